//! # Configuration
//!
//! Typed configuration for pipelines, message feeds, statistics and sinks.
//! Structures deserialize from the JSON service configuration (see
//! [`loader::ConfigLoader`]) and can also be built in code for tests.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use reactive_tools::config::ConfigLoader;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigLoader::new("config.json").load()?;
//!
//! let parallelism = config.pipeline.parallelism;
//! let retry = config.pipeline.process_retry_interval();
//! # Ok(())
//! # }
//! ```

pub mod loader;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ToolkitError, ToolkitResult};

pub use loader::ConfigLoader;

const DEFAULT_PROCESS_RETRY_INTERVAL_MS: u64 = 5_000;
const DEFAULT_ACK_RETRY_INTERVAL_MS: u64 = 100;
const DEFAULT_FEED_CHANNEL_BUFFER: usize = 64;
const DEFAULT_STATISTICS_SEND_INTERVAL_SECS: u64 = 60;

/// Largest parallelism or channel buffer the runtime can allocate
pub const MAX_PIPELINE_CAPACITY: usize = tokio::sync::Semaphore::MAX_PERMITS;

fn default_service_id() -> String {
    "reactive-pipeline".to_string()
}

fn default_process_retry_interval_ms() -> u64 {
    DEFAULT_PROCESS_RETRY_INTERVAL_MS
}

fn default_ack_retry_interval_ms() -> u64 {
    DEFAULT_ACK_RETRY_INTERVAL_MS
}

fn default_feed_channel_buffer() -> usize {
    DEFAULT_FEED_CHANNEL_BUFFER
}

fn default_send_interval_in_secs() -> u64 {
    DEFAULT_STATISTICS_SEND_INTERVAL_SECS
}

/// Root configuration for a consumer service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub pipeline: PipelineConfig,
    pub feed: FeedConfig,
    #[serde(default)]
    pub statistics: Option<StatisticsConfig>,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub sql_sink: Option<SqlSinkConfig>,
    #[serde(default)]
    pub kv_sink: Option<KvSinkConfig>,
}

impl ServiceConfig {
    pub fn validate(&self) -> ToolkitResult<()> {
        self.pipeline.validate()?;
        self.feed.validate()?;
        if let Some(statistics) = &self.statistics {
            statistics.validate()?;
        }
        self.log.validate()?;
        if let Some(sql) = &self.sql_sink {
            sql.validate()?;
        }
        if let Some(kv) = &self.kv_sink {
            kv.validate()?;
        }
        Ok(())
    }
}

/// Pipeline engine settings
///
/// `parallelism` is required. Channel buffers fall back to `parallelism`
/// when not given.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Identifier used in log fields
    #[serde(default = "default_service_id")]
    pub service_id: String,
    /// Maximum number of items processed concurrently
    pub parallelism: usize,
    #[serde(default)]
    pub processing_buffer: Option<usize>,
    #[serde(default)]
    pub completion_buffer: Option<usize>,
    #[serde(default)]
    pub acknowledging_buffer: Option<usize>,
    /// Pause between failed processor or publisher attempts
    #[serde(default = "default_process_retry_interval_ms")]
    pub process_retry_interval_ms: u64,
    /// Pause between failed acknowledgment attempts
    #[serde(default = "default_ack_retry_interval_ms")]
    pub ack_retry_interval_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            service_id: default_service_id(),
            parallelism: 10,
            processing_buffer: None,
            completion_buffer: None,
            acknowledging_buffer: None,
            process_retry_interval_ms: DEFAULT_PROCESS_RETRY_INTERVAL_MS,
            ack_retry_interval_ms: DEFAULT_ACK_RETRY_INTERVAL_MS,
        }
    }
}

impl PipelineConfig {
    /// Configuration with millisecond retry intervals for tests
    pub fn for_test(parallelism: usize) -> Self {
        Self {
            service_id: "test-pipeline".to_string(),
            parallelism,
            process_retry_interval_ms: 10,
            ack_retry_interval_ms: 5,
            ..Self::default()
        }
    }

    pub fn processing_buffer(&self) -> usize {
        self.processing_buffer.unwrap_or(self.parallelism)
    }

    pub fn completion_buffer(&self) -> usize {
        self.completion_buffer.unwrap_or(self.parallelism)
    }

    pub fn acknowledging_buffer(&self) -> usize {
        self.acknowledging_buffer.unwrap_or(self.parallelism)
    }

    pub fn process_retry_interval(&self) -> Duration {
        Duration::from_millis(self.process_retry_interval_ms)
    }

    pub fn ack_retry_interval(&self) -> Duration {
        Duration::from_millis(self.ack_retry_interval_ms)
    }

    pub fn validate(&self) -> ToolkitResult<()> {
        if self.parallelism < 1 {
            return Err(ToolkitError::configuration(
                "pipeline",
                "parallelism must be at least 1",
            ));
        }
        if self.parallelism > MAX_PIPELINE_CAPACITY {
            return Err(ToolkitError::configuration(
                "pipeline",
                format!("parallelism must not exceed {MAX_PIPELINE_CAPACITY}"),
            ));
        }

        for (name, buffer) in [
            ("processing_buffer", self.processing_buffer),
            ("completion_buffer", self.completion_buffer),
            ("acknowledging_buffer", self.acknowledging_buffer),
        ] {
            match buffer {
                Some(0) => {
                    return Err(ToolkitError::configuration(
                        "pipeline",
                        format!("{name} must be at least 1"),
                    ));
                }
                Some(size) if size > MAX_PIPELINE_CAPACITY => {
                    return Err(ToolkitError::configuration(
                        "pipeline",
                        format!("{name} must not exceed {MAX_PIPELINE_CAPACITY}"),
                    ));
                }
                _ => {}
            }
        }

        if self.service_id.is_empty() {
            return Err(ToolkitError::configuration(
                "pipeline",
                "service_id cannot be empty",
            ));
        }

        Ok(())
    }
}

/// Message feed filter settings
///
/// Records whose object type and operation name do not match are
/// acknowledged and dropped by the feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    #[serde(alias = "target_object_type")]
    pub object_type: String,
    /// Check name or event name, depending on the service
    #[serde(alias = "check_name", alias = "event_name", alias = "target_event_name")]
    pub operation_name: String,
    #[serde(default = "default_feed_channel_buffer")]
    pub channel_buffer: usize,
}

impl FeedConfig {
    pub fn new(object_type: impl Into<String>, operation_name: impl Into<String>) -> Self {
        Self {
            object_type: object_type.into(),
            operation_name: operation_name.into(),
            channel_buffer: DEFAULT_FEED_CHANNEL_BUFFER,
        }
    }

    pub fn validate(&self) -> ToolkitResult<()> {
        if self.object_type.is_empty() {
            return Err(ToolkitError::configuration(
                "feed",
                "object_type cannot be empty",
            ));
        }
        if self.operation_name.is_empty() {
            return Err(ToolkitError::configuration(
                "feed",
                "operation_name cannot be empty",
            ));
        }
        if self.channel_buffer < 1 || self.channel_buffer > MAX_PIPELINE_CAPACITY {
            return Err(ToolkitError::configuration(
                "feed",
                format!("channel_buffer must be between 1 and {MAX_PIPELINE_CAPACITY}"),
            ));
        }
        Ok(())
    }
}

/// Statistics cache and sender settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatisticsConfig {
    /// Time-to-live of cached statistics
    pub cache_timeout_in_secs: u64,
    #[serde(default = "default_send_interval_in_secs")]
    pub send_interval_in_secs: u64,
}

impl StatisticsConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_timeout_in_secs)
    }

    pub fn send_interval(&self) -> Duration {
        Duration::from_secs(self.send_interval_in_secs)
    }

    pub fn validate(&self) -> ToolkitResult<()> {
        if self.cache_timeout_in_secs == 0 {
            return Err(ToolkitError::configuration(
                "statistics",
                "cache_timeout_in_secs must be greater than 0",
            ));
        }
        if self.send_interval_in_secs == 0 {
            return Err(ToolkitError::configuration(
                "statistics",
                "send_interval_in_secs must be greater than 0",
            ));
        }
        Ok(())
    }
}

/// Logging settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogConfig {
    /// `error`, `info` or `debug`; environment default when absent
    #[serde(default)]
    pub level: Option<String>,
    /// Directory for the JSON log file; console only when absent
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

impl LogConfig {
    pub fn validate(&self) -> ToolkitResult<()> {
        match self.level.as_deref() {
            None | Some("error") | Some("info") | Some("debug") => Ok(()),
            Some(other) => Err(ToolkitError::configuration(
                "log",
                format!("unsupported level '{other}', expected error, info or debug"),
            )),
        }
    }
}

/// How change data is written into the value column
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    #[default]
    Text,
    Int,
}

/// Relational upsert sink settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqlSinkConfig {
    pub conn_string: String,
    pub item_flags_table: String,
    pub item_column: String,
    pub data_column: String,
    #[serde(default)]
    pub value_kind: ValueKind,
}

impl SqlSinkConfig {
    pub fn validate(&self) -> ToolkitResult<()> {
        if self.conn_string.is_empty() {
            return Err(ToolkitError::configuration(
                "sql_sink",
                "conn_string cannot be empty",
            ));
        }
        for (name, value) in [
            ("item_flags_table", &self.item_flags_table),
            ("item_column", &self.item_column),
            ("data_column", &self.data_column),
        ] {
            if value.is_empty() {
                return Err(ToolkitError::configuration(
                    "sql_sink",
                    format!("{name} cannot be empty"),
                ));
            }
        }
        Ok(())
    }
}

/// Embedded key-value sink settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KvSinkConfig {
    #[serde(alias = "bolt_storage_path")]
    pub storage_path: PathBuf,
}

impl KvSinkConfig {
    pub fn validate(&self) -> ToolkitResult<()> {
        if self.storage_path.as_os_str().is_empty() {
            return Err(ToolkitError::configuration(
                "kv_sink",
                "storage_path cannot be empty",
            ));
        }
        Ok(())
    }
}
