//! # Error Types
//!
//! Structured error handling for the toolkit using thiserror.
//!
//! Errors are split by who sees them:
//!
//! - [`ToolkitError`] is what constructors, loaders and sinks return to callers.
//! - [`ProcessError`] is what a business processor reports to the pipeline. The
//!   pipeline never surfaces it; it either retries or skips.
//! - [`SourceError`] is what acknowledging or rejecting a source message reports.

use thiserror::Error;

/// Crate-level error type
#[derive(Error, Debug)]
pub enum ToolkitError {
    #[error("Configuration error: {component}: {message}")]
    Configuration { component: String, message: String },

    #[error("Source error: {message}")]
    Source { message: String },

    #[error("Processing error: {message}")]
    Processing { message: String },

    #[error("Publish error: {message}")]
    Publish { message: String },

    #[error("Storage error: {operation}: {message}")]
    Storage { operation: String, message: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("Service {service} failed: {message}")]
    Service { service: String, message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl ToolkitError {
    /// Create a configuration error
    pub fn configuration(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Create a source error
    pub fn source(message: impl Into<String>) -> Self {
        Self::Source {
            message: message.into(),
        }
    }

    /// Create a processing error
    pub fn processing(message: impl Into<String>) -> Self {
        Self::Processing {
            message: message.into(),
        }
    }

    /// Create a publish error
    pub fn publish(message: impl Into<String>) -> Self {
        Self::Publish {
            message: message.into(),
        }
    }

    /// Create a storage error
    pub fn storage(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Storage {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create a service error
    pub fn service(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Service {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for ToolkitError {
    fn from(err: serde_json::Error) -> Self {
        ToolkitError::serialization(err.to_string())
    }
}

impl From<sqlx::Error> for ToolkitError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(config_err) => {
                ToolkitError::configuration("database", config_err.to_string())
            }
            other => ToolkitError::storage("sql", other.to_string()),
        }
    }
}

impl From<redb::Error> for ToolkitError {
    fn from(err: redb::Error) -> Self {
        ToolkitError::storage("kv", err.to_string())
    }
}

impl From<redb::DatabaseError> for ToolkitError {
    fn from(err: redb::DatabaseError) -> Self {
        ToolkitError::storage("kv_open", err.to_string())
    }
}

impl From<redb::TransactionError> for ToolkitError {
    fn from(err: redb::TransactionError) -> Self {
        ToolkitError::storage("kv_transaction", err.to_string())
    }
}

impl From<redb::TableError> for ToolkitError {
    fn from(err: redb::TableError) -> Self {
        ToolkitError::storage("kv_table", err.to_string())
    }
}

impl From<redb::StorageError> for ToolkitError {
    fn from(err: redb::StorageError) -> Self {
        ToolkitError::storage("kv_storage", err.to_string())
    }
}

impl From<redb::CommitError> for ToolkitError {
    fn from(err: redb::CommitError) -> Self {
        ToolkitError::storage("kv_commit", err.to_string())
    }
}

impl From<config::ConfigError> for ToolkitError {
    fn from(err: config::ConfigError) -> Self {
        ToolkitError::configuration("loader", err.to_string())
    }
}

impl From<SourceError> for ToolkitError {
    fn from(err: SourceError) -> Self {
        ToolkitError::source(err.to_string())
    }
}

/// Result type alias for toolkit operations
pub type ToolkitResult<T> = Result<T, ToolkitError>;

/// Outcome of a failed business-processor attempt.
///
/// `Skip` is the "skip result" sentinel: the item is dropped without an
/// outcome and without a retry. Everything else is retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessError {
    #[error("result skipped")]
    Skip,

    #[error("processing failed: {message}")]
    Failed { message: String },
}

impl ProcessError {
    /// Create a retryable failure
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, ProcessError::Skip)
    }
}

impl From<ToolkitError> for ProcessError {
    fn from(err: ToolkitError) -> Self {
        ProcessError::failed(err.to_string())
    }
}

/// Failure acknowledging or rejecting a source message
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("ack failed for offset {offset}: {message}")]
    Ack { offset: u64, message: String },

    #[error("nack failed for offset {offset}: {message}")]
    Nack { offset: u64, message: String },

    #[error("source unavailable: {message}")]
    Unavailable { message: String },
}

impl SourceError {
    pub fn ack(offset: u64, message: impl Into<String>) -> Self {
        Self::Ack {
            offset,
            message: message.into(),
        }
    }

    pub fn nack(offset: u64, message: impl Into<String>) -> Self {
        Self::Nack {
            offset,
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }
}
