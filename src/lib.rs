#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Reactive Tools
//!
//! At-least-once message consumers with bounded parallelism, infinite retry
//! and coalesced acknowledgment.
//!
//! ## Overview
//!
//! A consumer reads work items (check orders or change events) from an
//! offset-ordered partition, evaluates each one with injected business logic,
//! optionally publishes the outcome, and commits its progress back to the
//! partition. Items are admitted in order, processed in parallel up to a
//! configured limit, and acknowledged cumulatively: one acknowledgment of the
//! most advanced finished item covers everything before it.
//!
//! ## Architecture
//!
//! ```text
//! partition ─→ MessageFeed ─→ PipelineRunner ─→ ResultPublisher (check service)
//!                 │ filter          │ admission gate, retry forever
//!                 └─ ack skipped    └─ coalesced ack ─→ partition
//!
//! StatisticProvider ─→ StatisticsSender ─→ sink ─→ StatisticsAggregator ─→ StatisticsCache (TTL)
//! ```
//!
//! ## Module Organization
//!
//! - [`pipeline`] - Admission gate, single-shot cells, coalescing and the pipeline runner
//! - [`source`] - Raw messages, typed feeds and the in-memory partition
//! - [`service`] - Check and changes-consumer services, service sets
//! - [`statistics`] - Statistic TTL cache, aggregator and sender
//! - [`sinks`] - Key-value, relational and logging sinks
//! - [`config`] - Configuration structures and loader
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use reactive_tools::config::{FeedConfig, PipelineConfig};
//! use reactive_tools::service::CheckService;
//! use reactive_tools::sinks::{LoggingResultPublisher, StubCheckLogic};
//! use reactive_tools::source::{CheckOrderData, InMemoryPartition, MessageFeed};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let partition = InMemoryPartition::new("check_orders");
//! partition.produce_json(&CheckOrderData::new("sku", "has_price", "42"))?;
//! partition.close();
//!
//! let cancel = CancellationToken::new();
//! let feed = MessageFeed::<CheckOrderData>::spawn(
//!     &FeedConfig::new("sku", "has_price"),
//!     partition.subscribe(64),
//!     cancel.clone(),
//! )?;
//!
//! let service = CheckService::new(
//!     PipelineConfig::default(),
//!     feed,
//!     StubCheckLogic,
//!     Arc::new(LoggingResultPublisher::new()),
//! )?;
//! service.run(cancel).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! ```bash
//! cargo test --lib    # Unit tests
//! cargo test          # Unit and integration tests
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod service;
pub mod sinks;
pub mod source;
pub mod statistics;

pub use config::{
    ConfigLoader, FeedConfig, KvSinkConfig, LogConfig, PipelineConfig, ServiceConfig,
    SqlSinkConfig, StatisticsConfig, ValueKind,
};
pub use error::{ProcessError, SourceError, ToolkitError, ToolkitResult};
pub use pipeline::{
    AdmissionController, ItemProcessor, OutcomePublisher, PipelineRunner, PipelineStats,
    WorkItem, WorkSource,
};
pub use service::{
    compose_errors, ChangesConsumerService, ChangesProcessor, CheckLogic, CheckService,
    ResultPublisher, Service, ServiceSet,
};
pub use source::{InMemoryPartition, MessageFeed, RawMessage};
pub use statistics::{Statistic, StatisticProvider, StatisticsCache};
