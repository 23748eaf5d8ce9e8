//! # Terminal Sinks
//!
//! Where finished work ends up: an embedded key-value store, a relational
//! table, or (for demos) the log.

pub mod kv;
pub mod sql;
pub mod stub;

pub use kv::KvChangesAggregator;
pub use sql::{
    ChangeValue, ChangeValueConverter, PgChangeWriter, SqlChangeWriter, SqlChangesSaver,
    UpsertStatements,
};
pub use stub::{LoggingChangesSaver, LoggingResultPublisher, StubCheckLogic};
