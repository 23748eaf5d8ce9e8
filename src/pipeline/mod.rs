//! # Reactive Pipeline
//!
//! Building blocks for at-least-once consumers: an admission gate bounding
//! parallel work, single-shot cells linking stages, acknowledgment coalescing,
//! and the [`PipelineRunner`] wiring them into dispatch, processing,
//! completion and acknowledging stages.

pub mod admission;
pub mod cell;
pub mod coalesce;
pub mod runner;
pub mod stats;
pub mod traits;

pub use admission::{AdmissionController, AdmissionPermit};
pub use cell::{cell, CellCancelled, CellReader, CellState, CellWriter};
pub use coalesce::{take_latest, Coalesced};
pub use runner::{Completion, PipelineRunner};
pub use stats::{PipelineStats, PipelineStatsProvider};
pub use traits::{ItemProcessor, OutcomePublisher, WorkItem, WorkSource};
