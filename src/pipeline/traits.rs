//! # Pipeline Seams
//!
//! The capabilities a [`PipelineRunner`](super::PipelineRunner) is assembled
//! from. Sources, processors and publishers are injected; the runner owns
//! only the stage channels and the admission gate.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{ProcessError, SourceError, ToolkitResult};

/// A unit of inbound work with an acknowledge/reject capability back to its source
///
/// Acknowledging an item on an offset-ordered source commits every earlier
/// item of the same partition as well.
#[async_trait]
pub trait WorkItem: Send + Sync + 'static {
    fn object_type(&self) -> &str;

    fn object_identifier(&self) -> &str;

    /// Check name or event name
    fn operation_name(&self) -> &str;

    async fn ack(&self) -> Result<(), SourceError>;

    async fn nack(&self) -> Result<(), SourceError>;
}

/// Produces work items, one at a time, until closed
#[async_trait]
pub trait WorkSource: Send + 'static {
    type Item: WorkItem;

    /// Next item, or `None` once the source is closed
    async fn recv(&mut self) -> Option<Self::Item>;
}

#[async_trait]
impl<I: WorkItem> WorkSource for mpsc::Receiver<I> {
    type Item = I;

    async fn recv(&mut self) -> Option<I> {
        mpsc::Receiver::recv(self).await
    }
}

/// Domain logic applied to each admitted item
///
/// Any error other than [`ProcessError::Skip`] is retried by the pipeline,
/// forever, with a fixed pause between attempts.
#[async_trait]
pub trait ItemProcessor<I: WorkItem>: Send + Sync + 'static {
    type Outcome: Send + Sync + 'static;

    async fn process(&self, item: &I) -> Result<Self::Outcome, ProcessError>;
}

/// Durably communicates an outcome; retried by the pipeline until it succeeds
#[async_trait]
pub trait OutcomePublisher<O: Send + Sync + 'static>: Send + Sync + 'static {
    async fn publish(&self, outcome: &O) -> ToolkitResult<()>;
}
