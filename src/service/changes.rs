//! # Changes Consumer Service
//!
//! Applies change events to a terminal sink through a [`ChangesProcessor`].
//! There is no publish stage: an event counts as finished as soon as the
//! processor has stored it, and is then acknowledged.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::Service;
use crate::config::PipelineConfig;
use crate::error::{ProcessError, ToolkitResult};
use crate::pipeline::{ItemProcessor, PipelineRunner, PipelineStats, PipelineStatsProvider, WorkSource};
use crate::source::{ChangeEventMessage, FeedItem};

/// A change event as handed to the processor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub object_type: String,
    pub object_identifier: String,
    pub event_name: String,
    /// Change data, `,` already replaced by `;`
    pub data: String,
}

impl From<&ChangeEventMessage> for ChangeEvent {
    fn from(message: &ChangeEventMessage) -> Self {
        Self {
            object_type: message.object_type.clone(),
            object_identifier: message.object_identifier.clone(),
            event_name: message.event_name.clone(),
            data: message.data(),
        }
    }
}

/// Identity of a change that has been applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeOutcome {
    pub object_type: String,
    pub object_identifier: String,
    pub event_name: String,
}

/// Stores one change event
///
/// Return [`ProcessError::Skip`] to ignore the event; any other error is retried.
#[async_trait]
pub trait ChangesProcessor: Send + Sync + 'static {
    async fn process(&self, event: &ChangeEvent) -> Result<(), ProcessError>;
}

struct ChangeEventProcessor<P> {
    inner: Arc<P>,
}

#[async_trait]
impl<P: ChangesProcessor> ItemProcessor<FeedItem<ChangeEventMessage>> for ChangeEventProcessor<P> {
    type Outcome = ChangeOutcome;

    async fn process(
        &self,
        item: &FeedItem<ChangeEventMessage>,
    ) -> Result<ChangeOutcome, ProcessError> {
        let event = ChangeEvent::from(item.record());
        self.inner.process(&event).await?;
        Ok(ChangeOutcome {
            object_type: event.object_type,
            object_identifier: event.object_identifier,
            event_name: event.event_name,
        })
    }
}

/// Change-event pipeline without a publish stage
pub struct ChangesConsumerService<S, P>
where
    S: WorkSource<Item = FeedItem<ChangeEventMessage>>,
    P: ChangesProcessor,
{
    pipeline: PipelineRunner<S, ChangeEventProcessor<P>>,
}

impl<S, P> ChangesConsumerService<S, P>
where
    S: WorkSource<Item = FeedItem<ChangeEventMessage>>,
    P: ChangesProcessor,
{
    pub fn new(config: PipelineConfig, source: S, processor: Arc<P>) -> ToolkitResult<Self> {
        let pipeline = PipelineRunner::new(
            config,
            source,
            Arc::new(ChangeEventProcessor { inner: processor }),
        )?;
        Ok(Self { pipeline })
    }

    pub fn stats(&self) -> Arc<PipelineStats> {
        self.pipeline.stats()
    }

    pub fn statistics_provider(&self) -> PipelineStatsProvider {
        PipelineStatsProvider::new(self.service_id(), self.pipeline.stats())
    }

    pub fn service_id(&self) -> &str {
        &self.pipeline.config().service_id
    }

    pub async fn run(self, cancel: CancellationToken) -> ToolkitResult<()> {
        self.pipeline.run(cancel).await
    }
}

#[async_trait]
impl<S, P> Service for ChangesConsumerService<S, P>
where
    S: WorkSource<Item = FeedItem<ChangeEventMessage>>,
    P: ChangesProcessor,
{
    fn name(&self) -> &str {
        self.service_id()
    }

    async fn run(self: Box<Self>, cancel: CancellationToken) -> ToolkitResult<()> {
        ChangesConsumerService::run(*self, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FeedConfig;
    use crate::source::{InMemoryPartition, MessageFeed};
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<ChangeEvent>>,
    }

    #[async_trait]
    impl ChangesProcessor for Recorder {
        async fn process(&self, event: &ChangeEvent) -> Result<(), ProcessError> {
            self.events.lock().push(event.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_changes_flow_into_processor_and_commit() {
        let partition = InMemoryPartition::new("changes");
        for (id, data) in [("1", "a,b"), ("2", "c")] {
            partition
                .produce_json(&ChangeEventMessage::new("sku", id, "flags_changed", data))
                .unwrap();
        }
        partition
            .produce_json(&ChangeEventMessage::new("sku", "3", "deleted", ""))
            .unwrap();
        partition.close();

        let cancel = CancellationToken::new();
        let feed = MessageFeed::<ChangeEventMessage>::spawn(
            &FeedConfig::new("sku", "flags_changed"),
            partition.subscribe(8),
            cancel.clone(),
        )
        .unwrap();

        let recorder = Arc::new(Recorder::default());
        let service =
            ChangesConsumerService::new(PipelineConfig::for_test(2), feed, recorder.clone())
                .unwrap();
        let stats = service.stats();
        service.run(cancel).await.unwrap();

        let mut events = recorder.events.lock().clone();
        events.sort_by(|a, b| a.object_identifier.cmp(&b.object_identifier));
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].data, "a;b");
        assert_eq!(stats.get_published(), 0);
        assert_eq!(stats.get_processed(), 2);
        assert_eq!(partition.committed_offset(), 3);
    }
}
