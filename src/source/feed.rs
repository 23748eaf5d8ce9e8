//! # Message Feeds
//!
//! Turns a stream of [`RawMessage`]s into typed work items for one pipeline.
//!
//! A feed decodes each payload as JSON into its record type and keeps only
//! records whose object type and operation name match its [`FeedConfig`].
//!
//! - Non-matching records are acknowledged on the spot and dropped.
//! - Undecodable payloads are logged and dropped without acknowledgment; a
//!   later cumulative acknowledgment covers them.
//! - Matching records are forwarded, in source order, into a bounded channel
//!   read by the pipeline through [`WorkSource`].
//!
//! Acknowledging a filtered record on a cumulative-commit transport also
//! commits any earlier matching records still in flight, so a crash at that
//! point loses them. Give each pipeline its own partition where that matters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::RawMessage;
use crate::config::FeedConfig;
use crate::error::{SourceError, ToolkitResult};
use crate::pipeline::{WorkItem, WorkSource};

/// A decodable inbound record with a work-item identity
pub trait InboundRecord: DeserializeOwned + Send + Sync + 'static {
    fn object_type(&self) -> &str;

    fn object_identifier(&self) -> &str;

    /// Check name or event name
    fn operation_name(&self) -> &str;
}

/// Decoded record together with the message it came from
#[derive(Debug)]
pub struct FeedItem<R> {
    record: R,
    message: RawMessage,
}

impl<R: InboundRecord> FeedItem<R> {
    pub fn new(record: R, message: RawMessage) -> Self {
        Self { record, message }
    }

    pub fn record(&self) -> &R {
        &self.record
    }

    pub fn offset(&self) -> Option<u64> {
        self.message.offset()
    }
}

#[async_trait]
impl<R: InboundRecord> WorkItem for FeedItem<R> {
    fn object_type(&self) -> &str {
        self.record.object_type()
    }

    fn object_identifier(&self) -> &str {
        self.record.object_identifier()
    }

    fn operation_name(&self) -> &str {
        self.record.operation_name()
    }

    async fn ack(&self) -> Result<(), SourceError> {
        self.message.ack().await
    }

    async fn nack(&self) -> Result<(), SourceError> {
        self.message.nack().await
    }
}

/// Counters of what a feed did with the messages it read
#[derive(Debug, Default)]
pub struct FeedStats {
    pub matched: AtomicU64,
    pub filtered: AtomicU64,
    pub undecodable: AtomicU64,
}

impl FeedStats {
    pub fn get_matched(&self) -> u64 {
        self.matched.load(Ordering::Relaxed)
    }

    pub fn get_filtered(&self) -> u64 {
        self.filtered.load(Ordering::Relaxed)
    }

    pub fn get_undecodable(&self) -> u64 {
        self.undecodable.load(Ordering::Relaxed)
    }
}

/// Filtered, typed work-item stream over raw messages
pub struct MessageFeed<R> {
    items: mpsc::Receiver<FeedItem<R>>,
    stats: Arc<FeedStats>,
}

impl<R: InboundRecord> MessageFeed<R> {
    /// Start filtering `raw` in a background task
    ///
    /// The task stops when `raw` closes, when the feed is dropped, or on
    /// cancellation; the feed then reports closed to the pipeline.
    pub fn spawn(
        config: &FeedConfig,
        raw: mpsc::Receiver<RawMessage>,
        cancel: CancellationToken,
    ) -> ToolkitResult<Self> {
        config.validate()?;

        let (tx, items) = mpsc::channel(config.channel_buffer);
        let stats = Arc::new(FeedStats::default());

        info!(
            object_type = %config.object_type,
            operation = %config.operation_name,
            buffer = config.channel_buffer,
            "Message feed started"
        );

        tokio::spawn(filter_messages::<R>(
            config.object_type.clone(),
            config.operation_name.clone(),
            raw,
            tx,
            cancel,
            stats.clone(),
        ));

        Ok(Self { items, stats })
    }

    pub fn stats(&self) -> Arc<FeedStats> {
        self.stats.clone()
    }
}

#[async_trait]
impl<R: InboundRecord> WorkSource for MessageFeed<R> {
    type Item = FeedItem<R>;

    async fn recv(&mut self) -> Option<FeedItem<R>> {
        self.items.recv().await
    }
}

async fn filter_messages<R: InboundRecord>(
    object_type: String,
    operation_name: String,
    mut raw: mpsc::Receiver<RawMessage>,
    tx: mpsc::Sender<FeedItem<R>>,
    cancel: CancellationToken,
    stats: Arc<FeedStats>,
) {
    loop {
        let message = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = raw.recv() => match next {
                Some(message) => message,
                None => break,
            },
        };

        let record: R = match serde_json::from_slice(message.payload()) {
            Ok(record) => record,
            Err(e) => {
                stats.undecodable.fetch_add(1, Ordering::Relaxed);
                error!(
                    offset = ?message.offset(),
                    error = %e,
                    "Cannot parse message, skipping"
                );
                continue;
            }
        };

        if record.object_type() != object_type || record.operation_name() != operation_name {
            stats.filtered.fetch_add(1, Ordering::Relaxed);
            if let Err(e) = message.ack().await {
                error!(
                    offset = ?message.offset(),
                    error = %e,
                    "Cannot ack skipped message"
                );
            }
            continue;
        }

        stats.matched.fetch_add(1, Ordering::Relaxed);
        let item = FeedItem::new(record, message);
        let sent = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            sent = tx.send(item) => sent,
        };
        if sent.is_err() {
            break;
        }
    }

    debug!(
        object_type = %object_type,
        operation = %operation_name,
        matched = stats.get_matched(),
        filtered = stats.get_filtered(),
        "Message feed stopped"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::records::CheckOrderData;
    use crate::source::InMemoryPartition;

    fn order(object_type: &str, check: &str, id: &str) -> Vec<u8> {
        serde_json::to_vec(&CheckOrderData::new(object_type, check, id)).unwrap()
    }

    #[tokio::test]
    async fn test_feed_filters_and_acks_non_matching() {
        let partition = InMemoryPartition::new("orders");
        partition.produce(order("sku", "other_check", "1"));
        partition.produce(order("sku", "has_price", "2"));
        partition.produce(order("category", "has_price", "3"));
        partition.produce(b"{broken".to_vec());
        partition.produce(order("sku", "has_price", "5"));
        partition.close();

        let cancel = CancellationToken::new();
        let mut feed = MessageFeed::<CheckOrderData>::spawn(
            &FeedConfig::new("sku", "has_price"),
            partition.subscribe(8),
            cancel,
        )
        .unwrap();

        let first = feed.recv().await.unwrap();
        let second = feed.recv().await.unwrap();
        assert!(feed.recv().await.is_none());

        assert_eq!(first.object_identifier(), "2");
        assert_eq!(first.offset(), Some(1));
        assert_eq!(second.object_identifier(), "5");

        let stats = feed.stats();
        assert_eq!(stats.get_matched(), 2);
        assert_eq!(stats.get_filtered(), 2);
        assert_eq!(stats.get_undecodable(), 1);

        // Filtered offset 2 was acknowledged, committing through it
        assert_eq!(partition.committed_offset(), 3);
        assert_eq!(partition.ack_count(), 2);
    }

    #[tokio::test]
    async fn test_feed_item_ack_delegates_to_message() {
        let partition = InMemoryPartition::new("orders");
        partition.produce(order("sku", "has_price", "1"));
        partition.close();

        let mut feed = MessageFeed::<CheckOrderData>::spawn(
            &FeedConfig::new("sku", "has_price"),
            partition.subscribe(1),
            CancellationToken::new(),
        )
        .unwrap();

        let item = feed.recv().await.unwrap();
        item.ack().await.unwrap();
        assert_eq!(partition.committed_offset(), 1);
        assert_eq!(partition.consumer_lag(), 0);
    }

    #[tokio::test]
    async fn test_invalid_feed_config_rejected() {
        let (_tx, rx) = mpsc::channel(1);
        let result =
            MessageFeed::<CheckOrderData>::spawn(&FeedConfig::new("", "x"), rx, CancellationToken::new());
        assert!(result.is_err());
    }
}
