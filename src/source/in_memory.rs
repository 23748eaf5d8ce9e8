//! # In-Memory Partition
//!
//! Offset-ordered message log with a single consumer group and cumulative
//! commit, for tests and demos.
//!
//! ## Semantics
//!
//! - `produce` appends and returns the new offset.
//! - `subscribe` delivers every message from the committed offset onward, in
//!   order, waiting for new ones until the partition is closed.
//! - Acknowledging offset N commits every offset up to and including N.
//!   Commits never move backwards.
//! - Negative acknowledgment is counted and has no other effect.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};
use tracing::debug;

use super::{Acknowledge, RawMessage};
use crate::error::{SourceError, ToolkitResult};
use crate::statistics::{Statistic, StatisticDto, StatisticProvider, StatisticSink};

const LAG_DESCRIPTION: &str =
    "Check queue. Difference between the offsets of the last committed and the last written messages.";

#[derive(Debug, Default)]
struct PartitionLog {
    messages: Vec<Vec<u8>>,
    /// Offsets below this are committed
    committed: u64,
    closed: bool,
    failing_acks: u32,
}

#[derive(Debug)]
struct PartitionInner {
    topic: String,
    log: Mutex<PartitionLog>,
    appended: Notify,
    acks: AtomicU64,
    nacks: AtomicU64,
    lag_labels: Option<(String, String)>,
}

/// Shared handle to one in-memory partition
#[derive(Debug, Clone)]
pub struct InMemoryPartition {
    inner: Arc<PartitionInner>,
}

impl InMemoryPartition {
    pub fn new(topic: impl Into<String>) -> Self {
        Self::build(topic.into(), None)
    }

    /// Partition whose lag statistic is labelled with a check name and object type
    pub fn with_lag_labels(
        topic: impl Into<String>,
        operation_name: impl Into<String>,
        object_type: impl Into<String>,
    ) -> Self {
        Self::build(
            topic.into(),
            Some((operation_name.into(), object_type.into())),
        )
    }

    fn build(topic: String, lag_labels: Option<(String, String)>) -> Self {
        Self {
            inner: Arc::new(PartitionInner {
                topic,
                log: Mutex::new(PartitionLog::default()),
                appended: Notify::new(),
                acks: AtomicU64::new(0),
                nacks: AtomicU64::new(0),
                lag_labels,
            }),
        }
    }

    pub fn topic(&self) -> &str {
        &self.inner.topic
    }

    /// Append a message; returns its offset
    pub fn produce(&self, payload: impl Into<Vec<u8>>) -> u64 {
        let offset = {
            let mut log = self.inner.log.lock();
            log.messages.push(payload.into());
            (log.messages.len() - 1) as u64
        };
        self.inner.appended.notify_waiters();
        offset
    }

    /// Append a JSON-encoded record; returns its offset
    pub fn produce_json<T: serde::Serialize>(&self, record: &T) -> ToolkitResult<u64> {
        let payload = serde_json::to_vec(record)?;
        Ok(self.produce(payload))
    }

    /// Stop accepting waits; subscribers finish once they reach the end
    pub fn close(&self) {
        self.inner.log.lock().closed = true;
        self.inner.appended.notify_waiters();
    }

    /// Deliver messages from the committed offset onward into a bounded channel
    pub fn subscribe(&self, buffer: usize) -> mpsc::Receiver<RawMessage> {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let inner = self.inner.clone();
        tokio::spawn(deliver(inner, tx));
        rx
    }

    /// Number of committed messages (the next offset a restarted consumer reads)
    pub fn committed_offset(&self) -> u64 {
        self.inner.log.lock().committed
    }

    pub fn produced_count(&self) -> u64 {
        self.inner.log.lock().messages.len() as u64
    }

    /// Written but not yet committed
    pub fn consumer_lag(&self) -> u64 {
        let log = self.inner.log.lock();
        (log.messages.len() as u64).saturating_sub(log.committed)
    }

    pub fn ack_count(&self) -> u64 {
        self.inner.acks.load(Ordering::Relaxed)
    }

    pub fn nack_count(&self) -> u64 {
        self.inner.nacks.load(Ordering::Relaxed)
    }

    /// Make the next `count` acknowledgments fail
    pub fn fail_next_acks(&self, count: u32) {
        self.inner.log.lock().failing_acks = count;
    }

    fn lag_statistic(&self) -> Statistic {
        let name = match &self.inner.lag_labels {
            Some((operation, object_type)) => {
                format!("Consumer lag for check \"{operation}\" (object type: {object_type})")
            }
            None => format!("Consumer lag for topic \"{}\"", self.inner.topic),
        };
        Statistic::new(name, self.consumer_lag().to_string(), LAG_DESCRIPTION)
    }
}

async fn deliver(inner: Arc<PartitionInner>, tx: mpsc::Sender<RawMessage>) {
    let mut next = inner.log.lock().committed;

    loop {
        // Register before looking so an append between the check and the wait is not lost
        let appended = inner.appended.notified();

        let (payload, closed) = {
            let log = inner.log.lock();
            (log.messages.get(next as usize).cloned(), log.closed)
        };

        match payload {
            Some(payload) => {
                let handle = Arc::new(PartitionOffset {
                    inner: inner.clone(),
                    offset: next,
                });
                if tx.send(RawMessage::new(payload, handle)).await.is_err() {
                    break;
                }
                next += 1;
            }
            None if closed => break,
            None => {
                tokio::select! {
                    _ = appended => {}
                    _ = tx.closed() => break,
                }
            }
        }
    }

    debug!(topic = %inner.topic, delivered_up_to = next, "Partition subscription finished");
}

/// Acknowledgment handle for one delivered offset
struct PartitionOffset {
    inner: Arc<PartitionInner>,
    offset: u64,
}

#[async_trait]
impl Acknowledge for PartitionOffset {
    async fn ack(&self) -> Result<(), SourceError> {
        let mut log = self.inner.log.lock();
        if log.failing_acks > 0 {
            log.failing_acks -= 1;
            return Err(SourceError::ack(self.offset, "commit rejected by partition"));
        }
        log.committed = log.committed.max(self.offset + 1);
        self.inner.acks.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn nack(&self) -> Result<(), SourceError> {
        self.inner.nacks.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn offset(&self) -> Option<u64> {
        Some(self.offset)
    }
}

#[async_trait]
impl StatisticProvider for InMemoryPartition {
    async fn statistics(&self) -> ToolkitResult<Vec<Statistic>> {
        Ok(vec![self.lag_statistic()])
    }
}

#[async_trait]
impl StatisticSink for InMemoryPartition {
    async fn send(&self, statistic: &StatisticDto) -> ToolkitResult<()> {
        self.produce(statistic.to_json()?);
        Ok(())
    }
}
