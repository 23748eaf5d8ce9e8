//! Counters describing what a pipeline has done so far.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ToolkitResult;
use crate::statistics::{Statistic, StatisticProvider};

/// Statistics for pipeline observability
#[derive(Debug, Default)]
pub struct PipelineStats {
    /// Items admitted and handed to a task
    pub dispatched: AtomicU64,
    /// Items whose processor produced an outcome
    pub processed: AtomicU64,
    /// Items whose processor returned the skip sentinel
    pub skipped: AtomicU64,
    /// Outcomes accepted by the publisher
    pub published: AtomicU64,
    /// Successful acknowledgments (after coalescing)
    pub acknowledged: AtomicU64,
    /// Items covered by a later item's acknowledgment
    pub coalesced: AtomicU64,
    pub process_failures: AtomicU64,
    pub publish_failures: AtomicU64,
    pub ack_failures: AtomicU64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    pub fn get_processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn get_skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    pub fn get_published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    pub fn get_acknowledged(&self) -> u64 {
        self.acknowledged.load(Ordering::Relaxed)
    }

    pub fn get_coalesced(&self) -> u64 {
        self.coalesced.load(Ordering::Relaxed)
    }

    pub fn get_process_failures(&self) -> u64 {
        self.process_failures.load(Ordering::Relaxed)
    }

    pub fn get_publish_failures(&self) -> u64 {
        self.publish_failures.load(Ordering::Relaxed)
    }

    pub fn get_ack_failures(&self) -> u64 {
        self.ack_failures.load(Ordering::Relaxed)
    }

    /// Snapshot as named statistics, prefixed with the service id
    pub fn to_statistics(&self, service_id: &str) -> Vec<Statistic> {
        [
            ("dispatched", self.get_dispatched(), "Items admitted for processing"),
            ("processed", self.get_processed(), "Items with a produced outcome"),
            ("skipped", self.get_skipped(), "Items dropped by the processor"),
            ("published", self.get_published(), "Outcomes published"),
            ("acknowledged", self.get_acknowledged(), "Acknowledgments committed"),
            ("coalesced", self.get_coalesced(), "Items covered by a later acknowledgment"),
            ("process_failures", self.get_process_failures(), "Failed processor attempts"),
            ("publish_failures", self.get_publish_failures(), "Failed publish attempts"),
            ("ack_failures", self.get_ack_failures(), "Failed acknowledgment attempts"),
        ]
        .into_iter()
        .map(|(name, value, description)| {
            Statistic::new(
                format!("{service_id} {name}"),
                value.to_string(),
                description,
            )
        })
        .collect()
    }
}

/// Reports a pipeline's counters under its service id
#[derive(Debug, Clone)]
pub struct PipelineStatsProvider {
    service_id: String,
    stats: Arc<PipelineStats>,
}

impl PipelineStatsProvider {
    pub fn new(service_id: impl Into<String>, stats: Arc<PipelineStats>) -> Self {
        Self {
            service_id: service_id.into(),
            stats,
        }
    }
}

#[async_trait]
impl StatisticProvider for PipelineStatsProvider {
    async fn statistics(&self) -> ToolkitResult<Vec<Statistic>> {
        Ok(self.stats.to_statistics(&self.service_id))
    }
}
