//! TTL keyed cache of the most recent value of each named statistic.
//!
//! Entries are superseded by the next `set` under the same name and never
//! deleted; stale entries are simply not reported. Deadlines use
//! [`tokio::time::Instant`] so paused-clock tests can drive expiry.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;

use super::{Statistic, StatisticProvider};
use crate::config::StatisticsConfig;
use crate::error::{ToolkitError, ToolkitResult};

#[derive(Debug, Clone)]
struct CachedStatistic {
    statistic: Statistic,
    deadline: Instant,
}

/// Latest statistic per name, each with its own expiry deadline
#[derive(Debug)]
pub struct StatisticsCache {
    entries: Mutex<HashMap<String, CachedStatistic>>,
    ttl: Duration,
}

impl StatisticsCache {
    /// Create a cache; a zero TTL is rejected
    pub fn new(ttl: Duration) -> ToolkitResult<Self> {
        if ttl.is_zero() {
            return Err(ToolkitError::configuration(
                "statistics",
                "cache ttl must be greater than 0",
            ));
        }
        Ok(Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        })
    }

    pub fn from_config(config: &StatisticsConfig) -> ToolkitResult<Self> {
        config.validate()?;
        Self::new(config.cache_ttl())
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Insert or replace by name; the deadline restarts at now + ttl
    pub fn set(&self, statistic: Statistic) {
        let deadline = Instant::now() + self.ttl;
        let mut entries = self.entries.lock();
        debug!(name = %statistic.name(), value = %statistic.value(), "Cached statistic");
        entries.insert(
            statistic.name().to_string(),
            CachedStatistic {
                statistic,
                deadline,
            },
        );
    }

    /// Every entry whose deadline has not passed, ordered by name
    pub fn get_all(&self) -> Vec<Statistic> {
        let now = Instant::now();
        let entries = self.entries.lock();
        let mut fresh: Vec<Statistic> = entries
            .values()
            .filter(|cached| now < cached.deadline)
            .map(|cached| cached.statistic.clone())
            .collect();
        fresh.sort_by(|a, b| a.name().cmp(b.name()));
        fresh
    }

    /// Number of stored entries, stale ones included
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[async_trait]
impl StatisticProvider for StatisticsCache {
    async fn statistics(&self) -> ToolkitResult<Vec<Statistic>> {
        Ok(self.get_all())
    }
}
