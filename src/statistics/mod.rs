//! # Statistics
//!
//! Named metrics pushed into a TTL cache and pulled by whoever reports them.
//!
//! - [`Statistic`]: immutable `(name, value, description)` keyed by name
//! - [`StatisticProvider`]: anything that can report a snapshot of statistics
//! - [`cache::StatisticsCache`]: TTL keyed cache of the latest value per name
//! - [`aggregator::StatisticsAggregator`]: fills a cache from a message feed
//! - [`sender::StatisticsSender`]: periodically pushes a provider's snapshot to a sink

pub mod aggregator;
pub mod cache;
pub mod dto;
pub mod sender;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ToolkitResult;

pub use aggregator::StatisticsAggregator;
pub use cache::StatisticsCache;
pub use dto::StatisticDto;
pub use sender::{StatisticSink, StatisticsSender};

/// A single named metric
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statistic {
    name: String,
    value: String,
    description: String,
}

impl Statistic {
    pub fn new(
        name: impl Into<String>,
        value: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            description: description.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

/// Reports a snapshot of statistics
#[async_trait]
pub trait StatisticProvider: Send + Sync + 'static {
    async fn statistics(&self) -> ToolkitResult<Vec<Statistic>>;
}

/// Several providers reported as one snapshot
///
/// The first failing provider fails the whole snapshot.
#[derive(Clone, Default)]
pub struct ProviderSet {
    providers: Vec<Arc<dyn StatisticProvider>>,
}

impl ProviderSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, provider: Arc<dyn StatisticProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl std::fmt::Debug for ProviderSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSet")
            .field("providers", &self.providers.len())
            .finish()
    }
}

#[async_trait]
impl StatisticProvider for ProviderSet {
    async fn statistics(&self) -> ToolkitResult<Vec<Statistic>> {
        let mut all = Vec::new();
        for provider in &self.providers {
            all.extend(provider.statistics().await?);
        }
        Ok(all)
    }
}
