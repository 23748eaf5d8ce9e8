//! Fills a [`StatisticsCache`] from a feed of encoded statistics.
//!
//! Every message is acknowledged once handled, decodable or not.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::{Statistic, StatisticDto, StatisticProvider, StatisticsCache};
use crate::config::StatisticsConfig;
use crate::error::ToolkitResult;
use crate::source::RawMessage;

#[derive(Debug, Clone)]
pub struct StatisticsAggregator {
    cache: Arc<StatisticsCache>,
}

impl StatisticsAggregator {
    pub fn new(config: &StatisticsConfig) -> ToolkitResult<Self> {
        Ok(Self::with_cache(Arc::new(StatisticsCache::from_config(
            config,
        )?)))
    }

    pub fn with_cache(cache: Arc<StatisticsCache>) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> Arc<StatisticsCache> {
        self.cache.clone()
    }

    /// Consume messages until the channel closes or `cancel` fires
    pub async fn run(
        &self,
        mut messages: mpsc::Receiver<RawMessage>,
        cancel: CancellationToken,
    ) -> ToolkitResult<()> {
        info!(ttl_secs = self.cache.ttl().as_secs(), "Statistics aggregator started");

        loop {
            let message = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                next = messages.recv() => match next {
                    Some(message) => message,
                    None => break,
                },
            };
            self.absorb(&message);
            if let Err(e) = message.ack().await {
                error!(offset = ?message.offset(), error = %e, "Cannot ack statistic message");
            }
        }

        info!(cached = self.cache.len(), "Statistics aggregator finished");
        Ok(())
    }

    fn absorb(&self, message: &RawMessage) {
        match StatisticDto::from_json(message.payload()) {
            Ok(dto) => self.cache.set(dto.into()),
            Err(e) => error!(offset = ?message.offset(), error = %e, "Cannot parse statistic"),
        }
    }
}

#[async_trait]
impl StatisticProvider for StatisticsAggregator {
    async fn statistics(&self) -> ToolkitResult<Vec<Statistic>> {
        Ok(self.cache.get_all())
    }
}
