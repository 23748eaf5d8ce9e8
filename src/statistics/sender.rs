//! Periodic push of a provider's statistics into a sink.
//!
//! A failed round is logged and the next one runs on schedule; the sender
//! only stops on cancellation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::{StatisticDto, StatisticProvider};
use crate::config::StatisticsConfig;
use crate::error::{ToolkitError, ToolkitResult};

/// Destination for encoded statistics
#[async_trait]
pub trait StatisticSink: Send + Sync + 'static {
    async fn send(&self, statistic: &StatisticDto) -> ToolkitResult<()>;
}

pub struct StatisticsSender {
    provider: Arc<dyn StatisticProvider>,
    sink: Arc<dyn StatisticSink>,
    interval: Duration,
}

impl std::fmt::Debug for StatisticsSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatisticsSender")
            .field("interval", &self.interval)
            .finish()
    }
}

impl StatisticsSender {
    pub fn new(
        provider: Arc<dyn StatisticProvider>,
        sink: Arc<dyn StatisticSink>,
        interval: Duration,
    ) -> ToolkitResult<Self> {
        if interval.is_zero() {
            return Err(ToolkitError::configuration(
                "statistics",
                "send interval must be greater than 0",
            ));
        }
        Ok(Self {
            provider,
            sink,
            interval,
        })
    }

    pub fn from_config(
        config: &StatisticsConfig,
        provider: Arc<dyn StatisticProvider>,
        sink: Arc<dyn StatisticSink>,
    ) -> ToolkitResult<Self> {
        config.validate()?;
        Self::new(provider, sink, config.send_interval())
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Send one round every interval until cancelled
    pub async fn run(&self, cancel: CancellationToken) -> ToolkitResult<()> {
        info!(interval_secs = self.interval.as_secs(), "Statistics sender started");

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }

            if let Err(e) = self.send_once().await {
                error!(error = %e, "Error during statistics send");
            }
        }

        info!("Statistics sender finishing");
        Ok(())
    }

    /// Pull one snapshot and push it; stops at the first failing statistic
    pub async fn send_once(&self) -> ToolkitResult<usize> {
        let statistics = self.provider.statistics().await.map_err(|e| {
            ToolkitError::publish(format!("cannot get statistics to send: {e}"))
        })?;

        for statistic in &statistics {
            self.sink.send(&StatisticDto::from(statistic)).await?;
        }

        debug!(sent = statistics.len(), "Statistics sent");
        Ok(statistics.len())
    }
}
