//! Stand-in logic and sinks that only log, for demos and wiring tests.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tracing::info;

use crate::error::{ProcessError, ToolkitResult};
use crate::service::{
    ChangeEvent, ChangesProcessor, CheckLogic, CheckOrder, CheckResult, ResultPublisher,
};

pub const STUB_RESULT_MESSAGE: &str = "stub_result_msg";

/// Passes every check with a fixed message
#[derive(Debug, Clone, Copy, Default)]
pub struct StubCheckLogic;

#[async_trait]
impl CheckLogic for StubCheckLogic {
    async fn perform(&self, _order: &CheckOrder) -> Result<(String, bool), ProcessError> {
        Ok((STUB_RESULT_MESSAGE.to_string(), true))
    }
}

/// Logs and counts results instead of publishing them
#[derive(Debug, Default)]
pub struct LoggingResultPublisher {
    published: AtomicU64,
}

impl LoggingResultPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ResultPublisher for LoggingResultPublisher {
    async fn publish(&self, result: &CheckResult) -> ToolkitResult<()> {
        let count = self.published.fetch_add(1, Ordering::Relaxed) + 1;
        info!(
            count = count,
            object_identifier = %result.object_identifier,
            check_name = %result.check_name,
            success = result.success,
            message = %result.message,
            "Got check result"
        );
        Ok(())
    }
}

/// Logs change events instead of storing them
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingChangesSaver;

#[async_trait]
impl ChangesProcessor for LoggingChangesSaver {
    async fn process(&self, event: &ChangeEvent) -> Result<(), ProcessError> {
        info!(
            object_type = %event.object_type,
            object_identifier = %event.object_identifier,
            data = %event.data,
            "Saving new value"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order() -> CheckOrder {
        CheckOrder {
            object_type: "sku".to_string(),
            object_identifier: "1".to_string(),
            check_name: "has_price".to_string(),
        }
    }

    #[tokio::test]
    async fn test_stub_logic_always_passes() {
        let (message, success) = StubCheckLogic.perform(&order()).await.unwrap();
        assert_eq!(message, "stub_result_msg");
        assert!(success);
    }

    #[tokio::test]
    async fn test_logging_publisher_counts() {
        let publisher = LoggingResultPublisher::new();
        let result = CheckResult::new(order(), "ok", true);
        publisher.publish(&result).await.unwrap();
        publisher.publish(&result).await.unwrap();
        assert_eq!(publisher.published(), 2);
    }
}
