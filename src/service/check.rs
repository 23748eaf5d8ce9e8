//! # Check Service
//!
//! Evaluates check orders with injected [`CheckLogic`], publishes each
//! [`CheckResult`] through a [`ResultPublisher`], then acknowledges the
//! orders back to their source.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use reactive_tools::config::PipelineConfig;
//! use reactive_tools::service::CheckService;
//! use reactive_tools::sinks::{LoggingResultPublisher, StubCheckLogic};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example(
//! #     source: tokio::sync::mpsc::Receiver<reactive_tools::source::FeedItem<reactive_tools::source::CheckOrderData>>,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let service = CheckService::new(
//!     PipelineConfig::default(),
//!     source,
//!     StubCheckLogic,
//!     Arc::new(LoggingResultPublisher::new()),
//! )?;
//! service.run(CancellationToken::new()).await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::{compose_errors, Service};
use crate::config::PipelineConfig;
use crate::error::{ProcessError, ToolkitResult};
use crate::pipeline::{
    ItemProcessor, OutcomePublisher, PipelineRunner, PipelineStats, PipelineStatsProvider,
    WorkItem, WorkSource,
};
use crate::source::InMemoryPartition;
use crate::statistics::StatisticsSender;

/// What the check logic sees of an order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOrder {
    pub object_type: String,
    pub object_identifier: String,
    pub check_name: String,
}

impl CheckOrder {
    pub fn from_item<I: WorkItem>(item: &I) -> Self {
        Self {
            object_type: item.object_type().to_string(),
            object_identifier: item.object_identifier().to_string(),
            check_name: item.operation_name().to_string(),
        }
    }
}

/// Business logic of one check
///
/// Returns the result message and whether the check passed. Return
/// [`ProcessError::Skip`] to drop the order without a result; any other error
/// is retried.
#[async_trait]
pub trait CheckLogic: Send + Sync + 'static {
    async fn perform(&self, order: &CheckOrder) -> Result<(String, bool), ProcessError>;
}

/// Immutable outcome of one check order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub object_type: String,
    pub object_identifier: String,
    pub check_name: String,
    pub message: String,
    pub success: bool,
}

impl CheckResult {
    pub fn new(order: CheckOrder, message: impl Into<String>, success: bool) -> Self {
        Self {
            object_type: order.object_type,
            object_identifier: order.object_identifier,
            check_name: order.check_name,
            message: message.into(),
            success,
        }
    }

    pub fn to_dto(&self) -> ResultDto {
        ResultDto {
            object_type: self.object_type.clone(),
            identifier: self.object_identifier.clone(),
            check_name: self.check_name.clone(),
            check_status: self.success,
            check_message: self.message.clone(),
        }
    }
}

/// Published result wire record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultDto {
    pub object_type: String,
    pub identifier: String,
    pub check_name: String,
    pub check_status: bool,
    pub check_message: String,
}

/// Durably publishes check results
#[async_trait]
pub trait ResultPublisher: Send + Sync + 'static {
    async fn publish(&self, result: &CheckResult) -> ToolkitResult<()>;
}

#[async_trait]
impl ResultPublisher for InMemoryPartition {
    async fn publish(&self, result: &CheckResult) -> ToolkitResult<()> {
        self.produce_json(&result.to_dto())?;
        Ok(())
    }
}

struct ResultPublishing(Arc<dyn ResultPublisher>);

#[async_trait]
impl OutcomePublisher<CheckResult> for ResultPublishing {
    async fn publish(&self, outcome: &CheckResult) -> ToolkitResult<()> {
        self.0.publish(outcome).await
    }
}

/// Adapts [`CheckLogic`] to the pipeline's processor seam
#[derive(Debug)]
pub struct CheckOrderProcessor<L> {
    logic: L,
}

impl<L: CheckLogic> CheckOrderProcessor<L> {
    pub fn new(logic: L) -> Self {
        Self { logic }
    }
}

#[async_trait]
impl<I: WorkItem, L: CheckLogic> ItemProcessor<I> for CheckOrderProcessor<L> {
    type Outcome = CheckResult;

    async fn process(&self, item: &I) -> Result<CheckResult, ProcessError> {
        let order = CheckOrder::from_item(item);
        let (message, success) = self.logic.perform(&order).await?;
        Ok(CheckResult::new(order, message, success))
    }
}

/// Check pipeline plus an optional statistics sender
pub struct CheckService<S, L>
where
    S: WorkSource,
    L: CheckLogic,
{
    pipeline: PipelineRunner<S, CheckOrderProcessor<L>>,
    sender: Option<StatisticsSender>,
}

impl<S, L> CheckService<S, L>
where
    S: WorkSource,
    L: CheckLogic,
{
    pub fn new(
        config: PipelineConfig,
        source: S,
        logic: L,
        publisher: Arc<dyn ResultPublisher>,
    ) -> ToolkitResult<Self> {
        let pipeline =
            PipelineRunner::new(config, source, Arc::new(CheckOrderProcessor::new(logic)))?
                .with_publisher(Arc::new(ResultPublishing(publisher)));
        Ok(Self {
            pipeline,
            sender: None,
        })
    }

    /// Push statistics while the pipeline runs
    pub fn with_statistics_sender(mut self, sender: StatisticsSender) -> Self {
        self.sender = Some(sender);
        self
    }

    pub fn stats(&self) -> Arc<PipelineStats> {
        self.pipeline.stats()
    }

    /// Pipeline counters as a statistic provider
    pub fn statistics_provider(&self) -> PipelineStatsProvider {
        PipelineStatsProvider::new(self.service_id(), self.pipeline.stats())
    }

    pub fn service_id(&self) -> &str {
        &self.pipeline.config().service_id
    }

    /// Run until cancelled or the source drains
    pub async fn run(self, cancel: CancellationToken) -> ToolkitResult<()> {
        let service_id = self.service_id().to_string();
        let Self { pipeline, sender } = self;

        let Some(sender) = sender else {
            return pipeline.run(cancel).await;
        };

        // The sender outlives neither cancellation nor a drained pipeline
        let sender_cancel = cancel.child_token();
        let pipeline_run = async {
            let result = pipeline.run(cancel.clone()).await;
            sender_cancel.cancel();
            result
        };
        let (pipeline_result, sender_result) =
            tokio::join!(pipeline_run, sender.run(sender_cancel.clone()));

        compose_errors(&service_id, vec![pipeline_result, sender_result])
    }
}

#[async_trait]
impl<S, L> Service for CheckService<S, L>
where
    S: WorkSource,
    L: CheckLogic,
{
    fn name(&self) -> &str {
        self.service_id()
    }

    async fn run(self: Box<Self>, cancel: CancellationToken) -> ToolkitResult<()> {
        CheckService::run(*self, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{SourceError, ToolkitError};

    struct Order(&'static str);

    #[async_trait]
    impl WorkItem for Order {
        fn object_type(&self) -> &str {
            "sku"
        }

        fn object_identifier(&self) -> &str {
            self.0
        }

        fn operation_name(&self) -> &str {
            "has_price"
        }

        async fn ack(&self) -> Result<(), SourceError> {
            Ok(())
        }

        async fn nack(&self) -> Result<(), SourceError> {
            Ok(())
        }
    }

    struct PriceCheck;

    #[async_trait]
    impl CheckLogic for PriceCheck {
        async fn perform(&self, order: &CheckOrder) -> Result<(String, bool), ProcessError> {
            match order.object_identifier.as_str() {
                "skip" => Err(ProcessError::Skip),
                "flaky" => Err(ToolkitError::processing("pricing service down").into()),
                id => Ok((format!("price found for {id}"), true)),
            }
        }
    }

    #[tokio::test]
    async fn test_processor_builds_result() {
        let processor = CheckOrderProcessor::new(PriceCheck);
        let result = processor.process(&Order("42")).await.unwrap();

        assert_eq!(
            result,
            CheckResult {
                object_type: "sku".to_string(),
                object_identifier: "42".to_string(),
                check_name: "has_price".to_string(),
                message: "price found for 42".to_string(),
                success: true,
            }
        );
    }

    #[tokio::test]
    async fn test_processor_passes_skip_and_failure_through() {
        let processor = CheckOrderProcessor::new(PriceCheck);
        assert_eq!(
            processor.process(&Order("skip")).await,
            Err(ProcessError::Skip)
        );
        assert!(matches!(
            processor.process(&Order("flaky")).await,
            Err(ProcessError::Failed { .. })
        ));
    }

    #[test]
    fn test_result_dto_wire_format() {
        let order = CheckOrder {
            object_type: "sku".to_string(),
            object_identifier: "7".to_string(),
            check_name: "has_image".to_string(),
        };
        let dto = CheckResult::new(order, "no image", false).to_dto();
        let json = serde_json::to_value(&dto).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "object_type": "sku",
                "identifier": "7",
                "check_name": "has_image",
                "check_status": false,
                "check_message": "no image",
            })
        );
    }

    #[tokio::test]
    async fn test_partition_publisher_writes_dto() {
        let results = InMemoryPartition::new("results");
        let order = CheckOrder::from_item(&Order("9"));
        ResultPublisher::publish(&results, &CheckResult::new(order, "ok", true))
            .await
            .unwrap();
        results.close();

        let message = results.subscribe(1).recv().await.unwrap();
        let dto: ResultDto = serde_json::from_slice(message.payload()).unwrap();
        assert_eq!(dto.identifier, "9");
        assert!(dto.check_status);
    }
}
