//! # Consumer Services
//!
//! Thin configurations of the [`PipelineRunner`](crate::pipeline::PipelineRunner):
//!
//! - [`check::CheckService`] evaluates check orders and publishes results.
//! - [`changes::ChangesConsumerService`] applies change events, without a publish stage.
//!
//! [`ServiceSet`] runs several services under one cancellation token and
//! reports their failures together.

pub mod changes;
pub mod check;

use async_trait::async_trait;
use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::{ToolkitError, ToolkitResult};
use crate::logging::log_error;

pub use changes::{ChangeEvent, ChangeOutcome, ChangesConsumerService, ChangesProcessor};
pub use check::{
    CheckLogic, CheckOrder, CheckOrderProcessor, CheckResult, CheckService, ResultDto,
    ResultPublisher,
};

/// A long-running unit started by a [`ServiceSet`]
#[async_trait]
pub trait Service: Send + 'static {
    fn name(&self) -> &str;

    async fn run(self: Box<Self>, cancel: CancellationToken) -> ToolkitResult<()>;
}

/// Services run together until all of them return
#[derive(Default)]
pub struct ServiceSet {
    services: Vec<Box<dyn Service>>,
}

impl ServiceSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, service: impl Service) -> Self {
        self.services.push(Box::new(service));
        self
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Run every service concurrently; the first failure cancels the others
    ///
    /// Services run under a child of `cancel`, so a failure stops the set
    /// without cancelling the caller's token.
    pub async fn run(self, cancel: CancellationToken) -> ToolkitResult<()> {
        let set_cancel = cancel.child_token();
        let mut names = Vec::with_capacity(self.services.len());
        let mut handles = Vec::with_capacity(self.services.len());

        for service in self.services {
            let name = service.name().to_string();
            let cancel = set_cancel.clone();
            info!(service = %name, "Starting service");
            handles.push(tokio::spawn(async move {
                let result = service.run(cancel.clone()).await;
                if result.is_err() {
                    cancel.cancel();
                }
                result
            }));
            names.push(name);
        }

        let results = join_all(handles)
            .await
            .into_iter()
            .zip(names)
            .map(|(joined, name)| {
                let result = joined
                    .map_err(|e| ToolkitError::internal(format!("service task failed: {e}")))
                    .and_then(|result| result);
                if let Err(e) = &result {
                    log_error("service-set", &name, &e.to_string(), None);
                }
                result
            })
            .collect();

        compose_errors("service-set", results)
    }
}

/// Fold several results into one error listing every failure
pub fn compose_errors(context: &str, results: Vec<ToolkitResult<()>>) -> ToolkitResult<()> {
    let mut errors: Vec<ToolkitError> = results.into_iter().filter_map(Result::err).collect();

    match errors.len() {
        0 => Ok(()),
        1 => Err(errors.remove(0)),
        _ => Err(ToolkitError::service(
            context,
            errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; "),
        )),
    }
}
