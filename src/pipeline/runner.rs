//! # Pipeline Runner
//!
//! Generic ordered processing pipeline: admission-controlled fan-out of work
//! items to processor tasks, fan-in through publishing, and coalesced
//! acknowledgment back to the source.
//!
//! ## Architecture
//!
//! ```text
//! source ─→ dispatch ─[Admission]─→ task: processor (retry forever) ─→ outcome cell
//!              │
//!              └─→ processing ─→ wait outcome ─→ publish (retry forever) ─→ completion cell
//!                      │
//!                      └─→ completion (admission order) ─→ acknowledging (take latest, ack with retry)
//! ```
//!
//! - Dispatch is serial: items are admitted in source order.
//! - Tasks run in parallel, bounded by the admission gate, and may finish out
//!   of order.
//! - The completion stage waits on items in admission order, so the item that
//!   reaches acknowledgment is always one whose predecessors are finished.
//! - The acknowledging stage coalesces whatever is queued into the most recent
//!   item and acknowledges only that one.
//!
//! ## Shutdown
//!
//! Cancelling the token stops every stage loop and `run` returns `Ok(())`.
//! Admitted tasks are not aborted; they keep retrying until their processor
//! succeeds. When the source closes, dispatch stops and the remaining items
//! drain through publish and acknowledgment before `run` returns `Ok(())`.
//!
//! An item whose task ends without an outcome (the processor panicked) can
//! never be acknowledged. Nothing admitted after it is acknowledged either:
//! the pipeline stops and `run` returns [`ToolkitError::Internal`], leaving the
//! source to redeliver from the last committed item.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::admission::{AdmissionController, AdmissionPermit};
use super::cell::{cell, CellReader, CellWriter};
use super::coalesce::take_latest;
use super::stats::PipelineStats;
use super::traits::{ItemProcessor, OutcomePublisher, WorkItem, WorkSource};
use crate::config::PipelineConfig;
use crate::error::{ProcessError, ToolkitError, ToolkitResult};
use crate::logging::{log_error, log_item_operation};

/// How an item's downstream processing finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Outcome produced and accepted by the publisher
    Published,
    /// Outcome produced; the pipeline has no publish stage
    Processed,
    /// Processor returned the skip sentinel; nothing was published
    Skipped,
}

enum ItemOutcome<O> {
    Produced(O),
    Skipped,
}

struct Dispatched<I, O> {
    item: Arc<I>,
    outcome: CellReader<ItemOutcome<O>>,
    completion_writer: CellWriter<Completion>,
    completion_reader: CellReader<Completion>,
}

struct Pending<I> {
    item: Arc<I>,
    completion: CellReader<Completion>,
}

type SharedPublisher<O> = Arc<dyn OutcomePublisher<O>>;

#[derive(Clone)]
struct StageContext {
    service_id: Arc<str>,
    instance_id: Uuid,
    cancel: CancellationToken,
    process_retry: Duration,
    ack_retry: Duration,
    stats: Arc<PipelineStats>,
}

/// Ordered processing pipeline over a source, a processor and an optional publisher
pub struct PipelineRunner<S, P>
where
    S: WorkSource,
    P: ItemProcessor<S::Item>,
{
    source: S,
    processor: Arc<P>,
    publisher: Option<SharedPublisher<P::Outcome>>,
    config: PipelineConfig,
    stats: Arc<PipelineStats>,
    instance_id: Uuid,
}

impl<S, P> std::fmt::Debug for PipelineRunner<S, P>
where
    S: WorkSource,
    P: ItemProcessor<S::Item>,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineRunner")
            .field("service_id", &self.config.service_id)
            .field("instance_id", &self.instance_id)
            .field("parallelism", &self.config.parallelism)
            .field("has_publisher", &self.publisher.is_some())
            .finish()
    }
}

impl<S, P> PipelineRunner<S, P>
where
    S: WorkSource,
    P: ItemProcessor<S::Item>,
{
    /// Create a pipeline without a publish stage
    ///
    /// Fails on invalid configuration; the pipeline is never started then.
    pub fn new(config: PipelineConfig, source: S, processor: Arc<P>) -> ToolkitResult<Self> {
        config.validate()?;
        Ok(Self {
            source,
            processor,
            publisher: None,
            config,
            stats: Arc::new(PipelineStats::new()),
            instance_id: Uuid::new_v4(),
        })
    }

    /// Add a publish stage between processing and acknowledgment
    pub fn with_publisher(mut self, publisher: SharedPublisher<P::Outcome>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn stats(&self) -> Arc<PipelineStats> {
        self.stats.clone()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn has_publish_stage(&self) -> bool {
        self.publisher.is_some()
    }

    /// Run until cancelled or until the source closes and in-flight items drain
    ///
    /// Processing errors are never returned; they are retried inside the
    /// pipeline. An error is returned only if an item's task ends without an
    /// outcome or a stage task panics.
    pub async fn run(self, cancel: CancellationToken) -> ToolkitResult<()> {
        let Self {
            mut source,
            processor,
            publisher,
            config,
            stats,
            instance_id,
        } = self;

        // Stages stop on the caller's cancel or on an abandoned item
        let stop = cancel.child_token();
        let ctx = StageContext {
            service_id: Arc::from(config.service_id.as_str()),
            instance_id,
            cancel: stop.clone(),
            process_retry: config.process_retry_interval(),
            ack_retry: config.ack_retry_interval(),
            stats,
        };

        let admission = AdmissionController::new(config.parallelism, stop.clone());
        let (processing_tx, processing_rx) = mpsc::channel(config.processing_buffer());
        let (completion_tx, completion_rx) = mpsc::channel(config.completion_buffer());
        let (acknowledging_tx, acknowledging_rx) = mpsc::channel(config.acknowledging_buffer());

        let stages = vec![
            tokio::spawn(processing_stage(
                ctx.clone(),
                processing_rx,
                completion_tx,
                publisher,
            )),
            tokio::spawn(acknowledging_stage(ctx.clone(), acknowledging_rx)),
        ];
        let completion = tokio::spawn(completion_stage(
            ctx.clone(),
            completion_rx,
            acknowledging_tx,
        ));

        info!(
            service_id = %ctx.service_id,
            instance_id = %ctx.instance_id,
            parallelism = config.parallelism,
            "Pipeline started"
        );

        loop {
            let next = tokio::select! {
                biased;
                _ = stop.cancelled() => {
                    info!(service_id = %ctx.service_id, "Cancellation requested, stopping dispatch");
                    break;
                }
                next = source.recv() => next,
            };

            let Some(item) = next else {
                info!(
                    service_id = %ctx.service_id,
                    in_flight = admission.in_use(),
                    "Source closed, draining in-flight items"
                );
                break;
            };

            debug!(
                service_id = %ctx.service_id,
                object_type = %item.object_type(),
                object_identifier = %item.object_identifier(),
                operation = %item.operation_name(),
                "Received work item"
            );

            if !dispatch(&ctx, &admission, &processor, &processing_tx, item).await {
                break;
            }
        }

        // Closing the first channel lets the stages drain and exit in turn
        drop(processing_tx);

        let (stages, completion) = tokio::join!(join_all(stages), completion);
        for joined in stages {
            joined.map_err(|e| ToolkitError::internal(format!("pipeline stage failed: {e}")))?;
        }
        completion
            .map_err(|e| ToolkitError::internal(format!("pipeline stage failed: {e}")))??;

        info!(
            service_id = %ctx.service_id,
            instance_id = %ctx.instance_id,
            dispatched = ctx.stats.get_dispatched(),
            acknowledged = ctx.stats.get_acknowledged(),
            "Pipeline stopped"
        );

        Ok(())
    }
}

/// Admit one item: take a slot, start its task and hand it to processing
///
/// Returns `false` when the pipeline was cancelled while waiting.
async fn dispatch<I, P>(
    ctx: &StageContext,
    admission: &AdmissionController,
    processor: &Arc<P>,
    processing_tx: &mpsc::Sender<Dispatched<I, P::Outcome>>,
    item: I,
) -> bool
where
    I: WorkItem,
    P: ItemProcessor<I>,
{
    let Some(permit) = admission.acquire().await else {
        return false;
    };

    let item = Arc::new(item);
    let (outcome_writer, outcome_reader) = cell();
    let (completion_writer, completion_reader) = cell();

    log_item_operation(
        &ctx.service_id,
        "dispatch",
        item.object_type(),
        item.object_identifier(),
        item.operation_name(),
        None,
    );
    PipelineStats::incr(&ctx.stats.dispatched);

    tokio::spawn(execute(
        ctx.clone(),
        processor.clone(),
        item.clone(),
        outcome_writer,
        permit,
    ));

    let dispatched = Dispatched {
        item,
        outcome: outcome_reader,
        completion_writer,
        completion_reader,
    };

    tokio::select! {
        biased;
        _ = ctx.cancel.cancelled() => false,
        sent = processing_tx.send(dispatched) => sent.is_ok(),
    }
}

/// Run the processor until it succeeds or skips, then release the slot
async fn execute<I, P>(
    ctx: StageContext,
    processor: Arc<P>,
    item: Arc<I>,
    outcome: CellWriter<ItemOutcome<P::Outcome>>,
    permit: AdmissionPermit,
) where
    I: WorkItem,
    P: ItemProcessor<I>,
{
    let mut attempt: u64 = 0;
    let result = loop {
        attempt += 1;
        match processor.process(item.as_ref()).await {
            Ok(produced) => {
                PipelineStats::incr(&ctx.stats.processed);
                break ItemOutcome::Produced(produced);
            }
            Err(ProcessError::Skip) => {
                PipelineStats::incr(&ctx.stats.skipped);
                debug!(
                    service_id = %ctx.service_id,
                    object_identifier = %item.object_identifier(),
                    operation = %item.operation_name(),
                    "Processor skipped item"
                );
                break ItemOutcome::Skipped;
            }
            Err(e) => {
                PipelineStats::incr(&ctx.stats.process_failures);
                error!(
                    service_id = %ctx.service_id,
                    object_type = %item.object_type(),
                    object_identifier = %item.object_identifier(),
                    operation = %item.operation_name(),
                    attempt = attempt,
                    error = %e,
                    retry_in_ms = ctx.process_retry.as_millis() as u64,
                    "Error during item processing, retrying"
                );
                tokio::time::sleep(ctx.process_retry).await;
            }
        }
    };

    if !outcome.complete(result) {
        debug!(
            service_id = %ctx.service_id,
            object_identifier = %item.object_identifier(),
            "Outcome dropped, pipeline no longer waiting"
        );
    }

    permit.release();
}

/// Forward dispatched items in order and publish each outcome as it becomes ready
async fn processing_stage<I, O>(
    ctx: StageContext,
    mut rx: mpsc::Receiver<Dispatched<I, O>>,
    tx: mpsc::Sender<Pending<I>>,
    publisher: Option<SharedPublisher<O>>,
) where
    I: WorkItem,
    O: Send + Sync + 'static,
{
    loop {
        let dispatched = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return,
            next = rx.recv() => match next {
                Some(dispatched) => dispatched,
                None => return,
            },
        };

        let Dispatched {
            item,
            outcome,
            completion_writer,
            completion_reader,
        } = dispatched;

        tokio::spawn(publish_outcome(
            ctx.clone(),
            item.clone(),
            outcome,
            completion_writer,
            publisher.clone(),
        ));

        let pending = Pending {
            item,
            completion: completion_reader,
        };

        let sent = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return,
            sent = tx.send(pending) => sent,
        };
        if sent.is_err() {
            return;
        }
    }
}

async fn publish_outcome<I, O>(
    ctx: StageContext,
    item: Arc<I>,
    outcome: CellReader<ItemOutcome<O>>,
    completion: CellWriter<Completion>,
    publisher: Option<SharedPublisher<O>>,
) where
    I: WorkItem,
    O: Send + Sync + 'static,
{
    let finished = match outcome.wait().await {
        Ok(ItemOutcome::Produced(produced)) => match publisher {
            Some(publisher) => {
                publish_with_retry(&ctx, item.as_ref(), publisher.as_ref(), &produced).await;
                Completion::Published
            }
            None => Completion::Processed,
        },
        Ok(ItemOutcome::Skipped) => Completion::Skipped,
        Err(_) => {
            warn!(
                service_id = %ctx.service_id,
                object_identifier = %item.object_identifier(),
                operation = %item.operation_name(),
                "Item task ended without an outcome"
            );
            return;
        }
    };

    completion.complete(finished);
}

async fn publish_with_retry<I, O>(
    ctx: &StageContext,
    item: &I,
    publisher: &dyn OutcomePublisher<O>,
    outcome: &O,
) where
    I: WorkItem,
    O: Send + Sync + 'static,
{
    loop {
        match publisher.publish(outcome).await {
            Ok(()) => {
                PipelineStats::incr(&ctx.stats.published);
                info!(
                    service_id = %ctx.service_id,
                    object_identifier = %item.object_identifier(),
                    operation = %item.operation_name(),
                    "Outcome published"
                );
                return;
            }
            Err(e) => {
                PipelineStats::incr(&ctx.stats.publish_failures);
                error!(
                    service_id = %ctx.service_id,
                    object_identifier = %item.object_identifier(),
                    operation = %item.operation_name(),
                    error = %e,
                    "Cannot publish outcome, retrying"
                );
                tokio::time::sleep(ctx.process_retry).await;
            }
        }
    }
}

/// Wait for each item's completion in admission order, then pass it on
///
/// An item that can never complete stops the pipeline: nothing admitted
/// after it may reach acknowledgment.
async fn completion_stage<I: WorkItem>(
    ctx: StageContext,
    mut rx: mpsc::Receiver<Pending<I>>,
    tx: mpsc::Sender<Arc<I>>,
) -> ToolkitResult<()> {
    loop {
        let pending = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return Ok(()),
            next = rx.recv() => match next {
                Some(pending) => pending,
                None => return Ok(()),
            },
        };

        let finished = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return Ok(()),
            finished = pending.completion.wait() => finished,
        };

        let Ok(completion) = finished else {
            let message = format!(
                "item {} ({}) ended without an outcome",
                pending.item.object_identifier(),
                pending.item.operation_name()
            );
            log_error(
                &ctx.service_id,
                "completion",
                &message,
                Some("stopping before acknowledging any later item"),
            );
            ctx.cancel.cancel();
            return Err(ToolkitError::internal(message));
        };

        debug!(
            service_id = %ctx.service_id,
            object_identifier = %pending.item.object_identifier(),
            completion = ?completion,
            "Item finished"
        );
        let sent = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return Ok(()),
            sent = tx.send(pending.item) => sent,
        };
        if sent.is_err() {
            return Ok(());
        }
    }
}

/// Acknowledge the most recent finished item, coalescing everything queued behind it
async fn acknowledging_stage<I: WorkItem>(ctx: StageContext, mut rx: mpsc::Receiver<Arc<I>>) {
    loop {
        let first = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return,
            next = rx.recv() => match next {
                Some(item) => item,
                None => return,
            },
        };

        let coalesced = take_latest(first, &mut rx);
        if coalesced.discarded > 0 {
            ctx.stats
                .coalesced
                .fetch_add(coalesced.discarded as u64, std::sync::atomic::Ordering::Relaxed);
            debug!(
                service_id = %ctx.service_id,
                discarded = coalesced.discarded,
                object_identifier = %coalesced.latest.object_identifier(),
                "Coalesced pending acknowledgments"
            );
        }

        if !acknowledge(&ctx, coalesced.latest.as_ref()).await {
            return;
        }
    }
}

/// Retry `ack` until it succeeds; `false` if cancelled first
async fn acknowledge<I: WorkItem>(ctx: &StageContext, item: &I) -> bool {
    loop {
        match item.ack().await {
            Ok(()) => {
                PipelineStats::incr(&ctx.stats.acknowledged);
                info!(
                    service_id = %ctx.service_id,
                    object_type = %item.object_type(),
                    object_identifier = %item.object_identifier(),
                    operation = %item.operation_name(),
                    "Item acknowledged"
                );
                return true;
            }
            Err(e) => {
                PipelineStats::incr(&ctx.stats.ack_failures);
                error!(
                    service_id = %ctx.service_id,
                    object_identifier = %item.object_identifier(),
                    error = %e,
                    retry_in_ms = ctx.ack_retry.as_millis() as u64,
                    "Cannot ack finished item, retrying"
                );
                tokio::select! {
                    biased;
                    _ = ctx.cancel.cancelled() => return false,
                    _ = tokio::time::sleep(ctx.ack_retry) => {}
                }
            }
        }
    }
}
