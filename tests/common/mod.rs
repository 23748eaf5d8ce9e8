//! # Pipeline Test Helpers
//!
//! In-memory work items with an acknowledgment ledger, and recording
//! processors and publishers whose behaviour is scripted per item.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use reactive_tools::error::{ProcessError, SourceError, ToolkitError, ToolkitResult};
use reactive_tools::pipeline::{ItemProcessor, OutcomePublisher, WorkItem};

/// Records every successful acknowledgment, in order
#[derive(Debug, Default)]
pub struct AckLedger {
    acked: Mutex<Vec<u64>>,
    failing_acks: AtomicU32,
}

impl AckLedger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn acked(&self) -> Vec<u64> {
        self.acked.lock().clone()
    }

    pub fn last_acked(&self) -> Option<u64> {
        self.acked.lock().last().copied()
    }

    /// Make the next `count` ack attempts fail
    pub fn fail_next_acks(&self, count: u32) {
        self.failing_acks.store(count, Ordering::SeqCst);
    }
}

/// Work item identified by its sequence number
#[derive(Debug)]
pub struct SeqItem {
    pub seq: u64,
    identifier: String,
    ledger: Arc<AckLedger>,
}

impl SeqItem {
    pub fn new(seq: u64, ledger: Arc<AckLedger>) -> Self {
        Self {
            seq,
            identifier: seq.to_string(),
            ledger,
        }
    }
}

#[async_trait]
impl WorkItem for SeqItem {
    fn object_type(&self) -> &str {
        "sku"
    }

    fn object_identifier(&self) -> &str {
        &self.identifier
    }

    fn operation_name(&self) -> &str {
        "has_price"
    }

    async fn ack(&self) -> Result<(), SourceError> {
        let failing = self
            .ledger
            .failing_acks
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            return Err(SourceError::ack(self.seq, "broker unavailable"));
        }
        self.ledger.acked.lock().push(self.seq);
        Ok(())
    }

    async fn nack(&self) -> Result<(), SourceError> {
        Ok(())
    }
}

/// Channel pre-filled with items `1..=count`; keep the sender to hold the source open
pub fn seq_source(
    count: u64,
    ledger: &Arc<AckLedger>,
) -> (mpsc::Sender<SeqItem>, mpsc::Receiver<SeqItem>) {
    let (tx, rx) = mpsc::channel(count.max(1) as usize);
    for seq in 1..=count {
        tx.try_send(SeqItem::new(seq, ledger.clone()))
            .expect("channel sized for every item");
    }
    (tx, rx)
}

/// Per-item script for [`ScriptedProcessor`]
#[derive(Debug, Clone, Default)]
pub struct Script {
    pub failures: u32,
    pub delay: Duration,
    pub skip: bool,
    /// Panic instead of returning, leaving the item without an outcome
    pub panic: bool,
}

/// Processor that follows a per-item script and records what it did
#[derive(Debug, Default)]
pub struct ScriptedProcessor {
    scripts: Mutex<HashMap<u64, Script>>,
    default_delay: Duration,
    skip_all: bool,
    pub attempts: Mutex<Vec<u64>>,
    pub outcomes: Mutex<Vec<u64>>,
    in_flight: AtomicUsize,
    pub peak_in_flight: AtomicUsize,
}

impl ScriptedProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn skipping_everything() -> Self {
        Self {
            skip_all: true,
            ..Self::default()
        }
    }

    pub fn with_default_delay(mut self, delay: Duration) -> Self {
        self.default_delay = delay;
        self
    }

    pub fn with_script(self, seq: u64, script: Script) -> Self {
        self.scripts.lock().insert(seq, script);
        self
    }

    pub fn attempts(&self) -> Vec<u64> {
        self.attempts.lock().clone()
    }

    pub fn outcomes(&self) -> Vec<u64> {
        let mut outcomes = self.outcomes.lock().clone();
        outcomes.sort_unstable();
        outcomes
    }

    pub fn peak(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ItemProcessor<SeqItem> for ScriptedProcessor {
    type Outcome = u64;

    async fn process(&self, item: &SeqItem) -> Result<u64, ProcessError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        self.attempts.lock().push(item.seq);

        let (delay, fail, skip, panic) = {
            let mut scripts = self.scripts.lock();
            match scripts.get_mut(&item.seq) {
                Some(script) => {
                    let fail = script.failures > 0;
                    if fail {
                        script.failures -= 1;
                    }
                    (script.delay, fail, script.skip || self.skip_all, script.panic)
                }
                None => (self.default_delay, false, self.skip_all, false),
            }
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if panic {
            panic!("processor crashed on item {}", item.seq);
        }

        if skip {
            return Err(ProcessError::Skip);
        }
        if fail {
            return Err(ProcessError::failed(format!("item {} not ready", item.seq)));
        }
        self.outcomes.lock().push(item.seq);
        Ok(item.seq)
    }
}

/// Publisher recording every outcome it accepted
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<u64>>,
    failing: AtomicU32,
    pub calls: AtomicUsize,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_first(count: u32) -> Self {
        Self {
            failing: AtomicU32::new(count),
            ..Self::default()
        }
    }

    pub fn published(&self) -> Vec<u64> {
        let mut published = self.published.lock().clone();
        published.sort_unstable();
        published
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OutcomePublisher<u64> for RecordingPublisher {
    async fn publish(&self, outcome: &u64) -> ToolkitResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failing
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            return Err(ToolkitError::publish("results topic unavailable"));
        }
        self.published.lock().push(*outcome);
        Ok(())
    }
}

/// Poll `condition` every few milliseconds until it holds or `timeout` passes
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    condition()
}
