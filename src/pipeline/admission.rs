//! # Admission Control
//!
//! Counting gate bounding how many items are processed at once.
//!
//! A permit is held for the whole task execution of one item, including all of
//! its failed attempts, and is returned by dropping it. Acquisition races the
//! pipeline's cancellation token: once cancelled, `acquire` returns `None`
//! immediately and the caller abandons dispatch.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

/// Bounded pool of admission slots
#[derive(Clone)]
pub struct AdmissionController {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    cancel: CancellationToken,
}

/// One admission slot; released on drop
#[derive(Debug)]
#[must_use = "dropping the permit releases the slot immediately"]
pub struct AdmissionPermit {
    _permit: OwnedSemaphorePermit,
}

impl AdmissionPermit {
    /// Return the slot to the pool
    pub fn release(self) {}
}

impl AdmissionController {
    /// Capacity is capped at [`Semaphore::MAX_PERMITS`]
    pub fn new(capacity: usize, cancel: CancellationToken) -> Self {
        let capacity = capacity.min(Semaphore::MAX_PERMITS);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            cancel,
        }
    }

    /// Wait for a free slot
    ///
    /// Returns `None` if the pipeline is cancelled before a slot frees up.
    pub async fn acquire(&self) -> Option<AdmissionPermit> {
        if self.cancel.is_cancelled() {
            return None;
        }

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            permit = self.semaphore.clone().acquire_owned() => {
                permit.ok().map(|permit| AdmissionPermit { _permit: permit })
            }
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn in_use(&self) -> usize {
        self.capacity.saturating_sub(self.available())
    }
}

impl std::fmt::Debug for AdmissionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionController")
            .field("capacity", &self.capacity)
            .field("in_use", &self.in_use())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}
