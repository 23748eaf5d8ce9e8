//! # Acknowledgment Coalescing
//!
//! "Take latest, drop rest": collapse every item already queued behind the
//! one just received into the most recent of them.
//!
//! Discarded items are never acknowledged individually. This is only correct
//! on transports with cumulative commit, where acknowledging offset N commits
//! every earlier offset of the partition (Kafka-style). On a transport that
//! acknowledges messages individually the discarded items would be
//! redelivered, so this combinator must not be used there.

use tokio::sync::mpsc;

/// Result of a coalescing pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Coalesced<T> {
    pub latest: T,
    /// Items skipped over in favour of `latest`
    pub discarded: usize,
}

/// Drain what is queued right now and keep only the most recent item
///
/// The drain is non-blocking and bounded by the queue length observed when
/// the pass starts, so items arriving concurrently are left for the next pass.
pub fn take_latest<T>(first: T, rx: &mut mpsc::Receiver<T>) -> Coalesced<T> {
    let queued = rx.len();
    let mut latest = first;
    let mut discarded = 0;

    for _ in 0..queued {
        match rx.try_recv() {
            Ok(next) => {
                latest = next;
                discarded += 1;
            }
            Err(_) => break,
        }
    }

    Coalesced { latest, discarded }
}
