//! # Single-Shot Cells
//!
//! One-producer, one-consumer cell carrying a single value. The writer is
//! consumed by [`CellWriter::complete`], so a cell can never be written twice;
//! dropping the writer without completing moves the cell to `Cancelled`.
//!
//! The pipeline uses one cell for an item's outcome and one for its
//! completion signal.

use thiserror::Error;
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;

/// Observable state of a cell
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellState<T> {
    Pending,
    Ready(T),
    Cancelled,
}

/// The writer was dropped without completing the cell
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("cell cancelled before a value was written")]
pub struct CellCancelled;

/// Writing half
#[derive(Debug)]
pub struct CellWriter<T> {
    tx: oneshot::Sender<T>,
}

/// Reading half
#[derive(Debug)]
pub struct CellReader<T> {
    rx: oneshot::Receiver<T>,
}

/// Create an empty cell
pub fn cell<T>() -> (CellWriter<T>, CellReader<T>) {
    let (tx, rx) = oneshot::channel();
    (CellWriter { tx }, CellReader { rx })
}

impl<T> CellWriter<T> {
    /// Write the value
    ///
    /// Returns `false` if the reader has already gone away; the value is
    /// dropped in that case.
    pub fn complete(self, value: T) -> bool {
        self.tx.send(value).is_ok()
    }

    pub fn is_abandoned(&self) -> bool {
        self.tx.is_closed()
    }
}

impl<T> CellReader<T> {
    /// Wait for the value
    pub async fn wait(self) -> Result<T, CellCancelled> {
        self.rx.await.map_err(|_| CellCancelled)
    }

    /// Look at the cell without waiting
    ///
    /// `Ready` is reported at most once; later calls report `Cancelled`.
    pub fn try_take(&mut self) -> CellState<T> {
        match self.rx.try_recv() {
            Ok(value) => CellState::Ready(value),
            Err(TryRecvError::Empty) => CellState::Pending,
            Err(TryRecvError::Closed) => CellState::Cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_complete_then_wait() {
        let (writer, reader) = cell();
        assert!(writer.complete(7));
        assert_eq!(reader.wait().await, Ok(7));
    }

    #[tokio::test]
    async fn test_dropped_writer_cancels() {
        let (writer, reader) = cell::<u32>();
        drop(writer);
        assert_eq!(reader.wait().await, Err(CellCancelled));
    }

    #[test]
    fn test_try_take_states() {
        let (writer, mut reader) = cell();
        assert_eq!(reader.try_take(), CellState::Pending);

        writer.complete("done");
        assert_eq!(reader.try_take(), CellState::Ready("done"));
        assert_eq!(reader.try_take(), CellState::Cancelled);
    }

    #[test]
    fn test_writer_sees_abandoned_reader() {
        let (writer, reader) = cell::<()>();
        assert!(!writer.is_abandoned());
        drop(reader);
        assert!(writer.is_abandoned());
        assert!(!writer.complete(()));
    }

    #[test]
    fn test_wait_is_pending_until_completed() {
        let (writer, reader) = cell();
        let mut wait = tokio_test::task::spawn(reader.wait());
        tokio_test::assert_pending!(wait.poll());

        writer.complete(3u8);
        assert!(wait.is_woken());
        tokio_test::assert_ready_eq!(wait.poll(), Ok(3));
    }

    #[tokio::test]
    async fn test_wait_across_tasks() {
        let (writer, reader) = cell();
        let waiter = tokio::spawn(reader.wait());
        tokio::task::yield_now().await;
        writer.complete(String::from("outcome"));
        assert_eq!(waiter.await.unwrap().unwrap(), "outcome");
    }
}
