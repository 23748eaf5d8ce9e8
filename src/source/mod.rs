//! # Message Sources
//!
//! Transport side of a consumer: raw messages carrying an acknowledgment
//! handle, typed feeds that decode and filter them into work items, and an
//! in-memory offset-ordered partition for tests and demos.

pub mod feed;
pub mod in_memory;
pub mod records;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::SourceError;

pub use feed::{FeedItem, InboundRecord, MessageFeed};
pub use in_memory::InMemoryPartition;
pub use records::{ChangeEventMessage, CheckOrderData};

/// Acknowledge/reject capability of one delivered message
#[async_trait]
pub trait Acknowledge: Send + Sync + 'static {
    async fn ack(&self) -> Result<(), SourceError>;

    async fn nack(&self) -> Result<(), SourceError>;

    /// Position within the partition, when the transport has one
    fn offset(&self) -> Option<u64> {
        None
    }
}

/// Undecoded message as delivered by the transport
#[derive(Clone)]
pub struct RawMessage {
    payload: Vec<u8>,
    handle: Arc<dyn Acknowledge>,
}

impl RawMessage {
    pub fn new(payload: impl Into<Vec<u8>>, handle: Arc<dyn Acknowledge>) -> Self {
        Self {
            payload: payload.into(),
            handle,
        }
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn offset(&self) -> Option<u64> {
        self.handle.offset()
    }

    pub async fn ack(&self) -> Result<(), SourceError> {
        self.handle.ack().await
    }

    pub async fn nack(&self) -> Result<(), SourceError> {
        self.handle.nack().await
    }
}

impl std::fmt::Debug for RawMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawMessage")
            .field("payload_len", &self.payload.len())
            .field("offset", &self.offset())
            .finish()
    }
}
