//! Completion pipeline: keyed publication of completion intents and the
//! commit-on-success consumer loop that drives status transitions.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

pub mod kafka;
pub mod memory;
pub mod message;
pub mod subscriber;

pub use message::CompletionMessage;
pub use subscriber::{CompletionHandler, Subscriber, SubscriberHandle, SubscriberStats};

#[derive(Debug, Error)]
pub enum TransportError {
    /// Broker or network hiccup; the operation may be retried.
    #[error("transient transport error: {0}")]
    Transient(String),

    /// The connection cannot recover.
    #[error("fatal transport error: {0}")]
    Fatal(String),

    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

impl TransportError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, TransportError::Fatal(_))
    }
}

/// A message as pulled from the transport, before decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    pub payload: Option<Vec<u8>>,
}

/// At-least-once emission of completion messages. Shared across request
/// handlers, so implementations must be safe for concurrent use.
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    /// Enqueues `message` keyed by its transaction id.
    async fn publish(&self, message: &CompletionMessage) -> Result<(), TransportError>;

    /// Waits up to `drain_timeout` for in-flight sends.
    async fn close(&self, drain_timeout: Duration) -> Result<(), TransportError>;
}

/// Consumer side of the transport with manual offset management.
#[async_trait]
pub trait MessageSource: Send {
    /// Next message, or `None` when nothing arrived within `timeout`.
    async fn poll(&mut self, timeout: Duration) -> Result<Option<ReceivedMessage>, TransportError>;

    /// Marks `message` (and everything before it on its partition) consumed.
    async fn commit(&mut self, message: &ReceivedMessage) -> Result<(), TransportError>;

    /// Repositions the partition so `message` is delivered again.
    async fn rewind(&mut self, message: &ReceivedMessage) -> Result<(), TransportError>;
}
