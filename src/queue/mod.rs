//! Queue client capabilities.
//!
//! The submission path only ever publishes and the worker pool only ever
//! receives and deletes, so the two sides are separate traits. Backends:
//!
//! * [`RedisQueue`] — reliable list queue (`ready` → `inflight` via `BLMOVE`)
//! * [`MemoryQueue`] — in-process queue used by tests and `--backend memory`

pub mod memory;
pub mod redis;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::QueueMessage;

pub use self::memory::MemoryQueue;
pub use self::redis::RedisQueue;

/// Default long-poll wait for a receive call.
pub const DEFAULT_WAIT: Duration = Duration::from_secs(20);

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("redis: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("queue unavailable: {0}")]
    Unavailable(String),
}

/// Opaque receipt token handed out by `receive` and consumed by `delete`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeleteHandle(String);

impl DeleteHandle {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A message as pulled off the queue. The body is not decoded yet.
#[derive(Debug, Clone)]
pub struct ReceivedMessage {
    pub body: String,
    pub handle: DeleteHandle,
}

/// Static queue attributes shared by every backend.
#[derive(Debug, Clone)]
pub struct QueueSettings {
    pub name: String,
    /// Upper bound on how long a single `receive` blocks.
    pub wait: Duration,
    /// Maximum number of messages returned by one `receive`.
    pub receive_batch: usize,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            name: "order_submit".into(),
            wait: DEFAULT_WAIT,
            receive_batch: 1,
        }
    }
}

#[async_trait]
pub trait QueuePublisher: Send + Sync {
    async fn publish(&self, message: &QueueMessage) -> Result<(), QueueError>;
}

#[async_trait]
pub trait QueueConsumer: Send + Sync {
    /// Long-polls for up to the configured wait. An empty result is `Ok`.
    async fn receive(&self) -> Result<Vec<ReceivedMessage>, QueueError>;

    /// Removes a received message. Deleting twice is not an error.
    async fn delete(&self, handle: &DeleteHandle) -> Result<(), QueueError>;
}
