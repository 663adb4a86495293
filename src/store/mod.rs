//! Correlation store: `action_id → submission unix timestamp` with a TTL.
//!
//! Values come back as raw strings. Deciding whether a value is usable is the
//! consumer's job, since a malformed record is a data problem, not a store
//! failure.

pub mod memory;
pub mod redis;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use self::memory::MemoryCorrelationStore;
pub use self::redis::RedisCorrelationStore;

/// Default lifetime of a correlation record.
pub const DEFAULT_TTL: Duration = Duration::from_secs(180);

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait CorrelationStore: Send + Sync {
    /// Write `action_id → submitted_at` with the given lifetime, replacing
    /// any previous value.
    async fn stamp(
        &self,
        action_id: &str,
        submitted_at: i64,
        ttl: Duration,
    ) -> Result<(), StoreError>;

    async fn get(&self, action_id: &str) -> Result<Option<String>, StoreError>;

    /// Atomically read and remove. Of two concurrent callers at most one
    /// sees the value.
    async fn take(&self, action_id: &str) -> Result<Option<String>, StoreError>;

    /// Remove the record. Removing a missing record is not an error.
    async fn delete(&self, action_id: &str) -> Result<(), StoreError>;
}
