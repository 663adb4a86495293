use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use super::{CorrelationStore, StoreError};

/// In-process correlation store with lazy expiry.
#[derive(Default)]
pub struct MemoryCorrelationStore {
    entries: Mutex<HashMap<String, Entry>>,
    fail_writes: AtomicBool,
}

struct Entry {
    value: String,
    expires_at: Instant,
}

impl MemoryCorrelationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an arbitrary value, e.g. something that is not a timestamp.
    pub fn insert_raw(&self, action_id: &str, value: impl Into<String>, ttl: Duration) {
        self.entries.lock().insert(
            action_id.to_owned(),
            Entry {
                value: value.into(),
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Make every subsequent `stamp` fail until switched back off.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of records that have not expired yet.
    pub fn live(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .values()
            .filter(|e| e.expires_at > now)
            .count()
    }
}

#[async_trait]
impl CorrelationStore for MemoryCorrelationStore {
    async fn stamp(
        &self,
        action_id: &str,
        submitted_at: i64,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("writes disabled".into()));
        }
        self.insert_raw(action_id, submitted_at.to_string(), ttl);
        Ok(())
    }

    async fn get(&self, action_id: &str) -> Result<Option<String>, StoreError> {
        let mut entries = self.entries.lock();
        match entries.get(action_id) {
            Some(e) if e.expires_at > Instant::now() => Ok(Some(e.value.clone())),
            Some(_) => {
                entries.remove(action_id);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn take(&self, action_id: &str) -> Result<Option<String>, StoreError> {
        let entry = self.entries.lock().remove(action_id);
        Ok(entry
            .filter(|e| e.expires_at > Instant::now())
            .map(|e| e.value))
    }

    async fn delete(&self, action_id: &str) -> Result<(), StoreError> {
        self.entries.lock().remove(action_id);
        Ok(())
    }
}
