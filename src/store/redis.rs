use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;

use super::{CorrelationStore, StoreError};

/// Correlation records as plain Redis strings keyed by action id.
/// `take` relies on `GETDEL` (Redis 6.2+).
#[derive(Clone)]
pub struct RedisCorrelationStore {
    conn: ConnectionManager,
}

impl RedisCorrelationStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl CorrelationStore for RedisCorrelationStore {
    async fn stamp(
        &self,
        action_id: &str,
        submitted_at: i64,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        // PX rejects zero, so clamp sub-millisecond lifetimes up.
        let ttl_ms = (ttl.as_millis() as u64).max(1);
        let _: () = redis::cmd("SET")
            .arg(action_id)
            .arg(submitted_at)
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn get(&self, action_id: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        Ok(redis::cmd("GET")
            .arg(action_id)
            .query_async(&mut conn)
            .await?)
    }

    async fn take(&self, action_id: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        Ok(redis::cmd("GETDEL")
            .arg(action_id)
            .query_async(&mut conn)
            .await?)
    }

    async fn delete(&self, action_id: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("DEL")
            .arg(action_id)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }
}
