use std::future::Future;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{
    DeleteHandle, QueueConsumer, QueueError, QueuePublisher, QueueSettings,
    ReceivedMessage,
};
use crate::model::QueueMessage;

/// What actually sits in the Redis lists. The id keeps two identical
/// bodies distinguishable so `LREM` removes exactly the delivery we hold.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    id: Uuid,
    body: String,
}

/// Reliable-list queue on Redis.
///
/// `publish` pushes onto `<name>:ready`. `receive` atomically moves entries
/// to `<name>:inflight`, and `delete` removes them from there.
///
/// Blocking receives tie up the connection they run on, so every worker
/// should get its own instance via [`RedisQueue::dedicated`].
#[derive(Clone)]
pub struct RedisQueue {
    conn: ConnectionManager,
    settings: QueueSettings,
    ready_key: String,
    inflight_key: String,
    attributes_key: String,
}

impl RedisQueue {
    pub fn new(conn: ConnectionManager, settings: QueueSettings) -> Self {
        Self {
            ready_key: format!("{}:ready", settings.name),
            inflight_key: format!("{}:inflight", settings.name),
            attributes_key: format!("{}:attributes", settings.name),
            conn,
            settings,
        }
    }

    /// Same queue, fresh connection. Used to give each worker its own
    /// socket for `BLMOVE`.
    pub async fn dedicated(&self, client: &redis::Client) -> Result<Self, QueueError> {
        let conn = ConnectionManager::new(client.clone()).await?;
        Ok(Self {
            conn,
            ..self.clone()
        })
    }

    /// Idempotent startup step: record the queue attributes and make sure
    /// Redis answers. Safe to run from every replica.
    pub async fn provision(&self) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let wait_secs = self.settings.wait.as_secs();

        let _: () = redis::cmd("HSET")
            .arg(&self.attributes_key)
            .arg("DelaySeconds")
            .arg(0u64)
            .arg("ReceiveMessageWaitTimeSeconds")
            .arg(wait_secs)
            .query_async(&mut conn)
            .await?;

        info!(
            queue = %self.settings.name,
            wait_secs,
            "queue provisioned"
        );
        Ok(())
    }

    async fn move_one(
        &self,
        conn: &mut ConnectionManager,
        block: bool,
    ) -> Result<Option<String>, QueueError> {
        let mut cmd = if block {
            redis::cmd("BLMOVE")
        } else {
            redis::cmd("LMOVE")
        };
        cmd.arg(&self.ready_key)
            .arg(&self.inflight_key)
            .arg("RIGHT")
            .arg("LEFT");
        if block {
            cmd.arg(self.settings.wait.as_secs_f64());
        }
        Ok(cmd.query_async(conn).await?)
    }
}

/// Tops a batch up to `limit` entries after the first one was moved.
///
/// Entries already sitting in inflight are always returned: a failing
/// follow-up move ends the batch early instead of failing the call, since
/// an error here would leave those entries without a delete handle.
async fn fill_batch<F, Fut>(first: String, limit: usize, mut next: F) -> Vec<String>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<String>, QueueError>>,
{
    let mut raw = vec![first];
    while raw.len() < limit {
        match next().await {
            Ok(Some(entry)) => raw.push(entry),
            Ok(None) => break,
            Err(err) => {
                warn!(error = %err, collected = raw.len(), "follow-up move failed, returning partial batch");
                break;
            }
        }
    }
    raw
}

fn unwrap_envelope(raw: String) -> ReceivedMessage {
    match serde_json::from_str::<Envelope>(&raw) {
        Ok(env) => ReceivedMessage {
            body: env.body,
            handle: DeleteHandle::new(raw),
        },
        // Something other than our publisher wrote to the list. Hand the raw
        // entry over; decoding will reject it and the delete still works.
        Err(_) => ReceivedMessage {
            body: raw.clone(),
            handle: DeleteHandle::new(raw),
        },
    }
}

#[async_trait]
impl QueuePublisher for RedisQueue {
    async fn publish(&self, message: &QueueMessage) -> Result<(), QueueError> {
        let envelope = Envelope {
            id: Uuid::new_v4(),
            body: message.to_json()?,
        };
        let raw = serde_json::to_string(&envelope)?;

        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("LPUSH")
            .arg(&self.ready_key)
            .arg(raw)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl QueueConsumer for RedisQueue {
    async fn receive(&self) -> Result<Vec<ReceivedMessage>, QueueError> {
        let mut conn = self.conn.clone();

        // A zero timeout means "block forever" to BLMOVE.
        let block = !self.settings.wait.is_zero();
        let Some(first) = self.move_one(&mut conn, block).await? else {
            return Ok(Vec::new());
        };

        let raw = fill_batch(first, self.settings.receive_batch, || {
            let mut conn = conn.clone();
            async move { self.move_one(&mut conn, false).await }
        })
        .await;

        debug!(count = raw.len(), queue = %self.settings.name, "received");
        Ok(raw.into_iter().map(unwrap_envelope).collect())
    }

    async fn delete(&self, handle: &DeleteHandle) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let removed: i64 = redis::cmd("LREM")
            .arg(&self.inflight_key)
            .arg(1)
            .arg(handle.as_str())
            .query_async(&mut conn)
            .await?;
        if removed == 0 {
            debug!(queue = %self.settings.name, "delete: handle already gone");
        }
        Ok(())
    }
}
