use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;
use uuid::Uuid;

use super::{
    DeleteHandle, QueueConsumer, QueueError, QueuePublisher, QueueSettings,
    ReceivedMessage,
};
use crate::model::QueueMessage;

/// In-process stand-in for the durable queue.
///
/// Same contract as the Redis backend: long-poll receive, at-least-once
/// delivery (publishing the same message twice delivers it twice), and
/// idempotent delete. Failure switches let tests exercise the error paths.
pub struct MemoryQueue {
    settings: QueueSettings,
    inner: Mutex<Inner>,
    notify: Notify,
    fail_publish: AtomicBool,
    fail_receive: AtomicBool,
}

#[derive(Default)]
struct Inner {
    ready: VecDeque<(Uuid, String)>,
    inflight: HashMap<Uuid, String>,
    published: u64,
    deleted: u64,
}

impl MemoryQueue {
    pub fn new(settings: QueueSettings) -> Self {
        Self {
            settings,
            inner: Mutex::new(Inner::default()),
            notify: Notify::new(),
            fail_publish: AtomicBool::new(false),
            fail_receive: AtomicBool::new(false),
        }
    }

    /// Make every subsequent `publish` fail until switched back off.
    pub fn fail_publishes(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent `receive` fail until switched back off.
    pub fn fail_receives(&self, fail: bool) {
        self.fail_receive.store(fail, Ordering::SeqCst);
    }

    /// Push a raw body, bypassing serialization. Lets tests enqueue
    /// payloads no well-behaved publisher would produce.
    pub fn push_raw(&self, body: impl Into<String>) {
        let mut inner = self.inner.lock();
        inner.ready.push_back((Uuid::new_v4(), body.into()));
        inner.published += 1;
        drop(inner);
        self.notify.notify_one();
    }

    /// Messages waiting to be received.
    pub fn pending(&self) -> usize {
        self.inner.lock().ready.len()
    }

    /// Messages received but not yet deleted.
    pub fn in_flight(&self) -> usize {
        self.inner.lock().inflight.len()
    }

    pub fn published(&self) -> u64 {
        self.inner.lock().published
    }

    pub fn deleted(&self) -> u64 {
        self.inner.lock().deleted
    }

    fn take_batch(&self) -> Vec<ReceivedMessage> {
        let mut inner = self.inner.lock();
        let mut batch = Vec::new();
        while batch.len() < self.settings.receive_batch.max(1) {
            let Some((id, body)) = inner.ready.pop_front() else {
                break;
            };
            inner.inflight.insert(id, body.clone());
            batch.push(ReceivedMessage {
                body,
                handle: DeleteHandle::new(id.to_string()),
            });
        }
        batch
    }
}

#[async_trait]
impl QueuePublisher for MemoryQueue {
    async fn publish(&self, message: &QueueMessage) -> Result<(), QueueError> {
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(QueueError::Unavailable("publish disabled".into()));
        }
        self.push_raw(message.to_json()?);
        Ok(())
    }
}

#[async_trait]
impl QueueConsumer for MemoryQueue {
    async fn receive(&self) -> Result<Vec<ReceivedMessage>, QueueError> {
        if self.fail_receive.load(Ordering::SeqCst) {
            return Err(QueueError::Unavailable("receive disabled".into()));
        }

        let deadline = Instant::now() + self.settings.wait;
        loop {
            let batch = self.take_batch();
            if !batch.is_empty() {
                return Ok(batch);
            }
            // notify_one stores a permit, so a publish racing this wait
            // still wakes us.
            if tokio::time::timeout_at(deadline, self.notify.notified())
                .await
                .is_err()
            {
                return Ok(Vec::new());
            }
        }
    }

    async fn delete(&self, handle: &DeleteHandle) -> Result<(), QueueError> {
        let Ok(id) = Uuid::parse_str(handle.as_str()) else {
            return Ok(());
        };
        let mut inner = self.inner.lock();
        if inner.inflight.remove(&id).is_some() {
            inner.deleted += 1;
        }
        Ok(())
    }
}
