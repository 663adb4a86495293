//! Consumption worker pool.
//!
//! Each worker drains the queue on its own, deletes every message as soon
//! as it has been read, and turns the matching correlation record into one
//! latency observation. Failures never leave the iteration that hit them.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::metrics::{LatencySink, QueuePhase, SkipReason};
use crate::model::QueueMessage;
use crate::queue::{QueueConsumer, ReceivedMessage};
use crate::store::CorrelationStore;

/// Pause between failed polls unless configured otherwise.
pub const DEFAULT_POLL_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// What happened to one consumed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    Observed(Duration),
    Skipped(SkipReason),
}

/// Per-worker state machine.
#[derive(Debug)]
pub enum WorkerState {
    Polling,
    Processing(Vec<ReceivedMessage>),
    ShuttingDown,
}

/// Collaborators shared by every worker in a pool.
pub struct WorkerContext {
    pub store: Arc<dyn CorrelationStore>,
    pub sink: Arc<dyn LatencySink>,
    pub poll_error_backoff: Duration,
}

pub struct Worker {
    id: usize,
    consumer: Arc<dyn QueueConsumer>,
    ctx: Arc<WorkerContext>,
    shutdown: watch::Receiver<bool>,
}

impl Worker {
    pub fn new(
        id: usize,
        consumer: Arc<dyn QueueConsumer>,
        ctx: Arc<WorkerContext>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            id,
            consumer,
            ctx,
            shutdown,
        }
    }

    /// Runs until the shutdown signal is seen between iterations. A receive
    /// or batch already in progress is finished first.
    pub async fn run(mut self) {
        debug!(worker = self.id, "worker started");
        let mut state = WorkerState::Polling;

        loop {
            state = match state {
                WorkerState::Polling if self.cancelled() => WorkerState::ShuttingDown,
                WorkerState::Polling => self.poll().await,
                WorkerState::Processing(batch) => {
                    for message in batch {
                        self.process(message).await;
                    }
                    WorkerState::Polling
                }
                WorkerState::ShuttingDown => break,
            };
        }

        debug!(worker = self.id, "worker stopped");
    }

    /// A dropped sender counts as shutdown so orphaned workers do not spin.
    fn cancelled(&self) -> bool {
        *self.shutdown.borrow() || self.shutdown.has_changed().is_err()
    }

    async fn poll(&mut self) -> WorkerState {
        let t_receive = Instant::now();
        match self.consumer.receive().await {
            Ok(batch) if batch.is_empty() => WorkerState::Polling,
            Ok(batch) => {
                self.ctx.sink.record_phase(QueuePhase::Receive, t_receive.elapsed());
                WorkerState::Processing(batch)
            }
            Err(err) => {
                error!(worker = self.id, error = %err, "failed to get orders from queue");
                self.backoff().await;
                WorkerState::Polling
            }
        }
    }

    async fn backoff(&mut self) {
        tokio::select! {
            _ = tokio::time::sleep(self.ctx.poll_error_backoff) => {}
            _ = self.shutdown.changed() => {}
        }
    }

    /// Handle one message end to end.
    ///
    /// The queue copy is deleted right after decoding, whatever happens
    /// next, so a missing record never causes redelivery. The price is that
    /// a message which fails later is not retried.
    pub async fn process(&self, message: ReceivedMessage) -> MessageOutcome {
        let consumed_at = Utc::now();
        let decoded = QueueMessage::from_json(&message.body);

        let t_delete = Instant::now();
        match self.consumer.delete(&message.handle).await {
            Ok(()) => self.ctx.sink.record_phase(QueuePhase::Delete, t_delete.elapsed()),
            Err(err) => warn!(worker = self.id, error = %err, "failed to delete message"),
        }

        let order = match decoded {
            Ok(order) => order,
            Err(err) => {
                warn!(worker = self.id, error = %err, "dropping undecodable message");
                return self.skip(SkipReason::Undecodable);
            }
        };

        let raw = match self.ctx.store.take(&order.action_id).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!(action_id = %order.action_id, "no submission time recorded");
                return self.skip(SkipReason::MissingCorrelation);
            }
            Err(err) => {
                warn!(action_id = %order.action_id, error = %err, "failed to get order time");
                return self.skip(SkipReason::StoreUnavailable);
            }
        };

        let Some(submitted_at) = parse_submission_time(&raw) else {
            warn!(action_id = %order.action_id, value = %raw, "failed to parse order time");
            return self.skip(SkipReason::MalformedCorrelation);
        };

        let Ok(latency) = (consumed_at - submitted_at).to_std() else {
            warn!(
                action_id = %order.action_id,
                submitted_at = %submitted_at,
                "submission time is in the future"
            );
            return self.skip(SkipReason::ClockSkew);
        };

        self.ctx.sink.record_latency(latency);
        info!(
            action_id = %order.action_id,
            latency_ms = latency.as_millis() as u64,
            "order processed"
        );
        MessageOutcome::Observed(latency)
    }

    fn skip(&self, reason: SkipReason) -> MessageOutcome {
        self.ctx.sink.record_skip(reason);
        MessageOutcome::Skipped(reason)
    }
}

/// Stored values are unix seconds. Zero and negatives are treated as
/// garbage, not as 1970.
fn parse_submission_time(raw: &str) -> Option<DateTime<Utc>> {
    let secs: i64 = raw.trim().parse().ok()?;
    if secs <= 0 {
        return None;
    }
    DateTime::from_timestamp(secs, 0)
}

// ─── Pool ────────────────────────────────────────────────────────

/// A set of running workers plus the channel that stops them.
pub struct WorkerPool {
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns one worker per consumer. Backends whose receive blocks a
    /// connection should hand in one consumer per worker; shareable ones can
    /// repeat the same `Arc`.
    pub fn spawn(consumers: Vec<Arc<dyn QueueConsumer>>, ctx: WorkerContext) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let ctx = Arc::new(ctx);

        let handles = consumers
            .into_iter()
            .enumerate()
            .map(|(id, consumer)| {
                let worker = Worker::new(id, consumer, ctx.clone(), shutdown_rx.clone());
                tokio::spawn(worker.run())
            })
            .collect::<Vec<_>>();

        info!(workers = handles.len(), "worker pool started");
        Self {
            shutdown_tx,
            handles,
        }
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Signal every worker and wait for them to leave their loops.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for handle in self.handles {
            if let Err(err) = handle.await {
                error!(error = %err, "worker task failed");
            }
        }
        info!("worker pool stopped");
    }
}
