use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;

use order_pipeline::metrics::{LatencySink, OrderMetrics, SkipReason};
use order_pipeline::model::{OrderSubmission, QueueMessage};
use order_pipeline::queue::{MemoryQueue, QueueConsumer, QueuePublisher, QueueSettings};
use order_pipeline::store::{CorrelationStore, MemoryCorrelationStore};
use order_pipeline::submission::SubmissionHandler;
use order_pipeline::worker::{MessageOutcome, Worker, WorkerContext, WorkerPool};

const TTL: Duration = Duration::from_secs(180);

struct Harness {
    queue: Arc<MemoryQueue>,
    store: Arc<MemoryCorrelationStore>,
    metrics: Arc<OrderMetrics>,
    handler: SubmissionHandler,
}

fn harness(batch: usize) -> Harness {
    let queue = Arc::new(MemoryQueue::new(QueueSettings {
        name: "order_submit".into(),
        wait: Duration::from_millis(50),
        receive_batch: batch,
    }));
    let store = Arc::new(MemoryCorrelationStore::new());
    let metrics = Arc::new(OrderMetrics::new("test", "pipeline", &[0.1, 1.0, 5.0]));
    let handler = SubmissionHandler::new(queue.clone(), store.clone(), metrics.clone(), TTL);
    Harness {
        queue,
        store,
        metrics,
        handler,
    }
}

impl Harness {
    fn context(&self) -> WorkerContext {
        WorkerContext {
            store: self.store.clone(),
            sink: self.metrics.clone(),
            poll_error_backoff: Duration::from_millis(10),
        }
    }

    fn pool(&self, workers: usize) -> WorkerPool {
        let consumers = (0..workers)
            .map(|_| self.queue.clone() as Arc<dyn QueueConsumer>)
            .collect();
        WorkerPool::spawn(consumers, self.context())
    }

    /// A lone worker for driving `process` by hand.
    fn worker(&self) -> (Worker, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        let worker = Worker::new(0, self.queue.clone(), Arc::new(self.context()), rx);
        (worker, tx)
    }

    async fn next_message(&self) -> order_pipeline::queue::ReceivedMessage {
        let mut batch = self.queue.receive().await.unwrap();
        assert_eq!(batch.len(), 1, "expected exactly one queued message");
        batch.remove(0)
    }

    fn skipped(&self, reason: SkipReason) -> u64 {
        self.metrics
            .snapshot()
            .skipped
            .iter()
            .find(|s| s.reason == reason.label())
            .map(|s| s.count)
            .unwrap_or(0)
    }
}

fn order(action_id: &str) -> OrderSubmission {
    OrderSubmission::new(action_id, "C1", vec![10, 20])
}

async fn wait_for(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// ─── Single-message behaviour ────────────────────────────────────

#[tokio::test]
async fn round_trip_yields_one_observation() {
    let h = harness(1);
    let submitted = Instant::now();
    h.handler.submit(Some(&order("A1"))).await.unwrap();
    assert!(h.store.get("A1").await.unwrap().is_some());

    tokio::time::sleep(Duration::from_millis(50)).await;
    let (worker, _tx) = h.worker();
    let outcome = worker.process(h.next_message().await).await;
    let gap = submitted.elapsed();

    let MessageOutcome::Observed(latency) = outcome else {
        panic!("expected an observation, got {outcome:?}");
    };
    // Stored timestamps have one-second resolution.
    assert!(latency <= gap + Duration::from_secs(1), "{latency:?} vs {gap:?}");

    assert_eq!(h.metrics.snapshot().observations, 1);
    assert_eq!(h.store.get("A1").await.unwrap(), None);
    assert_eq!(h.queue.in_flight(), 0);
    assert_eq!(h.queue.deleted(), 1);
}

#[tokio::test]
async fn expired_record_is_skipped() {
    let h = harness(1);
    let handler = SubmissionHandler::new(
        h.queue.clone(),
        h.store.clone(),
        h.metrics.clone(),
        Duration::from_millis(20),
    );
    handler.submit(Some(&order("A1"))).await.unwrap();
    tokio::time::sleep(Duration::from_millis(60)).await;

    let (worker, _tx) = h.worker();
    let outcome = worker.process(h.next_message().await).await;

    assert_eq!(outcome, MessageOutcome::Skipped(SkipReason::MissingCorrelation));
    assert_eq!(h.metrics.snapshot().observations, 0);
    assert_eq!(h.queue.deleted(), 1, "message is deleted even without a record");
}

#[tokio::test]
async fn never_stamped_record_is_skipped() {
    let h = harness(1);
    h.queue
        .publish(&QueueMessage {
            action_id: "ghost".into(),
            item_ids: vec![1],
        })
        .await
        .unwrap();

    let (worker, _tx) = h.worker();
    let outcome = worker.process(h.next_message().await).await;

    assert_eq!(outcome, MessageOutcome::Skipped(SkipReason::MissingCorrelation));
    assert_eq!(h.skipped(SkipReason::MissingCorrelation), 1);
}

#[tokio::test]
async fn malformed_record_is_skipped() {
    let h = harness(1);
    h.handler.submit(Some(&order("A1"))).await.unwrap();
    h.store.insert_raw("A1", "not-a-timestamp", TTL);
    h.handler.submit(Some(&order("A2"))).await.unwrap();
    h.store.insert_raw("A2", "0", TTL);

    let (worker, _tx) = h.worker();
    for _ in 0..2 {
        let outcome = worker.process(h.next_message().await).await;
        assert_eq!(outcome, MessageOutcome::Skipped(SkipReason::MalformedCorrelation));
    }
    assert_eq!(h.metrics.snapshot().observations, 0);
}

#[tokio::test]
async fn future_timestamp_is_not_recorded() {
    let h = harness(1);
    h.handler.submit(Some(&order("A1"))).await.unwrap();
    let future = chrono::Utc::now().timestamp() + 3_600;
    h.store.stamp("A1", future, TTL).await.unwrap();

    let (worker, _tx) = h.worker();
    let outcome = worker.process(h.next_message().await).await;

    assert_eq!(outcome, MessageOutcome::Skipped(SkipReason::ClockSkew));
    assert_eq!(h.metrics.snapshot().observations, 0);
}

#[tokio::test]
async fn corrupt_payload_is_deleted_and_skipped() {
    let h = harness(1);
    h.queue.push_raw("{not json");

    let (worker, _tx) = h.worker();
    let outcome = worker.process(h.next_message().await).await;

    assert_eq!(outcome, MessageOutcome::Skipped(SkipReason::Undecodable));
    assert_eq!(h.queue.in_flight(), 0);
    assert_eq!(h.queue.pending(), 0);
}

#[tokio::test]
async fn duplicate_delivery_is_counted_once() {
    let h = harness(1);
    h.handler.submit(Some(&order("A1"))).await.unwrap();
    h.queue.publish(&QueueMessage::from(&order("A1"))).await.unwrap();

    let (worker, _tx) = h.worker();
    let first = worker.process(h.next_message().await).await;
    let second = worker.process(h.next_message().await).await;

    assert!(matches!(first, MessageOutcome::Observed(_)));
    assert_eq!(second, MessageOutcome::Skipped(SkipReason::MissingCorrelation));
    assert_eq!(h.metrics.snapshot().observations, 1);
}

#[tokio::test]
async fn deleting_twice_is_harmless() {
    let h = harness(1);
    h.handler.submit(Some(&order("A1"))).await.unwrap();
    let msg = h.next_message().await;

    h.queue.delete(&msg.handle).await.unwrap();
    h.queue.delete(&msg.handle).await.unwrap();
    h.store.delete("A1").await.unwrap();
    h.store.delete("A1").await.unwrap();

    assert_eq!(h.queue.deleted(), 1);
    assert_eq!(h.store.live(), 0);
}

// ─── Pool behaviour ──────────────────────────────────────────────

#[tokio::test]
async fn pool_drains_submitted_orders() {
    let h = harness(1);
    let pool = h.pool(2);

    h.handler.submit(Some(&order("A1"))).await.unwrap();
    h.handler.submit(Some(&order("A2"))).await.unwrap();

    let metrics = h.metrics.clone();
    wait_for(|| metrics.snapshot().observations == 2).await;
    pool.shutdown().await;

    assert_eq!(h.store.live(), 0);
    assert_eq!(h.queue.pending(), 0);
    assert_eq!(h.queue.in_flight(), 0);
}

#[tokio::test]
async fn pool_survives_missing_records_and_bad_payloads() {
    let h = harness(2);
    let pool = h.pool(2);

    h.queue.push_raw("garbage");
    h.queue
        .publish(&QueueMessage {
            action_id: "ghost".into(),
            item_ids: vec![1],
        })
        .await
        .unwrap();
    h.handler.submit(Some(&order("A1"))).await.unwrap();

    wait_for(|| {
        h.metrics.snapshot().observations == 1
            && h.skipped(SkipReason::Undecodable) == 1
            && h.skipped(SkipReason::MissingCorrelation) == 1
    })
    .await;
    pool.shutdown().await;

    assert_eq!(h.queue.in_flight(), 0);
}

#[tokio::test]
async fn pool_keeps_polling_through_receive_errors() {
    let h = harness(1);
    h.queue.fail_receives(true);
    let pool = h.pool(2);

    tokio::time::sleep(Duration::from_millis(50)).await;
    h.handler.submit(Some(&order("A1"))).await.unwrap();
    h.queue.fail_receives(false);

    let metrics = h.metrics.clone();
    wait_for(|| metrics.snapshot().observations == 1).await;
    pool.shutdown().await;
}

#[tokio::test]
async fn concurrent_workers_never_double_count() {
    const ORDERS: usize = 150;

    let h = harness(3);
    for i in 0..ORDERS {
        let req = order(&format!("A{i}"));
        h.handler.submit(Some(&req)).await.unwrap();
        // Simulated redelivery of every message.
        h.queue.publish(&QueueMessage::from(&req)).await.unwrap();
    }

    let pool = h.pool(4);
    // Every message ends as either an observation or a missing-record skip.
    wait_for(|| {
        h.metrics.snapshot().observations + h.skipped(SkipReason::MissingCorrelation)
            == 2 * ORDERS as u64
    })
    .await;
    pool.shutdown().await;

    let snap = h.metrics.snapshot();
    assert_eq!(snap.observations, ORDERS as u64);
    assert_eq!(h.skipped(SkipReason::MissingCorrelation), ORDERS as u64);
    assert_eq!(h.queue.deleted(), 2 * ORDERS as u64);
    assert_eq!(h.store.live(), 0);
}

#[tokio::test]
async fn shutdown_waits_for_current_poll_only() {
    let h = harness(1);
    let pool = h.pool(3);
    assert_eq!(pool.size(), 3);

    let started = Instant::now();
    tokio::time::timeout(Duration::from_secs(2), pool.shutdown())
        .await
        .expect("workers should stop after their current long-poll");
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn custom_sink_receives_each_latency() {
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recording(Mutex<Vec<Duration>>);
    impl LatencySink for Recording {
        fn record_latency(&self, latency: Duration) {
            self.0.lock().push(latency);
        }
    }

    let h = harness(1);
    let sink = Arc::new(Recording::default());
    h.handler.submit(Some(&order("A1"))).await.unwrap();

    let (_tx, rx) = watch::channel(false);
    let ctx = WorkerContext {
        store: h.store.clone(),
        sink: sink.clone(),
        poll_error_backoff: Duration::from_millis(10),
    };
    let worker = Worker::new(7, h.queue.clone(), Arc::new(ctx), rx);
    worker.process(h.next_message().await).await;

    assert_eq!(sink.0.lock().len(), 1);
}
