use std::collections::VecDeque;
use std::time::{Duration, Instant};

use hdrhistogram::Histogram;
use parking_lot::Mutex;
use serde::Serialize;

use super::percentiles::PercentileSet;
use super::{LatencySink, QueuePhase, SkipReason};

// ─── Configuration ───────────────────────────────────────────────

/// HdrHistogram range: 1 μs → 1 h, 3 significant figures
const HIST_LOW: u64 = 1;
const HIST_HIGH: u64 = 3_600_000_000;
const HIST_SIGFIG: u8 = 3;

/// Rolling window of individual observations kept for the live feed
const MAX_RECENT_OBSERVATIONS: usize = 200;

// ─── Public types ────────────────────────────────────────────────

/// Thread-safe metrics engine.
/// Workers and the submission handler record, the HTTP layer snapshots.
pub struct OrderMetrics {
    prefix: String,
    inner: Mutex<Inner>,
}

/// One `le` bucket. Counts are cumulative, as in the Prometheus model.
#[derive(Debug, Clone, Serialize)]
pub struct BucketCount {
    pub le: f64,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistogramSnapshot {
    pub name: String,
    pub percentiles_us: PercentileSet,
    /// Finite buckets only; the implicit `+Inf` bucket equals `count`.
    pub buckets: Vec<BucketCount>,
    pub sum_secs: f64,
    pub count: u64,
}

/// One end-to-end latency as it was recorded.
#[derive(Debug, Clone, Serialize)]
pub struct RecentObservation {
    /// Milliseconds since the first observation.
    pub at_ms: u64,
    pub latency_us: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkipCount {
    pub reason: &'static str,
    pub count: u64,
}

/// Complete read-only view served by the metrics endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub order_time: HistogramSnapshot,
    pub send_message_time: HistogramSnapshot,
    pub receive_message_time: HistogramSnapshot,
    pub delete_message_time: HistogramSnapshot,

    pub observations: u64,
    pub skipped: Vec<SkipCount>,
    pub observations_per_sec: f64,
    pub elapsed_secs: f64,

    /// Oldest first, at most the last 200 observations.
    pub recent: Vec<RecentObservation>,
}

// ─── Internal state ──────────────────────────────────────────────

struct Inner {
    order_time: TimedHistogram,
    send: TimedHistogram,
    receive: TimedHistogram,
    delete: TimedHistogram,

    skips: [u64; SkipReason::ALL.len()],

    recent: VecDeque<RecentObservation>,

    // Wall-clock anchor, set on the first observation
    start_time: Option<Instant>,
}

/// HdrHistogram for percentiles plus explicit bucket counters for the
/// operator-configured boundaries.
struct TimedHistogram {
    hdr: Histogram<u64>,
    bounds: Vec<f64>,
    /// Non-cumulative, one per bound plus overflow.
    counts: Vec<u64>,
    sum_secs: f64,
}

// ─── OrderMetrics impl ───────────────────────────────────────────

impl OrderMetrics {
    /// `bounds` are bucket upper edges in seconds, ascending. The same set
    /// is used for every histogram.
    pub fn new(namespace: &str, subsystem: &str, bounds: &[f64]) -> Self {
        let prefix = [namespace, subsystem]
            .iter()
            .filter(|s| !s.is_empty())
            .map(|s| format!("{s}_"))
            .collect::<String>();

        Self {
            prefix,
            inner: Mutex::new(Inner::new(bounds)),
        }
    }

    /// Fully qualified metric name, e.g. `marketplace_api_order_time`.
    pub fn metric_name(&self, base: &str) -> String {
        format!("{}{base}", self.prefix)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.inner.lock().snapshot(self)
    }
}

impl LatencySink for OrderMetrics {
    fn record_latency(&self, latency: Duration) {
        self.inner.lock().record_latency(latency);
    }

    fn record_phase(&self, phase: QueuePhase, elapsed: Duration) {
        let mut inner = self.inner.lock();
        match phase {
            QueuePhase::Send => inner.send.record(elapsed),
            QueuePhase::Receive => inner.receive.record(elapsed),
            QueuePhase::Delete => inner.delete.record(elapsed),
        }
    }

    fn record_skip(&self, reason: SkipReason) {
        self.inner.lock().skips[reason.index()] += 1;
    }
}

// ─── Inner impl ──────────────────────────────────────────────────

impl Inner {
    fn new(bounds: &[f64]) -> Self {
        Self {
            order_time: TimedHistogram::new(bounds),
            send: TimedHistogram::new(bounds),
            receive: TimedHistogram::new(bounds),
            delete: TimedHistogram::new(bounds),
            skips: [0; SkipReason::ALL.len()],
            recent: VecDeque::with_capacity(MAX_RECENT_OBSERVATIONS + 1),
            start_time: None,
        }
    }

    fn record_latency(&mut self, latency: Duration) {
        let start = *self.start_time.get_or_insert_with(Instant::now);
        self.order_time.record(latency);

        self.recent.push_back(RecentObservation {
            at_ms: start.elapsed().as_millis() as u64,
            latency_us: latency.as_micros() as u64,
        });
        if self.recent.len() > MAX_RECENT_OBSERVATIONS {
            self.recent.pop_front();
        }
    }

    fn snapshot(&self, owner: &OrderMetrics) -> MetricsSnapshot {
        let elapsed_secs = self
            .start_time
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);

        let observations = self.order_time.count();
        let rate = if elapsed_secs > 0.0 {
            observations as f64 / elapsed_secs
        } else {
            0.0
        };

        MetricsSnapshot {
            order_time: self.order_time.snapshot(owner.metric_name("order_time")),
            send_message_time: self
                .send
                .snapshot(owner.metric_name(QueuePhase::Send.metric_name())),
            receive_message_time: self
                .receive
                .snapshot(owner.metric_name(QueuePhase::Receive.metric_name())),
            delete_message_time: self
                .delete
                .snapshot(owner.metric_name(QueuePhase::Delete.metric_name())),

            observations,
            skipped: SkipReason::ALL
                .iter()
                .map(|r| SkipCount {
                    reason: r.label(),
                    count: self.skips[r.index()],
                })
                .collect(),
            observations_per_sec: rate,
            elapsed_secs,
            recent: self.recent.iter().cloned().collect(),
        }
    }
}

// ─── TimedHistogram impl ─────────────────────────────────────────

impl TimedHistogram {
    fn new(bounds: &[f64]) -> Self {
        Self {
            hdr: Histogram::<u64>::new_with_bounds(HIST_LOW, HIST_HIGH, HIST_SIGFIG)
                .expect("histogram creation"),
            bounds: bounds.to_vec(),
            counts: vec![0; bounds.len() + 1],
            sum_secs: 0.0,
        }
    }

    fn record(&mut self, value: Duration) {
        // Clamp to ≥ 1 μs; values past the top saturate
        let us = (value.as_micros() as u64).max(HIST_LOW);
        self.hdr.saturating_record(us);

        let secs = value.as_secs_f64();
        self.sum_secs += secs;

        // First bound >= value, or the overflow slot
        let idx = self.bounds.partition_point(|&b| b < secs);
        self.counts[idx] += 1;
    }

    fn count(&self) -> u64 {
        self.hdr.len()
    }

    fn snapshot(&self, name: String) -> HistogramSnapshot {
        let mut cumulative = 0u64;
        let buckets = self
            .bounds
            .iter()
            .zip(&self.counts)
            .map(|(&le, &n)| {
                cumulative += n;
                BucketCount {
                    le,
                    count: cumulative,
                }
            })
            .collect();

        HistogramSnapshot {
            name,
            percentiles_us: PercentileSet::from_histogram(&self.hdr),
            buckets,
            sum_secs: self.sum_secs,
            count: self.count(),
        }
    }
}
