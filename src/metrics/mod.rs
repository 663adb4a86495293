pub mod collector;
pub mod exposition;
pub mod percentiles;
pub mod stream;

use std::time::Duration;

pub use collector::{MetricsSnapshot, OrderMetrics};

/// Default `order_time` bucket boundaries, in seconds.
pub const DEFAULT_BUCKETS: &[f64] = &[0.1, 0.2, 0.5, 1.0, 2.0, 5.0, 10.0, 20.0];

/// Where latency observations go.
///
/// Only `record_latency` is required. The queue-phase timings and skip
/// counters are extras a sink may ignore.
pub trait LatencySink: Send + Sync {
    /// Submission → consumption latency for one order.
    fn record_latency(&self, latency: Duration);

    fn record_phase(&self, _phase: QueuePhase, _elapsed: Duration) {}

    fn record_skip(&self, _reason: SkipReason) {}
}

/// Queue round trips timed separately from the end-to-end latency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueuePhase {
    Send,
    Receive,
    Delete,
}

impl QueuePhase {
    pub fn metric_name(self) -> &'static str {
        match self {
            Self::Send => "send_message_time",
            Self::Receive => "receive_message_time",
            Self::Delete => "delete_message_time",
        }
    }
}

/// Why a consumed message produced no latency observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Body was not a valid queue message.
    Undecodable,
    /// No correlation record: expired, never written, or already taken.
    MissingCorrelation,
    /// Record present but not a positive unix timestamp.
    MalformedCorrelation,
    /// Store lookup failed.
    StoreUnavailable,
    /// Recorded submission time lies in the future.
    ClockSkew,
}

impl SkipReason {
    pub const ALL: [SkipReason; 5] = [
        Self::Undecodable,
        Self::MissingCorrelation,
        Self::MalformedCorrelation,
        Self::StoreUnavailable,
        Self::ClockSkew,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::Undecodable => "undecodable",
            Self::MissingCorrelation => "missing_correlation",
            Self::MalformedCorrelation => "malformed_correlation",
            Self::StoreUnavailable => "store_unavailable",
            Self::ClockSkew => "clock_skew",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}
