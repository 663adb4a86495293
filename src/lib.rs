//! Order submission pipeline.
//!
//! Orders come in over HTTP, are validated and pushed onto a durable queue,
//! and a correlation record remembers when each one was submitted. A pool
//! of workers drains the queue and turns every message it can correlate
//! into one end-to-end latency sample.

use std::sync::Arc;

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod model;
pub mod queue;
pub mod redis_client;
pub mod server;
pub mod store;
pub mod submission;
pub mod worker;

/// Shared application state available to every handler via `State<Arc<AppState>>`.
pub struct AppState {
    /// Validates, enqueues and stamps incoming orders.
    pub submissions: submission::SubmissionHandler,

    /// Latency histograms — workers record, metrics endpoints snapshot.
    pub metrics: Arc<metrics::OrderMetrics>,

    /// Size of the consumption pool, reported by `/health`.
    pub workers: usize,
}
