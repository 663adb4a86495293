use axum::{
    extract::State,
    http::header,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    Json,
};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::StreamExt;

use super::collector::MetricsSnapshot;
use super::exposition;
use crate::AppState;

// ─── GET /api/metrics ────────────────────────────────────────────
/// Returns a single JSON snapshot — useful for curl / debugging.

pub async fn get_metrics(
    State(state): State<Arc<AppState>>,
) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}

// ─── GET /api/metrics/stream ─────────────────────────────────────
/// Server-Sent Events endpoint.
/// Pushes a full `MetricsSnapshot` as JSON once per second.

pub async fn metrics_stream(
    State(state): State<Arc<AppState>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let interval = tokio::time::interval(Duration::from_secs(1));

    let stream = IntervalStream::new(interval).map(move |_| {
        let snapshot = state.metrics.snapshot();
        let json = serde_json::to_string(&snapshot).unwrap_or_default();
        Ok(Event::default().data(json))
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

// ─── GET /metrics ────────────────────────────────────────────────
/// Prometheus scrape target.

pub async fn prometheus(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let body = exposition::render(
        &state.metrics.snapshot(),
        &state.metrics.metric_name("skipped_messages_total"),
    );
    ([(header::CONTENT_TYPE, exposition::CONTENT_TYPE)], body)
}
