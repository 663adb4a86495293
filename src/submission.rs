use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::PipelineError;
use crate::metrics::{LatencySink, QueuePhase};
use crate::model::{self, OrderSubmission, QueueMessage, SubmitOrderResponse};
use crate::queue::QueuePublisher;
use crate::store::CorrelationStore;

/// Synchronous half of the pipeline: validate, enqueue, stamp.
#[derive(Clone)]
pub struct SubmissionHandler {
    publisher: Arc<dyn QueuePublisher>,
    store: Arc<dyn CorrelationStore>,
    sink: Arc<dyn LatencySink>,
    ttl: Duration,
}

impl SubmissionHandler {
    pub fn new(
        publisher: Arc<dyn QueuePublisher>,
        store: Arc<dyn CorrelationStore>,
        sink: Arc<dyn LatencySink>,
        ttl: Duration,
    ) -> Self {
        Self {
            publisher,
            store,
            sink,
            ttl,
        }
    }

    /// Accept an order for asynchronous processing.
    ///
    /// The message is published before the correlation record is written,
    /// so a worker can never see a message whose record was skipped because
    /// the publish failed. A failed stamp only costs the latency sample.
    pub async fn submit(
        &self,
        request: Option<&OrderSubmission>,
    ) -> Result<SubmitOrderResponse, PipelineError> {
        let req = model::validate(request).inspect_err(|err| {
            debug!(error = %err, "request validation failed");
        })?;

        let submitted_at = chrono::Utc::now().timestamp();
        let message = QueueMessage::from(req);

        let t_send = Instant::now();
        if let Err(err) = self.publisher.publish(&message).await {
            warn!(action_id = %req.action_id, error = %err, "failed to push order to queue");
            return Err(err.into());
        }
        self.sink.record_phase(QueuePhase::Send, t_send.elapsed());

        if let Err(err) = self.store.stamp(&req.action_id, submitted_at, self.ttl).await {
            warn!(
                action_id = %req.action_id,
                error = %err,
                "failed to stamp submission time; latency for this order will not be recorded"
            );
        }

        debug!(action_id = %req.action_id, items = req.item_ids.len(), "order queued");
        Ok(SubmitOrderResponse::in_progress())
    }
}
