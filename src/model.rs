use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Status returned to the caller once an order has been handed to the queue.
pub const STATUS_IN_PROGRESS: &str = "in progress";

// ─── Inbound request ─────────────────────────────────────────────

/// An order as submitted by a client.
///
/// Missing fields deserialize to empty values so that validation, not the
/// JSON extractor, decides which field is reported.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderSubmission {
    #[serde(default)]
    pub action_id: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub item_ids: Vec<i64>,
}

impl OrderSubmission {
    pub fn new(
        action_id: impl Into<String>,
        client_id: impl Into<String>,
        item_ids: Vec<i64>,
    ) -> Self {
        Self {
            action_id: action_id.into(),
            client_id: client_id.into(),
            item_ids,
        }
    }
}

/// Fail-fast validation. The first failing rule wins.
pub fn validate(request: Option<&OrderSubmission>) -> Result<&OrderSubmission, PipelineError> {
    let req = request
        .ok_or_else(|| PipelineError::InvalidArgument("request is nil".into()))?;

    if req.client_id.is_empty() {
        return Err(PipelineError::InvalidArgument("client id is empty".into()));
    }
    if req.item_ids.is_empty() {
        return Err(PipelineError::InvalidArgument("item ids are empty".into()));
    }
    if req.action_id.is_empty() {
        return Err(PipelineError::InvalidArgument("action id is empty".into()));
    }

    Ok(req)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitOrderResponse {
    pub status: String,
}

impl SubmitOrderResponse {
    pub fn in_progress() -> Self {
        Self {
            status: STATUS_IN_PROGRESS.into(),
        }
    }
}

// ─── Queue wire format ───────────────────────────────────────────

/// What travels through the queue. The client id stays behind: consumers
/// only need the action id to find the submission timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueMessage {
    pub action_id: String,
    pub item_ids: Vec<i64>,
}

impl From<&OrderSubmission> for QueueMessage {
    fn from(req: &OrderSubmission) -> Self {
        Self {
            action_id: req.action_id.clone(),
            item_ids: req.item_ids.clone(),
        }
    }
}

impl QueueMessage {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(body: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> OrderSubmission {
        OrderSubmission::new("A1", "C1", vec![10, 20])
    }

    fn reason(result: Result<&OrderSubmission, PipelineError>) -> String {
        match result {
            Err(PipelineError::InvalidArgument(msg)) => msg,
            other => panic!("expected InvalidArgument, got {other:?}"),
        }
    }

    #[test]
    fn accepts_complete_submission() {
        let req = valid();
        assert!(validate(Some(&req)).is_ok());
    }

    #[test]
    fn rejects_missing_request() {
        assert_eq!(reason(validate(None)), "request is nil");
    }

    #[test]
    fn first_failing_rule_wins() {
        let req = OrderSubmission::new("", "", vec![]);
        assert_eq!(reason(validate(Some(&req))), "client id is empty");

        let req = OrderSubmission::new("", "C1", vec![]);
        assert_eq!(reason(validate(Some(&req))), "item ids are empty");

        let req = OrderSubmission::new("", "C1", vec![1]);
        assert_eq!(reason(validate(Some(&req))), "action id is empty");
    }

    #[test]
    fn queue_message_drops_client_id() {
        let msg = QueueMessage::from(&valid());
        let json = msg.to_json().unwrap();
        assert_eq!(json, r#"{"action_id":"A1","item_ids":[10,20]}"#);
        assert!(!json.contains("client"));
    }

    #[test]
    fn missing_request_fields_default_to_empty() {
        let req: OrderSubmission = serde_json::from_str(r#"{"action_id":"A1"}"#).unwrap();
        assert!(req.client_id.is_empty());
        assert!(req.item_ids.is_empty());
    }

    #[test]
    fn corrupt_queue_body_fails_to_decode() {
        assert!(QueueMessage::from_json("not json").is_err());
        assert!(QueueMessage::from_json(r#"{"item_ids":[1]}"#).is_err());
    }
}
