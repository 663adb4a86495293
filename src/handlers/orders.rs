use axum::{extract::State, Json};
use std::sync::Arc;

use crate::model::{OrderSubmission, SubmitOrderResponse};
use crate::AppState;

use super::AppError;

// ─── POST /api/orders ────────────────────────────────────────────

/// SubmitOrder. A missing or unreadable body counts as a missing request
/// and is rejected by validation like any other bad submission.
pub async fn submit_order(
    State(state): State<Arc<AppState>>,
    payload: Option<Json<OrderSubmission>>,
) -> Result<Json<SubmitOrderResponse>, AppError> {
    let request = payload.map(|Json(req)| req);
    let response = state.submissions.submit(request.as_ref()).await?;
    Ok(Json(response))
}
