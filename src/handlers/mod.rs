pub mod health;
pub mod orders;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::error::PipelineError;

// ─── Unified error type ──────────────────────────────────────────

/// HTTP face of [`PipelineError`].
#[derive(Debug)]
pub struct AppError(pub PipelineError);

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        Self(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self.0 {
            PipelineError::InvalidArgument(msg) => {
                (StatusCode::BAD_REQUEST, "INVALID_ARGUMENT", msg)
            }
            PipelineError::DependencyFailure(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "DEPENDENCY_FAILURE", msg)
            }
        };

        let body = serde_json::json!({
            "error":   code,
            "message": message,
        });

        (status, Json(body)).into_response()
    }
}
