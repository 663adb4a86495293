use thiserror::Error;

use crate::queue::QueueError;
use crate::store::StoreError;

/// Failures the submission path returns to its caller.
///
/// Undecodable payloads and unusable correlation state only occur on the
/// consumption path, where they are a `SkipReason` on the worker's outcome
/// rather than an error.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Malformed submission. Rejected before any side effect.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Queue or correlation store unreachable.
    #[error("dependency failure: {0}")]
    DependencyFailure(String),
}

impl From<QueueError> for PipelineError {
    fn from(err: QueueError) -> Self {
        Self::DependencyFailure(err.to_string())
    }
}

impl From<StoreError> for PipelineError {
    fn from(err: StoreError) -> Self {
        Self::DependencyFailure(err.to_string())
    }
}
