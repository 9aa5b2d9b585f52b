use std::time::Duration;

use http::StatusCode;
use thiserror::Error;

/// Raw failure of one pass through the resilience pipeline.
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    #[error("token fetch failed ({status}): {message}")]
    FetchFailed { status: StatusCode, message: String },

    #[error("circuit breaker '{service}' is open, call not permitted")]
    CircuitOpen { service: String },

    #[error("'{service}' did not complete within {after:?}")]
    Timeout { service: String, after: Duration },

    #[error("worker pool for '{service}' rejected the task")]
    Rejected { service: String },

    /// the worker task died without producing a result
    #[error("'{service}' aborted: {message}")]
    Aborted { service: String, message: String },
}

impl PipelineError {
    pub fn fetch_failed(status: StatusCode, message: impl Into<String>) -> Self {
        PipelineError::FetchFailed { status, message: message.into() }
    }

    /// Short label for metrics and logs.
    pub fn reason(&self) -> &'static str {
        match self {
            PipelineError::FetchFailed { .. } => "fetch_failed",
            PipelineError::CircuitOpen { .. } => "circuit_open",
            PipelineError::Timeout { .. } => "timeout",
            PipelineError::Rejected { .. } => "rejected",
            PipelineError::Aborted { .. } => "aborted",
        }
    }
}

/// Uniform error handed to token consumers.
///
/// `status` is `429 Too Many Requests` for every pipeline-level failure
/// (open circuit, timeout, rejection); a failed fetch keeps the upstream status.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message} (status {status})")]
pub struct AuthError {
    pub message: String,
    pub status: StatusCode,
}

impl AuthError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { message: message.into(), status }
    }

    pub fn too_many_requests(message: impl Into<String>) -> Self {
        Self::new(StatusCode::TOO_MANY_REQUESTS, message)
    }
}

impl From<PipelineError> for AuthError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::FetchFailed { status, message } => AuthError::new(status, message),
            other => AuthError::too_many_requests(other.to_string()),
        }
    }
}
