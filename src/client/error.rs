use http::StatusCode;
use thiserror::Error;

use crate::resilience::error::AuthError;

/// Failure of a downstream call made through a `ServiceClient`.
#[derive(Debug, Error)]
pub enum ClientError {
    /// no token could be obtained, the request was not sent
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("'{service}' responded {status}: {body}")]
    Status { service: String, status: StatusCode, body: String },

    #[error("invalid header value: {0}")]
    InvalidHeader(String),

    #[error("invalid url: {0}")]
    InvalidUrl(String),
}

impl ClientError {
    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ClientError::Auth(e) => Some(e.status),
            ClientError::Transport(e) => e.status(),
            ClientError::Status { status, .. } => Some(*status),
            ClientError::InvalidHeader(_) | ClientError::InvalidUrl(_) => None,
        }
    }
}
