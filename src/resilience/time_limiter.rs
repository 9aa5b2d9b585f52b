use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::warn;

use crate::config::services::TimeLimiterConfig;
use crate::resilience::error::PipelineError;
use crate::utils::constants::DEFAULT_TIMEOUT_MS;

/// Wall-clock bound around a spawned unit of work.
///
/// On expiry the handle is dropped, which detaches the task: it keeps running
/// (and holds its worker slot) until it finishes on its own.
#[derive(Debug, Clone)]
pub struct TimeLimiter {
    pub timeout: Duration,
}

impl From<&TimeLimiterConfig> for TimeLimiter {
    fn from(cfg: &TimeLimiterConfig) -> Self {
        Self {
            timeout: Duration::from_millis(cfg.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS)),
        }
    }
}

impl TimeLimiter {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub async fn limit<T>(
        &self,
        service: &str,
        handle: JoinHandle<Result<T, PipelineError>>,
    ) -> Result<T, PipelineError> {
        match tokio::time::timeout(self.timeout, handle).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(join_error)) => Err(PipelineError::Aborted {
                service: service.to_owned(),
                message: join_error.to_string(),
            }),
            Err(_) => {
                warn!("{service}: no result within {:?}, abandoning the call", self.timeout);
                Err(PipelineError::Timeout { service: service.to_owned(), after: self.timeout })
            }
        }
    }
}
