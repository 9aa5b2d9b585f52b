use std::future::Future;

use tokio::time::{sleep, Duration};
use tracing::{error, warn};

use crate::config::services::RetryConfig;
use crate::observability::metrics::get_metrics;
use crate::resilience::error::PipelineError;
use crate::utils::constants::*;

#[derive(Debug, Clone)]
pub struct RetrySettings {
    /// total attempts, the first call included
    pub attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// 1.0 keeps a fixed delay
    pub multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetrySettings {
    fn from(cfg: &RetryConfig) -> Self {
        Self {
            attempts: cfg.max_attempts.unwrap_or(DEFAULT_RETRY_ATTEMPTS).max(1),
            base_delay: Duration::from_millis(cfg.base_delay_ms.unwrap_or(DEFAULT_RETRY_BASE_DELAY_MS)),
            max_delay: Duration::from_millis(cfg.max_delay_ms.unwrap_or(DEFAULT_RETRY_MAX_DELAY_MS)),
            multiplier: cfg.multiplier.unwrap_or(DEFAULT_RETRY_MULTIPLIER).max(1.0).min(MAX_RETRY_MULTIPLIER),
        }
    }
}

impl RetrySettings {
    /// Runs `operation` until it succeeds or the attempts are used up.
    /// An open circuit ends the loop immediately.
    pub async fn run_with_retry<F, Fut, T>(&self, service: &str, mut operation: F) -> Result<T, PipelineError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, PipelineError>>,
    {
        let attempts = self.attempts.max(1);
        let mut delay = self.base_delay;
        let mut attempt = 1;

        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e @ PipelineError::CircuitOpen { .. }) => {
                    warn!("{service}: attempt {attempt}/{attempts} not permitted: {e}");
                    return Err(e);
                }
                Err(e) if attempt < attempts => {
                    warn!("{service}: attempt {attempt}/{attempts} failed: {e}");
                    get_metrics().retry_attempts.with_label_values(&[service]).inc();
                    sleep(delay).await;
                    delay = self.next_delay(delay);
                    attempt += 1;
                }
                Err(e) => {
                    error!("{service}: all {attempt} attempts failed: {e}");
                    return Err(e);
                }
            }
        }
    }
}

impl RetrySettings {
    /// Grows `delay` by the multiplier, capped at `max_delay`. Saturates instead of overflowing.
    pub fn next_delay(&self, delay: Duration) -> Duration {
        Duration::try_from_secs_f64(delay.as_secs_f64() * self.multiplier)
            .map(|next| next.min(self.max_delay))
            .unwrap_or(self.max_delay)
    }
}
