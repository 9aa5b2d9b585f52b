use std::sync::Arc;

use tracing::info;

use crate::config::services::ResilienceConfig;
use crate::resilience::circuit_breaker::{CircuitBreaker, CircuitBreakerSettings};
use crate::resilience::registry::CircuitBreakerRegistry;
use crate::resilience::retry::RetrySettings;
use crate::resilience::time_limiter::TimeLimiter;
use crate::resilience::worker_pool::WorkerPool;
use crate::utils::constants::DEFAULT_WORKER_POOL_SIZE;

/// Circuit breaker, retry, time limiter and worker pool for one logical service.
#[derive(Debug)]
pub struct ResiliencePolicySet {
    pub name: String,
    pub breaker: Arc<CircuitBreaker>,
    pub retry: RetrySettings,
    pub time_limiter: TimeLimiter,
    pub pool: WorkerPool,
}

impl ResiliencePolicySet {
    pub fn new(
        name: impl Into<String>,
        breaker: Arc<CircuitBreaker>,
        retry: RetrySettings,
        time_limiter: TimeLimiter,
        pool: WorkerPool,
    ) -> Self {
        Self { name: name.into(), breaker, retry, time_limiter, pool }
    }

    /// Builds the policies for `name`, sharing the registry's breaker of the same name.
    pub fn from_config(name: &str, cfg: &ResilienceConfig, registry: &CircuitBreakerRegistry) -> Self {
        let breaker = registry.get_or_create(name, CircuitBreakerSettings::from(&cfg.circuit_breaker));
        let retry = RetrySettings::from(&cfg.retry);
        let time_limiter = TimeLimiter::from(&cfg.time_limiter);
        let pool = WorkerPool::new(name, cfg.worker_pool_size.unwrap_or(DEFAULT_WORKER_POOL_SIZE));

        info!(
            "resilience policies for '{}': retry attempts {}, timeout {:?}, pool size {}, breaker {:?}",
            name,
            retry.attempts,
            time_limiter.timeout,
            pool.size(),
            breaker.settings()
        );

        Self::new(name, breaker, retry, time_limiter, pool)
    }
}
