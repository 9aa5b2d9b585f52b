//! Count-based sliding window circuit breaker.
//!
//! - Closed: calls pass; outcomes are recorded in a window of the last
//!   `sliding_window_size` calls. Once `minimum_calls` are recorded and the
//!   failure rate reaches `failure_rate_threshold`, the circuit opens.
//! - Open: calls fail with `CircuitOpen` without running. After
//!   `wait_duration_open` the next permission check moves to half-open.
//! - HalfOpen: up to `permitted_calls_in_half_open` trial calls are admitted.
//!   Any failure reopens, that many successes close.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::config::services::CircuitBreakerConfig;
use crate::observability::metrics::get_metrics;
use crate::resilience::error::PipelineError;
use crate::utils::constants::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        }
    }

    fn gauge_value(&self) -> i64 {
        match self {
            CircuitState::Closed => 0,
            CircuitState::Open => 1,
            CircuitState::HalfOpen => 2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerSettings {
    /// percent of failed calls in the window that opens the circuit
    pub failure_rate_threshold: f64,
    pub sliding_window_size: usize,
    pub minimum_calls: usize,
    pub wait_duration_open: Duration,
    pub permitted_calls_in_half_open: usize,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_rate_threshold: DEFAULT_FAILURE_RATE_THRESHOLD,
            sliding_window_size: DEFAULT_SLIDING_WINDOW_SIZE,
            minimum_calls: DEFAULT_MINIMUM_CALLS,
            wait_duration_open: Duration::from_millis(DEFAULT_WAIT_DURATION_OPEN_MS),
            permitted_calls_in_half_open: DEFAULT_PERMITTED_CALLS_IN_HALF_OPEN,
        }
    }
}

impl From<&CircuitBreakerConfig> for CircuitBreakerSettings {
    fn from(cfg: &CircuitBreakerConfig) -> Self {
        let window = cfg.sliding_window_size.unwrap_or(DEFAULT_SLIDING_WINDOW_SIZE).max(1);
        Self {
            failure_rate_threshold: cfg.failure_rate_threshold.unwrap_or(DEFAULT_FAILURE_RATE_THRESHOLD),
            sliding_window_size: window,
            minimum_calls: cfg.minimum_calls.unwrap_or(DEFAULT_MINIMUM_CALLS.min(window)).clamp(1, window),
            wait_duration_open: Duration::from_millis(cfg.wait_duration_open_ms.unwrap_or(DEFAULT_WAIT_DURATION_OPEN_MS)),
            permitted_calls_in_half_open: cfg
                .permitted_calls_in_half_open
                .unwrap_or(DEFAULT_PERMITTED_CALLS_IN_HALF_OPEN)
                .max(1),
        }
    }
}

/// Point-in-time view for the admin API.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CircuitBreakerSnapshot {
    pub name: String,
    pub state: CircuitState,
    /// percent, `None` until `minimum_calls` outcomes are buffered
    pub failure_rate: Option<f64>,
    pub buffered_calls: usize,
    pub failed_calls: usize,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    /// true = failed call
    window: VecDeque<bool>,
    opened_at: Option<Instant>,
    half_open_admitted: usize,
    half_open_successes: usize,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    settings: CircuitBreakerSettings,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, settings: CircuitBreakerSettings) -> Self {
        let name = name.into();
        get_metrics()
            .circuit_breaker_state
            .with_label_values(&[name.as_str()])
            .set(CircuitState::Closed.gauge_value());
        Self {
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                window: VecDeque::with_capacity(settings.sliding_window_size),
                opened_at: None,
                half_open_admitted: 0,
                half_open_successes: 0,
            }),
            name,
            settings,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> &CircuitBreakerSettings {
        &self.settings
    }

    /// Current state; an expired open period is reported (and applied) as half-open.
    pub fn state(&self) -> CircuitState {
        let mut inner = self.lock();
        self.promote_if_wait_elapsed(&mut inner);
        inner.state
    }

    /// Admits a call or fails with `CircuitOpen`.
    pub fn try_acquire_permission(&self) -> Result<(), PipelineError> {
        let mut inner = self.lock();
        self.promote_if_wait_elapsed(&mut inner);
        match inner.state {
            CircuitState::Closed => Ok(()),
            CircuitState::HalfOpen if inner.half_open_admitted < self.settings.permitted_calls_in_half_open => {
                inner.half_open_admitted += 1;
                Ok(())
            }
            _ => Err(PipelineError::CircuitOpen { service: self.name.clone() }),
        }
    }

    pub fn on_success(&self) {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => {
                self.record(&mut inner, false);
            }
            CircuitState::HalfOpen => {
                inner.half_open_successes += 1;
                if inner.half_open_successes >= self.settings.permitted_calls_in_half_open {
                    self.transition(&mut inner, CircuitState::Closed);
                }
            }
            // a call admitted before the circuit opened finished late
            CircuitState::Open => {}
        }
    }

    pub fn on_failure(&self, error: &PipelineError) {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => {
                self.record(&mut inner, true);
                if let Some(rate) = failure_rate(&inner.window, self.settings.minimum_calls) {
                    if rate >= self.settings.failure_rate_threshold {
                        warn!(
                            circuit = %self.name,
                            failure_rate = rate,
                            threshold = self.settings.failure_rate_threshold,
                            "failure rate threshold reached, last error: {}", error
                        );
                        self.transition(&mut inner, CircuitState::Open);
                    }
                }
            }
            CircuitState::HalfOpen => {
                warn!(circuit = %self.name, "trial call failed in half-open state: {}", error);
                self.transition(&mut inner, CircuitState::Open);
            }
            CircuitState::Open => {}
        }
    }

    /// Runs `op` if the circuit admits it and records the outcome.
    pub async fn call<F, Fut, T>(&self, op: F) -> Result<T, PipelineError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, PipelineError>>,
    {
        self.try_acquire_permission()?;
        match op().await {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(e) => {
                self.on_failure(&e);
                Err(e)
            }
        }
    }

    pub fn force_open(&self) {
        let mut inner = self.lock();
        self.transition(&mut inner, CircuitState::Open);
    }

    pub fn force_closed(&self) {
        let mut inner = self.lock();
        self.transition(&mut inner, CircuitState::Closed);
    }

    pub fn force_half_open(&self) {
        let mut inner = self.lock();
        self.transition(&mut inner, CircuitState::HalfOpen);
    }

    /// Back to closed with an empty window.
    pub fn reset(&self) {
        let mut inner = self.lock();
        self.transition(&mut inner, CircuitState::Closed);
        inner.window.clear();
    }

    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        let mut inner = self.lock();
        self.promote_if_wait_elapsed(&mut inner);
        CircuitBreakerSnapshot {
            name: self.name.clone(),
            state: inner.state,
            failure_rate: failure_rate(&inner.window, self.settings.minimum_calls),
            buffered_calls: inner.window.len(),
            failed_calls: inner.window.iter().filter(|failed| **failed).count(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, inner: &mut BreakerInner, failed: bool) {
        if inner.window.len() == self.settings.sliding_window_size {
            inner.window.pop_front();
        }
        inner.window.push_back(failed);
    }

    fn promote_if_wait_elapsed(&self, inner: &mut BreakerInner) {
        if inner.state != CircuitState::Open {
            return;
        }
        let elapsed = inner
            .opened_at
            .map(|opened_at| opened_at.elapsed() >= self.settings.wait_duration_open)
            .unwrap_or(true);
        if elapsed {
            self.transition(inner, CircuitState::HalfOpen);
        }
    }

    fn transition(&self, inner: &mut BreakerInner, to: CircuitState) {
        let from = inner.state;
        inner.state = to;
        inner.half_open_admitted = 0;
        inner.half_open_successes = 0;
        match to {
            CircuitState::Open => inner.opened_at = Some(Instant::now()),
            CircuitState::Closed => {
                inner.opened_at = None;
                inner.window.clear();
            }
            CircuitState::HalfOpen => inner.opened_at = None,
        }

        if from != to {
            info!(circuit = %self.name, "circuit breaker {} -> {}", from.as_str(), to.as_str());
            let metrics = get_metrics();
            metrics
                .circuit_breaker_transitions
                .with_label_values(&[self.name.as_str(), from.as_str(), to.as_str()])
                .inc();
            metrics
                .circuit_breaker_state
                .with_label_values(&[self.name.as_str()])
                .set(to.gauge_value());
        }
    }
}

fn failure_rate(window: &VecDeque<bool>, minimum_calls: usize) -> Option<f64> {
    if window.is_empty() || window.len() < minimum_calls {
        return None;
    }
    let failed = window.iter().filter(|failed| **failed).count();
    Some(failed as f64 * 100.0 / window.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;

    fn settings(wait: Duration) -> CircuitBreakerSettings {
        CircuitBreakerSettings {
            failure_rate_threshold: 50.0,
            sliding_window_size: 4,
            minimum_calls: 4,
            wait_duration_open: wait,
            permitted_calls_in_half_open: 2,
        }
    }

    fn failure() -> PipelineError {
        PipelineError::fetch_failed(StatusCode::SERVICE_UNAVAILABLE, "down")
    }

    #[test]
    fn opens_when_failure_rate_reaches_threshold() {
        let breaker = CircuitBreaker::new("cb_threshold", settings(Duration::from_secs(60)));

        breaker.on_success();
        breaker.on_failure(&failure());
        breaker.on_success();
        // 1 of 3 failed, below minimum calls anyway
        assert_eq!(breaker.state(), CircuitState::Closed);

        breaker.on_failure(&failure());
        // 2 of 4 = 50%
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(matches!(
            breaker.try_acquire_permission(),
            Err(PipelineError::CircuitOpen { .. })
        ));
    }

    #[test]
    fn stays_closed_below_minimum_calls() {
        let breaker = CircuitBreaker::new("cb_minimum", settings(Duration::from_secs(60)));
        for _ in 0..3 {
            breaker.on_failure(&failure());
        }
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.snapshot().failure_rate, None);
        assert_eq!(breaker.snapshot().failed_calls, 3);
    }

    #[test]
    fn window_slides_over_old_outcomes() {
        let breaker = CircuitBreaker::new("cb_sliding", settings(Duration::from_secs(60)));
        breaker.on_failure(&failure());
        for _ in 0..4 {
            breaker.on_success();
        }
        let snapshot = breaker.snapshot();
        assert_eq!(snapshot.buffered_calls, 4);
        assert_eq!(snapshot.failure_rate, Some(0.0));
    }

    #[tokio::test]
    async fn recovers_through_half_open() {
        let breaker = CircuitBreaker::new("cb_recover", settings(Duration::from_millis(30)));
        breaker.force_open();
        assert!(breaker.try_acquire_permission().is_err());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        // two trial calls admitted, third rejected
        assert!(breaker.try_acquire_permission().is_ok());
        assert!(breaker.try_acquire_permission().is_ok());
        assert!(breaker.try_acquire_permission().is_err());

        breaker.on_success();
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        breaker.on_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn half_open_failure_reopens() {
        let breaker = CircuitBreaker::new("cb_reopen", settings(Duration::from_secs(60)));
        breaker.force_half_open();

        let result: Result<(), PipelineError> = breaker.call(|| async { Err(failure()) }).await;
        assert!(result.is_err());
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn open_circuit_does_not_run_the_call() {
        let breaker = CircuitBreaker::new("cb_skip", settings(Duration::from_secs(60)));
        breaker.force_open();

        let mut ran = false;
        let result = breaker
            .call(|| {
                ran = true;
                async { Ok::<_, PipelineError>(()) }
            })
            .await;

        assert!(matches!(result, Err(PipelineError::CircuitOpen { .. })));
        assert!(!ran);

        breaker.reset();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.snapshot().buffered_calls, 0);
    }
}
