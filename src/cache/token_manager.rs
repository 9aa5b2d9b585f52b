//! Self-refreshing bearer token cache for one provider.
//!
//! Reads go through a short-lived state lock and never wait for a refresh.
//! A miss takes the refresh lock, re-checks, and only then runs the pipeline,
//! so at most one fetch is in flight per manager. Callers that queued behind a
//! failed refresh get that same failure instead of starting another fetch.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::cache::token::{Token, TokenState, TokenStatus};
use crate::helpers::time::Clock;
use crate::observability::metrics::get_metrics;
use crate::resilience::error::AuthError;
use crate::resilience::pipeline::ResilientPipeline;
use crate::sources::fetch::{FetchToken, HttpTokenFetcher};
use crate::sources::request::TokenRequestSpec;

pub struct TokenManager<F: FetchToken = HttpTokenFetcher> {
    provider: String,
    spec: Arc<TokenRequestSpec>,
    pipeline: ResilientPipeline<F>,
    clock: Arc<dyn Clock>,
    safety_buffer: Duration,
    state: RwLock<TokenState>,
    /// guards refreshes and invalidation; holds the outcome of the last failed refresh
    refresh_lock: Mutex<Option<AuthError>>,
    /// completed refresh attempts
    refreshes: AtomicU64,
}

impl<F: FetchToken> TokenManager<F> {
    pub fn new(
        provider: impl Into<String>,
        spec: TokenRequestSpec,
        pipeline: ResilientPipeline<F>,
        clock: Arc<dyn Clock>,
        safety_buffer: Duration,
    ) -> Self {
        Self {
            provider: provider.into(),
            spec: Arc::new(spec),
            pipeline,
            clock,
            safety_buffer,
            state: RwLock::new(TokenState::default()),
            refresh_lock: Mutex::new(None),
            refreshes: AtomicU64::new(0),
        }
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn spec(&self) -> &TokenRequestSpec {
        &self.spec
    }

    pub fn pipeline(&self) -> &ResilientPipeline<F> {
        &self.pipeline
    }

    /// Returns a token valid for at least the safety buffer, refreshing if needed.
    pub async fn get_valid_token(&self) -> Result<String, AuthError> {
        let metrics = get_metrics();
        if let Some(token) = self.cached_token() {
            metrics.token_cache_hits.with_label_values(&[self.provider.as_str()]).inc();
            return Ok(token);
        }
        metrics.token_cache_misses.with_label_values(&[self.provider.as_str()]).inc();

        let seen = self.refreshes.load(Ordering::Acquire);
        let mut last_failure = self.refresh_lock.lock().await;

        if let Some(token) = self.cached_token() {
            debug!("'{}' token refreshed by a concurrent caller", self.provider);
            return Ok(token);
        }
        if self.refreshes.load(Ordering::Acquire) != seen {
            if let Some(err) = last_failure.as_ref() {
                debug!("'{}' sharing the failure of the refresh this call waited on", self.provider);
                return Err(err.clone());
            }
        }

        let outcome = self.refresh().await;
        *last_failure = outcome.as_ref().err().cloned();
        self.refreshes.fetch_add(1, Ordering::Release);
        outcome
    }

    /// Drops the cached token so the next call refreshes. Idempotent.
    pub async fn invalidate(&self) {
        let _guard = self.refresh_lock.lock().await;
        let had_token = self.write_state().clear();
        self.record_invalidation(had_token);
    }

    /// Drops the cached token only while it is still `rejected`, so a late 401
    /// for an old token leaves a newer one alone. Returns whether it was dropped.
    pub async fn invalidate_if(&self, rejected: &str) -> bool {
        let _guard = self.refresh_lock.lock().await;
        let cleared = {
            let mut state = self.write_state();
            state.value() == Some(rejected) && state.clear()
        };
        if cleared {
            self.record_invalidation(true);
        } else {
            debug!("'{}' rejected token is no longer cached, keeping the current one", self.provider);
        }
        cleared
    }

    fn record_invalidation(&self, had_token: bool) {
        get_metrics().token_invalidations.with_label_values(&[self.provider.as_str()]).inc();
        get_metrics().token_expiry_unix.with_label_values(&[self.provider.as_str()]).set(0);
        info!("'{}' token invalidated (cached token present: {})", self.provider, had_token);
    }

    pub fn status(&self) -> TokenStatus {
        let expires_at = self.read_state().expires_at();
        TokenStatus {
            provider: self.provider.clone(),
            cached: expires_at.is_some(),
            expires_at,
        }
    }

    async fn refresh(&self) -> Result<String, AuthError> {
        info!("'{}' refreshing token", self.provider);
        let grant = self.pipeline.execute(self.spec.clone()).await?;

        let now = self.clock.now();
        let expires_at = i64::try_from(grant.expires_in)
            .ok()
            .and_then(Duration::try_seconds)
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let token = Token::new(grant.access_token, expires_at);
        let value = token.value.clone();
        self.write_state().replace(token);

        get_metrics()
            .token_expiry_unix
            .with_label_values(&[self.provider.as_str()])
            .set(expires_at.timestamp());
        info!("'{}' token refreshed, expires at {}", self.provider, expires_at);
        Ok(value)
    }

    fn cached_token(&self) -> Option<String> {
        self.read_state()
            .valid_token(self.clock.now(), self.safety_buffer)
            .map(|token| token.value.clone())
    }

    fn read_state(&self) -> RwLockReadGuard<'_, TokenState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, TokenState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}
