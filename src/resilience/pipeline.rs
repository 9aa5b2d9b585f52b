//! Resilient token fetch: retry ( circuit breaker ( fetch ) ), run on the
//! worker pool, bounded by the time limiter, normalized into `AuthError`.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::helpers::time::get_instant;
use crate::observability::metrics::get_metrics;
use crate::resilience::error::{AuthError, PipelineError};
use crate::resilience::policy::ResiliencePolicySet;
use crate::sources::fetch::{FetchToken, HttpTokenFetcher, TokenGrant};
use crate::sources::request::TokenRequestSpec;

#[derive(Debug)]
pub struct ResilientPipeline<F: FetchToken = HttpTokenFetcher> {
    policies: Arc<ResiliencePolicySet>,
    fetcher: Arc<F>,
}

impl<F: FetchToken> Clone for ResilientPipeline<F> {
    fn clone(&self) -> Self {
        Self {
            policies: self.policies.clone(),
            fetcher: self.fetcher.clone(),
        }
    }
}

impl<F: FetchToken> ResilientPipeline<F> {
    pub fn new(policies: Arc<ResiliencePolicySet>, fetcher: Arc<F>) -> Self {
        Self { policies, fetcher }
    }

    pub fn policies(&self) -> &Arc<ResiliencePolicySet> {
        &self.policies
    }

    /// Fetches a token through every policy. Success is returned untouched.
    pub async fn execute(&self, spec: Arc<TokenRequestSpec>) -> Result<TokenGrant, AuthError> {
        let name = self.policies.name.as_str();
        let metrics = get_metrics();
        let start = get_instant();
        metrics.token_fetch_requests.with_label_values(&[name]).inc();

        let outcome = self.run(spec).await;
        metrics
            .token_fetch_duration
            .with_label_values(&[name])
            .observe(start.elapsed().as_secs_f64());

        outcome
            .inspect(|grant| debug!("'{}' issued a {} token valid for {}s", name, grant.token_type, grant.expires_in))
            .map_err(|e| {
                warn!("'{}' token pipeline failed ({}): {}", name, e.reason(), e);
                metrics.token_fetch_failures.with_label_values(&[name, e.reason()]).inc();
                AuthError::from(e)
            })
    }

    async fn run(&self, spec: Arc<TokenRequestSpec>) -> Result<TokenGrant, PipelineError> {
        let policies = self.policies.clone();
        let fetcher = self.fetcher.clone();

        let unit = async move {
            let breaker = policies.breaker.as_ref();
            let fetcher = fetcher.as_ref();
            let spec = spec.as_ref();
            policies
                .retry
                .run_with_retry(&policies.name, move || breaker.call(move || fetcher.fetch_token(spec)))
                .await
        };

        let handle = self.policies.pool.submit(unit)?;
        self.policies.time_limiter.limit(&self.policies.name, handle).await
    }
}
