// tests/common/mod.rs
pub use axum::{body::Body, Router};
pub use serde_json::json;
pub use tokio::task::JoinHandle;

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use http::StatusCode;
use reqwest::Client;

use crate::resilience::circuit_breaker::{CircuitBreaker, CircuitBreakerSettings};
use crate::resilience::error::PipelineError;
use crate::resilience::pipeline::ResilientPipeline;
use crate::resilience::policy::ResiliencePolicySet;
use crate::resilience::retry::RetrySettings;
use crate::resilience::time_limiter::TimeLimiter;
use crate::resilience::worker_pool::WorkerPool;
use crate::sources::fetch::{FetchToken, TokenGrant};
use crate::sources::request::TokenRequestSpec;

/// Spawn an Axum router on an ephemeral port and return (JoinHandle, SocketAddr)
pub async fn spawn_axum(router: Router) -> (JoinHandle<()>, SocketAddr) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind failed");
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.expect("server failed");
    });
    (handle, addr)
}

pub fn build_reqwest_client() -> Client {
    Client::builder()
        .timeout(std::time::Duration::from_secs(5))
        .build()
        .expect("reqwest client")
}

/// Fetcher that replays a fixed list of outcomes and counts every call.
/// Once the script runs out every call fails with 500.
pub struct ScriptedFetcher {
    script: Mutex<VecDeque<Result<(String, u64), StatusCode>>>,
    calls: AtomicUsize,
    delay: Duration,
}

impl ScriptedFetcher {
    pub fn new(script: Vec<Result<(&str, u64), StatusCode>>) -> Self {
        Self {
            script: Mutex::new(
                script
                    .into_iter()
                    .map(|outcome| outcome.map(|(token, ttl)| (token.to_owned(), ttl)))
                    .collect(),
            ),
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }

    pub fn tokens(tokens: &[(&str, u64)]) -> Self {
        Self::new(tokens.iter().map(|&(token, ttl)| Ok((token, ttl))).collect())
    }

    /// Every call sleeps this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl FetchToken for ScriptedFetcher {
    async fn fetch_token(&self, _spec: &TokenRequestSpec) -> Result<TokenGrant, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match next {
            Some(Ok((access_token, expires_in))) => Ok(TokenGrant {
                access_token,
                token_type: "Bearer".to_owned(),
                expires_in,
            }),
            Some(Err(status)) => Err(PipelineError::fetch_failed(status, "scripted failure")),
            None => Err(PipelineError::fetch_failed(StatusCode::INTERNAL_SERVER_ERROR, "script exhausted")),
        }
    }
}

/// Policies with fast retries so scenarios finish quickly.
pub fn test_policies(
    name: &str,
    attempts: u32,
    timeout: Duration,
    pool_size: usize,
    breaker: CircuitBreakerSettings,
) -> Arc<ResiliencePolicySet> {
    Arc::new(ResiliencePolicySet::new(
        name,
        Arc::new(CircuitBreaker::new(name, breaker)),
        RetrySettings {
            attempts,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
            multiplier: 2.0,
        },
        TimeLimiter::new(timeout),
        WorkerPool::new(name, pool_size),
    ))
}

/// Single-attempt pipeline around `fetcher`, so every cache-level call maps to one fetch.
pub fn pipeline_with(name: &str, fetcher: Arc<ScriptedFetcher>) -> ResilientPipeline<ScriptedFetcher> {
    ResilientPipeline::new(
        test_policies(name, 1, Duration::from_secs(5), 10, CircuitBreakerSettings::default()),
        fetcher,
    )
}
