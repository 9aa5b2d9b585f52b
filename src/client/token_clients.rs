//! Composition root
//!
//! One breaker registry for the process, then per provider a policy set,
//! pipeline and token manager, then per downstream service a client bound to
//! its provider's token manager.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::Duration;
use reqwest::Client;
use tracing::{info, warn};

use crate::cache::token::TokenStatus;
use crate::cache::token_manager::TokenManager;
use crate::client::service_client::ServiceClient;
use crate::config::services::ServiceConfig;
use crate::helpers::time::{get_token_safety_margin_seconds, Clock, SystemClock};
use crate::interceptor::bearer::BearerInterceptor;
use crate::resilience::pipeline::ResilientPipeline;
use crate::resilience::policy::ResiliencePolicySet;
use crate::resilience::registry::CircuitBreakerRegistry;
use crate::sources::fetch::HttpTokenFetcher;
use crate::sources::request::TokenRequestSpec;

pub struct TokenClients {
    breakers: Arc<CircuitBreakerRegistry>,
    providers: BTreeMap<String, Arc<TokenManager>>,
    services: BTreeMap<String, Arc<ServiceClient>>,
}

impl TokenClients {
    pub fn build(config: &ServiceConfig, http: Client) -> Result<Self> {
        Self::build_with_clock(config, http, Arc::new(SystemClock))
    }

    pub fn build_with_clock(config: &ServiceConfig, http: Client, clock: Arc<dyn Clock>) -> Result<Self> {
        let breakers = Arc::new(CircuitBreakerRegistry::new());
        let fetcher = Arc::new(HttpTokenFetcher::new(http.clone()));

        let mut providers = BTreeMap::new();
        for (name, provider) in &config.providers {
            let policies = Arc::new(ResiliencePolicySet::from_config(name, &provider.resilience, &breakers));
            let pipeline = ResilientPipeline::new(policies, fetcher.clone());

            let margin = get_token_safety_margin_seconds(config.settings.safety_margin_seconds, provider.safety_margin_seconds);
            let safety_buffer = i64::try_from(margin)
                .ok()
                .and_then(Duration::try_seconds)
                .ok_or_else(|| anyhow!("provider '{}': safety margin {}s is out of range", name, margin))?;

            let manager = TokenManager::new(
                name.as_str(),
                TokenRequestSpec::from_config(provider),
                pipeline,
                clock.clone(),
                safety_buffer,
            );
            info!("provider '{}' ready, token url {}, safety margin {}s", name, provider.token_url, margin);
            providers.insert(name.to_owned(), Arc::new(manager));
        }

        let mut services = BTreeMap::new();
        for (name, service) in &config.services {
            let manager = providers
                .get(&service.provider)
                .ok_or_else(|| anyhow!("service '{}' references unknown provider '{}'", name, service.provider))?;
            let client = ServiceClient::new(
                name.as_str(),
                &service.base_url,
                BearerInterceptor::new(manager.clone()),
                http.clone(),
            )
            .map_err(|e| anyhow!("service '{}': {}", name, e))?;
            info!("service '{}' ready at {} using provider '{}'", name, service.base_url, service.provider);
            services.insert(name.to_owned(), Arc::new(client));
        }

        Ok(Self { breakers, providers, services })
    }

    pub fn provider(&self, name: &str) -> Option<Arc<TokenManager>> {
        self.providers.get(name).cloned()
    }

    pub fn service(&self, name: &str) -> Option<Arc<ServiceClient>> {
        self.services.get(name).cloned()
    }

    pub fn providers(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }

    pub fn services(&self) -> impl Iterator<Item = &str> {
        self.services.keys().map(String::as_str)
    }

    pub fn breakers(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.breakers
    }

    /// Fetches a token for every provider. Failures are logged, not fatal;
    /// returns the names of the providers that failed.
    pub async fn warm_up(&self) -> Vec<String> {
        let mut failed = Vec::new();
        for (name, manager) in &self.providers {
            match manager.get_valid_token().await {
                Ok(_) => info!("provider '{}' warmed up", name),
                Err(e) => {
                    warn!("provider '{}' warm-up failed: {}", name, e);
                    failed.push(name.to_owned());
                }
            }
        }
        failed
    }

    pub fn token_statuses(&self) -> Vec<TokenStatus> {
        self.providers.values().map(|manager| manager.status()).collect()
    }
}
