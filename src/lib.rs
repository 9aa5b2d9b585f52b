//! # Token Client Library
//!
//! Keeps OAuth2 client-credentials tokens fresh for downstream HTTP calls.
//! Tokens are cached per provider and refreshed through a resilience
//! pipeline (circuit breaker, retry, worker pool, time limiter); outgoing
//! requests get `Authorization: Bearer` injected and a 401 drops the token.
//!
//! Modules:
//! - `config`: YAML configuration, env expansion and validation
//! - `cache`: self-refreshing token manager
//! - `sources`: token endpoint request and fetcher
//! - `resilience`: circuit breaker, retry, worker pool, time limiter, pipeline
//! - `interceptor`: bearer token injection
//! - `client`: downstream service clients and the composition root
//! - `server`: admin API and metrics endpoint

pub mod cache;
pub mod client;
pub mod config;
pub mod helpers;
pub mod interceptor;
pub mod observability;
pub mod resilience;
pub mod server;
pub mod sources;
pub mod tests;
pub mod utils;

pub use crate::config::services::ServiceConfig;
