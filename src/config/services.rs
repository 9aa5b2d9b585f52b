use serde::Deserialize;
use std::collections::HashMap;

use crate::config::settings::SettingsConfig;

/// ================================
/// Full service configuration
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub settings: SettingsConfig,
    /// token providers by logical service name, e.g. `authService`
    pub providers: HashMap<String, ProviderConfig>,
    /// downstream services called with a provider's bearer token
    #[serde(default)]
    pub services: HashMap<String, DownstreamConfig>,
}

/// ================================
/// Token providers
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    pub token_url: String,
    pub grant_type: Option<String>,
    pub scope: Option<String>,
    pub audience: Option<String>,
    /// sent as `Authorization: Basic base64(client_id:client_secret)` when both are set
    pub client_id: Option<GenericSourceValue>,
    pub client_secret: Option<GenericSourceValue>,
    pub headers: Option<HashMap<String, GenericSourceValue>>,
    pub safety_margin_seconds: Option<u64>,
    pub default_expires_in: Option<u64>,
    #[serde(default)]
    pub resilience: ResilienceConfig,
}

/// Header / credential value sources
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum GenericSourceValue {
    Literal {
        value: String,
    },
    FromEnv {
        from_env: String,
    },
    FromFile {
        path: String,
    },
}

/// ================================
/// Resilience policies
/// ================================
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ResilienceConfig {
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub time_limiter: TimeLimiterConfig,
    pub worker_pool_size: Option<usize>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct CircuitBreakerConfig {
    /// percent, (0, 100]
    pub failure_rate_threshold: Option<f64>,
    pub sliding_window_size: Option<usize>,
    /// outcomes required in the window before the rate is evaluated
    pub minimum_calls: Option<usize>,
    pub wait_duration_open_ms: Option<u64>,
    pub permitted_calls_in_half_open: Option<usize>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct RetryConfig {
    /// total attempts, the first call included
    pub max_attempts: Option<u32>,
    /// will be multiplied by `multiplier` on every attempt until max_delay_ms
    pub base_delay_ms: Option<u64>,
    /// must be >= base_delay_ms
    pub max_delay_ms: Option<u64>,
    pub multiplier: Option<f64>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct TimeLimiterConfig {
    pub timeout_ms: Option<u64>,
}

/// ================================
/// Downstream services
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct DownstreamConfig {
    pub base_url: String,
    /// name of the provider in `providers`
    pub provider: String,
}
