//! Configuration validation with aggregated errors.
//! Every issue found is collected into one `Vec<String>` so a broken config
//! reports all of its problems at once.

use reqwest::Url;
use tracing::{error, info};

use crate::config::services::{
    CircuitBreakerConfig, DownstreamConfig, ProviderConfig, RetryConfig, ServiceConfig,
};
use crate::config::settings::SettingsConfig;
use crate::observability::metrics::get_metrics;
use crate::utils::constants::{MAX_RETRY_MULTIPLIER, MAX_SAFETY_MARGIN_SECS};

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Public entrypoint: returns Ok(()) or Err(Vec<String>) containing all issues.
pub fn validate_service_config(cfg: &ServiceConfig) -> Result<(), Vec<String>> {
    let mut errors: Vec<String> = Vec::new();

    validate_settings(&cfg.settings, &mut errors);

    if cfg.providers.is_empty() {
        errors.push("config: 'providers' is empty; at least one token provider required".to_string());
    }

    for (name, provider) in &cfg.providers {
        validate_provider(name, provider, &mut errors);
    }

    for (name, service) in &cfg.services {
        validate_downstream(name, service, cfg, &mut errors);
    }

    if errors.is_empty() {
        info!("config valid");
        Ok(())
    } else {
        error!("configuration validation errors ({}):", errors.len());
        for e in &errors {
            error!(" - {}", e);
        }
        get_metrics().config_validation_errors.inc();
        Err(errors)
    }
}

/// SETTINGS VALIDATION
fn validate_settings(settings: &SettingsConfig, errors: &mut Vec<String>) {
    validate_safety_margin("settings", settings.safety_margin_seconds, errors);
    if settings.server.host.is_empty() {
        errors.push("settings.server.host must not be empty".to_string());
    }
    if settings.server.port.parse::<u16>().is_err() {
        errors.push(format!("settings.server.port '{}' must be a valid port", settings.server.port));
    }
    if !settings.metrics.path.starts_with('/') {
        errors.push(format!("settings.metrics.path '{}' must start with '/'", settings.metrics.path));
    }
    if let Some(logging) = &settings.logging {
        if !LOG_LEVELS.contains(&logging.level.to_lowercase().as_str()) {
            errors.push(format!(
                "settings.logging.level '{}' must be one of {:?}",
                logging.level, LOG_LEVELS
            ));
        }
    }
}

/// PROVIDER VALIDATION
fn validate_provider(name: &str, provider: &ProviderConfig, errors: &mut Vec<String>) {
    let prefix = format!("providers['{}']", name);

    validate_url(&format!("{}.token_url", prefix), &provider.token_url, errors);

    if let Some(grant_type) = &provider.grant_type {
        if grant_type.trim().is_empty() {
            errors.push(format!("{}.grant_type must not be empty", prefix));
        }
    }
    if provider.client_id.is_some() != provider.client_secret.is_some() {
        errors.push(format!(
            "{}: client_id and client_secret must be configured together",
            prefix
        ));
    }
    validate_safety_margin(&prefix, provider.safety_margin_seconds, errors);
    if provider.default_expires_in == Some(0) {
        errors.push(format!("{}.default_expires_in must be > 0", prefix));
    }

    let resilience = &provider.resilience;
    validate_circuit_breaker(&format!("{}.resilience.circuit_breaker", prefix), &resilience.circuit_breaker, errors);
    validate_retry(&format!("{}.resilience.retry", prefix), &resilience.retry, errors);

    if resilience.time_limiter.timeout_ms == Some(0) {
        errors.push(format!("{}.resilience.time_limiter.timeout_ms must be > 0", prefix));
    }
    if resilience.worker_pool_size == Some(0) {
        errors.push(format!("{}.resilience.worker_pool_size must be > 0", prefix));
    }
}

fn validate_circuit_breaker(path: &str, cb: &CircuitBreakerConfig, errors: &mut Vec<String>) {
    if let Some(rate) = cb.failure_rate_threshold {
        if !(rate > 0.0 && rate <= 100.0) {
            errors.push(format!("{}.failure_rate_threshold ({}) must be in (0, 100]", path, rate));
        }
    }
    if cb.sliding_window_size == Some(0) {
        errors.push(format!("{}.sliding_window_size must be > 0", path));
    }
    if cb.minimum_calls == Some(0) {
        errors.push(format!("{}.minimum_calls must be > 0", path));
    }
    if let (Some(min), Some(window)) = (cb.minimum_calls, cb.sliding_window_size) {
        if min > window {
            errors.push(format!(
                "{}.minimum_calls ({}) must be <= sliding_window_size ({})",
                path, min, window
            ));
        }
    }
    if cb.permitted_calls_in_half_open == Some(0) {
        errors.push(format!("{}.permitted_calls_in_half_open must be > 0", path));
    }
}

fn validate_retry(path: &str, retry: &RetryConfig, errors: &mut Vec<String>) {
    if retry.max_attempts == Some(0) {
        errors.push(format!("{}.max_attempts must be >= 1", path));
    }
    if let (Some(base), Some(max)) = (retry.base_delay_ms, retry.max_delay_ms) {
        if base > max {
            errors.push(format!(
                "{}.base_delay_ms ({}) must be <= max_delay_ms ({})",
                path, base, max
            ));
        }
    }
    if let Some(multiplier) = retry.multiplier {
        if !(1.0..=MAX_RETRY_MULTIPLIER).contains(&multiplier) {
            errors.push(format!(
                "{}.multiplier ({}) must be in [1.0, {}]",
                path, multiplier, MAX_RETRY_MULTIPLIER
            ));
        }
    }
}

fn validate_safety_margin(path: &str, margin: Option<u64>, errors: &mut Vec<String>) {
    if let Some(s) = margin {
        if s > MAX_SAFETY_MARGIN_SECS {
            errors.push(format!(
                "{}.safety_margin_seconds ({}) must be <= {}",
                path, s, MAX_SAFETY_MARGIN_SECS
            ));
        }
    }
}

/// DOWNSTREAM VALIDATION
fn validate_downstream(name: &str, service: &DownstreamConfig, cfg: &ServiceConfig, errors: &mut Vec<String>) {
    validate_url(&format!("services['{}'].base_url", name), &service.base_url, errors);
    if !cfg.providers.contains_key(&service.provider) {
        errors.push(format!(
            "services['{}'].provider references unknown provider '{}'",
            name, service.provider
        ));
    }
}

fn validate_url(path: &str, value: &str, errors: &mut Vec<String>) {
    match Url::parse(value) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
        Ok(url) => errors.push(format!("{} '{}' has unsupported scheme '{}'", path, value, url.scheme())),
        Err(e) => errors.push(format!("{} '{}' is not a valid URL: {}", path, value, e)),
    }
}
