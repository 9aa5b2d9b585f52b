use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry};
use std::sync::OnceLock;
use tracing::info;

static METRICS_INSTANCE: OnceLock<Metrics> = OnceLock::new();

/// Initializes on first use and returns the process-wide metrics registry.
pub fn get_metrics() -> &'static Metrics {
    METRICS_INSTANCE.get_or_init(|| {
        info!("Initializing Metrics ...");
        Metrics::new()
    })
}

#[derive(Clone)]
pub struct Metrics {
    pub registry: Registry,

    // Token fetch metrics
    pub token_fetch_requests: IntCounterVec,
    pub token_fetch_failures: IntCounterVec,
    pub token_fetch_duration: HistogramVec,
    pub retry_attempts: IntCounterVec,

    // Cache metrics
    pub token_cache_hits: IntCounterVec,
    pub token_cache_misses: IntCounterVec,
    pub token_invalidations: IntCounterVec,
    pub token_expiry_unix: IntGaugeVec,

    // Circuit breaker metrics
    pub circuit_breaker_state: IntGaugeVec,
    pub circuit_breaker_transitions: IntCounterVec,

    // Downstream metrics
    pub downstream_requests: IntCounterVec,
    pub downstream_duration: HistogramVec,

    // Config/runtime
    pub config_parse_failures: IntCounter,
    pub config_validation_errors: IntCounter,
    pub up: IntGauge,
}

impl Metrics {
    fn new() -> Self {
        let registry = Registry::new_custom(Some("tokenclient".into()), None).unwrap();

        let metrics = Self {
            // Token fetch
            token_fetch_requests: IntCounterVec::new(Opts::new("token_fetch_requests_total", "Token pipeline executions by provider"), &["provider"]).unwrap(),
            token_fetch_failures: IntCounterVec::new(Opts::new("token_fetch_failures_total", "Token pipeline failures by reason"), &["provider", "reason"]).unwrap(),
            token_fetch_duration: HistogramVec::new(HistogramOpts::new("token_fetch_duration_seconds", "Token pipeline duration seconds").buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]), &["provider"]).unwrap(),
            retry_attempts: IntCounterVec::new(Opts::new("retry_attempts_total", "Retried attempts by logical service"), &["service"]).unwrap(),

            // Cache
            token_cache_hits: IntCounterVec::new(Opts::new("token_cache_hits_total", "Tokens served from cache"), &["provider"]).unwrap(),
            token_cache_misses: IntCounterVec::new(Opts::new("token_cache_misses_total", "Token requests that needed a refresh"), &["provider"]).unwrap(),
            token_invalidations: IntCounterVec::new(Opts::new("token_invalidations_total", "Explicit token invalidations"), &["provider"]).unwrap(),
            token_expiry_unix: IntGaugeVec::new(Opts::new("token_expiry_unix_seconds", "Cached token expiry timestamp"), &["provider"]).unwrap(),

            // Circuit breaker
            circuit_breaker_state: IntGaugeVec::new(Opts::new("circuit_breaker_state", "0 closed, 1 open, 2 half-open"), &["name"]).unwrap(),
            circuit_breaker_transitions: IntCounterVec::new(Opts::new("circuit_breaker_transitions_total", "Circuit breaker state transitions"), &["name", "from", "to"]).unwrap(),

            // Downstream
            downstream_requests: IntCounterVec::new(Opts::new("downstream_requests_total", "Downstream requests by service and status"), &["service", "status"]).unwrap(),
            downstream_duration: HistogramVec::new(HistogramOpts::new("downstream_request_duration_seconds", "Downstream request duration").buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]), &["service"]).unwrap(),

            // Config/runtime
            config_parse_failures: IntCounter::new("config_parse_failures_total", "Config files that failed to parse").unwrap(),
            config_validation_errors: IntCounter::new("config_validation_errors_total", "Validation errors during startup").unwrap(),
            up: IntGauge::new("up", "1 if service is healthy").unwrap(),

            registry,
        };

        // Register all metrics in the registry
        let reg = &metrics.registry;
        reg.register(Box::new(metrics.token_fetch_requests.clone())).unwrap();
        reg.register(Box::new(metrics.token_fetch_failures.clone())).unwrap();
        reg.register(Box::new(metrics.token_fetch_duration.clone())).unwrap();
        reg.register(Box::new(metrics.retry_attempts.clone())).unwrap();
        reg.register(Box::new(metrics.token_cache_hits.clone())).unwrap();
        reg.register(Box::new(metrics.token_cache_misses.clone())).unwrap();
        reg.register(Box::new(metrics.token_invalidations.clone())).unwrap();
        reg.register(Box::new(metrics.token_expiry_unix.clone())).unwrap();
        reg.register(Box::new(metrics.circuit_breaker_state.clone())).unwrap();
        reg.register(Box::new(metrics.circuit_breaker_transitions.clone())).unwrap();
        reg.register(Box::new(metrics.downstream_requests.clone())).unwrap();
        reg.register(Box::new(metrics.downstream_duration.clone())).unwrap();
        reg.register(Box::new(metrics.config_parse_failures.clone())).unwrap();
        reg.register(Box::new(metrics.config_validation_errors.clone())).unwrap();
        reg.register(Box::new(metrics.up.clone())).unwrap();

        metrics
    }
}
