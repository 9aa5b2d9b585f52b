//! Shared constants and defaults

/// Token is treated as expired this many seconds before its real expiry.
pub const DEFAULT_SAFETY_MARGIN_SECS: u64 = 30;
pub const MAX_SAFETY_MARGIN_SECS: u64 = 60 * 60 * 24;
/// Lifetime assumed when the token endpoint omits `expires_in`.
pub const DEFAULT_EXPIRES_IN_SECS: u64 = 300;
pub const DEFAULT_GRANT_TYPE: &str = "client_credentials";

// Circuit breaker
pub const DEFAULT_FAILURE_RATE_THRESHOLD: f64 = 50.0;
pub const DEFAULT_SLIDING_WINDOW_SIZE: usize = 10;
pub const DEFAULT_MINIMUM_CALLS: usize = 5;
pub const DEFAULT_WAIT_DURATION_OPEN_MS: u64 = 10_000;
pub const DEFAULT_PERMITTED_CALLS_IN_HALF_OPEN: usize = 3;

// Retry
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 200;
pub const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 2_000;
pub const DEFAULT_RETRY_MULTIPLIER: f64 = 2.0;
pub const MAX_RETRY_MULTIPLIER: f64 = 10.0;

// Time limiter / worker pool
pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_WORKER_POOL_SIZE: usize = 10;

pub const HEALTH_PATH: &str = "/health";
pub const DEFAULT_METRICS_PATH: &str = "/metrics";
