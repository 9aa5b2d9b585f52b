pub mod circuit_breaker;
pub mod error;
pub mod pipeline;
pub mod policy;
pub mod registry;
pub mod retry;
pub mod time_limiter;
pub mod worker_pool;
