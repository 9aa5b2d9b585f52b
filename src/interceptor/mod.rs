//! Request interceptor
//!
//! Bearer token injection for outgoing downstream requests.

pub mod bearer;

pub use bearer::{BearerInterceptor, Next};
