//! Token sources
//!
//! The token endpoint request spec and the fetcher that executes it.

pub mod fetch;
pub mod request;

pub use fetch::{FetchToken, HttpTokenFetcher, TokenGrant};
pub use request::TokenRequestSpec;
