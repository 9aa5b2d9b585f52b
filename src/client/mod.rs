//! Downstream clients
//!
//! Bearer-authenticated service clients and the composition root that wires
//! providers, pipelines and clients together from configuration.

pub mod error;
pub mod service_client;
pub mod token_clients;

pub use error::ClientError;
pub use service_client::ServiceClient;
pub use token_clients::TokenClients;
