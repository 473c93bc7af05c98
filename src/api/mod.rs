//! HTTP API Module
//!
//! The web side of the service: the greeting route reachable through
//! resolved pseudo-TLD names, the peer registry, and monitoring
//! endpoints.

mod metrics;
mod routes;

pub use metrics::Metrics;
pub use routes::run_api_server;
