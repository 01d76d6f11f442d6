//! Query frontend for Prometheus-compatible range queries.
//!
//! Range queries (`.../query_range`) run through a configurable middleware
//! pipeline (limits, step alignment, splitting, results caching, retries)
//! before reaching the downstream query backend. Everything else is proxied
//! unchanged.

pub mod cache;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod queryrange;

pub use config::schema::FrontendConfig;
pub use error::{Error, Result};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
