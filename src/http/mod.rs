//! HTTP host for the query_range pipeline.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, tracing, timeout)
//!     → org_id.rs (X-Scope-OrgID → Context with deadline)
//!     → tripperware-wrapped transport (query_range pipeline or passthrough)
//!     → downstream.rs (hyper client to the query backend)
//!     → Send to client
//! ```

pub mod downstream;
pub mod org_id;
pub mod server;

pub use downstream::HttpDownstream;
pub use server::HttpServer;
