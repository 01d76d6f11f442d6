//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Server and pipeline stages produce:
//!     → logging.rs (structured log events and spans)
//!     → metrics.rs (counters and histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout, pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Request ID flows through the server span and every stage span
//! - Metric updates are no-ops until a recorder is installed

pub mod logging;
pub mod metrics;
