//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     trigger → server stops accepting → drain in-flight queries → stop results cache → exit
//! ```

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
