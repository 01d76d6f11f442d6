//! Result cache stores.
//!
//! # Data Flow
//! ```text
//! [query_range.results_cache.cache] config
//!     → new_cache (pick backend, validate settings)
//!     → Arc<dyn Cache> shared by every pipeline invocation
//!     → stop() once the server has drained
//! ```
//!
//! # Design Decisions
//! - Values are opaque bytes; encoding is the caller's concern
//! - Stores synchronize internally and are safe for concurrent use
//! - Construction is fallible so misconfiguration fails pipeline assembly

pub mod fifo;

use std::sync::Arc;

use axum::body::Bytes;
use futures_util::future::BoxFuture;

use crate::config::CacheConfig;
use crate::error::{Error, Result};

pub use fifo::FifoCache;

/// A shared key/value store for encoded results.
pub trait Cache: Send + Sync {
    fn fetch<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Option<Bytes>>;

    fn store<'a>(&'a self, key: &'a str, value: Bytes) -> BoxFuture<'a, ()>;

    /// Release everything the store holds. Called once at shutdown.
    fn stop(&self);
}

/// Build the store described by `config`.
pub fn new_cache(config: &CacheConfig) -> Result<Arc<dyn Cache>> {
    match config.backend.as_str() {
        "fifo" => {
            if config.fifo.max_size_items == 0 {
                return Err(Error::CacheConfig(
                    "fifo.max_size_items must be greater than zero".to_string(),
                ));
            }
            tracing::info!(
                max_size_items = config.fifo.max_size_items,
                validity = ?config.fifo.validity,
                "Using in-process FIFO results cache"
            );
            Ok(Arc::new(FifoCache::new(
                config.fifo.max_size_items,
                config.fifo.validity,
            )))
        }
        other => Err(Error::CacheConfig(format!(
            "unknown cache backend {:?}",
            other
        ))),
    }
}
