//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the frontend.
//! All types derive Serde traits for deserialization from config files.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Fixed interval forced by the deprecated `split_queries_by_day` flag.
pub const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Root configuration for the query frontend.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct FrontendConfig {
    /// Listener configuration (bind address, connection cap).
    pub listener: ListenerConfig,

    /// The query backend every request is eventually forwarded to.
    pub downstream: DownstreamConfig,

    /// Shape of the query_range middleware pipeline.
    pub query_range: QueryRangeConfig,

    /// Per-tenant limits.
    pub limits: LimitsConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Downstream query backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DownstreamConfig {
    /// Base URL of the backend (e.g., "http://querier:9090").
    pub url: String,

    /// Maximum response body accepted from the backend, in bytes.
    pub max_body_bytes: usize,
}

impl Default for DownstreamConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:9090".to_string(),
            max_body_bytes: 64 * 1024 * 1024,
        }
    }
}

/// Configuration for the query_range middleware chain.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct QueryRangeConfig {
    /// Split queries by this interval and execute in parallel; 0 disables.
    /// Use a multiple of 24 hours to line up with storage bucketing.
    #[serde(with = "humantime_serde")]
    pub split_queries_by_interval: Duration,

    /// Deprecated: split queries by day. Forces the interval to 24h.
    pub split_queries_by_day: bool,

    /// Mutate incoming queries to align their start and end with their step.
    pub align_queries_with_step: bool,

    /// Cache query results.
    pub cache_results: bool,

    /// Maximum number of attempts for a single request; beyond this the
    /// downstream error is returned. 0 disables the retry stage.
    pub max_retries: u32,

    /// Base delay between attempts in milliseconds (0 = retry immediately).
    pub retry_base_delay_ms: u64,

    /// Upper bound on the delay between attempts in milliseconds.
    pub retry_max_delay_ms: u64,

    /// Results cache settings, handed to cache construction as-is.
    pub results_cache: ResultsCacheConfig,
}

impl Default for QueryRangeConfig {
    fn default() -> Self {
        Self {
            split_queries_by_interval: Duration::ZERO,
            split_queries_by_day: false,
            align_queries_with_step: false,
            cache_results: false,
            max_retries: 5,
            retry_base_delay_ms: 0,
            retry_max_delay_ms: 1000,
            results_cache: ResultsCacheConfig::default(),
        }
    }
}

/// Results cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ResultsCacheConfig {
    /// Backing store.
    pub cache: CacheConfig,
}

/// Cache store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Store implementation ("fifo").
    pub backend: String,

    /// In-process FIFO cache settings.
    pub fifo: FifoCacheConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: "fifo".to_string(),
            fifo: FifoCacheConfig::default(),
        }
    }
}

/// In-process FIFO cache settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FifoCacheConfig {
    /// Maximum number of entries before the oldest is evicted.
    pub max_size_items: usize,

    /// How long an entry stays valid; 0 keeps entries until evicted.
    #[serde(with = "humantime_serde")]
    pub validity: Duration,
}

impl Default for FifoCacheConfig {
    fn default() -> Self {
        Self {
            max_size_items: 1024,
            validity: Duration::ZERO,
        }
    }
}

/// Per-tenant limits with optional overrides.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum length of a query_range request; 0 disables the check.
    #[serde(with = "humantime_serde")]
    pub max_query_length: Duration,

    /// Maximum number of split sub-queries in flight per request.
    pub max_query_parallelism: usize,

    /// Most recent window of results that is never cached.
    #[serde(with = "humantime_serde")]
    pub max_cache_freshness: Duration,

    /// Tenant id -> overrides.
    pub overrides: HashMap<String, TenantLimitsConfig>,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_query_length: Duration::ZERO,
            max_query_parallelism: 14,
            max_cache_freshness: Duration::from_secs(60),
            overrides: HashMap::new(),
        }
    }
}

/// Overrides for a single tenant. Unset fields fall back to the defaults.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct TenantLimitsConfig {
    #[serde(with = "humantime_serde")]
    pub max_query_length: Option<Duration>,

    pub max_query_parallelism: Option<usize>,

    #[serde(with = "humantime_serde")]
    pub max_cache_freshness: Option<Duration>,
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 120 }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON log lines instead of text.
    pub log_json: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_json: false,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9091".to_string(),
        }
    }
}
