//! Command-line overrides for the file configuration.
//!
//! Flag names follow the querier conventions operators already use, so
//! existing deployment manifests keep working.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser};

use crate::config::schema::FrontendConfig;

/// Query frontend command line.
#[derive(Debug, Parser)]
#[command(name = "query-frontend")]
#[command(about = "Query frontend for Prometheus-compatible range queries", long_about = None)]
pub struct Cli {
    /// Path to a TOML configuration file. Defaults are used when omitted.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Base URL of the downstream query backend.
    #[arg(long = "frontend.downstream-url")]
    pub downstream_url: Option<String>,

    /// Address the frontend listens on.
    #[arg(long = "server.http-listen-address")]
    pub bind_address: Option<String>,

    #[command(flatten)]
    pub query_range: QueryRangeArgs,
}

/// Overrides for `[query_range]`.
#[derive(Debug, Clone, Default, Args)]
pub struct QueryRangeArgs {
    /// Split queries by an interval and execute in parallel, 0 disables it.
    #[arg(long = "querier.split-queries-by-interval", value_parser = humantime::parse_duration)]
    pub split_queries_by_interval: Option<Duration>,

    /// Deprecated: split queries by day and execute in parallel.
    #[arg(long = "querier.split-queries-by-day")]
    pub split_queries_by_day: bool,

    /// Mutate incoming queries to align their start and end with their step.
    #[arg(long = "querier.align-querier-with-step")]
    pub align_queries_with_step: bool,

    /// Cache query results.
    #[arg(long = "querier.cache-results")]
    pub cache_results: bool,

    /// Maximum number of retries for a single request; beyond this, the downstream error is returned.
    #[arg(long = "querier.max-retries-per-request")]
    pub max_retries: Option<u32>,
}

impl Cli {
    /// Apply every override that was given on the command line.
    pub fn apply(&self, config: &mut FrontendConfig) {
        if let Some(url) = &self.downstream_url {
            config.downstream.url = url.clone();
        }
        if let Some(addr) = &self.bind_address {
            config.listener.bind_address = addr.clone();
        }
        self.query_range.apply(config);
    }
}

impl QueryRangeArgs {
    /// Boolean flags only ever switch a feature on.
    pub fn apply(&self, config: &mut FrontendConfig) {
        let qr = &mut config.query_range;
        if let Some(interval) = self.split_queries_by_interval {
            qr.split_queries_by_interval = interval;
        }
        qr.split_queries_by_day |= self.split_queries_by_day;
        qr.align_queries_with_step |= self.align_queries_with_step;
        qr.cache_results |= self.cache_results;
        if let Some(max_retries) = self.max_retries {
            qr.max_retries = max_retries;
        }
    }
}
