//! Query frontend binary.
//!
//! ```text
//!                 ┌───────────────────────────── query-frontend ─────────────────────────────┐
//!  Client ───────▶│ axum server → org id → query_range pipeline ─────────────▶ hyper client │──▶ Query
//!                 │                         limits → align → split → cache → retry          │    backend
//!                 │                 other paths ─────────────────────────────▶               │
//!                 └──────────────────────────────────────────────────────────────────────────┘
//! ```

use std::fs;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use query_frontend::config::flags::Cli;
use query_frontend::config::loader::{parse_config, ConfigError};
use query_frontend::config::validation::validate_config;
use query_frontend::lifecycle::signals::spawn_signal_handler;
use query_frontend::observability::{logging, metrics};
use query_frontend::{FrontendConfig, HttpServer, Shutdown};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => {
            let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
            parse_config(&content)?
        }
        None => FrontendConfig::default(),
    };
    cli.apply(&mut config);
    validate_config(&config).map_err(ConfigError::Validation)?;

    logging::init_tracing(&config.observability.log_level, config.observability.log_json);

    tracing::info!("query-frontend v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        downstream = %config.downstream.url,
        split_queries_by_interval = ?config.query_range.split_queries_by_interval,
        align_queries_with_step = config.query_range.align_queries_with_step,
        cache_results = config.query_range.cache_results,
        max_retries = config.query_range.max_retries,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        let addr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let server = HttpServer::new(config)?;

    let shutdown = Arc::new(Shutdown::new());
    let stopped = shutdown.wait();
    spawn_signal_handler(shutdown);

    server.run(listener, stopped).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
