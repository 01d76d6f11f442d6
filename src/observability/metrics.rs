//! Metrics collection and exposition.
//!
//! # Metrics
//! - `query_frontend_requests_total` (counter): requests by method, status, route
//! - `query_frontend_request_duration_seconds` (histogram): end-to-end latency
//! - `query_frontend_stage_duration_seconds` (histogram): time spent in and below a stage
//! - `query_frontend_split_queries_total` (counter): sub-queries produced by splitting
//! - `query_frontend_retries_total` (counter): extra attempts made by the retry stage
//! - `query_frontend_results_cache_lookups_total` (counter): lookups by outcome

use std::net::SocketAddr;
use std::time::Instant;

use metrics::Label;
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and serve `/metrics` on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_request(method: &str, status: u16, route: &str, start: Instant) {
    let labels = vec![
        Label::new("method", method.to_string()),
        Label::new("status", status.to_string()),
        Label::new("route", route.to_string()),
    ];
    metrics::counter!("query_frontend_requests_total", labels.clone()).increment(1);
    metrics::histogram!("query_frontend_request_duration_seconds", labels)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_stage(stage: &'static str, status_code: u16, start: Instant) {
    metrics::histogram!(
        "query_frontend_stage_duration_seconds",
        "stage" => stage,
        "status_code" => status_code.to_string()
    )
    .record(start.elapsed().as_secs_f64());
}

pub fn record_split_queries(count: usize) {
    metrics::counter!("query_frontend_split_queries_total").increment(count as u64);
}

pub fn record_retries(retries: u32) {
    if retries > 0 {
        metrics::counter!("query_frontend_retries_total").increment(u64::from(retries));
    }
}

pub fn record_cache_lookup(hit: bool) {
    let outcome = if hit { "hit" } else { "miss" };
    metrics::counter!("query_frontend_results_cache_lookups_total", "outcome" => outcome).increment(1);
}
