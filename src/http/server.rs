//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the frontend handler
//! - Wire up middleware (tracing, request ID, timeout, org id)
//! - Assemble the query_range tripperware around the downstream transport
//! - Bind server to listener and drain on shutdown
//! - Stop the results cache once the server has stopped

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware,
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::cache::Cache;
use crate::config::FrontendConfig;
use crate::error::Result;
use crate::http::downstream::HttpDownstream;
use crate::http::org_id::org_id_middleware;
use crate::observability::metrics;
use crate::queryrange::{
    new_tripperware, DefaultExtractor, PrometheusCodec, RoundTrip, StaticLimits,
    QUERY_RANGE_SUFFIX,
};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub transport: Arc<dyn RoundTrip>,
}

/// HTTP server for the query frontend.
pub struct HttpServer {
    router: Router,
    cache: Option<Arc<dyn Cache>>,
    config: FrontendConfig,
}

impl HttpServer {
    /// Create a server forwarding to the configured downstream URL.
    pub fn new(config: FrontendConfig) -> Result<Self> {
        let downstream = Arc::new(HttpDownstream::new(&config.downstream.url)?);
        Self::with_downstream(config, downstream)
    }

    /// Create a server forwarding to an arbitrary transport.
    pub fn with_downstream(config: FrontendConfig, downstream: Arc<dyn RoundTrip>) -> Result<Self> {
        let limits = Arc::new(StaticLimits::new(config.limits.clone()));
        let codec =
            Arc::new(PrometheusCodec::new().with_max_body_bytes(config.downstream.max_body_bytes));

        let (tripperware, cache) =
            new_tripperware(&config.query_range, limits, codec, Arc::new(DefaultExtractor))?;

        let state = AppState {
            transport: tripperware(downstream),
        };

        let router = Self::build_router(&config, state);
        Ok(Self {
            router,
            cache,
            config,
        })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &FrontendConfig, state: AppState) -> Router {
        let request_timeout = Duration::from_secs(config.timeouts.request_secs);
        Router::new()
            .route("/{*path}", any(frontend_handler))
            .route("/", any(frontend_handler))
            .with_state(state)
            .layer(middleware::from_fn_with_state(request_timeout, org_id_middleware))
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::x_request_id())
                    .layer(TimeoutLayer::new(request_timeout)),
            )
    }

    /// Run the server until `shutdown` resolves, then stop the results cache.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            downstream = %self.config.downstream.url,
            "HTTP server starting"
        );

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        if let Some(cache) = &self.cache {
            cache.stop();
            tracing::info!("Results cache stopped");
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &FrontendConfig {
        &self.config
    }
}

/// Sends every request through the tripperware-wrapped transport.
async fn frontend_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start_time = Instant::now();
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let route = if path.ends_with(QUERY_RANGE_SUFFIX) {
        "query_range"
    } else {
        "passthrough"
    };

    tracing::debug!(
        request_id = %request_id,
        method = %method,
        path = %path,
        route,
        "Handling request"
    );

    match state.transport.round_trip(request).await {
        Ok(response) => {
            metrics::record_request(&method, response.status().as_u16(), route, start_time);
            response
        }
        Err(err) => {
            let status = err.status_code();
            if status.is_server_error() {
                tracing::warn!(request_id = %request_id, path = %path, error = %err, "Request failed");
            } else {
                tracing::debug!(request_id = %request_id, path = %path, error = %err, "Request rejected");
            }
            metrics::record_request(&method, status.as_u16(), route, start_time);
            err.into_response()
        }
    }
}
