//! Pipeline assembly and the transport adapter that hosts it.
//!
//! # Data Flow
//! ```text
//! Request<Body>
//!     → QueryRangeRoundTripper (path ends with /query_range?)
//!         no  → next transport, untouched
//!         yes → decode → composed pipeline → encode → Response<Body>
//!                             │
//!                             ▼
//!                  Downstream (terminus)
//!                  encode → X-Scope-OrgID → next transport → decode
//! ```
//!
//! # Design Decisions
//! - Assembly is all-or-nothing: a failing stage constructor returns only the error
//! - The composed pipeline is built once per wrapped transport and shared by all calls
//! - The terminus owns each downstream response body, so it is released exactly once

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response};
use futures_util::future::BoxFuture;

use crate::cache::Cache;
use crate::config::schema::DAY;
use crate::config::QueryRangeConfig;
use crate::error::Result;
use crate::queryrange::codec::Codec;
use crate::queryrange::context::{inject_org_id, Context};
use crate::queryrange::handler::{compose, Handler, Middleware};
use crate::queryrange::instrumentation::{instrument_middleware, log_to_span};
use crate::queryrange::limits::{Limits, LimitsMiddleware};
use crate::queryrange::model::{QueryRangeRequest, QueryRangeResponse};
use crate::queryrange::results_cache::{Extractor, ResultsCacheMiddleware};
use crate::queryrange::retry::RetryMiddleware;
use crate::queryrange::split_by_interval::SplitByIntervalMiddleware;
use crate::queryrange::step_align::StepAlignMiddleware;

/// Path suffix of the requests the adapter intercepts.
pub const QUERY_RANGE_SUFFIX: &str = "/query_range";

/// Executes a transport-level request.
pub trait RoundTrip: Send + Sync {
    fn round_trip(&self, req: Request<Body>) -> BoxFuture<'_, Result<Response<Body>>>;
}

/// Adapts a closure into a [`RoundTrip`].
pub struct RoundTripFn<F>(F);

impl<F> RoundTripFn<F>
where
    F: Fn(Request<Body>) -> BoxFuture<'static, Result<Response<Body>>> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> RoundTrip for RoundTripFn<F>
where
    F: Fn(Request<Body>) -> BoxFuture<'static, Result<Response<Body>>> + Send + Sync,
{
    fn round_trip(&self, req: Request<Body>) -> BoxFuture<'_, Result<Response<Body>>> {
        (self.0)(req)
    }
}

impl<F> fmt::Debug for RoundTripFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RoundTripFn")
    }
}

/// Wraps a downstream transport in the query_range pipeline.
pub type Tripperware = Arc<dyn Fn(Arc<dyn RoundTrip>) -> Arc<dyn RoundTrip> + Send + Sync>;

/// The ordered middleware list for one configuration.
pub struct Pipeline {
    middlewares: Vec<Arc<dyn Middleware>>,
    stages: Vec<&'static str>,
    split_interval: Duration,
    cache: Option<Arc<dyn Cache>>,
    codec: Arc<dyn Codec>,
}

impl Pipeline {
    /// Assemble the stages enabled by `config`, outermost first.
    pub fn build(
        config: &QueryRangeConfig,
        limits: Arc<dyn Limits>,
        codec: Arc<dyn Codec>,
        extractor: Arc<dyn Extractor>,
    ) -> Result<Self> {
        let mut pipeline = Self {
            middlewares: Vec::new(),
            stages: Vec::new(),
            split_interval: Duration::ZERO,
            cache: None,
            codec: codec.clone(),
        };

        pipeline.push("limits", Arc::new(LimitsMiddleware::new(limits.clone())));

        if config.align_queries_with_step {
            pipeline.push_instrumented("step_align", Arc::new(StepAlignMiddleware));
        }

        // The deprecated flag wins over any explicit interval.
        let mut split_interval = config.split_queries_by_interval;
        if config.split_queries_by_day {
            split_interval = DAY;
            tracing::warn!(
                "flag querier.split-queries-by-day is deprecated, use querier.split-queries-by-interval instead"
            );
        }
        pipeline.split_interval = split_interval;

        if !split_interval.is_zero() {
            pipeline.push_instrumented(
                "split_by_interval",
                Arc::new(SplitByIntervalMiddleware::new(
                    split_interval,
                    limits.clone(),
                    codec,
                )),
            );
        }

        if config.cache_results {
            let (middleware, cache) =
                ResultsCacheMiddleware::new(&config.results_cache, limits, extractor)?;
            pipeline.push_instrumented("results_cache", Arc::new(middleware));
            pipeline.cache = Some(cache);
        }

        if config.max_retries > 0 {
            pipeline.push_instrumented(
                "retry",
                Arc::new(
                    RetryMiddleware::new(config.max_retries)
                        .with_backoff(config.retry_base_delay_ms, config.retry_max_delay_ms),
                ),
            );
        }

        tracing::debug!(stages = ?pipeline.stages, "Assembled query_range pipeline");
        Ok(pipeline)
    }

    fn push(&mut self, stage: &'static str, middleware: Arc<dyn Middleware>) {
        self.stages.push(stage);
        self.middlewares.push(middleware);
    }

    fn push_instrumented(&mut self, stage: &'static str, middleware: Arc<dyn Middleware>) {
        self.middlewares.push(instrument_middleware(stage));
        self.push(stage, middleware);
    }

    /// Names of the functional stages in order, without instrumentation.
    pub fn stage_names(&self) -> &[&'static str] {
        &self.stages
    }

    /// Every middleware in order, instrumentation included.
    pub fn middlewares(&self) -> &[Arc<dyn Middleware>] {
        &self.middlewares
    }

    /// Effective split interval; zero when splitting is disabled.
    pub fn split_interval(&self) -> Duration {
        self.split_interval
    }

    pub fn cache(&self) -> Option<Arc<dyn Cache>> {
        self.cache.clone()
    }

    pub fn into_tripperware(self) -> Tripperware {
        tripperware(self.middlewares, self.codec)
    }
}

/// Tripperware applying `middlewares`. With no middlewares the downstream
/// transport is returned unchanged.
pub fn tripperware(middlewares: Vec<Arc<dyn Middleware>>, codec: Arc<dyn Codec>) -> Tripperware {
    Arc::new(move |next: Arc<dyn RoundTrip>| {
        if middlewares.is_empty() {
            return next;
        }
        Arc::new(QueryRangeRoundTripper::new(next, codec.clone(), &middlewares)) as Arc<dyn RoundTrip>
    })
}

/// Build the query_range tripperware for `config`.
///
/// Returns the results cache store when caching is enabled; the caller
/// stops it at shutdown.
pub fn new_tripperware(
    config: &QueryRangeConfig,
    limits: Arc<dyn Limits>,
    codec: Arc<dyn Codec>,
    extractor: Arc<dyn Extractor>,
) -> Result<(Tripperware, Option<Arc<dyn Cache>>)> {
    let pipeline = Pipeline::build(config, limits, codec, extractor)?;
    let cache = pipeline.cache();
    Ok((pipeline.into_tripperware(), cache))
}

/// Routes query_range requests through the pipeline and everything else
/// straight to the next transport.
pub struct QueryRangeRoundTripper {
    next: Arc<dyn RoundTrip>,
    codec: Arc<dyn Codec>,
    handler: Arc<dyn Handler>,
}

impl QueryRangeRoundTripper {
    pub fn new(
        next: Arc<dyn RoundTrip>,
        codec: Arc<dyn Codec>,
        middlewares: &[Arc<dyn Middleware>],
    ) -> Self {
        let downstream = Arc::new(Downstream {
            next: next.clone(),
            codec: codec.clone(),
        });
        Self {
            next,
            codec,
            handler: compose(middlewares, downstream),
        }
    }
}

impl RoundTrip for QueryRangeRoundTripper {
    fn round_trip(&self, req: Request<Body>) -> BoxFuture<'_, Result<Response<Body>>> {
        Box::pin(async move {
            if !req.uri().path().ends_with(QUERY_RANGE_SUFFIX) {
                return self.next.round_trip(req).await;
            }

            let ctx = Context::from_request(&req);
            let query = self.codec.decode_request(req).await?;
            log_to_span(&query);

            let resp = self.handler.handle(ctx, query).await?;
            self.codec.encode_response(&resp)
        })
    }
}

/// Pipeline terminus: sends each structured request to the next transport.
struct Downstream {
    next: Arc<dyn RoundTrip>,
    codec: Arc<dyn Codec>,
}

impl Handler for Downstream {
    fn handle(
        &self,
        ctx: Context,
        req: QueryRangeRequest,
    ) -> BoxFuture<'_, Result<QueryRangeResponse>> {
        Box::pin(async move {
            let mut http_req = self.codec.encode_request(&req)?;
            inject_org_id(&ctx, &mut http_req)?;
            http_req.extensions_mut().insert(ctx.clone());

            let resp = ctx.run(self.next.round_trip(http_req)).await?;
            self.codec.decode_response(resp, &req).await
        })
    }
}
