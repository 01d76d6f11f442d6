//! Query range middleware engine.
//!
//! # Data Flow
//! ```text
//! Request<Body>
//!     → roundtrip.rs (path filter, decode)
//!     → limits.rs → step_align.rs → split_by_interval.rs
//!         → results_cache.rs → retry.rs
//!     → roundtrip.rs terminus (encode, X-Scope-OrgID, forward, decode)
//!     → unwind → encode → Response<Body>
//! ```
//!
//! Each stage is a [`Middleware`]; `instrumentation.rs` wraps every optional
//! stage in a span and a timing histogram.

pub mod codec;
pub mod context;
pub mod handler;
pub mod instrumentation;
pub mod limits;
pub mod model;
pub mod results_cache;
pub mod retry;
pub mod roundtrip;
pub mod split_by_interval;
pub mod step_align;

pub use codec::{Codec, PrometheusCodec};
pub use context::{inject_org_id, Context, ORG_ID_HEADER};
pub use handler::{compose, merge_middlewares, Handler, HandlerFn, Middleware, MiddlewareFn};
pub use limits::{Limits, LimitsMiddleware, StaticLimits};
pub use model::{QueryRangeRequest, QueryRangeResponse, Sample, SampleStream};
pub use results_cache::{DefaultExtractor, Extractor, ResultsCacheMiddleware};
pub use retry::RetryMiddleware;
pub use roundtrip::{
    new_tripperware, tripperware, Pipeline, QueryRangeRoundTripper, RoundTrip, RoundTripFn,
    Tripperware, QUERY_RANGE_SUFFIX,
};
pub use split_by_interval::SplitByIntervalMiddleware;
pub use step_align::StepAlignMiddleware;
