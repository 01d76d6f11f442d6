//! Handler and middleware abstractions and the composer.
//!
//! A [`Handler`] turns a structured request into a structured response.
//! A [`Middleware`] wraps one handler to produce another. Both have a
//! closure adapter ([`HandlerFn`], [`MiddlewareFn`]) so plain functions
//! participate without a dedicated type.
//!
//! # Ordering
//! ```text
//! compose([A, B, C], T) == A.wrap(B.wrap(C.wrap(T)))
//!
//! A.pre → B.pre → C.pre → T → C.post → B.post → A.post
//! ```

use std::fmt;
use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::error::Result;
use crate::queryrange::context::Context;
use crate::queryrange::model::{QueryRangeRequest, QueryRangeResponse};

/// Processes a single query range request.
pub trait Handler: Send + Sync {
    fn handle(&self, ctx: Context, req: QueryRangeRequest)
        -> BoxFuture<'_, Result<QueryRangeResponse>>;
}

/// A higher order [`Handler`].
pub trait Middleware: Send + Sync {
    fn wrap(&self, next: Arc<dyn Handler>) -> Arc<dyn Handler>;
}

/// Adapts a closure into a [`Handler`].
pub struct HandlerFn<F>(F);

impl<F> HandlerFn<F>
where
    F: Fn(Context, QueryRangeRequest) -> BoxFuture<'static, Result<QueryRangeResponse>>
        + Send
        + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> Handler for HandlerFn<F>
where
    F: Fn(Context, QueryRangeRequest) -> BoxFuture<'static, Result<QueryRangeResponse>>
        + Send
        + Sync,
{
    fn handle(
        &self,
        ctx: Context,
        req: QueryRangeRequest,
    ) -> BoxFuture<'_, Result<QueryRangeResponse>> {
        (self.0)(ctx, req)
    }
}

impl<F> fmt::Debug for HandlerFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("HandlerFn")
    }
}

/// Adapts a closure into a [`Middleware`].
pub struct MiddlewareFn<F>(F);

impl<F> MiddlewareFn<F>
where
    F: Fn(Arc<dyn Handler>) -> Arc<dyn Handler> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> Middleware for MiddlewareFn<F>
where
    F: Fn(Arc<dyn Handler>) -> Arc<dyn Handler> + Send + Sync,
{
    fn wrap(&self, next: Arc<dyn Handler>) -> Arc<dyn Handler> {
        (self.0)(next)
    }
}

impl<F> fmt::Debug for MiddlewareFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MiddlewareFn")
    }
}

/// Merge several middlewares into one that applies them in turn:
/// `merge(f, g, h).wrap(t) == f.wrap(g.wrap(h.wrap(t)))`.
pub fn merge_middlewares(middlewares: Vec<Arc<dyn Middleware>>) -> impl Middleware {
    MiddlewareFn::new(move |mut next: Arc<dyn Handler>| {
        for middleware in middlewares.iter().rev() {
            next = middleware.wrap(next);
        }
        next
    })
}

/// Compose `middlewares` around `terminus`. The first middleware is the
/// outermost; an empty list yields the terminus itself.
pub fn compose(middlewares: &[Arc<dyn Middleware>], terminus: Arc<dyn Handler>) -> Arc<dyn Handler> {
    merge_middlewares(middlewares.to_vec()).wrap(terminus)
}
