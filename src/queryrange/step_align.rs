//! Aligns query start and end to a multiple of the step.
//!
//! Aligned queries produce identical timestamps across refreshes, which is
//! what makes their results cacheable.

use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::error::Result;
use crate::queryrange::context::Context;
use crate::queryrange::handler::{Handler, Middleware};
use crate::queryrange::model::{QueryRangeRequest, QueryRangeResponse};

#[derive(Debug, Clone, Copy, Default)]
pub struct StepAlignMiddleware;

impl Middleware for StepAlignMiddleware {
    fn wrap(&self, next: Arc<dyn Handler>) -> Arc<dyn Handler> {
        Arc::new(StepAlign { next })
    }
}

struct StepAlign {
    next: Arc<dyn Handler>,
}

impl Handler for StepAlign {
    fn handle(
        &self,
        ctx: Context,
        req: QueryRangeRequest,
    ) -> BoxFuture<'_, Result<QueryRangeResponse>> {
        let req = align(req);
        self.next.handle(ctx, req)
    }
}

fn align(req: QueryRangeRequest) -> QueryRangeRequest {
    if req.step <= 0 {
        return req;
    }
    let start = (req.start / req.step) * req.step;
    let end = (req.end / req.step) * req.step;
    req.with_start_end(start, end)
}
