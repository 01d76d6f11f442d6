//! Splits a query into sub-queries aligned to a fixed interval.
//!
//! # Splitting
//! ```text
//! |-------- interval --------|-------- interval --------|
//!      start ●──────────────●  ●──────────────────────● end
//!                     boundary - k*step   boundary + (step - r)
//! ```
//! Each sub-query ends on the last step before an interval boundary and
//! the next one starts exactly one step later, so no point is evaluated
//! twice and every point stays a whole number of steps from `start`.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::stream::{self, StreamExt, TryStreamExt};

use crate::error::Result;
use crate::observability::metrics;
use crate::queryrange::codec::Codec;
use crate::queryrange::context::Context;
use crate::queryrange::handler::{Handler, Middleware};
use crate::queryrange::limits::Limits;
use crate::queryrange::model::{QueryRangeRequest, QueryRangeResponse};

pub struct SplitByIntervalMiddleware {
    interval: Duration,
    limits: Arc<dyn Limits>,
    codec: Arc<dyn Codec>,
}

impl SplitByIntervalMiddleware {
    pub fn new(interval: Duration, limits: Arc<dyn Limits>, codec: Arc<dyn Codec>) -> Self {
        Self {
            interval,
            limits,
            codec,
        }
    }
}

impl Middleware for SplitByIntervalMiddleware {
    fn wrap(&self, next: Arc<dyn Handler>) -> Arc<dyn Handler> {
        Arc::new(SplitByInterval {
            interval_ms: self.interval.as_millis() as i64,
            limits: self.limits.clone(),
            codec: self.codec.clone(),
            next,
        })
    }
}

struct SplitByInterval {
    interval_ms: i64,
    limits: Arc<dyn Limits>,
    codec: Arc<dyn Codec>,
    next: Arc<dyn Handler>,
}

impl Handler for SplitByInterval {
    fn handle(
        &self,
        ctx: Context,
        req: QueryRangeRequest,
    ) -> BoxFuture<'_, Result<QueryRangeResponse>> {
        Box::pin(async move {
            let reqs = split_query(&req, self.interval_ms);
            metrics::record_split_queries(reqs.len());

            let parallelism = self
                .limits
                .max_query_parallelism(ctx.org_id().unwrap_or_default())
                .max(1);

            tracing::debug!(
                query = %req.query,
                splits = reqs.len(),
                parallelism,
                "Split query by interval"
            );

            let responses: Vec<QueryRangeResponse> = stream::iter(reqs)
                .map(|sub| self.next.handle(ctx.clone(), sub))
                .buffered(parallelism)
                .try_collect()
                .await?;

            self.codec.merge_responses(responses)
        })
    }
}

/// Split `req` at interval boundaries. A single-point query is returned as is.
pub fn split_query(req: &QueryRangeRequest, interval_ms: i64) -> Vec<QueryRangeRequest> {
    if req.start == req.end || interval_ms <= 0 || req.step <= 0 {
        return vec![req.clone()];
    }

    let mut reqs = Vec::new();
    let mut start = req.start;
    while start < req.end {
        // No representable boundary left: the rest of the range is one query.
        let end = next_interval_boundary(start, req.step, interval_ms)
            .filter(|boundary| {
                boundary
                    .checked_add(req.step)
                    .is_some_and(|next| next < req.end)
            })
            .unwrap_or(req.end);
        reqs.push(req.with_start_end(start, end));
        match end.checked_add(req.step) {
            Some(next) => start = next,
            None => break,
        }
    }
    reqs
}

/// Last timestamp before the interval boundary following `t` that is a
/// whole number of steps away from `t`. `None` when that boundary is past
/// the end of the `i64` range.
fn next_interval_boundary(t: i64, step: i64, interval_ms: i64) -> Option<i64> {
    let start_of_next = (t / interval_ms + 1).checked_mul(interval_ms)?;
    let target = start_of_next - (start_of_next.checked_sub(t)? % step);
    if target == start_of_next {
        target.checked_sub(step)
    } else {
        Some(target)
    }
}
