//! Per-stage spans and timings.

use std::sync::Arc;
use std::time::Instant;

use futures_util::future::BoxFuture;
use tracing::Instrument;

use crate::error::Result;
use crate::observability::metrics;
use crate::queryrange::context::Context;
use crate::queryrange::handler::{Handler, Middleware, MiddlewareFn};
use crate::queryrange::model::{QueryRangeRequest, QueryRangeResponse};

/// Wraps the rest of the pipeline in a span named after `stage` and records
/// how long it took.
pub fn instrument_middleware(stage: &'static str) -> Arc<dyn Middleware> {
    Arc::new(MiddlewareFn::new(move |next| {
        Arc::new(Instrumented { stage, next }) as Arc<dyn Handler>
    }))
}

struct Instrumented {
    stage: &'static str,
    next: Arc<dyn Handler>,
}

impl Handler for Instrumented {
    fn handle(
        &self,
        ctx: Context,
        req: QueryRangeRequest,
    ) -> BoxFuture<'_, Result<QueryRangeResponse>> {
        let span = tracing::debug_span!("query_range_stage", stage = self.stage);
        Box::pin(
            async move {
                let start = Instant::now();
                let result = self.next.handle(ctx, req).await;
                let status = match &result {
                    Ok(_) => 200,
                    Err(err) => err.status_code().as_u16(),
                };
                metrics::record_stage(self.stage, status, start);
                result
            }
            .instrument(span),
        )
    }
}

/// Attach the request's parameters to the current span.
pub fn log_to_span(req: &QueryRangeRequest) {
    tracing::debug!(
        query = %req.query,
        start = req.start,
        end = req.end,
        step = req.step,
        "query_range request"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::error::Error;
    use crate::queryrange::handler::HandlerFn;

    #[tokio::test]
    async fn test_instrumentation_is_transparent() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let next: Arc<dyn Handler> = Arc::new(HandlerFn::new(move |_ctx, req: QueryRangeRequest| {
            counter.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                if req.query == "bad" {
                    Err(Error::bad_request("parse error"))
                } else {
                    Ok(QueryRangeResponse::success(vec![]))
                }
            }) as BoxFuture<'static, _>
        }));
        let handler = instrument_middleware("retry").wrap(next);

        let mut req = QueryRangeRequest {
            path: "/api/v1/query_range".to_string(),
            start: 0,
            end: 60_000,
            step: 15_000,
            timeout: None,
            query: "up".to_string(),
        };
        log_to_span(&req);
        assert!(handler.handle(Context::new(), req.clone()).await.unwrap().is_success());

        req.query = "bad".to_string();
        let err = handler.handle(Context::new(), req).await.unwrap_err();
        assert_eq!(err.to_string(), "parse error");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
