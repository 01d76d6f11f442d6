//! Retries failed requests.
//!
//! # Design Decisions
//! - `max_retries` bounds the total number of attempts
//! - 5xx replies and errors without an HTTP status are retried; 4xx are final
//! - The last error is returned once attempts are exhausted or the deadline passes
//! - Jittered exponential backoff between attempts, disabled with a zero base delay

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use rand::Rng;

use crate::error::Result;
use crate::observability::metrics;
use crate::queryrange::context::Context;
use crate::queryrange::handler::{Handler, Middleware};
use crate::queryrange::model::{QueryRangeRequest, QueryRangeResponse};

#[derive(Debug, Clone, Copy)]
pub struct RetryMiddleware {
    max_retries: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
}

impl RetryMiddleware {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay_ms: 0,
            max_delay_ms: 0,
        }
    }

    pub fn with_backoff(mut self, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        self.base_delay_ms = base_delay_ms;
        self.max_delay_ms = max_delay_ms;
        self
    }
}

impl Middleware for RetryMiddleware {
    fn wrap(&self, next: Arc<dyn Handler>) -> Arc<dyn Handler> {
        Arc::new(Retry {
            policy: *self,
            next,
        })
    }
}

struct Retry {
    policy: RetryMiddleware,
    next: Arc<dyn Handler>,
}

impl Handler for Retry {
    fn handle(
        &self,
        ctx: Context,
        req: QueryRangeRequest,
    ) -> BoxFuture<'_, Result<QueryRangeResponse>> {
        Box::pin(async move {
            let attempts = self.policy.max_retries.max(1);
            let mut attempt = 1;
            loop {
                match self.next.handle(ctx.clone(), req.clone()).await {
                    Ok(resp) => {
                        metrics::record_retries(attempt - 1);
                        return Ok(resp);
                    }
                    Err(err) if !err.is_retryable() || attempt >= attempts => {
                        metrics::record_retries(attempt - 1);
                        return Err(err);
                    }
                    Err(err) => {
                        // Out of time: report the downstream failure.
                        if ctx.is_expired() {
                            metrics::record_retries(attempt - 1);
                            return Err(err);
                        }

                        tracing::warn!(
                            attempt,
                            max_retries = attempts,
                            query = %req.query,
                            error = %err,
                            "Retrying query range request"
                        );

                        let delay = calculate_backoff(
                            attempt,
                            self.policy.base_delay_ms,
                            self.policy.max_delay_ms,
                        );
                        if !delay.is_zero() {
                            let slept = ctx
                                .run(async {
                                    tokio::time::sleep(delay).await;
                                    Ok(())
                                })
                                .await;
                            if slept.is_err() {
                                metrics::record_retries(attempt - 1);
                                return Err(err);
                            }
                        }
                    }
                }
                attempt += 1;
            }
        })
    }
}

/// Calculate exponential backoff delay with jitter.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 || base_ms == 0 {
        return Duration::ZERO;
    }

    let exponential_base = 2u64.saturating_pow(attempt - 1);
    let delay_ms = base_ms.saturating_mul(exponential_base);
    let capped_delay = delay_ms.min(max_ms);

    // Up to 10% extra.
    let jitter_range = capped_delay / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped_delay + jitter)
}
