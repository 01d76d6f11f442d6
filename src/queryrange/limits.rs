//! Per-tenant limits and the middleware enforcing them.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;

use crate::config::schema::{LimitsConfig, TenantLimitsConfig};
use crate::error::{Error, Result};
use crate::queryrange::context::Context;
use crate::queryrange::handler::{Handler, Middleware};
use crate::queryrange::model::{QueryRangeRequest, QueryRangeResponse};

/// Per-tenant constraints consumed by the pipeline stages.
pub trait Limits: Send + Sync {
    /// Longest range a single query may cover; zero means unlimited.
    fn max_query_length(&self, org_id: &str) -> Duration;

    /// How many split sub-queries may run at once.
    fn max_query_parallelism(&self, org_id: &str) -> usize;

    /// Results newer than this are never cached.
    fn max_cache_freshness(&self, org_id: &str) -> Duration;
}

/// Limits read from configuration: defaults plus per-tenant overrides.
#[derive(Debug, Clone)]
pub struct StaticLimits {
    defaults: LimitsConfig,
    overrides: HashMap<String, TenantLimitsConfig>,
}

impl StaticLimits {
    pub fn new(config: LimitsConfig) -> Self {
        let mut defaults = config;
        let overrides = std::mem::take(&mut defaults.overrides);
        Self {
            defaults,
            overrides,
        }
    }

    fn tenant(&self, org_id: &str) -> Option<&TenantLimitsConfig> {
        self.overrides.get(org_id)
    }
}

impl Limits for StaticLimits {
    fn max_query_length(&self, org_id: &str) -> Duration {
        self.tenant(org_id)
            .and_then(|t| t.max_query_length)
            .unwrap_or(self.defaults.max_query_length)
    }

    fn max_query_parallelism(&self, org_id: &str) -> usize {
        self.tenant(org_id)
            .and_then(|t| t.max_query_parallelism)
            .unwrap_or(self.defaults.max_query_parallelism)
    }

    fn max_cache_freshness(&self, org_id: &str) -> Duration {
        self.tenant(org_id)
            .and_then(|t| t.max_cache_freshness)
            .unwrap_or(self.defaults.max_cache_freshness)
    }
}

/// Rejects requests without a tenant or longer than the tenant's limit.
pub struct LimitsMiddleware {
    limits: Arc<dyn Limits>,
}

impl LimitsMiddleware {
    pub fn new(limits: Arc<dyn Limits>) -> Self {
        Self { limits }
    }
}

impl Middleware for LimitsMiddleware {
    fn wrap(&self, next: Arc<dyn Handler>) -> Arc<dyn Handler> {
        Arc::new(LimitedHandler {
            limits: self.limits.clone(),
            next,
        })
    }
}

struct LimitedHandler {
    limits: Arc<dyn Limits>,
    next: Arc<dyn Handler>,
}

impl Handler for LimitedHandler {
    fn handle(
        &self,
        ctx: Context,
        req: QueryRangeRequest,
    ) -> BoxFuture<'_, Result<QueryRangeResponse>> {
        Box::pin(async move {
            let org_id = ctx.org_id().ok_or_else(|| Error::bad_request("no org id"))?;

            let max_length = self.limits.max_query_length(org_id);
            let length = req.range();
            if !max_length.is_zero() && length > max_length {
                tracing::debug!(
                    org_id,
                    length = ?length,
                    limit = ?max_length,
                    "Rejecting query over length limit"
                );
                return Err(Error::bad_request(format!(
                    "invalid query, length > limit ({} > {})",
                    humantime::format_duration(length),
                    humantime::format_duration(max_length)
                )));
            }

            self.next.handle(ctx, req).await
        })
    }
}
