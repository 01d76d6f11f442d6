//! Caches complete query results per tenant.
//!
//! Lookups are exact: a cached entry only answers a request with the same
//! tenant, query, range and step. Results that may still change (the range
//! ends inside the tenant's freshness window) are never stored or served.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::body::Bytes;
use futures_util::future::BoxFuture;

use crate::cache::{new_cache, Cache};
use crate::config::ResultsCacheConfig;
use crate::error::Result;
use crate::observability::metrics;
use crate::queryrange::context::Context;
use crate::queryrange::handler::{Handler, Middleware};
use crate::queryrange::limits::Limits;
use crate::queryrange::model::{QueryRangeRequest, QueryRangeResponse};

/// Derives the cache key for a request.
pub trait Extractor: Send + Sync {
    fn cache_key(&self, org_id: &str, req: &QueryRangeRequest) -> String;
}

/// Keys on tenant, query, range and step.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultExtractor;

impl Extractor for DefaultExtractor {
    fn cache_key(&self, org_id: &str, req: &QueryRangeRequest) -> String {
        format!("{}:{}:{}:{}:{}", org_id, req.query, req.start, req.end, req.step)
    }
}

pub struct ResultsCacheMiddleware {
    cache: Arc<dyn Cache>,
    limits: Arc<dyn Limits>,
    extractor: Arc<dyn Extractor>,
}

impl ResultsCacheMiddleware {
    /// Build the middleware and the store behind it. The store is returned
    /// as well so the owner can stop it at shutdown.
    pub fn new(
        config: &ResultsCacheConfig,
        limits: Arc<dyn Limits>,
        extractor: Arc<dyn Extractor>,
    ) -> Result<(Self, Arc<dyn Cache>)> {
        let cache = new_cache(&config.cache)?;
        Ok((Self::with_cache(cache.clone(), limits, extractor), cache))
    }

    pub fn with_cache(
        cache: Arc<dyn Cache>,
        limits: Arc<dyn Limits>,
        extractor: Arc<dyn Extractor>,
    ) -> Self {
        Self {
            cache,
            limits,
            extractor,
        }
    }
}

impl Middleware for ResultsCacheMiddleware {
    fn wrap(&self, next: Arc<dyn Handler>) -> Arc<dyn Handler> {
        Arc::new(ResultsCache {
            cache: self.cache.clone(),
            limits: self.limits.clone(),
            extractor: self.extractor.clone(),
            next,
        })
    }
}

struct ResultsCache {
    cache: Arc<dyn Cache>,
    limits: Arc<dyn Limits>,
    extractor: Arc<dyn Extractor>,
    next: Arc<dyn Handler>,
}

impl ResultsCache {
    fn is_cacheable(&self, org_id: &str, req: &QueryRangeRequest) -> bool {
        let freshness = self.limits.max_cache_freshness(org_id).as_millis() as i64;
        req.end <= now_ms().saturating_sub(freshness)
    }
}

impl Handler for ResultsCache {
    fn handle(
        &self,
        ctx: Context,
        req: QueryRangeRequest,
    ) -> BoxFuture<'_, Result<QueryRangeResponse>> {
        Box::pin(async move {
            let key = ctx
                .org_id()
                .filter(|org_id| self.is_cacheable(org_id, &req))
                .map(|org_id| self.extractor.cache_key(org_id, &req));
            let Some(key) = key else {
                return self.next.handle(ctx, req).await;
            };

            if let Some(bytes) = self.cache.fetch(&key).await {
                match serde_json::from_slice::<QueryRangeResponse>(&bytes) {
                    Ok(resp) => {
                        metrics::record_cache_lookup(true);
                        tracing::debug!(key = %key, "Results cache hit");
                        return Ok(resp);
                    }
                    Err(err) => {
                        tracing::warn!(key = %key, error = %err, "Discarding undecodable cache entry");
                    }
                }
            }
            metrics::record_cache_lookup(false);

            let resp = self.next.handle(ctx, req).await?;
            if resp.is_success() {
                match serde_json::to_vec(&resp) {
                    Ok(encoded) => self.cache.store(&key, Bytes::from(encoded)).await,
                    Err(err) => {
                        tracing::warn!(key = %key, error = %err, "Failed to encode result for caching")
                    }
                }
            }
            Ok(resp)
        })
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}
