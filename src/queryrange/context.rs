//! Execution context carried through the pipeline.
//!
//! The context holds the tenant identity and an optional deadline. It is
//! cheap to clone and is passed by value to every handler.

use std::future::Future;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{HeaderValue, Request};
use tokio::time::Instant;

use crate::error::{Error, Result};

/// Header carrying the tenant identity on every downstream call.
pub const ORG_ID_HEADER: &str = "X-Scope-OrgID";

/// Per-request execution context.
#[derive(Debug, Clone, Default)]
pub struct Context {
    org_id: Option<Arc<str>>,
    deadline: Option<Instant>,
}

impl Context {
    /// A context with no identity and no deadline.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_org_id(mut self, org_id: impl Into<Arc<str>>) -> Self {
        self.org_id = Some(org_id.into());
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// The tenant this request runs on behalf of.
    pub fn org_id(&self) -> Option<&str> {
        self.org_id.as_deref()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns true once the deadline has passed.
    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Context attached to a transport request, or an empty one.
    pub fn from_request(req: &Request<Body>) -> Self {
        req.extensions().get::<Context>().cloned().unwrap_or_default()
    }

    /// Drive `fut` to completion, bounded by the deadline if there is one.
    pub async fn run<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match self.deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, fut)
                .await
                .map_err(|_| Error::DeadlineExceeded)?,
            None => fut.await,
        }
    }
}

/// Write the context's tenant into `req` as [`ORG_ID_HEADER`].
///
/// Fails with [`Error::MissingOrgId`] when the context carries no tenant.
pub fn inject_org_id(ctx: &Context, req: &mut Request<Body>) -> Result<()> {
    let org_id = ctx.org_id().ok_or(Error::MissingOrgId)?;
    let value = HeaderValue::from_str(org_id)
        .map_err(|_| Error::bad_request(format!("invalid org id {:?}", org_id)))?;
    req.headers_mut().insert(ORG_ID_HEADER, value);
    Ok(())
}
