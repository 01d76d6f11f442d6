//! Tenant identification.
//!
//! Reads `X-Scope-OrgID` into a [`Context`] that travels with the request
//! as an extension. Requests without a tenant are rejected with 401.
//!
//! The context deadline ends slightly before the server's request timeout,
//! so a slow backend surfaces as 504 from the pipeline rather than a bare
//! 408 from the timeout layer.

use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tokio::time::Instant;

use crate::queryrange::{Context, ORG_ID_HEADER};

/// Upper bound on how far the context deadline precedes the request timeout.
const MAX_DEADLINE_MARGIN: Duration = Duration::from_secs(1);

/// Time the pipeline gets out of `request_timeout`: a tenth less, at most
/// [`MAX_DEADLINE_MARGIN`] less.
pub fn context_budget(request_timeout: Duration) -> Duration {
    request_timeout.saturating_sub((request_timeout / 10).min(MAX_DEADLINE_MARGIN))
}

pub async fn org_id_middleware(
    State(request_timeout): State<Duration>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let org_id = req
        .headers()
        .get(ORG_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string);

    let Some(org_id) = org_id else {
        tracing::debug!(path = %req.uri().path(), "Rejecting request without org id");
        return (StatusCode::UNAUTHORIZED, "no org id").into_response();
    };

    let ctx = Context::new()
        .with_org_id(org_id)
        .with_deadline(Instant::now() + context_budget(request_timeout));
    req.extensions_mut().insert(ctx);
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_budget_ends_before_timeout() {
        assert_eq!(context_budget(Duration::from_secs(1)), Duration::from_millis(900));
        assert_eq!(context_budget(Duration::from_secs(120)), Duration::from_secs(119));
        assert_eq!(context_budget(Duration::ZERO), Duration::ZERO);
        for secs in [1, 5, 30, 120, 3600] {
            let timeout = Duration::from_secs(secs);
            assert!(context_budget(timeout) < timeout);
        }
    }
}
