//! Transport to the downstream query backend.

use axum::body::Body;
use axum::http::uri::{Authority, PathAndQuery, Scheme};
use axum::http::{header, Request, Response, Uri};
use futures_util::future::BoxFuture;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};

use crate::error::{Error, Result};
use crate::queryrange::RoundTrip;

/// Forwards requests to a fixed backend over a pooled HTTP client.
///
/// The request path is kept and prefixed with the backend URL's path, so a
/// backend mounted under `/prometheus` receives `/prometheus/api/v1/...`.
#[derive(Clone)]
pub struct HttpDownstream {
    client: Client<HttpConnector, Body>,
    scheme: Scheme,
    authority: Authority,
    path_prefix: String,
}

impl HttpDownstream {
    pub fn new(url: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::internal(format!("invalid downstream url {:?}: {}", url, reason));

        let uri: Uri = url.parse().map_err(|_| invalid("not a URI"))?;
        let scheme = uri.scheme().cloned().ok_or_else(|| invalid("missing scheme"))?;
        let authority = uri.authority().cloned().ok_or_else(|| invalid("missing host"))?;
        let path_prefix = uri.path().trim_end_matches('/').to_string();

        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());

        Ok(Self {
            client,
            scheme,
            authority,
            path_prefix,
        })
    }

    fn rewrite(&self, uri: &Uri) -> Result<Uri> {
        let path_and_query = uri.path_and_query().map(PathAndQuery::as_str).unwrap_or("/");
        let path_and_query: PathAndQuery = format!("{}{}", self.path_prefix, path_and_query)
            .parse()
            .map_err(Error::transport)?;

        Uri::builder()
            .scheme(self.scheme.clone())
            .authority(self.authority.clone())
            .path_and_query(path_and_query)
            .build()
            .map_err(Error::transport)
    }
}

impl RoundTrip for HttpDownstream {
    fn round_trip(&self, req: Request<Body>) -> BoxFuture<'_, Result<Response<Body>>> {
        Box::pin(async move {
            let (mut parts, body) = req.into_parts();
            parts.uri = self.rewrite(&parts.uri)?;
            parts.headers.remove(header::HOST);

            tracing::trace!(uri = %parts.uri, "Forwarding to downstream");

            let response = self
                .client
                .request(Request::from_parts(parts, body))
                .await
                .map_err(Error::transport)?;

            let (parts, body) = response.into_parts();
            Ok(Response::from_parts(parts, Body::new(body)))
        })
    }
}
