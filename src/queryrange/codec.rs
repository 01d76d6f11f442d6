//! Translation between HTTP messages and structured query_range values.
//!
//! # Responsibilities
//! - Parse and validate `start`, `end`, `step`, `query` and `timeout`
//! - Re-encode a structured request as a `GET` for the backend
//! - Decode backend replies, surfacing non-200 statuses as errors
//! - Encode the final structured response as Prometheus JSON
//!
//! # Design Decisions
//! - Timestamps accept unix seconds (float) or RFC3339; steps accept
//!   float seconds or duration strings such as `15s`
//! - A decoder that takes a body owns it, so the body is released when
//!   decoding returns on every path

use std::collections::HashMap;
use std::time::{Duration, UNIX_EPOCH};

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, Response, StatusCode};
use futures_util::future::BoxFuture;

use crate::error::{Error, Result};
use crate::queryrange::model::{merge_responses, QueryRangeRequest, QueryRangeResponse};

/// Most points a single series may return.
pub const MAX_POINTS_PER_SERIES: i64 = 11_000;

/// Default cap on request and response bodies.
pub const DEFAULT_MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

/// Translates between transport messages and structured values.
pub trait Codec: Send + Sync {
    fn decode_request(&self, req: Request<Body>) -> BoxFuture<'_, Result<QueryRangeRequest>>;

    fn encode_request(&self, req: &QueryRangeRequest) -> Result<Request<Body>>;

    /// `req` is the request that produced `resp`.
    fn decode_response<'a>(
        &'a self,
        resp: Response<Body>,
        req: &'a QueryRangeRequest,
    ) -> BoxFuture<'a, Result<QueryRangeResponse>>;

    fn encode_response(&self, resp: &QueryRangeResponse) -> Result<Response<Body>>;

    /// Combine sub-range responses, given in time order.
    fn merge_responses(&self, responses: Vec<QueryRangeResponse>) -> Result<QueryRangeResponse>;
}

/// Codec for the Prometheus HTTP API.
#[derive(Debug, Clone)]
pub struct PrometheusCodec {
    max_body_bytes: usize,
}

impl PrometheusCodec {
    pub fn new() -> Self {
        Self {
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }
}

impl Default for PrometheusCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Codec for PrometheusCodec {
    fn decode_request(&self, req: Request<Body>) -> BoxFuture<'_, Result<QueryRangeRequest>> {
        Box::pin(async move {
            let (parts, body) = req.into_parts();

            let mut params: HashMap<String, String> = HashMap::new();
            if let Some(query) = parts.uri.query() {
                let pairs: Vec<(String, String)> = serde_urlencoded::from_str(query)
                    .map_err(|e| Error::bad_request(format!("invalid query string: {}", e)))?;
                for (k, v) in pairs {
                    params.entry(k).or_insert(v);
                }
            }

            let is_form = parts
                .headers
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .is_some_and(|v| v.starts_with("application/x-www-form-urlencoded"));
            if parts.method == Method::POST && is_form {
                let bytes = to_bytes(body, self.max_body_bytes)
                    .await
                    .map_err(|e| Error::bad_request(format!("error reading request body: {}", e)))?;
                let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(&bytes)
                    .map_err(|e| Error::bad_request(format!("invalid form body: {}", e)))?;
                // Body values take precedence over the query string.
                params.extend(pairs);
            }

            let param = |name: &str| params.get(name).map(String::as_str).unwrap_or_default();

            let start = parse_time("start", param("start"))?;
            let end = parse_time("end", param("end"))?;
            if end < start {
                return Err(Error::bad_request(
                    "end timestamp must not be before start time",
                ));
            }

            let step = parse_duration_ms("step", param("step"))?;
            if step <= 0 {
                return Err(Error::bad_request(
                    "zero or negative query resolution step widths are not accepted. Try a positive integer",
                ));
            }

            let points = end.checked_sub(start).map(|range| range / step);
            if points.map_or(true, |points| points > MAX_POINTS_PER_SERIES) {
                return Err(Error::bad_request(
                    "exceeded maximum resolution of 11,000 points per timeseries. Try decreasing the query resolution (?step=XX)",
                ));
            }

            let timeout = match params.get("timeout") {
                Some(raw) if !raw.is_empty() => Some(Duration::from_millis(
                    parse_duration_ms("timeout", raw)?.max(0) as u64,
                )),
                _ => None,
            };

            Ok(QueryRangeRequest {
                path: parts.uri.path().to_string(),
                start,
                end,
                step,
                timeout,
                query: param("query").to_string(),
            })
        })
    }

    fn encode_request(&self, req: &QueryRangeRequest) -> Result<Request<Body>> {
        let mut params = vec![
            ("start", encode_time(req.start)),
            ("end", encode_time(req.end)),
            ("step", encode_time(req.step)),
            ("query", req.query.clone()),
        ];
        if let Some(timeout) = req.timeout {
            params.push(("timeout", timeout.as_secs_f64().to_string()));
        }

        let query = serde_urlencoded::to_string(&params)
            .map_err(|e| Error::internal(format!("error encoding request: {}", e)))?;

        Request::builder()
            .method(Method::GET)
            .uri(format!("{}?{}", req.path, query))
            .header(header::ACCEPT, "application/json")
            .body(Body::empty())
            .map_err(|e| Error::internal(format!("error encoding request: {}", e)))
    }

    fn decode_response<'a>(
        &'a self,
        resp: Response<Body>,
        req: &'a QueryRangeRequest,
    ) -> BoxFuture<'a, Result<QueryRangeResponse>> {
        Box::pin(async move {
            let (parts, body) = resp.into_parts();
            let bytes = to_bytes(body, self.max_body_bytes)
                .await
                .map_err(Error::transport)?;

            if parts.status != StatusCode::OK {
                return Err(Error::http(
                    parts.status,
                    String::from_utf8_lossy(&bytes).into_owned(),
                ));
            }

            let decoded: QueryRangeResponse = serde_json::from_slice(&bytes)
                .map_err(|e| Error::internal(format!("error decoding response: {}", e)))?;

            tracing::trace!(
                query = %req.query,
                series = decoded.data.result.len(),
                bytes = bytes.len(),
                "Decoded downstream response"
            );
            Ok(decoded)
        })
    }

    fn encode_response(&self, resp: &QueryRangeResponse) -> Result<Response<Body>> {
        let body = serde_json::to_vec(resp)
            .map_err(|e| Error::internal(format!("error encoding response: {}", e)))?;

        Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .map_err(|e| Error::internal(format!("error encoding response: {}", e)))
    }

    fn merge_responses(&self, responses: Vec<QueryRangeResponse>) -> Result<QueryRangeResponse> {
        if let Some(failed) = responses.iter().find(|r| !r.is_success()) {
            return Err(Error::internal(format!(
                "cannot merge unsuccessful response: {}",
                failed.error.as_deref().unwrap_or(&failed.status)
            )));
        }
        Ok(merge_responses(responses))
    }
}

/// Parse unix seconds (possibly fractional) or RFC3339 into milliseconds.
fn parse_time(name: &str, raw: &str) -> Result<i64> {
    let invalid = || {
        Error::bad_request(format!(
            "invalid parameter {:?}; cannot parse {:?} to a valid timestamp",
            name, raw
        ))
    };

    if let Ok(seconds) = raw.parse::<f64>() {
        let ms = (seconds * 1000.0).round();
        // `i64::MAX as f64` rounds up to 2^63, so the upper bound is exclusive.
        if ms.is_finite() && ms >= i64::MIN as f64 && ms < i64::MAX as f64 {
            return Ok(ms as i64);
        }
        return Err(invalid());
    }
    humantime::parse_rfc3339(raw)
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .and_then(|d| i64::try_from(d.as_millis()).ok())
        .ok_or_else(invalid)
}

/// Parse float seconds or a duration string into milliseconds.
fn parse_duration_ms(name: &str, raw: &str) -> Result<i64> {
    if let Ok(seconds) = raw.parse::<f64>() {
        let ms = seconds * 1000.0;
        if ms.is_finite() && ms.abs() < i64::MAX as f64 {
            return Ok(ms.round() as i64);
        }
        return Err(Error::bad_request(format!(
            "invalid parameter {:?}; cannot parse {:?} to a valid duration. It overflows int64",
            name, raw
        )));
    }
    humantime::parse_duration(raw)
        .map(|d| d.as_millis() as i64)
        .map_err(|_| {
            Error::bad_request(format!(
                "invalid parameter {:?}; cannot parse {:?} to a valid duration",
                name, raw
            ))
        })
}

/// Milliseconds rendered as seconds with the shortest exact representation.
fn encode_time(ms: i64) -> String {
    (ms as f64 / 1000.0).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::queryrange::model::{Sample, SampleStream};

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_decode_request() {
        let codec = PrometheusCodec::new();
        let req = codec
            .decode_request(get(
                "/api/v1/query_range?start=1536673680&end=1536716880&step=120&query=sum%28up%29",
            ))
            .await
            .unwrap();

        assert_eq!(req.path, "/api/v1/query_range");
        assert_eq!(req.start, 1_536_673_680_000);
        assert_eq!(req.end, 1_536_716_880_000);
        assert_eq!(req.step, 120_000);
        assert_eq!(req.query, "sum(up)");
        assert_eq!(req.timeout, None);
    }

    #[tokio::test]
    async fn test_decode_request_rfc3339_and_duration_step() {
        let codec = PrometheusCodec::new();
        let req = codec
            .decode_request(get(
                "/api/v1/query_range?start=2018-09-11T13:48:00Z&end=2018-09-11T14:48:00.5Z&step=1m&query=up&timeout=30s",
            ))
            .await
            .unwrap();

        assert_eq!(req.start, 1_536_673_680_000);
        assert_eq!(req.end, 1_536_677_280_500);
        assert_eq!(req.step, 60_000);
        assert_eq!(req.timeout, Some(Duration::from_secs(30)));
    }

    #[tokio::test]
    async fn test_decode_request_form_body() {
        let codec = PrometheusCodec::new();
        let req = Request::builder()
            .method(Method::POST)
            .uri("/prometheus/api/v1/query_range?query=ignored")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("start=0&end=3600&step=60&query=rate%28x%5B5m%5D%29"))
            .unwrap();

        let req = codec.decode_request(req).await.unwrap();
        assert_eq!(req.query, "rate(x[5m])");
        assert_eq!(req.end, 3_600_000);
    }

    #[tokio::test]
    async fn test_decode_request_validation() {
        let codec = PrometheusCodec::new();
        let cases = [
            ("start=10&end=5&step=1&query=up", "end timestamp must not be before start time"),
            ("start=0&end=5&step=0&query=up", "zero or negative query resolution step"),
            ("start=0&end=5&step=-1&query=up", "zero or negative query resolution step"),
            ("start=0&end=100000&step=1&query=up", "exceeded maximum resolution"),
            ("start=foo&end=5&step=1&query=up", "cannot parse \"foo\" to a valid timestamp"),
            ("start=0&end=5&step=bar&query=up", "cannot parse \"bar\" to a valid duration"),
            ("start=-1e300&end=1e300&step=1&query=up", "cannot parse \"-1e300\" to a valid timestamp"),
            ("start=0&end=1e300&step=1&query=up", "cannot parse \"1e300\" to a valid timestamp"),
            ("start=NaN&end=5&step=1&query=up", "cannot parse \"NaN\" to a valid timestamp"),
            // Both ends fit in i64 milliseconds but their distance does not.
            (
                "start=-9000000000000000&end=9000000000000000&step=1&query=up",
                "exceeded maximum resolution",
            ),
        ];

        for (query, expected) in cases {
            let err = codec
                .decode_request(get(&format!("/api/v1/query_range?{}", query)))
                .await
                .unwrap_err();
            assert_eq!(err.http_status(), Some(StatusCode::BAD_REQUEST), "{}", query);
            assert!(err.to_string().contains(expected), "{}: {}", query, err);
        }
    }

    #[tokio::test]
    async fn test_encode_request_preserves_parameters() {
        let codec = PrometheusCodec::new();
        let original = QueryRangeRequest {
            path: "/api/v1/query_range".to_string(),
            start: 1_536_673_680_500,
            end: 1_536_716_880_000,
            step: 15_000,
            timeout: Some(Duration::from_millis(1500)),
            query: "sum by (job) (up{env=\"prod\"})".to_string(),
        };

        let encoded = codec.encode_request(&original).unwrap();
        assert_eq!(encoded.method(), Method::GET);
        assert_eq!(encoded.uri().path(), "/api/v1/query_range");

        let decoded = codec.decode_request(encoded).await.unwrap();
        assert_eq!(decoded, original);
    }

    #[tokio::test]
    async fn test_decode_response_non_200() {
        let codec = PrometheusCodec::new();
        let req = codec
            .decode_request(get("/api/v1/query_range?start=0&end=60&step=15&query=up"))
            .await
            .unwrap();
        let resp = Response::builder()
            .status(StatusCode::SERVICE_UNAVAILABLE)
            .body(Body::from("querier overloaded"))
            .unwrap();

        let err = codec.decode_response(resp, &req).await.unwrap_err();
        assert_eq!(err.http_status(), Some(StatusCode::SERVICE_UNAVAILABLE));
        assert_eq!(err.to_string(), "querier overloaded");
    }

    #[tokio::test]
    async fn test_decode_response_invalid_json() {
        let codec = PrometheusCodec::new();
        let req = codec
            .decode_request(get("/api/v1/query_range?start=0&end=60&step=15&query=up"))
            .await
            .unwrap();
        let resp = Response::new(Body::from("{not json"));

        let err = codec.decode_response(resp, &req).await.unwrap_err();
        assert_eq!(err.http_status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(err.to_string().starts_with("error decoding response"));
    }

    #[tokio::test]
    async fn test_encode_response() {
        let codec = PrometheusCodec::new();
        let resp = QueryRangeResponse::success(vec![SampleStream {
            metric: [("job".to_string(), "api".to_string())].into(),
            values: vec![Sample::new(1_000, 1.5)],
        }]);

        let encoded = codec.encode_response(&resp).unwrap();
        assert_eq!(encoded.status(), StatusCode::OK);
        assert_eq!(
            encoded.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );

        let bytes = to_bytes(encoded.into_body(), usize::MAX).await.unwrap();
        assert_eq!(
            std::str::from_utf8(&bytes).unwrap(),
            r#"{"status":"success","data":{"resultType":"matrix","result":[{"metric":{"job":"api"},"values":[[1.0,"1.5"]]}]}}"#
        );
    }
}
