//! Transport adapter behavior against stub transports.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};

use query_frontend::config::{LimitsConfig, QueryRangeConfig};
use query_frontend::error::Error;
use query_frontend::queryrange::{
    new_tripperware, Codec, Context, DefaultExtractor, PrometheusCodec, QueryRangeResponse,
    QueryRangeRoundTripper, RoundTrip, StaticLimits,
};

mod common;
use common::{counting_middleware, matrix_json, response, stub_transport, tracked_body, Recorded};

const DAY_MS: i64 = 86_400_000;

fn codec() -> Arc<dyn Codec> {
    Arc::new(PrometheusCodec::new())
}

fn query_range(uri: &str, org_id: Option<&str>) -> Request<Body> {
    let mut req = Request::builder().uri(uri).body(Body::empty()).unwrap();
    if let Some(org_id) = org_id {
        req.extensions_mut().insert(Context::new().with_org_id(org_id));
    }
    req
}

async fn decode(resp: axum::http::Response<Body>) -> QueryRangeResponse {
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_non_matching_path_is_forwarded_verbatim() {
    let recorded = Arc::new(Recorded::default());
    let transport = stub_transport(recorded.clone(), |_, _| response(StatusCode::OK, "raw"));
    let pipeline_calls = Arc::new(AtomicUsize::new(0));

    let adapter = QueryRangeRoundTripper::new(
        transport,
        codec(),
        &[counting_middleware(pipeline_calls.clone())],
    );

    let resp = adapter
        .round_trip(query_range("/api/v1/query?query=up&time=10", Some("1")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(to_bytes(resp.into_body(), usize::MAX).await.unwrap(), "raw");

    assert_eq!(recorded.calls(), 1);
    assert_eq!(recorded.uris.lock().unwrap()[0], "/api/v1/query?query=up&time=10");
    assert_eq!(pipeline_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_query_range_is_pipelined() {
    let recorded = Arc::new(Recorded::default());
    let transport = stub_transport(recorded.clone(), |_, _| {
        response(StatusCode::OK, matrix_json(&[0, 15_000]))
    });
    let pipeline_calls = Arc::new(AtomicUsize::new(0));

    let adapter = QueryRangeRoundTripper::new(
        transport,
        codec(),
        &[counting_middleware(pipeline_calls.clone())],
    );

    let resp = adapter
        .round_trip(query_range(
            "/api/v1/query_range?query=up&start=0&end=15&step=15",
            Some("team-a"),
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get("content-type").unwrap(),
        "application/json"
    );
    let body = decode(resp).await;
    assert!(body.is_success());
    assert_eq!(body.data.result[0].values.len(), 2);

    assert_eq!(pipeline_calls.load(Ordering::SeqCst), 1);
    assert_eq!(recorded.calls(), 1);
    assert_eq!(
        recorded.org_ids.lock().unwrap()[0].as_deref(),
        Some("team-a")
    );
    let uri = recorded.uris.lock().unwrap()[0].clone();
    assert!(uri.starts_with("/api/v1/query_range?"), "{}", uri);
    assert!(uri.contains("query=up"), "{}", uri);
}

#[tokio::test]
async fn test_missing_identity_never_reaches_downstream() {
    let recorded = Arc::new(Recorded::default());
    let transport = stub_transport(recorded.clone(), |_, _| response(StatusCode::OK, "{}"));
    let adapter = QueryRangeRoundTripper::new(transport, codec(), &[]);

    let err = adapter
        .round_trip(query_range(
            "/api/v1/query_range?query=up&start=0&end=60&step=15",
            None,
        ))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::MissingOrgId));
    assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
    assert_eq!(recorded.calls(), 0);
}

#[tokio::test]
async fn test_decode_failure_skips_pipeline() {
    let recorded = Arc::new(Recorded::default());
    let transport = stub_transport(recorded.clone(), |_, _| response(StatusCode::OK, "{}"));
    let pipeline_calls = Arc::new(AtomicUsize::new(0));
    let adapter = QueryRangeRoundTripper::new(
        transport,
        codec(),
        &[counting_middleware(pipeline_calls.clone())],
    );

    let err = adapter
        .round_trip(query_range(
            "/api/v1/query_range?query=up&start=60&end=0&step=15",
            Some("1"),
        ))
        .await
        .unwrap_err();

    assert_eq!(err.http_status(), Some(StatusCode::BAD_REQUEST));
    assert_eq!(err.to_string(), "end timestamp must not be before start time");
    assert_eq!(pipeline_calls.load(Ordering::SeqCst), 0);
    assert_eq!(recorded.calls(), 0);
}

#[tokio::test]
async fn test_response_body_released_once() {
    let cases = [
        (StatusCode::OK, matrix_json(&[0]), true),
        (StatusCode::OK, "not json".to_string(), false),
        (StatusCode::INTERNAL_SERVER_ERROR, "querier exploded".to_string(), false),
    ];

    for (status, body, ok) in cases {
        let drops = Arc::new(AtomicUsize::new(0));
        let tracked = drops.clone();
        let recorded = Arc::new(Recorded::default());
        let transport = stub_transport(recorded, move |_, _| {
            response(status, tracked_body(body.clone(), tracked.clone()))
        });
        let adapter = QueryRangeRoundTripper::new(transport, codec(), &[]);

        let result = adapter
            .round_trip(query_range(
                "/api/v1/query_range?query=up&start=0&end=60&step=15",
                Some("1"),
            ))
            .await;

        assert_eq!(result.is_ok(), ok, "status {}", status);
        assert_eq!(drops.load(Ordering::SeqCst), 1, "status {}", status);
        if let Err(err) = result {
            let expected = if status == StatusCode::OK {
                StatusCode::INTERNAL_SERVER_ERROR
            } else {
                status
            };
            assert_eq!(err.status_code(), expected);
        }
    }
}

#[tokio::test]
async fn test_downstream_error_status_is_propagated() {
    let recorded = Arc::new(Recorded::default());
    let transport = stub_transport(recorded.clone(), |_, _| {
        response(StatusCode::BAD_REQUEST, "parse error: unexpected end of input")
    });
    let adapter = QueryRangeRoundTripper::new(transport, codec(), &[]);

    let err = adapter
        .round_trip(query_range(
            "/api/v1/query_range?query=sum(&start=0&end=60&step=15",
            Some("1"),
        ))
        .await
        .unwrap_err();

    assert_eq!(err.http_status(), Some(StatusCode::BAD_REQUEST));
    assert_eq!(err.to_string(), "parse error: unexpected end of input");
}

#[tokio::test]
async fn test_assembled_pipeline_splits_and_retries() {
    let config = QueryRangeConfig {
        split_queries_by_day: true,
        split_queries_by_interval: Duration::from_secs(3600),
        max_retries: 3,
        ..Default::default()
    };
    let (tripperware, cache) = new_tripperware(
        &config,
        Arc::new(StaticLimits::new(LimitsConfig::default())),
        codec(),
        Arc::new(DefaultExtractor),
    )
    .unwrap();
    assert!(cache.is_none());

    let recorded = Arc::new(Recorded::default());
    let transport = stub_transport(recorded.clone(), |n, req| {
        if n == 0 {
            return response(StatusCode::SERVICE_UNAVAILABLE, "busy");
        }
        let query = req.uri().query().unwrap_or_default();
        if query.contains("start=0&") {
            response(StatusCode::OK, matrix_json(&[0, DAY_MS - 60_000]))
        } else {
            response(StatusCode::OK, matrix_json(&[DAY_MS, 2 * DAY_MS]))
        }
    });

    let resp = tripperware(transport)
        .round_trip(query_range(
            "/api/v1/query_range?query=up&start=0&end=172800&step=60",
            Some("1"),
        ))
        .await
        .unwrap();
    let body = decode(resp).await;

    // Two day-long sub-queries, one of which was retried.
    assert_eq!(recorded.calls(), 3);
    let timestamps: Vec<i64> = body.data.result[0]
        .values
        .iter()
        .map(|s| s.timestamp_ms)
        .collect();
    assert_eq!(timestamps, vec![0, DAY_MS - 60_000, DAY_MS, 2 * DAY_MS]);
    assert!(recorded
        .org_ids
        .lock()
        .unwrap()
        .iter()
        .all(|id| id.as_deref() == Some("1")));
}
