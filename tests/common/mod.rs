//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context as TaskContext, Poll};

use axum::body::{Body, Bytes};
use axum::http::{Request, Response, StatusCode};
use futures_util::future::BoxFuture;
use futures_util::Stream;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use query_frontend::queryrange::{
    Context, Handler, Middleware, MiddlewareFn, QueryRangeRequest, QueryRangeResponse, RoundTrip,
    RoundTripFn,
};

/// A JSON matrix with one series holding one sample per given timestamp (ms).
pub fn matrix_json(timestamps_ms: &[i64]) -> String {
    let values: Vec<String> = timestamps_ms
        .iter()
        .map(|ts| format!("[{},\"1\"]", *ts as f64 / 1000.0))
        .collect();
    format!(
        r#"{{"status":"success","data":{{"resultType":"matrix","result":[{{"metric":{{"job":"api"}},"values":[{}]}}]}}}}"#,
        values.join(",")
    )
}

/// Increments a counter when dropped.
pub struct DropCounter(Arc<AtomicUsize>);

impl Drop for DropCounter {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

struct TrackedStream {
    chunk: Option<Bytes>,
    _guard: DropCounter,
}

impl Stream for TrackedStream {
    type Item = Result<Bytes, std::io::Error>;

    fn poll_next(mut self: Pin<&mut Self>, _cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        Poll::Ready(self.chunk.take().map(Ok))
    }
}

/// A body that records its release in `drops`.
pub fn tracked_body(content: impl Into<Bytes>, drops: Arc<AtomicUsize>) -> Body {
    Body::from_stream(TrackedStream {
        chunk: Some(content.into()),
        _guard: DropCounter(drops),
    })
}

/// Everything a stub transport saw.
#[derive(Default)]
pub struct Recorded {
    pub calls: AtomicUsize,
    pub uris: Mutex<Vec<String>>,
    pub org_ids: Mutex<Vec<Option<String>>>,
}

impl Recorded {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// A transport answering every call with `respond(call_index, request)`.
pub fn stub_transport<F>(recorded: Arc<Recorded>, respond: F) -> Arc<dyn RoundTrip>
where
    F: Fn(usize, &Request<Body>) -> Response<Body> + Send + Sync + 'static,
{
    Arc::new(RoundTripFn::new(move |req: Request<Body>| {
        let n = recorded.calls.fetch_add(1, Ordering::SeqCst);
        recorded.uris.lock().unwrap().push(req.uri().to_string());
        recorded.org_ids.lock().unwrap().push(
            req.headers()
                .get("X-Scope-OrgID")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        );
        let resp = respond(n, &req);
        Box::pin(async move { Ok(resp) }) as BoxFuture<'static, _>
    }))
}

pub fn response(status: StatusCode, body: impl Into<Body>) -> Response<Body> {
    Response::builder().status(status).body(body.into()).unwrap()
}

/// A middleware counting how many calls reach it.
pub fn counting_middleware(calls: Arc<AtomicUsize>) -> Arc<dyn Middleware> {
    struct Counting {
        calls: Arc<AtomicUsize>,
        next: Arc<dyn Handler>,
    }

    impl Handler for Counting {
        fn handle(
            &self,
            ctx: Context,
            req: QueryRangeRequest,
        ) -> BoxFuture<'_, query_frontend::Result<QueryRangeResponse>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.next.handle(ctx, req)
        }
    }

    Arc::new(MiddlewareFn::new(move |next| {
        Arc::new(Counting {
            calls: calls.clone(),
            next,
        }) as Arc<dyn Handler>
    }))
}

/// Start a programmable HTTP backend on an ephemeral port.
///
/// `f` receives the raw request head and returns the status and body.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        let mut head = Vec::new();
                        let mut buf = [0u8; 1024];
                        while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                            match socket.read(&mut buf).await {
                                Ok(0) | Err(_) => return,
                                Ok(n) => head.extend_from_slice(&buf[..n]),
                            }
                        }

                        let (status, body) = f(String::from_utf8_lossy(&head).into_owned()).await;
                        let status_text = match status {
                            200 => "200 OK",
                            400 => "400 Bad Request",
                            401 => "401 Unauthorized",
                            404 => "404 Not Found",
                            500 => "500 Internal Server Error",
                            502 => "502 Bad Gateway",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };

                        let response_str = format!(
                            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}
