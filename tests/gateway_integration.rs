//! End-to-end exercises against an in-process mock HTTP origin, covering the
//! scenarios a real deployment depends on: coalescing, admission by count and
//! by bytes, retry-then-success, retry exhaustion, and streaming order.

use bytes::Bytes;
use fetch_gateway::{FixedSequenceRetry, Gateway, GatewayLimits, NeverRetry};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

fn full_body(data: impl Into<Bytes>) -> BoxBody {
    Full::new(data.into()).map_err(|never| match never {}).boxed()
}

/// Starts a mock origin on a background Tokio task, driven by `respond`
/// (called once per request, on the mock's own runtime thread). Returns the
/// bound address and a shutdown handle.
async fn spawn_mock_origin<F>(respond: F) -> (String, oneshot::Sender<()>)
where
    F: Fn(usize) -> (u16, Vec<u8>) + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let respond = Arc::new(respond);
    let hit_count = Arc::new(AtomicUsize::new(0));
    let (tx, mut rx) = oneshot::channel();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = &mut rx => break,
                accepted = listener.accept() => {
                    let Ok((stream, _)) = accepted else { continue };
                    let respond = respond.clone();
                    let hit_count = hit_count.clone();
                    tokio::spawn(async move {
                        let io = TokioIo::new(stream);
                        let svc = service_fn(move |_req: Request<Incoming>| {
                            let respond = respond.clone();
                            let hit_count = hit_count.clone();
                            async move {
                                let attempt = hit_count.fetch_add(1, Ordering::SeqCst);
                                let (status, body) = respond(attempt);
                                Ok::<_, hyper::Error>(
                                    Response::builder()
                                        .status(status)
                                        .body(full_body(body))
                                        .unwrap(),
                                )
                            }
                        });
                        let _ = auto::Builder::new(TokioExecutor::new())
                            .http1()
                            .serve_connection(io, svc)
                            .await;
                    });
                }
            }
        }
    });

    (format!("http://{addr}"), tx)
}

/// Collects a buffered transfer's body alongside its HTTP response code, so
/// callers can assert on both halves of what `Content` carries.
async fn collect_buffered(
    gateway: &Gateway,
    url: String,
    policy: Arc<dyn fetch_gateway::RetryPolicy>,
) -> Result<(Vec<u8>, Option<u16>), fetch_gateway::ErrorList> {
    let (tx, rx) = oneshot::channel();
    gateway.download_buffered(
        url,
        0,
        vec![],
        None,
        1024,
        policy,
        Box::new(move |res| {
            let _ = tx.send(res.map(|c| (c.as_bytes().to_vec(), c.http_response_code())));
        }),
    );
    rx.await.unwrap()
}

#[tokio::test]
async fn buffered_request_round_trips() {
    let (url, _shutdown) = spawn_mock_origin(|_| (200, b"hello".to_vec())).await;
    let gateway = Gateway::standalone(GatewayLimits::default());

    let (body, code) = collect_buffered(&gateway, format!("{url}/file"), Arc::new(NeverRetry))
        .await
        .unwrap();
    assert_eq!(body, b"hello");
    assert_eq!(code, Some(200));
}

#[tokio::test]
async fn concurrent_identical_requests_coalesce_to_one_origin_hit() {
    let hits = Arc::new(AtomicUsize::new(0));
    let hits2 = hits.clone();
    let (url, _shutdown) = spawn_mock_origin(move |_| {
        hits2.fetch_add(1, Ordering::SeqCst);
        (200, b"shared".to_vec())
    })
    .await;
    let gateway = Gateway::standalone(GatewayLimits::default());

    let mut receivers = Vec::new();
    for _ in 0..5 {
        let (tx, rx) = oneshot::channel();
        gateway.download_buffered(
            format!("{url}/shared"),
            0,
            vec![],
            None,
            1024,
            Arc::new(NeverRetry),
            Box::new(move |res| {
                let _ = tx.send(res.map(|c| (c.as_bytes().to_vec(), c.http_response_code())));
            }),
        );
        receivers.push(rx);
    }

    for rx in receivers {
        let (body, code) = rx.await.unwrap().unwrap();
        assert_eq!(body, b"shared");
        assert_eq!(code, Some(200));
    }
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn admission_rejects_requests_over_the_byte_ceiling() {
    let (url, _shutdown) = spawn_mock_origin(|_| (200, b"ok".to_vec())).await;
    let gateway = Gateway::standalone(GatewayLimits {
        max_in_flight_count: 4,
        max_simultaneous_bytes: 100,
    });

    let (tx, rx) = oneshot::channel();
    gateway.download_buffered(
        format!("{url}/too-big"),
        0,
        vec![],
        None,
        1_000_000,
        Arc::new(NeverRetry),
        Box::new(move |res| {
            let _ = tx.send(res);
        }),
    );
    let result = rx.await.unwrap();
    assert!(result.is_err());
}

#[tokio::test]
async fn admission_throttles_by_in_flight_count() {
    let inflight_peak = Arc::new(AtomicUsize::new(0));
    let inflight_now = Arc::new(AtomicUsize::new(0));
    let peak2 = inflight_peak.clone();
    let now2 = inflight_now.clone();
    let (url, _shutdown) = spawn_mock_origin(move |_| {
        let current = now2.fetch_add(1, Ordering::SeqCst) + 1;
        peak2.fetch_max(current, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(20));
        now2.fetch_sub(1, Ordering::SeqCst);
        (200, b"x".to_vec())
    })
    .await;
    let gateway = Gateway::standalone(GatewayLimits {
        max_in_flight_count: 2,
        max_simultaneous_bytes: u64::MAX,
    });

    let mut receivers = Vec::new();
    for i in 0..6 {
        let (tx, rx) = oneshot::channel();
        gateway.download_buffered(
            format!("{url}/n{i}"),
            0,
            vec![],
            None,
            1,
            Arc::new(NeverRetry),
            Box::new(move |res| {
                let _ = tx.send(res);
            }),
        );
        receivers.push(rx);
    }
    for rx in receivers {
        rx.await.unwrap().unwrap();
    }

    assert!(inflight_peak.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn retries_then_succeeds_within_the_fixed_sequence() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let attempts2 = attempts.clone();
    let (url, _shutdown) = spawn_mock_origin(move |attempt| {
        attempts2.fetch_add(1, Ordering::SeqCst);
        if attempt < 2 {
            (503, b"".to_vec())
        } else {
            (200, b"recovered".to_vec())
        }
    })
    .await;
    let gateway = Gateway::standalone(GatewayLimits::default());
    let policy = Arc::new(FixedSequenceRetry::new(
        vec![Duration::from_millis(5), Duration::from_millis(5)],
        vec![503],
    ));

    let (body, code) = collect_buffered(&gateway, format!("{url}/flaky"), policy)
        .await
        .unwrap();
    assert_eq!(body, b"recovered");
    assert_eq!(code, Some(200));
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn retry_exhaustion_delivers_the_final_response_code() {
    let (url, _shutdown) = spawn_mock_origin(|_| (503, b"down".to_vec())).await;
    let gateway = Gateway::standalone(GatewayLimits::default());
    let policy = Arc::new(FixedSequenceRetry::new(vec![Duration::from_millis(5)], vec![503]));

    let (body, code) = collect_buffered(&gateway, format!("{url}/always-down"), policy)
        .await
        .unwrap();
    assert_eq!(body, b"down");
    assert_eq!(code, Some(503));
}

#[tokio::test]
async fn streaming_delivers_chunks_then_finishes() {
    let (url, _shutdown) = spawn_mock_origin(|_| (200, b"abcdefgh".to_vec())).await;
    let gateway = Gateway::standalone(GatewayLimits::default());

    let chunks = Arc::new(Mutex::new(Vec::new()));
    let chunks2 = chunks.clone();
    let (tx, rx) = oneshot::channel();
    gateway.download_stream(
        format!("{url}/stream"),
        0,
        vec![],
        Box::new(move |content| chunks2.lock().unwrap().push(content.as_bytes().to_vec())),
        Box::new(move |err| {
            let _ = tx.send(err);
        }),
    );

    let finish = rx.await.unwrap();
    assert!(finish.is_none());
    let received: Vec<u8> = chunks.lock().unwrap().concat();
    assert_eq!(received, b"abcdefgh");
}
