//! End-to-end polling tests over real HTTP.
//!
//! Each test binds an axum server on an ephemeral port and points a
//! `GatewayClient`-backed `Poller` at it.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::{Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use leakwatch::api::{AppState, router};
use leakwatch::data_sources::GatewayClient;
use leakwatch::layout::Layout;
use leakwatch::monitor::{Monitor, MonitorSettings};
use leakwatch::poller::{PollStatus, Poller};
use leakwatch::relay::GatewayCache;

const INTERVAL: Duration = Duration::from_millis(20);

async fn serve(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn client_for(addr: SocketAddr) -> GatewayClient {
    GatewayClient::with_timeout(&format!("http://{addr}"), Duration::from_secs(2)).unwrap()
}

async fn wait_for<F: Fn(&PollStatus) -> bool>(status: &mut watch::Receiver<PollStatus>, check: F) {
    tokio::time::timeout(Duration::from_secs(5), status.wait_for(|s| check(s)))
        .await
        .expect("poll status condition not reached in time")
        .unwrap();
}

/// Fails the first `failures` requests with 500, then serves one sensor.
async fn flaky_snapshot(State((calls, failures)): State<(Arc<AtomicUsize>, usize)>) -> impl IntoResponse {
    let n = calls.fetch_add(1, Ordering::SeqCst);
    if n < failures {
        return (StatusCode::INTERNAL_SERVER_ERROR, String::new());
    }
    (
        StatusCode::OK,
        r#"{"k1":{"gateway":"241","value":0,"time":0}}"#.to_string(),
    )
}

#[tokio::test]
async fn test_poll_survives_consecutive_failures() {
    let calls = Arc::new(AtomicUsize::new(0));
    let app = Router::new()
        .route("/api/gw", get(flaky_snapshot))
        .with_state((Arc::clone(&calls), 3));
    let addr = serve(app).await;

    let mut poller = Poller::new(client_for(addr), INTERVAL);
    let mut snapshots = poller.subscribe();
    let mut status = poller.status();
    poller.start();

    tokio::time::timeout(Duration::from_secs(5), snapshots.wait_for(|s| s.is_some()))
        .await
        .unwrap()
        .unwrap();
    wait_for(&mut status, |s| s.successes >= 1).await;

    assert!(calls.load(Ordering::SeqCst) >= 4);
    let status = status.borrow().clone();
    assert_eq!(status.consecutive_failures, 0);
    assert!(status.attempts >= 4);
    poller.stop().await;
}

#[tokio::test]
async fn test_protocol_error_reported() {
    let app = Router::new().route(
        "/api/gw",
        get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "maintenance") }),
    );
    let addr = serve(app).await;

    let client = client_for(addr);
    let err = client.get_snapshot().await.unwrap_err();
    assert_eq!(err.kind(), "protocol");

    let mut poller = Poller::new(client, INTERVAL);
    let mut status = poller.status();
    poller.start();
    wait_for(&mut status, |s| s.consecutive_failures >= 3).await;

    assert!(poller.subscribe().borrow().is_none());
    assert!(status.borrow().last_error.as_deref().unwrap().contains("503"));
    poller.stop().await;
}

#[tokio::test]
async fn test_malformed_body_is_decode_error() {
    let app = Router::new()
        .route("/api/gw", get(|| async { r#"{"k1":{"value":"wet"}}"# }))
        .route("/not-json/api/gw", get(|| async { "<html></html>" }));
    let addr = serve(app).await;

    let err = client_for(addr).get_snapshot().await.unwrap_err();
    assert_eq!(err.kind(), "decode");

    let client =
        GatewayClient::with_timeout(&format!("http://{addr}/not-json"), Duration::from_secs(2))
            .unwrap();
    let err = client.get_snapshot().await.unwrap_err();
    assert_eq!(err.kind(), "decode");
}

#[tokio::test]
async fn test_relay_to_alert_pipeline() {
    let relay = GatewayCache::default();
    let monitor = Monitor::new(MonitorSettings::default());
    let (_status_tx, poll_status) = watch::channel(PollStatus::default());
    let app = router(AppState {
        relay: relay.clone(),
        monitor: monitor.clone(),
        layout: Arc::new(Layout::default()),
        poll_status,
    });
    let addr = serve(app).await;

    let mut poller = Poller::new(client_for(addr), INTERVAL);
    let token = CancellationToken::new();
    let consumer = monitor.spawn(poller.subscribe(), token.clone());
    poller.start();

    // Gateway reports water at sensor k7
    let response = reqwest::Client::new()
        .post(format!("http://{addr}/api/gw/244"))
        .json(&serde_json::json!({"k7": 1}))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());

    let view = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let view = monitor.alert_view(chrono::Utc::now()).await;
            if view.active {
                return view;
            }
            tokio::time::sleep(INTERVAL).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(view.sensors, vec!["k7".to_string()]);

    poller.stop().await;
    token.cancel();
    consumer.await.unwrap();
}
