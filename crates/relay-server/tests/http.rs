//! End-to-end tests: real listener, reqwest for HTTP, tokio-tungstenite for
//! the push channel, `MockBroker` standing in for the STOMP session.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use axum::Router;
use futures::StreamExt;
use relay_core::{Destinations, LatestState};
use relay_server::server::with_middleware;
use relay_server::{start, AppState, Ingestor, ServerConfig, ServerHandle};
use relay_stomp::{MockBroker, MockFeed};
use serde_json::{json, Value};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

const TIMEOUT: Duration = Duration::from_secs(5);

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

struct Harness {
    handle: ServerHandle,
    state: AppState,
    feed: MockFeed,
}

impl Harness {
    fn url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{path}", self.handle.port)
    }

    async fn ws(&self) -> WsStream {
        let before = self.state.registry.count();
        let (ws, _) = connect_async(format!("ws://127.0.0.1:{}/ws", self.handle.port))
            .await
            .unwrap();
        // Registration happens after the upgrade completes server-side.
        timeout(TIMEOUT, async {
            while self.state.registry.count() <= before {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("client never registered");
        ws
    }

    async fn latest(&self) -> Value {
        reqwest::get(self.url("/latest"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap()
    }
}

async fn setup_with_public(public_dir: PathBuf) -> Harness {
    let state = AppState::new(Arc::new(LatestState::new()), 64);
    let (broker, feed) = MockBroker::new();

    let ingestor = Ingestor::new(
        Arc::clone(&state.latest),
        state.notifier(),
        Destinations::default(),
    );
    let subscription = ingestor.connect(&broker).await.unwrap();
    drop(ingestor.spawn(subscription));

    let config = ServerConfig {
        port: 0,
        public_dir,
        ..Default::default()
    };
    let handle = start(config, state.clone()).await.unwrap();
    Harness {
        handle,
        state,
        feed,
    }
}

async fn setup() -> Harness {
    setup_with_public(PathBuf::from("does-not-exist")).await
}

async fn read_json(ws: &mut WsStream) -> Value {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("timeout waiting for message")
            .expect("stream closed")
            .expect("ws error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

async fn wait_for<F>(harness: &Harness, mut done: F) -> Value
where
    F: FnMut(&Value) -> bool,
{
    timeout(TIMEOUT, async {
        loop {
            let latest = harness.latest().await;
            if done(&latest) {
                return latest;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("state never updated")
}

#[tokio::test]
async fn latest_is_null_before_any_message() {
    let h = setup().await;
    let resp = reqwest::get(h.url("/latest")).await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!({"sdr": null, "publisher": null}));
}

#[tokio::test]
async fn spectrum_message_reaches_socket_and_latest() {
    let h = setup().await;
    let mut ws = h.ws().await;

    h.feed
        .send("/queue/sdr", r#"{"spectrum_db": -42, "timestamp": 1000}"#)
        .await;

    let frame = read_json(&mut ws).await;
    assert_eq!(
        frame,
        json!({"event": "sdr-message", "data": {"spectrum_db": -42, "timestamp": 1000}})
    );

    let latest = h.latest().await;
    assert_eq!(latest["sdr"], json!({"spectrum_db": -42, "timestamp": 1000}));
    assert_eq!(latest["publisher"], Value::Null);
}

#[tokio::test]
async fn publisher_timestamp_reaches_socket_and_latest() {
    let h = setup().await;
    let mut ws = h.ws().await;

    h.feed.send("/queue/publisher", "2024-01-01T12:00:00Z").await;

    let frame = read_json(&mut ws).await;
    assert_eq!(
        frame,
        json!({"event": "publisher-message", "data": "2024-01-01T12:00:00Z"})
    );
    assert_eq!(h.latest().await["publisher"], "2024-01-01T12:00:00Z");
}

#[tokio::test]
async fn legacy_unrecognized_only_emits_raw_event() {
    let h = setup().await;
    let mut ws = h.ws().await;

    h.feed.send("/queue/test", "hello broker").await;
    // A recognized follow-up proves nothing else was queued in between.
    h.feed.send("/queue/publisher", "2024-01-01T12:00:00Z").await;

    assert_eq!(
        read_json(&mut ws).await,
        json!({"event": "activemq-message", "data": "hello broker"})
    );
    assert_eq!(read_json(&mut ws).await["event"], "publisher-message");

    let latest = h.latest().await;
    assert_eq!(latest["sdr"], Value::Null);
}

#[tokio::test]
async fn rewritten_destination_routed_by_subscription() {
    let h = setup().await;
    let mut ws = h.ws().await;

    // sub-0 is the legacy destination; the broker dropped the leading '/'.
    h.feed.send_on("sub-0", "queue/test", "hello broker").await;

    assert_eq!(
        read_json(&mut ws).await,
        json!({"event": "activemq-message", "data": "hello broker"})
    );
}

#[tokio::test]
async fn every_socket_receives_broadcast() {
    let h = setup().await;
    let mut a = h.ws().await;
    let mut b = h.ws().await;

    h.feed.send("/queue/sdr", r#"{"spectrum_db": [1.5, 2.5]}"#).await;

    assert_eq!(read_json(&mut a).await["event"], "sdr-message");
    assert_eq!(read_json(&mut b).await["event"], "sdr-message");
}

#[tokio::test]
async fn last_arrival_wins() {
    let h = setup().await;
    h.feed.send("/queue/sdr", r#"{"spectrum_db": 1, "timestamp": 5}"#).await;
    h.feed.send("/queue/sdr", r#"{"spectrum_db": 2, "timestamp": 1}"#).await;

    let latest = wait_for(&h, |v| v["sdr"]["spectrum_db"] == 2).await;
    assert_eq!(latest["sdr"]["timestamp"], 1);
}

#[tokio::test]
async fn disconnect_unregisters_client() {
    let h = setup().await;
    let ws = h.ws().await;
    assert_eq!(h.state.registry.count(), 1);
    drop(ws);

    timeout(TIMEOUT, async {
        while h.state.registry.count() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("client never unregistered");
}

#[tokio::test]
async fn html_pages() {
    let h = setup().await;

    let resp = reqwest::get(h.url("/latest-view")).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert!(resp.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/html"));
    assert!(resp.text().await.unwrap().contains("/latest"));

    let resp = reqwest::get(h.url("/")).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert!(resp.text().await.unwrap().contains("/latest-view"));
}

#[tokio::test]
async fn health_reports_clients() {
    let h = setup().await;
    let _ws = h.ws().await;

    let body: Value = reqwest::get(h.url("/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body, json!({"status": "ok", "clients": 1}));
}

#[tokio::test]
async fn static_files_served_from_public_dir() {
    let dir = std::env::temp_dir().join(format!("relay-public-{}", uuid::Uuid::now_v7()));
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("style.css"), "body { color: red; }").unwrap();

    let h = setup_with_public(dir.clone()).await;

    let resp = reqwest::get(h.url("/style.css")).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "body { color: red; }");

    let resp = reqwest::get(h.url("/missing.js")).await.unwrap();
    assert_eq!(resp.status(), 404);

    std::fs::remove_dir_all(dir).ok();
}

async fn explode() -> &'static str {
    panic!("handler failure")
}

#[tokio::test]
async fn handler_panic_becomes_500() {
    let router = with_middleware(Router::new().route("/boom", get(explode)).route(
        "/ok",
        get(|| async { "ok" }),
    ));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move { axum::serve(listener, router).await.ok() });

    let resp = reqwest::get(format!("http://127.0.0.1:{port}/boom")).await.unwrap();
    assert_eq!(resp.status(), 500);

    // The server is still up.
    let resp = reqwest::get(format!("http://127.0.0.1:{port}/ok")).await.unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn shutdown_stops_listener() {
    let h = setup().await;
    let url = h.url("/health");
    assert!(reqwest::get(&url).await.is_ok());

    h.handle.shutdown().await;
    assert!(reqwest::get(&url).await.is_err());
}
