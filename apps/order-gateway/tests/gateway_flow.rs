//! Gateway Flow Integration Tests
//!
//! Runs the real control-channel client against an in-process WebSocket
//! server standing in for the order-management service, with the
//! simulated backend and a temporary SQLite store behind it.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use order_gateway::{
    ChannelError, ChannelState, ControlChannelClient, ControlChannelConfig, DispatchCoordinator,
    EventRelay, ExecutionBackend, ReconnectConfig, SimBackend, SqliteStateStore, StateStore,
    TlsMode,
};

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

struct Gateway {
    cancel: CancellationToken,
    handle: tokio::task::JoinHandle<Result<(), ChannelError>>,
    _dir: tempfile::TempDir,
}

impl Gateway {
    async fn stop(self) {
        self.cancel.cancel();
        let _ = timeout(RECV_TIMEOUT, self.handle).await;
    }
}

/// Wire up the full gateway against the given URL.
async fn spawn_gateway(url: &str, max_reconnect_attempts: u32) -> Gateway {
    spawn_gateway_with(
        url,
        ReconnectConfig {
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_millis(200),
            multiplier: 2.0,
            jitter_factor: 0.0,
            max_attempts: max_reconnect_attempts,
        },
        Duration::from_secs(60),
    )
    .await
}

async fn spawn_gateway_with(
    url: &str,
    reconnect: ReconnectConfig,
    stable_reset_after: Duration,
) -> Gateway {
    let dir = tempfile::tempdir().unwrap();
    let db_url = format!("sqlite://{}", dir.path().join("gateway.db").display());
    let store: Arc<dyn StateStore> =
        Arc::new(SqliteStateStore::connect(&db_url).await.unwrap());

    let backend: Arc<dyn ExecutionBackend> =
        Arc::new(SimBackend::new(vec!["ACC1".to_string(), "ACC2".to_string()]));

    let state = Arc::new(ChannelState::new());
    let (outbound_tx, outbound_rx) = mpsc::channel(64);

    let relay = Arc::new(EventRelay::new(Arc::clone(&state), outbound_tx.clone()));
    backend.register_event_handler(relay.handler());

    let dispatcher = Arc::new(DispatchCoordinator::new(
        Arc::clone(&backend),
        Arc::clone(&store),
        4,
    ));

    let cancel = CancellationToken::new();
    let client = Arc::new(ControlChannelClient::new(
        ControlChannelConfig {
            url: url.to_string(),
            auth_token: None,
            tls: TlsMode::Strict,
            reconnect,
            stable_reset_after,
            drain_timeout: Duration::from_secs(1),
        },
        dispatcher,
        backend,
        store,
        state,
        (outbound_tx, outbound_rx),
        cancel.clone(),
    ));

    Gateway {
        cancel,
        handle: tokio::spawn(client.run()),
        _dir: dir,
    }
}

async fn bind_server() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    (listener, url)
}

async fn accept(listener: &TcpListener) -> WebSocketStream<TcpStream> {
    let (stream, _) = timeout(RECV_TIMEOUT, listener.accept())
        .await
        .unwrap()
        .unwrap();
    tokio_tungstenite::accept_async(stream).await.unwrap()
}

async fn recv_json(ws: &mut WebSocketStream<TcpStream>) -> serde_json::Value {
    loop {
        let msg = timeout(RECV_TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("connection ended")
            .unwrap();
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

/// Receive frames until one of the given type arrives.
async fn recv_type(ws: &mut WebSocketStream<TcpStream>, message_type: &str) -> serde_json::Value {
    loop {
        let value = recv_json(ws).await;
        if value["type"] == message_type {
            return value;
        }
    }
}

async fn send_json(ws: &mut WebSocketStream<TcpStream>, value: &serde_json::Value) {
    ws.send(Message::Text(value.to_string().into()))
        .await
        .unwrap();
}

fn place_order(key: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "placeOrder",
        "order": {
            "account": "ACC1",
            "symbol": "XYZ",
            "side": "B",
            "quantity": 100,
            "idempotencyKey": key
        }
    })
}

#[tokio::test]
async fn session_registration_is_the_first_frame() {
    let (listener, url) = bind_server().await;
    let gateway = spawn_gateway(&url, 1).await;

    let mut ws = accept(&listener).await;
    let first = recv_json(&mut ws).await;
    assert_eq!(first["type"], "sessionRegister");
    assert!(first["sessionId"].as_str().is_some_and(|s| !s.is_empty()));
    assert_eq!(first["accounts"], serde_json::json!(["ACC1", "ACC2"]));

    gateway.stop().await;
}

#[tokio::test]
async fn ping_is_answered_and_unknown_types_are_ignored() {
    let (listener, url) = bind_server().await;
    let gateway = spawn_gateway(&url, 1).await;

    let mut ws = accept(&listener).await;
    recv_type(&mut ws, "sessionRegister").await;

    send_json(&mut ws, &serde_json::json!({ "type": "cancelAll" })).await;
    send_json(&mut ws, &serde_json::json!({ "type": "ping" })).await;

    // The unknown message produces no reply; the next frame is the pong.
    let reply = recv_json(&mut ws).await;
    assert_eq!(reply["type"], "pong");

    gateway.stop().await;
}

#[tokio::test]
async fn health_check_reports_the_registered_session() {
    let (listener, url) = bind_server().await;
    let gateway = spawn_gateway(&url, 1).await;

    let mut ws = accept(&listener).await;
    let register = recv_type(&mut ws, "sessionRegister").await;

    send_json(&mut ws, &serde_json::json!({ "type": "healthCheck" })).await;
    let health = recv_type(&mut ws, "health").await;
    assert_eq!(health["sessionId"], register["sessionId"]);
    assert_eq!(health["accounts"], register["accounts"]);

    gateway.stop().await;
}

#[tokio::test]
async fn place_order_is_acknowledged_and_replayed() {
    let (listener, url) = bind_server().await;
    let gateway = spawn_gateway(&url, 1).await;

    let mut ws = accept(&listener).await;
    recv_type(&mut ws, "sessionRegister").await;

    send_json(&mut ws, &place_order("k-100")).await;
    let ack = recv_type(&mut ws, "orderAck").await;
    assert_eq!(ack["idempotencyKey"], "k-100");
    assert_eq!(ack["status"], "submitted");
    let order_id = ack["clientOrderId"].as_str().unwrap().to_string();
    assert!(!order_id.is_empty());

    // Same key again: no second execution, the recorded result comes back.
    send_json(&mut ws, &place_order("k-100")).await;
    let replay = recv_type(&mut ws, "orderAck").await;
    assert_eq!(replay["status"], "idempotentReplay");
    assert_eq!(replay["clientOrderId"], order_id.as_str());

    gateway.stop().await;
}

#[tokio::test]
async fn invalid_order_is_rejected_without_execution() {
    let (listener, url) = bind_server().await;
    let gateway = spawn_gateway(&url, 1).await;

    let mut ws = accept(&listener).await;
    recv_type(&mut ws, "sessionRegister").await;

    send_json(
        &mut ws,
        &serde_json::json!({
            "type": "placeOrder",
            "order": {
                "account": "ACC1",
                "symbol": "XYZ",
                "side": "B",
                "quantity": 0,
                "idempotencyKey": "k-bad"
            }
        }),
    )
    .await;

    let ack = recv_type(&mut ws, "orderAck").await;
    assert_eq!(ack["status"], "error");
    assert!(ack["details"].as_str().unwrap().contains("quantity"));
    assert!(ack["clientOrderId"].is_null());

    gateway.stop().await;
}

#[tokio::test]
async fn backend_events_are_relayed_upstream() {
    let (listener, url) = bind_server().await;
    let gateway = spawn_gateway(&url, 1).await;

    let mut ws = accept(&listener).await;
    recv_type(&mut ws, "sessionRegister").await;

    send_json(&mut ws, &place_order("k-200")).await;
    let update = recv_type(&mut ws, "orderUpdate").await;
    assert_eq!(update["symbol"], "XYZ");

    gateway.stop().await;
}

#[tokio::test]
async fn reconnect_reregisters_with_the_same_session_id() {
    let (listener, url) = bind_server().await;
    let gateway = spawn_gateway(&url, 5).await;

    let mut ws = accept(&listener).await;
    let first = recv_type(&mut ws, "sessionRegister").await;
    drop(ws);

    // The client comes back on its own and registers again.
    let mut ws = accept(&listener).await;
    let second = recv_type(&mut ws, "sessionRegister").await;
    assert_eq!(second["sessionId"], first["sessionId"]);

    gateway.stop().await;
}

#[tokio::test]
async fn new_epoch_registers_before_any_queued_ack() {
    let (listener, url) = bind_server().await;
    let gateway = spawn_gateway(&url, 5).await;

    let mut ws = accept(&listener).await;
    recv_type(&mut ws, "sessionRegister").await;

    // Drop the transport right after the command goes out, without
    // reading anything back: the acknowledgement lands on the outbound
    // queue while the channel is down and must not survive into the
    // next epoch ahead of its registration.
    send_json(&mut ws, &place_order("k-300")).await;
    drop(ws);

    let mut ws = accept(&listener).await;
    let first = recv_json(&mut ws).await;
    assert_eq!(first["type"], "sessionRegister");

    gateway.stop().await;
}

#[tokio::test]
async fn backoff_resets_to_floor_after_sustained_active_period() {
    let (listener, url) = bind_server().await;
    let gateway = spawn_gateway_with(
        &url,
        ReconnectConfig {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
            multiplier: 4.0,
            jitter_factor: 0.0,
            max_attempts: 10,
        },
        Duration::from_millis(200),
    )
    .await;

    // First epoch drops immediately, consuming the 100ms floor delay
    // and growing the next one to 400ms.
    let mut ws = accept(&listener).await;
    recv_type(&mut ws, "sessionRegister").await;
    drop(ws);

    // Second epoch stays active past the reset threshold.
    let mut ws = accept(&listener).await;
    recv_type(&mut ws, "sessionRegister").await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    let dropped_at = std::time::Instant::now();
    drop(ws);

    // The sustained-active period put the delay back at the floor, so
    // the third epoch arrives well before the 400ms a continued
    // progression would impose.
    let mut ws = accept(&listener).await;
    recv_type(&mut ws, "sessionRegister").await;
    let elapsed = dropped_at.elapsed();
    assert!(
        elapsed < Duration::from_millis(350),
        "reconnect took {elapsed:?}, expected the floor delay"
    );

    gateway.stop().await;
}

#[tokio::test]
async fn reconnect_budget_is_bounded() {
    let (listener, url) = bind_server().await;
    drop(listener);

    let gateway = spawn_gateway(&url, 2).await;
    let result = timeout(RECV_TIMEOUT, gateway.handle).await.unwrap().unwrap();
    assert!(matches!(
        result,
        Err(ChannelError::MaxReconnectAttemptsExceeded)
    ));
}
