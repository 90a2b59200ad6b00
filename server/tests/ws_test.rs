//! Integration tests for WebSocket admission, fan-out, cleanup and frame handling.

use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use jami_web_server::auth::jwt::{issue_access_token, SigningKeys};
use jami_web_server::auth::AccountStore;
use jami_web_server::daemon::{self, DaemonHandle};
use jami_web_server::state::AppState;
use jami_web_server::ws::protocol::CallAction;
use jami_web_server::ws::WsMessage;

type WsClient = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

const CALL_BEGIN_FRAME: &str = r#"{"type":"CallBegin","data":{"from":"abc123","to":"xyz789"}}"#;

/// Helper: start the server on a random port with an in-memory key pair and
/// the loopback daemon. Returns the bound address and the shared state.
async fn start_test_server() -> (SocketAddr, AppState) {
    let keys = SigningKeys::generate().expect("Failed to generate signing keys");

    let (daemon_handle, cmd_rx) = DaemonHandle::channel();
    let (evt_tx, evt_rx) = tokio::sync::mpsc::unbounded_channel();
    tokio::spawn(daemon::loopback::run_loopback(cmd_rx, evt_tx));

    let state = AppState::new(keys, AccountStore::default(), 60, &daemon_handle);
    tokio::spawn(daemon::events::run_event_consumer(
        evt_rx,
        state.registry.clone(),
    ));

    let app = jami_web_server::routes::build_router(state.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    (addr, state)
}

fn token_for(state: &AppState, account_id: &str) -> String {
    issue_access_token(&state.signing_keys, "tester", account_id, 60).unwrap()
}

async fn connect(addr: SocketAddr, token: &str) -> WsClient {
    let url = format!("ws://{}/ws?accessToken={}", addr, token);
    let (ws, _) = tokio_tungstenite::connect_async(&url)
        .await
        .expect("Failed to connect to WebSocket");
    ws
}

/// Attempt a connection that is expected to be refused and return the HTTP status.
async fn refused_status(url: &str) -> u16 {
    match tokio_tungstenite::connect_async(url).await {
        Err(tungstenite::Error::Http(response)) => response.status().as_u16(),
        Err(other) => panic!("Expected HTTP refusal, got error: {other}"),
        Ok(_) => panic!("Expected HTTP refusal, connection was upgraded"),
    }
}

/// Wait until the registry reports `expected` connections for the account.
async fn wait_for_connections(state: &AppState, account_id: &str, expected: usize) {
    for _ in 0..100 {
        if state.registry.connection_count(account_id) == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!(
        "Account {} never reached {} connection(s), has {}",
        account_id,
        expected,
        state.registry.connection_count(account_id)
    );
}

/// Read the next text frame, skipping control frames.
async fn next_text(ws: &mut WsClient) -> String {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("Expected a frame within timeout");
        match msg {
            Some(Ok(Message::Text(text))) => return text.as_str().to_string(),
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
            other => panic!("Expected text frame, got: {:?}", other),
        }
    }
}

fn call_begin() -> WsMessage {
    WsMessage::CallBegin(CallAction {
        from: Some("abc123".to_string()),
        to: Some("xyz789".to_string()),
        ..Default::default()
    })
}

#[tokio::test]
async fn test_ws_missing_token_refused() {
    let (addr, state) = start_test_server().await;

    assert_eq!(refused_status(&format!("ws://{}/ws", addr)).await, 400);
    assert_eq!(
        refused_status(&format!("ws://{}/ws?accessToken=", addr)).await,
        400
    );
    assert_eq!(state.registry.account_count(), 0);
}

#[tokio::test]
async fn test_ws_invalid_token_refused() {
    let (addr, state) = start_test_server().await;

    let garbage = format!("ws://{}/ws?accessToken=not.a.jwt", addr);
    assert_eq!(refused_status(&garbage).await, 401);

    let expired = issue_access_token(&state.signing_keys, "tester", "abc123", -60).unwrap();
    let url = format!("ws://{}/ws?accessToken={}", addr, expired);
    assert_eq!(refused_status(&url).await, 401);

    let foreign_keys = SigningKeys::generate().unwrap();
    let foreign = issue_access_token(&foreign_keys, "tester", "abc123", 60).unwrap();
    let url = format!("ws://{}/ws?accessToken={}", addr, foreign);
    assert_eq!(refused_status(&url).await, 401);

    assert_eq!(state.registry.account_count(), 0);
}

/// Send a raw upgrade request and read until the server closes the socket.
async fn raw_refused_upgrade(addr: SocketAddr, query: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!(
        "GET /ws{} HTTP/1.1\r\n\
         Host: {}\r\n\
         Connection: Upgrade\r\n\
         Upgrade: websocket\r\n\
         Sec-WebSocket-Version: 13\r\n\
         Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\r\n",
        query, addr
    );
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut response = Vec::new();
    tokio::time::timeout(Duration::from_secs(2), stream.read_to_end(&mut response))
        .await
        .expect("Server should close the socket after refusing the upgrade")
        .unwrap();
    String::from_utf8(response).unwrap()
}

#[tokio::test]
async fn test_ws_refusal_closes_transport() {
    let (addr, state) = start_test_server().await;

    let response = raw_refused_upgrade(addr, "?accessToken=bad").await;
    assert!(response.starts_with("HTTP/1.1 401"), "{}", response);

    let response = raw_refused_upgrade(addr, "").await;
    assert!(response.starts_with("HTTP/1.1 400"), "{}", response);

    assert_eq!(state.registry.account_count(), 0);
}

#[tokio::test]
async fn test_ws_fan_out_to_every_connection() {
    let (addr, state) = start_test_server().await;
    let token = token_for(&state, "abc123");

    let mut tab_a = connect(addr, &token).await;
    let mut tab_b = connect(addr, &token).await;
    wait_for_connections(&state, "abc123", 2).await;

    assert!(state.registry.send("abc123", &call_begin()));
    assert_eq!(next_text(&mut tab_a).await, CALL_BEGIN_FRAME);
    assert_eq!(next_text(&mut tab_b).await, CALL_BEGIN_FRAME);

    assert!(!state.registry.send("nobody", &call_begin()));
}

#[tokio::test]
async fn test_ws_send_is_scoped_to_account() {
    let (addr, state) = start_test_server().await;

    let mut alice = connect(addr, &token_for(&state, "abc123")).await;
    let mut bob = connect(addr, &token_for(&state, "xyz789")).await;
    wait_for_connections(&state, "abc123", 1).await;
    wait_for_connections(&state, "xyz789", 1).await;

    assert!(state.registry.send("xyz789", &call_begin()));
    assert_eq!(next_text(&mut bob).await, CALL_BEGIN_FRAME);

    let nothing = tokio::time::timeout(Duration::from_millis(300), alice.next()).await;
    assert!(nothing.is_err(), "Alice should not receive Bob's message");
}

#[tokio::test]
async fn test_ws_registry_cleanup_on_close() {
    let (addr, state) = start_test_server().await;
    let token = token_for(&state, "abc123");

    let mut tab_a = connect(addr, &token).await;
    let mut tab_b = connect(addr, &token).await;
    wait_for_connections(&state, "abc123", 2).await;

    tab_a.close(None).await.unwrap();
    wait_for_connections(&state, "abc123", 1).await;
    assert_eq!(state.registry.account_count(), 1);

    // The remaining connection still receives
    assert!(state.registry.send("abc123", &call_begin()));
    assert_eq!(next_text(&mut tab_b).await, CALL_BEGIN_FRAME);

    tab_b.close(None).await.unwrap();
    wait_for_connections(&state, "abc123", 0).await;
    assert_eq!(state.registry.account_count(), 0);
    assert!(!state.registry.send("abc123", &call_begin()));
}

#[tokio::test]
async fn test_ws_invalid_frames_keep_connection_open() {
    let (addr, state) = start_test_server().await;
    let mut ws = connect(addr, &token_for(&state, "abc123")).await;
    wait_for_connections(&state, "abc123", 1).await;

    ws.send(Message::text("not json")).await.unwrap();
    ws.send(Message::text(r#"{"type":"Bogus","data":{}}"#))
        .await
        .unwrap();
    ws.send(Message::text(r#"{"data":{}}"#)).await.unwrap();
    ws.send(Message::Binary(vec![1, 2, 3].into())).await.unwrap();

    // Give the reader loop time to process the frames
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(state.registry.connection_count("abc123"), 1);

    assert!(state.registry.send("abc123", &call_begin()));
    assert_eq!(next_text(&mut ws).await, CALL_BEGIN_FRAME);
}

#[tokio::test]
async fn test_ws_client_ping_answered() {
    let (addr, state) = start_test_server().await;
    let mut ws = connect(addr, &token_for(&state, "abc123")).await;

    ws.send(Message::Ping(vec![42, 43, 44].into()))
        .await
        .expect("Failed to send ping");

    let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
        .await
        .expect("Expected pong within timeout");
    match msg {
        Some(Ok(Message::Pong(data))) => {
            assert_eq!(data.as_ref(), &[42, 43, 44], "Pong data should match ping");
        }
        other => panic!("Expected Pong message, got: {:?}", other),
    }
}

#[tokio::test]
async fn test_health_reports_sessions() {
    let (addr, state) = start_test_server().await;
    let _ws = connect(addr, &token_for(&state, "abc123")).await;
    wait_for_connections(&state, "abc123", 1).await;

    let body: serde_json::Value = reqwest::get(format!("http://{}/health", addr))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["sessions"], 1);
}
