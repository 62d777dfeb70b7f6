//! End-to-end tests using real WebSocket and HTTP clients.

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use reqwest::StatusCode;
use reqwest::header::CONTENT_TYPE;
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use duet_server::config::ServerConfig;
use duet_server::metrics::detached_handle;
use duet_server::server::DuetServer;

const TIMEOUT: Duration = Duration::from_secs(5);

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

struct TestServer {
    server: DuetServer,
    addr: SocketAddr,
    _assets: TempDir,
}

impl TestServer {
    fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }
}

/// Boot a server on an ephemeral port with a throwaway assets directory.
async fn boot_server_with(configure: impl FnOnce(&mut ServerConfig)) -> TestServer {
    let assets = tempfile::tempdir().unwrap();
    std::fs::write(assets.path().join("index.html"), "<!doctype html><script src=\"/elm.js\"></script>").unwrap();
    std::fs::write(assets.path().join("elm.js"), "var Elm = {};").unwrap();

    let mut config = ServerConfig {
        assets_dir: assets.path().to_path_buf(),
        ..ServerConfig::default()
    };
    configure(&mut config);

    let server = DuetServer::new(config, detached_handle());
    let (addr, _handle) = server.listen().await.unwrap();
    TestServer {
        server,
        addr,
        _assets: assets,
    }
}

async fn boot_server() -> TestServer {
    boot_server_with(|_| {}).await
}

async fn connect(server: &TestServer) -> WsStream {
    let (ws, _) = timeout(TIMEOUT, connect_async(server.ws_url()))
        .await
        .expect("connect timed out")
        .expect("connect failed");
    ws
}

async fn send_json(ws: &mut WsStream, value: Value) {
    ws.send(Message::Text(value.to_string().into())).await.unwrap();
}

/// Next protocol event, skipping control frames.
async fn recv_event(ws: &mut WsStream) -> Value {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for event")
            .expect("stream ended")
            .expect("websocket error");
        match msg {
            Message::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
            Message::Ping(_) | Message::Pong(_) => {}
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

/// Ask for the client ID; once answered, the connection is admitted.
async fn client_id(ws: &mut WsStream) -> String {
    send_json(ws, json!({ "event": "getClientID" })).await;
    let reply = recv_event(ws).await;
    assert_eq!(reply["event"], "clientID");
    reply["data"]["clientID"].as_str().unwrap().to_owned()
}

async fn set_value(ws: &mut WsStream, id: &str, value: Value) {
    send_json(ws, json!({ "event": "setValue", "data": { "clientID": id, "value": value } })).await;
}

async fn wait_for_sessions(server: &TestServer, expected: usize) {
    timeout(TIMEOUT, async {
        loop {
            if server.server.registry().session_count().await.unwrap() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("session count never reached {expected}"));
}

async fn fetch(server: &TestServer, path: &str) -> reqwest::Response {
    timeout(TIMEOUT, reqwest::get(format!("http://{}{path}", server.addr)))
        .await
        .expect("request timed out")
        .expect("request failed")
}

// ── Relay ──

#[tokio::test]
async fn value_is_relayed_to_the_other_client() {
    let server = boot_server().await;
    let mut a = connect(&server).await;
    let mut b = connect(&server).await;
    let a_id = client_id(&mut a).await;
    let _ = client_id(&mut b).await;

    set_value(&mut a, &a_id, json!(7)).await;

    let event = recv_event(&mut b).await;
    assert_eq!(event["event"], "setOther");
    assert_eq!(event["data"]["value"], json!(7));
}

#[tokio::test]
async fn sender_does_not_receive_its_own_value() {
    let server = boot_server().await;
    let mut a = connect(&server).await;
    let mut b = connect(&server).await;
    let a_id = client_id(&mut a).await;
    let _ = client_id(&mut b).await;

    set_value(&mut a, &a_id, json!(3.5)).await;
    let _ = recv_event(&mut b).await;

    // Anything relayed back to A would arrive before this reply.
    send_json(&mut a, json!({ "event": "getClientID" })).await;
    let next = recv_event(&mut a).await;
    assert_eq!(next["event"], "clientID");
}

#[tokio::test]
async fn relay_works_in_both_directions_and_keeps_order() {
    let server = boot_server().await;
    let mut a = connect(&server).await;
    let mut b = connect(&server).await;
    let a_id = client_id(&mut a).await;
    let b_id = client_id(&mut b).await;

    for v in 1..=3 {
        set_value(&mut a, &a_id, json!(v)).await;
    }
    for v in 1..=3 {
        let event = recv_event(&mut b).await;
        assert_eq!(event["data"]["value"], json!(v));
    }

    set_value(&mut b, &b_id, json!(-4.25)).await;
    let event = recv_event(&mut a).await;
    assert_eq!(event["event"], "setOther");
    assert_eq!(event["data"]["value"], json!(-4.25));
}

#[tokio::test]
async fn set_value_updates_the_senders_session() {
    let server = boot_server().await;
    let mut a = connect(&server).await;
    let mut b = connect(&server).await;
    let a_id = client_id(&mut a).await;
    let _ = client_id(&mut b).await;

    set_value(&mut a, &a_id, json!(42)).await;
    let _ = recv_event(&mut b).await;

    let snapshot = server.server.registry().snapshot().await.unwrap();
    let session = snapshot.sessions.iter().find(|s| s.id.as_str() == a_id).unwrap();
    assert_eq!(session.value, serde_json::Number::from(42));
}

#[tokio::test]
async fn integer_values_are_relayed_verbatim() {
    let server = boot_server().await;
    let mut a = connect(&server).await;
    let mut b = connect(&server).await;
    let a_id = client_id(&mut a).await;
    let _ = client_id(&mut b).await;

    a.send(Message::Text(
        format!(r#"{{"event":"setValue","data":{{"clientID":"{a_id}","value":42}}}}"#).into(),
    ))
    .await
    .unwrap();

    let raw = loop {
        match timeout(TIMEOUT, b.next()).await.unwrap().unwrap().unwrap() {
            Message::Text(text) => break text.as_str().to_owned(),
            Message::Ping(_) | Message::Pong(_) => {}
            other => panic!("unexpected frame: {other:?}"),
        }
    };
    assert_eq!(raw, r#"{"event":"setOther","data":{"value":42}}"#);
}

#[tokio::test]
async fn lone_client_can_set_values() {
    let server = boot_server().await;
    let mut a = connect(&server).await;
    let a_id = client_id(&mut a).await;

    set_value(&mut a, &a_id, json!(1)).await;
    // Still responsive; nothing was sent back.
    assert_eq!(client_id(&mut a).await, a_id);
}

// ── Identity ──

#[tokio::test]
async fn client_ids_are_unique_and_stable() {
    let server = boot_server().await;
    let mut a = connect(&server).await;
    let mut b = connect(&server).await;

    let a_first = client_id(&mut a).await;
    let a_second = client_id(&mut a).await;
    let b_id = client_id(&mut b).await;

    assert_eq!(a_first, a_second);
    assert_ne!(a_first, b_id);
    assert!(a_first.starts_with("client_"));
}

#[tokio::test]
async fn reported_id_matches_the_registered_session() {
    let server = boot_server().await;
    let mut a = connect(&server).await;
    let a_id = client_id(&mut a).await;

    let snapshot = server.server.registry().snapshot().await.unwrap();
    assert_eq!(snapshot.sessions.len(), 1);
    assert_eq!(snapshot.sessions[0].id.as_str(), a_id);
}

#[tokio::test]
async fn get_client_id_accepts_empty_data() {
    let server = boot_server().await;
    let mut a = connect(&server).await;

    send_json(&mut a, json!({ "event": "getClientID", "data": {} })).await;
    let reply = recv_event(&mut a).await;
    assert_eq!(reply["event"], "clientID");
    assert_eq!(reply["data"]["clientID"].as_str().unwrap(), client_id(&mut a).await);
}

// ── Admission ──

#[tokio::test]
async fn third_client_is_rejected_and_closed() {
    let server = boot_server().await;
    let mut a = connect(&server).await;
    let mut b = connect(&server).await;
    let _ = client_id(&mut a).await;
    let _ = client_id(&mut b).await;

    let mut c = connect(&server).await;
    let rejected = recv_event(&mut c).await;
    assert_eq!(rejected["event"], "rejected");
    assert_eq!(rejected["data"]["maxSessions"], 2);

    let close = timeout(TIMEOUT, c.next()).await.unwrap().unwrap().unwrap();
    match close {
        Message::Close(Some(frame)) => assert_eq!(u16::from(frame.code), 1013),
        other => panic!("expected close frame, got {other:?}"),
    }

    assert_eq!(server.server.registry().session_count().await.unwrap(), 2);
}

#[tokio::test]
async fn slot_is_reusable_after_disconnect() {
    let server = boot_server().await;
    let mut a = connect(&server).await;
    let mut b = connect(&server).await;
    let a_id = client_id(&mut a).await;
    let _ = client_id(&mut b).await;

    b.close(None).await.unwrap();
    wait_for_sessions(&server, 1).await;

    let mut c = connect(&server).await;
    let c_id = client_id(&mut c).await;
    assert_eq!(server.server.registry().session_count().await.unwrap(), 2);

    set_value(&mut a, &a_id, json!(9)).await;
    let event = recv_event(&mut c).await;
    assert_eq!(event["event"], "setOther");
    assert_eq!(event["data"]["value"], json!(9));
    assert_ne!(c_id, a_id);
}

#[tokio::test]
async fn dropped_socket_frees_its_slot() {
    let server = boot_server().await;
    let mut a = connect(&server).await;
    let _ = client_id(&mut a).await;
    wait_for_sessions(&server, 1).await;

    drop(a);
    wait_for_sessions(&server, 0).await;
}

// ── Malformed input ──

#[tokio::test]
async fn invalid_frame_gets_error_and_connection_survives() {
    let server = boot_server().await;
    let mut a = connect(&server).await;

    a.send(Message::Text("this is not json".to_owned().into())).await.unwrap();
    let error = recv_event(&mut a).await;
    assert_eq!(error["event"], "error");
    assert_eq!(error["data"]["code"], "INVALID_MESSAGE");

    send_json(&mut a, json!({ "event": "setValue", "data": { "value": "seven" } })).await;
    let error = recv_event(&mut a).await;
    assert_eq!(error["data"]["code"], "INVALID_MESSAGE");

    assert!(client_id(&mut a).await.starts_with("client_"));
}

#[tokio::test]
async fn binary_json_frames_are_accepted() {
    let server = boot_server().await;
    let mut a = connect(&server).await;

    a.send(Message::Binary(br#"{"event":"getClientID"}"#.to_vec().into()))
        .await
        .unwrap();
    let reply = recv_event(&mut a).await;
    assert_eq!(reply["event"], "clientID");
}

// ── Heartbeat and shutdown ──

#[tokio::test]
async fn silent_client_is_dropped_after_heartbeat_timeout() {
    let server = boot_server_with(|c| {
        c.heartbeat_interval_secs = 1;
        c.heartbeat_timeout_secs = 1;
    })
    .await;
    let mut a = connect(&server).await;
    let _ = client_id(&mut a).await;

    // Not reading means the server's pings go unanswered.
    wait_for_sessions(&server, 0).await;
}

#[tokio::test]
async fn shutdown_closes_connected_clients() {
    let server = boot_server().await;
    let mut a = connect(&server).await;
    let _ = client_id(&mut a).await;

    server.server.shutdown().shutdown();

    let frame = timeout(TIMEOUT, async {
        loop {
            match a.next().await {
                Some(Ok(Message::Close(frame))) => return frame,
                Some(Ok(_)) => {}
                other => panic!("expected close frame, got {other:?}"),
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(frame.map(|f| u16::from(f.code)), Some(1001));
}

// ── HTTP ──

#[tokio::test]
async fn index_and_bundle_are_served() {
    let server = boot_server().await;

    let index = fetch(&server, "/").await;
    assert_eq!(index.status(), StatusCode::OK);
    let content_type = index.headers()[CONTENT_TYPE].to_str().unwrap();
    assert!(content_type.starts_with("text/html"), "{content_type}");
    assert_eq!(
        index.bytes().await.unwrap().as_ref(),
        b"<!doctype html><script src=\"/elm.js\"></script>"
    );

    let bundle = fetch(&server, "/elm.js").await;
    assert_eq!(bundle.status(), StatusCode::OK);
    let content_type = bundle.headers()[CONTENT_TYPE].to_str().unwrap();
    assert!(content_type.contains("javascript"), "{content_type}");
    assert_eq!(bundle.bytes().await.unwrap().as_ref(), b"var Elm = {};");
}

#[tokio::test]
async fn unknown_path_is_not_found() {
    let server = boot_server().await;
    let resp = fetch(&server, "/missing.js").await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_reports_live_sessions() {
    let server = boot_server().await;
    let mut a = connect(&server).await;
    let _ = client_id(&mut a).await;

    let resp = fetch(&server, "/health").await;
    assert_eq!(resp.status(), StatusCode::OK);
    let health: Value = resp.json().await.unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["sessions"], 1);
    assert_eq!(health["max_sessions"], 2);
}
