//! Gateway tests over a real WebSocket: upgrade, identify, frame handling,
//! idle enforcement.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use gambit_server::bus::LocalBus;
use gambit_server::config::Config;
use gambit_server::gateway::server;
use gambit_server::AppState;
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// Bind the gateway on an ephemeral port and serve it in the background.
async fn spawn_server(config: Config) -> SocketAddr {
    let state = AppState::new(Arc::new(config), Arc::new(LocalBus::new()));
    let app = server::router().with_state(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn connect(addr: SocketAddr) -> WsClient {
    let (ws, _response) = connect_async(format!("ws://{addr}/gateway"))
        .await
        .expect("ws connect failed");
    ws
}

async fn send_json(ws: &mut WsClient, value: &Value) {
    ws.send(Message::text(value.to_string())).await.unwrap();
}

/// Read the next text frame and decode it.
async fn next_json(ws: &mut WsClient) -> Value {
    loop {
        let msg = timeout(RECV_TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("connection closed")
            .expect("ws read error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

async fn identify(ws: &mut WsClient, player_id: &str) {
    send_json(ws, &json!({ "op": 2, "d": { "player_id": player_id } })).await;
    let ready = next_json(ws).await;
    assert_eq!(ready["t"], "READY");
}

#[tokio::test]
async fn malformed_json_rejects_the_message_not_the_connection() {
    let addr = spawn_server(Config::for_instance("inst_a")).await;
    let mut ws = connect(addr).await;
    identify(&mut ws, "p1").await;

    ws.send(Message::text("{this is not json")).await.unwrap();
    let reply = next_json(&mut ws).await;
    assert_eq!(reply["t"], "ERROR");

    // The connection survived; the full join/action flow still works on it.
    send_json(
        &mut ws,
        &json!({ "op": 3, "d": { "game_id": "g1", "participants": ["p1", "p2"] } }),
    )
    .await;
    let joined = next_json(&mut ws).await;
    assert_eq!(joined["t"], "GAME_JOINED");

    send_json(
        &mut ws,
        &json!({ "op": 4, "d": { "game_id": "g1", "data": { "move": "e2e4" } } }),
    )
    .await;
    let event = next_json(&mut ws).await;
    assert_eq!(event["t"], "GAME_EVENT");
    assert_eq!(event["s"], 1);
    assert_eq!(event["d"]["player_id"], "p1");
}

#[tokio::test]
async fn garbage_before_identify_is_rejected_without_closing() {
    let addr = spawn_server(Config::for_instance("inst_a")).await;
    let mut ws = connect(addr).await;

    ws.send(Message::text("garbage")).await.unwrap();
    let reply = next_json(&mut ws).await;
    assert_eq!(reply["t"], "ERROR");

    // Still unidentified and still connected: a valid IDENTIFY goes through.
    identify(&mut ws, "p1").await;
}

#[tokio::test]
async fn idle_connection_is_closed() {
    let mut config = Config::for_instance("inst_a");
    config.idle_timeout_secs = 1;
    let addr = spawn_server(config).await;
    let mut ws = connect(addr).await;
    identify(&mut ws, "p1").await;

    // No further frames from us; the server must close within the window.
    let closed = timeout(Duration::from_secs(5), async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Close(_))) | None => return true,
                Some(Ok(_)) => continue,
                Some(Err(_)) => return true,
            }
        }
    })
    .await
    .expect("server did not close the idle connection");
    assert!(closed);
}
