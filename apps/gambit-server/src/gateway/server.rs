//! WebSocket upgrade handler and per-connection event loop.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast;
use tokio::time;

use crate::AppState;

use super::dispatch::{handle_action, handle_identify, handle_join};
use super::events::{
    ActionPayload, ClientMessage, GatewayMessage, HeartbeatPayload, IdentifyPayload, JoinPayload,
    OP_ACTION, OP_HEARTBEAT, OP_IDENTIFY, OP_JOIN,
};
use super::fanout::EventPayload;
use super::session::GatewaySession;

/// Close codes (4000-range for application-level).
const CLOSE_SESSION_TIMEOUT: u16 = 4009;

/// Timeout for receiving IDENTIFY after connection (seconds).
const IDENTIFY_TIMEOUT_SECS: u64 = 10;

type WsSink = futures_util::stream::SplitSink<WebSocket, Message>;
type WsStream = futures_util::stream::SplitStream<WebSocket>;

pub fn router() -> Router<AppState> {
    Router::new().route("/gateway", get(ws_upgrade))
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

async fn handle_connection(socket: WebSocket, state: AppState) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    // Step 1: wait for IDENTIFY within the timeout. Malformed messages are
    // rejected individually without closing the connection.
    let identify = time::timeout(Duration::from_secs(IDENTIFY_TIMEOUT_SECS), async {
        while let Some(msg) = ws_rx.next().await {
            let msg = match msg {
                Ok(m) => m,
                Err(e) => {
                    tracing::debug!(?e, "ws read error during identify");
                    return None;
                }
            };

            let text = match msg {
                Message::Text(t) => t,
                Message::Close(_) => return None,
                Message::Ping(_) | Message::Pong(_) => continue,
                _ => continue,
            };

            let payload = serde_json::from_str::<ClientMessage>(&text)
                .ok()
                .filter(|m| m.op == OP_IDENTIFY)
                .and_then(|m| serde_json::from_value::<IdentifyPayload>(m.d).ok());
            match payload {
                Some(payload) => return Some(payload),
                None => {
                    let err = GatewayMessage::protocol_error("expected a valid IDENTIFY");
                    if send_message(&mut ws_tx, &err).await.is_err() {
                        return None;
                    }
                }
            }
        }
        None
    })
    .await;

    let payload = match identify {
        Ok(Some(payload)) => payload,
        Ok(None) => return,
        Err(_timeout) => {
            let _ = send_close(&mut ws_tx, CLOSE_SESSION_TIMEOUT, "Identify timeout").await;
            return;
        }
    };

    let (session, ready_msg) = handle_identify(&state, payload);

    tracing::info!(
        conn_id = %session.conn_id,
        player_id = %session.player_id,
        "gateway session established"
    );

    if send_message(&mut ws_tx, &ready_msg).await.is_err() {
        state.registry.unregister(&session.conn_id);
        return;
    }

    // Run the main event loop.
    let broadcast_rx = state.broadcast.subscribe();
    let mut session = session;
    run_session(&state, &mut session, ws_tx, ws_rx, broadcast_rx).await;

    // Teardown touches only the registry; session state outlives a disconnect.
    state.registry.unregister(&session.conn_id);

    tracing::info!(
        conn_id = %session.conn_id,
        player_id = %session.player_id,
        "gateway session ended"
    );
}

/// Main session event loop: read client messages, forward fan-out payloads,
/// enforce the idle window.
async fn run_session(
    state: &AppState,
    session: &mut GatewaySession,
    mut ws_tx: WsSink,
    mut ws_rx: WsStream,
    mut broadcast_rx: broadcast::Receiver<Arc<EventPayload>>,
) {
    let idle_window = Duration::from_secs(state.config.idle_timeout_secs);
    let mut idle_timer = time::interval(idle_window);
    idle_timer.tick().await; // First tick fires immediately; skip it.
    let mut saw_activity = true;

    loop {
        tokio::select! {
            // Client sends us a message.
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        saw_activity = true;
                        if let Some(reply) = handle_text_frame(state, session, &text) {
                            if send_message(&mut ws_tx, &reply).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                        saw_activity = true;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(?e, conn_id = %session.conn_id, "ws read error");
                        break;
                    }
                    _ => continue,
                }
            }

            // Event from the local fan-out hub.
            result = broadcast_rx.recv() => {
                match result {
                    Ok(payload) => {
                        if !session.is_watching(&payload.game_id) {
                            continue;
                        }
                        if send_message(&mut ws_tx, &payload.message).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(
                            conn_id = %session.conn_id,
                            skipped = n,
                            "gateway session lagged behind fan-out"
                        );
                        // Continue — we just drop the missed events.
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        break;
                    }
                }
            }

            // Idle window check.
            _ = idle_timer.tick() => {
                if !saw_activity {
                    tracing::debug!(
                        conn_id = %session.conn_id,
                        "idle timeout — closing connection"
                    );
                    let _ = send_close(&mut ws_tx, CLOSE_SESSION_TIMEOUT, "Idle timeout").await;
                    break;
                }
                saw_activity = false;
            }
        }
    }
}

/// Decode and route one inbound text frame. A frame that is not valid JSON
/// gets an ERROR dispatch; the connection stays open either way.
fn handle_text_frame(
    state: &AppState,
    session: &mut GatewaySession,
    text: &str,
) -> Option<GatewayMessage> {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(msg) => handle_client_message(state, session, msg),
        Err(_) => Some(GatewayMessage::protocol_error("invalid JSON")),
    }
}

/// Route one decoded client message. Returns the reply to write to this
/// connection, if any. Accepted actions are delivered through the fan-out
/// hub, so the event itself needs no direct reply here.
fn handle_client_message(
    state: &AppState,
    session: &mut GatewaySession,
    msg: ClientMessage,
) -> Option<GatewayMessage> {
    match msg.op {
        OP_HEARTBEAT => {
            let payload: HeartbeatPayload =
                serde_json::from_value(msg.d).unwrap_or(HeartbeatPayload { seq: 0 });
            Some(GatewayMessage::heartbeat_ack(payload.seq))
        }
        OP_JOIN => match serde_json::from_value::<JoinPayload>(msg.d) {
            Ok(payload) => Some(handle_join(state, session, payload)),
            Err(_) => Some(GatewayMessage::protocol_error("invalid JOIN payload")),
        },
        OP_ACTION => match serde_json::from_value::<ActionPayload>(msg.d) {
            Ok(payload) => {
                let game_id = payload.game_id.clone();
                match handle_action(state, session, payload) {
                    // Delivered via the fan-out hub to all watchers,
                    // including this connection.
                    Ok(_event) => None,
                    Err(rejection) => Some(GatewayMessage::rejection(&game_id, rejection)),
                }
            }
            Err(_) => Some(GatewayMessage::protocol_error("invalid ACTION payload")),
        },
        OP_IDENTIFY => Some(GatewayMessage::protocol_error("already identified")),
        other => {
            tracing::debug!(conn_id = %session.conn_id, op = other, "unknown opcode");
            Some(GatewayMessage::protocol_error("unknown opcode"))
        }
    }
}

async fn send_message(ws_tx: &mut WsSink, msg: &GatewayMessage) -> Result<(), axum::Error> {
    let json = serde_json::to_string(msg).unwrap();
    ws_tx.send(Message::Text(json.into())).await
}

/// Send a WebSocket close frame with a code and reason.
async fn send_close(ws_tx: &mut WsSink, code: u16, reason: &str) -> Result<(), axum::Error> {
    let close_msg = Message::Close(Some(axum::extract::ws::CloseFrame {
        code,
        reason: reason.to_string().into(),
    }));
    ws_tx.send(close_msg).await
}
