//! Gateway opcodes, event types, and wire-format messages.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::game::{Event, Rejection};

// ---------------------------------------------------------------------------
// Opcodes
// ---------------------------------------------------------------------------

pub const OP_DISPATCH: u8 = 0;
pub const OP_HEARTBEAT: u8 = 1;
pub const OP_IDENTIFY: u8 = 2;
pub const OP_JOIN: u8 = 3;
pub const OP_ACTION: u8 = 4;
pub const OP_HEARTBEAT_ACK: u8 = 6;

// ---------------------------------------------------------------------------
// Server → Client message
// ---------------------------------------------------------------------------

/// A message sent from the server to the client over WebSocket.
#[derive(Debug, Clone, Serialize)]
pub struct GatewayMessage {
    pub op: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
    /// Per-game sequence number on GAME_EVENT dispatches.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,
    pub d: Value,
}

impl GatewayMessage {
    /// Build a DISPATCH message (op=0).
    pub fn dispatch(event_name: &str, seq: Option<u64>, data: Value) -> Self {
        Self {
            op: OP_DISPATCH,
            t: Some(event_name.to_string()),
            s: seq,
            d: data,
        }
    }

    /// Build a GAME_EVENT dispatch from an accepted event.
    pub fn game_event(event: &Event) -> Self {
        Self::dispatch(
            EventName::GAME_EVENT,
            Some(event.seq),
            serde_json::json!({
                "game_id": event.game_id,
                "seq": event.seq,
                "player_id": event.player_id,
                "data": event.data,
                "state": event.state,
                "next_mover": event.next_mover,
                "terminal": event.terminal,
            }),
        )
    }

    /// Build an ACTION_REJECTED dispatch, delivered to the submitting
    /// connection only.
    pub fn rejection(game_id: &str, rejection: Rejection) -> Self {
        Self::dispatch(
            EventName::ACTION_REJECTED,
            None,
            serde_json::json!({
                "game_id": game_id,
                "code": rejection.code(),
                "message": rejection.message(),
            }),
        )
    }

    /// Build an ERROR dispatch for a malformed or unexpected message. The
    /// connection stays open; only the offending message is rejected.
    pub fn protocol_error(message: &str) -> Self {
        Self::dispatch(
            EventName::ERROR,
            None,
            serde_json::json!({ "message": message }),
        )
    }

    /// Build a HEARTBEAT_ACK message (op=6).
    pub fn heartbeat_ack(seq: u64) -> Self {
        Self {
            op: OP_HEARTBEAT_ACK,
            t: None,
            s: None,
            d: serde_json::json!({ "ack": seq }),
        }
    }
}

// ---------------------------------------------------------------------------
// Client → Server message
// ---------------------------------------------------------------------------

/// A message received from the client over WebSocket.
#[derive(Debug, Deserialize)]
pub struct ClientMessage {
    pub op: u8,
    #[serde(default)]
    pub t: Option<String>,
    #[serde(default)]
    pub d: Value,
}

// ---------------------------------------------------------------------------
// IDENTIFY payload
// ---------------------------------------------------------------------------

/// Player identity is supplied externally; there is no auth subsystem here.
#[derive(Debug, Deserialize)]
pub struct IdentifyPayload {
    pub player_id: String,
}

// ---------------------------------------------------------------------------
// JOIN payload
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct JoinPayload {
    pub game_id: String,
    /// Rule set selected at session creation. Ignored when joining an
    /// existing session.
    #[serde(default = "default_game_type")]
    pub game_type: String,
    /// Ordered participant list; required when the join creates the session.
    #[serde(default)]
    pub participants: Option<Vec<String>>,
}

fn default_game_type() -> String {
    "move_log".to_string()
}

// ---------------------------------------------------------------------------
// ACTION payload
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ActionPayload {
    pub game_id: String,
    pub data: Value,
    #[serde(default)]
    pub nonce: Option<String>,
}

// ---------------------------------------------------------------------------
// HEARTBEAT payload
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct HeartbeatPayload {
    #[serde(default)]
    pub seq: u64,
}

// ---------------------------------------------------------------------------
// Dispatch event types
// ---------------------------------------------------------------------------

/// Event names dispatched to clients.
pub struct EventName;

impl EventName {
    pub const READY: &'static str = "READY";
    pub const GAME_JOINED: &'static str = "GAME_JOINED";
    pub const GAME_EVENT: &'static str = "GAME_EVENT";
    pub const ACTION_REJECTED: &'static str = "ACTION_REJECTED";
    pub const ERROR: &'static str = "ERROR";
}
