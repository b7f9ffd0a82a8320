//! Core data types exchanged between the gateway, the session store, and the bus.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An inbound request to change game state, already decoded from the wire.
#[derive(Debug, Clone, Deserialize)]
pub struct Action {
    pub game_id: String,
    pub player_id: String,
    /// Domain-specific move descriptor, opaque to the core.
    pub data: Value,
    /// Client-supplied nonce for idempotent retry detection.
    #[serde(default)]
    pub nonce: Option<String>,
}

/// The authoritative, broadcastable result of an accepted [`Action`].
///
/// Carries the full resulting state snapshot so instances that receive it off
/// the bus can adopt it without re-running the turn engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub game_id: String,
    /// Per-game monotonic sequence number; one slot per accepted action.
    pub seq: u64,
    /// Instance that validated the action. Used to drop self-originated
    /// events received back off the bus.
    pub origin: String,
    pub player_id: String,
    /// The accepted move descriptor, echoed back to clients.
    pub data: Value,
    /// Resulting authoritative state.
    pub state: Value,
    pub next_mover: Option<String>,
    pub terminal: bool,
}

/// Why an action was not accepted. Delivered to the submitting connection
/// only; never broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    SessionNotFound,
    SessionTerminal,
    UnknownGameType,
    NotJoined,
    NotAParticipant,
    NotYourTurn,
    IllegalMove,
    DuplicateAction,
}

impl Rejection {
    pub fn code(&self) -> &'static str {
        match self {
            Rejection::SessionNotFound => "SESSION_NOT_FOUND",
            Rejection::SessionTerminal => "SESSION_TERMINAL",
            Rejection::UnknownGameType => "UNKNOWN_GAME_TYPE",
            Rejection::NotJoined => "NOT_JOINED",
            Rejection::NotAParticipant => "NOT_A_PARTICIPANT",
            Rejection::NotYourTurn => "NOT_YOUR_TURN",
            Rejection::IllegalMove => "ILLEGAL_MOVE",
            Rejection::DuplicateAction => "DUPLICATE_ACTION",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Rejection::SessionNotFound => "session not found",
            Rejection::SessionTerminal => "session has ended",
            Rejection::UnknownGameType => "no rule set registered for this game type",
            Rejection::NotJoined => "connection has not joined this game",
            Rejection::NotAParticipant => "you are not a participant in this game",
            Rejection::NotYourTurn => "not your turn",
            Rejection::IllegalMove => "illegal move",
            Rejection::DuplicateAction => "duplicate action (nonce already accepted)",
        }
    }
}

/// Read-only view of a session, handed to the gateway for GAME_JOINED
/// payloads and to tests.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub game_id: String,
    pub game_type: String,
    pub participants: Vec<String>,
    pub state: Value,
    pub seq: u64,
    pub current_mover: Option<String>,
    pub terminal: bool,
}
