//! Authoritative per-game state held by the session store.

use std::collections::HashMap;
use std::time::Instant;

use serde_json::Value;

use super::types::SessionSnapshot;

/// One active turn-based game. Owned by [`super::store::SessionStore`]; all
/// mutation goes through the store's per-session lock.
pub struct GameSession {
    pub game_id: String,
    pub game_type: String,
    /// Ordered, fixed at creation. Turn order follows this ordering.
    pub participants: Vec<String>,
    /// Current domain state, opaque to the core.
    pub state: Value,
    /// Monotonically increasing; one slot per accepted action.
    pub seq: u64,
    /// Index into `participants` of the player whose turn it is.
    pub mover_idx: usize,
    pub terminal: bool,
    /// Last accepted nonce per player, for idempotent retry detection.
    pub accepted_nonces: HashMap<String, String>,
    /// Updated on every accepted mutation; drives the expiry sweep.
    pub touched_at: Instant,
}

impl GameSession {
    pub fn new(game_id: String, game_type: String, participants: Vec<String>, state: Value) -> Self {
        Self {
            game_id,
            game_type,
            participants,
            state,
            seq: 0,
            mover_idx: 0,
            terminal: false,
            accepted_nonces: HashMap::new(),
            touched_at: Instant::now(),
        }
    }

    /// The player whose turn it is, or `None` once the game is terminal.
    pub fn current_mover(&self) -> Option<&str> {
        if self.terminal {
            return None;
        }
        self.participants.get(self.mover_idx).map(String::as_str)
    }

    pub fn is_participant(&self, player_id: &str) -> bool {
        self.participants.iter().any(|p| p == player_id)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            game_id: self.game_id.clone(),
            game_type: self.game_type.clone(),
            participants: self.participants.clone(),
            state: self.state.clone(),
            seq: self.seq,
            current_mover: self.current_mover().map(str::to_string),
            terminal: self.terminal,
        }
    }
}
