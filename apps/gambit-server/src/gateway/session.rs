//! Per-connection gateway state.

/// State for a single WebSocket connection, owned by its event loop.
pub struct GatewaySession {
    /// Unique connection identifier (`conn_` prefixed ULID).
    pub conn_id: String,
    /// Externally supplied player identity, bound at IDENTIFY.
    pub player_id: String,
    /// The game this connection is bound to, set at JOIN. At most one at a
    /// time; joining another game replaces it.
    pub game_id: Option<String>,
}

impl GatewaySession {
    pub fn new(conn_id: String, player_id: String) -> Self {
        Self {
            conn_id,
            player_id,
            game_id: None,
        }
    }

    /// Whether this connection should receive events for a given game.
    pub fn is_watching(&self, game_id: &str) -> bool {
        self.game_id.as_deref() == Some(game_id)
    }
}
