//! Instance-local registry of live connections.
//!
//! Tracks which players are connected here and which connections watch which
//! game. Entirely in-memory; rebuilt empty on restart. A player missing from
//! `lookup` is connected to another instance or offline, never an error.

use std::collections::HashSet;

use dashmap::DashMap;

/// Metadata for one live connection.
#[derive(Debug, Clone)]
pub struct ConnectionEntry {
    pub conn_id: String,
    pub player_id: String,
    pub game_id: Option<String>,
}

pub struct ConnectionRegistry {
    conns: DashMap<String, ConnectionEntry>,
    /// player id → connection id. A reconnect overwrites the old mapping.
    players: DashMap<String, String>,
    /// game id → connection ids watching it on this instance.
    games: DashMap<String, HashSet<String>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            conns: DashMap::new(),
            players: DashMap::new(),
            games: DashMap::new(),
        }
    }

    /// Register a new connection after IDENTIFY.
    pub fn register(&self, conn_id: &str, player_id: &str) {
        self.conns.insert(
            conn_id.to_string(),
            ConnectionEntry {
                conn_id: conn_id.to_string(),
                player_id: player_id.to_string(),
                game_id: None,
            },
        );
        self.players
            .insert(player_id.to_string(), conn_id.to_string());
    }

    /// Remove a connection on disconnect. Touches no session state: a
    /// turn-based game outlives a temporary disconnect.
    pub fn unregister(&self, conn_id: &str) {
        let Some((_, entry)) = self.conns.remove(conn_id) else {
            return;
        };
        // Only drop the player mapping if it still points at this connection;
        // a reconnect may already have replaced it.
        self.players
            .remove_if(&entry.player_id, |_, mapped| mapped == conn_id);
        if let Some(game_id) = &entry.game_id {
            self.leave_game(conn_id, game_id);
        }
    }

    /// Connection id for a player, if connected to this instance.
    pub fn lookup(&self, player_id: &str) -> Option<String> {
        self.players.get(player_id).map(|c| c.clone())
    }

    /// Connections on this instance watching a game.
    pub fn connections_for(&self, game_id: &str) -> Vec<String> {
        self.games
            .get(game_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Bind a connection to a game, replacing any previous binding.
    pub fn join_game(&self, conn_id: &str, game_id: &str) {
        let previous = self
            .conns
            .get_mut(conn_id)
            .and_then(|mut entry| entry.game_id.replace(game_id.to_string()));
        if let Some(previous) = previous {
            if previous != game_id {
                self.leave_game(conn_id, &previous);
            }
        }
        self.games
            .entry(game_id.to_string())
            .or_default()
            .insert(conn_id.to_string());
    }

    fn leave_game(&self, conn_id: &str, game_id: &str) {
        if let Some(mut set) = self.games.get_mut(game_id) {
            set.remove(conn_id);
        }
        self.games.remove_if(game_id, |_, set| set.is_empty());
    }

    pub fn len(&self) -> usize {
        self.conns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conns.is_empty()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
