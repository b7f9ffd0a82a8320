//! Domain rule-set capability boundary.
//!
//! The core never knows game-specific rules; it calls through [`RuleSet`],
//! selected per session at creation time from the [`RuleBook`].

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;

/// Result of applying a legal move.
pub struct Outcome {
    pub state: Value,
    pub terminal: bool,
}

/// Capability interface implemented per game type (chess, checkers, ...).
///
/// Implementations must be pure: no side effects, same output for the same
/// `(state, mover_idx, data)` input. The turn engine relies on this for
/// deterministic validation under the store's per-session lock.
pub trait RuleSet: Send + Sync {
    /// The state a fresh session starts from.
    fn initial_state(&self, participants: &[String]) -> Value;

    /// Whether `data` is a structurally legal move in `state`.
    fn legal(&self, state: &Value, mover_idx: usize, data: &Value) -> bool;

    /// Apply a move already checked by [`RuleSet::legal`].
    fn apply(&self, state: &Value, mover_idx: usize, data: &Value) -> Outcome;
}

/// Registry of rule sets by game-type name.
pub struct RuleBook {
    rule_sets: DashMap<String, Arc<dyn RuleSet>>,
}

impl RuleBook {
    pub fn new() -> Self {
        Self {
            rule_sets: DashMap::new(),
        }
    }

    /// A rule book with the built-in `move_log` rule set registered.
    pub fn with_defaults() -> Self {
        let book = Self::new();
        book.register("move_log", Arc::new(MoveLog));
        book
    }

    pub fn register(&self, game_type: &str, rules: Arc<dyn RuleSet>) {
        self.rule_sets.insert(game_type.to_string(), rules);
    }

    pub fn get(&self, game_type: &str) -> Option<Arc<dyn RuleSet>> {
        self.rule_sets.get(game_type).map(|r| r.clone())
    }
}

impl Default for RuleBook {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Built-in rule set that accepts any non-empty move string and records it.
///
/// Keeps the server runnable without an external rules engine; a `resign`
/// move ends the game.
pub struct MoveLog;

impl RuleSet for MoveLog {
    fn initial_state(&self, participants: &[String]) -> Value {
        serde_json::json!({
            "participants": participants,
            "moves": [],
        })
    }

    fn legal(&self, _state: &Value, _mover_idx: usize, data: &Value) -> bool {
        data.get("move")
            .and_then(Value::as_str)
            .is_some_and(|m| !m.is_empty())
    }

    fn apply(&self, state: &Value, mover_idx: usize, data: &Value) -> Outcome {
        let mv = data.get("move").and_then(Value::as_str).unwrap_or_default();
        let mut state = state.clone();
        if let Some(moves) = state.get_mut("moves").and_then(Value::as_array_mut) {
            moves.push(serde_json::json!({ "by": mover_idx, "move": mv }));
        }
        Outcome {
            state,
            terminal: mv == "resign",
        }
    }
}
