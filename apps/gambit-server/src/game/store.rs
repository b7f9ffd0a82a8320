//! In-memory session store with per-session single-writer discipline.
//!
//! Uses `DashMap` for shard-level concurrency and `parking_lot::Mutex` per
//! session for non-poisoning, fast locking. The per-session mutex is the only
//! serialization point in the system: concurrent actions against the same
//! game queue on it, while unrelated games proceed in parallel.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;

use super::engine;
use super::rules::RuleBook;
use super::session::GameSession;
use super::types::{Action, Event, Rejection, SessionSnapshot};

pub struct SessionStore {
    sessions: DashMap<String, Mutex<GameSession>>,
    /// Stamped as `origin` on every event accepted here.
    instance_id: String,
}

impl SessionStore {
    pub fn new(instance_id: impl Into<String>) -> Self {
        Self {
            sessions: DashMap::new(),
            instance_id: instance_id.into(),
        }
    }

    /// Create a session if absent and return its snapshot. Concurrent calls
    /// for the same id race on the map entry; all see the same session.
    pub fn create(
        &self,
        game_id: &str,
        game_type: &str,
        participants: Vec<String>,
        rules: &RuleBook,
    ) -> Result<SessionSnapshot, Rejection> {
        let rule_set = rules.get(game_type).ok_or(Rejection::UnknownGameType)?;
        let entry = self.sessions.entry(game_id.to_string()).or_insert_with(|| {
            let state = rule_set.initial_state(&participants);
            Mutex::new(GameSession::new(
                game_id.to_string(),
                game_type.to_string(),
                participants,
                state,
            ))
        });
        let snapshot = entry.lock().snapshot();
        Ok(snapshot)
    }

    pub fn get(&self, game_id: &str) -> Option<SessionSnapshot> {
        let entry = self.sessions.get(game_id)?;
        let snapshot = entry.lock().snapshot();
        Some(snapshot)
    }

    pub fn contains(&self, game_id: &str) -> bool {
        self.sessions.contains_key(game_id)
    }

    /// Validate and apply a locally submitted action.
    ///
    /// Atomic per session: the per-entry lock is held across validation and
    /// mutation, so exactly one action wins each sequence-number slot. The
    /// loser of a race is validated against post-mutation state.
    ///
    /// `deliver` runs while the lock is still held, so deliveries for one
    /// session happen in sequence order. It must not block.
    pub fn apply_action(
        &self,
        action: &Action,
        rules: &RuleBook,
        deliver: impl FnOnce(&Event),
    ) -> Result<Event, Rejection> {
        let entry = self
            .sessions
            .get(&action.game_id)
            .ok_or(Rejection::SessionNotFound)?;
        let mut session = entry.lock();

        let rule_set = rules
            .get(&session.game_type)
            .ok_or(Rejection::UnknownGameType)?;
        let accepted = engine::validate(&session, action, rule_set.as_ref())?;

        session.seq += 1;
        session.state = accepted.new_state;
        session.terminal = accepted.terminal;
        if !session.terminal {
            session.mover_idx = (session.mover_idx + 1) % session.participants.len();
        }
        if let Some(nonce) = &action.nonce {
            session
                .accepted_nonces
                .insert(action.player_id.clone(), nonce.clone());
        }
        session.touched_at = Instant::now();

        let event = Event {
            game_id: session.game_id.clone(),
            seq: session.seq,
            origin: self.instance_id.clone(),
            player_id: action.player_id.clone(),
            data: action.data.clone(),
            state: session.state.clone(),
            next_mover: session.current_mover().map(str::to_string),
            terminal: session.terminal,
        };
        deliver(&event);
        Ok(event)
    }

    /// Adopt an event validated by another instance.
    ///
    /// Returns `true` if the event advanced local state; `false` for stale
    /// or duplicate events and for sessions this instance has no record of.
    /// The bus gives no ordering or exactly-once guarantee, so this check is
    /// the safety net. As with [`SessionStore::apply_action`], `deliver`
    /// runs under the session lock only when the event is adopted.
    pub fn apply_remote(&self, event: &Event, deliver: impl FnOnce(&Event)) -> bool {
        let Some(entry) = self.sessions.get(&event.game_id) else {
            return false;
        };
        let mut session = entry.lock();
        if event.seq <= session.seq {
            return false;
        }

        session.seq = event.seq;
        session.state = event.state.clone();
        session.terminal = event.terminal;
        if let Some(next) = &event.next_mover {
            if let Some(idx) = session.participants.iter().position(|p| p == next) {
                session.mover_idx = idx;
            }
        }
        session.touched_at = Instant::now();
        deliver(event);
        true
    }

    /// Remove sessions untouched for longer than `ttl`. Returns the number
    /// removed.
    pub fn remove_expired(&self, ttl: Duration) -> usize {
        let now = Instant::now();
        let before = self.sessions.len();
        self.sessions
            .retain(|_, session| now.duration_since(session.lock().touched_at) < ttl);
        before - self.sessions.len()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn store_with_game() -> (SessionStore, RuleBook) {
        let store = SessionStore::new("inst_a");
        let rules = RuleBook::with_defaults();
        store
            .create("g1", "move_log", vec!["p1".into(), "p2".into()], &rules)
            .unwrap();
        (store, rules)
    }

    fn action(player: &str, mv: &str) -> Action {
        Action {
            game_id: "g1".into(),
            player_id: player.into(),
            data: serde_json::json!({ "move": mv }),
            nonce: None,
        }
    }

    #[test]
    fn create_is_idempotent() {
        let (store, rules) = store_with_game();
        store.apply_action(&action("p1", "e2e4"), &rules, |_| {}).unwrap();

        // Second create returns the live session, not a fresh one.
        let snap = store
            .create("g1", "move_log", vec!["p1".into(), "p2".into()], &rules)
            .unwrap();
        assert_eq!(snap.seq, 1);
    }

    #[test]
    fn create_unknown_game_type() {
        let store = SessionStore::new("inst_a");
        let rules = RuleBook::with_defaults();
        let err = store
            .create("g1", "chess", vec!["p1".into(), "p2".into()], &rules)
            .unwrap_err();
        assert_eq!(err, Rejection::UnknownGameType);
    }

    #[test]
    fn sequence_increments_per_accepted_action() {
        let (store, rules) = store_with_game();

        let e1 = store.apply_action(&action("p1", "e2e4"), &rules, |_| {}).unwrap();
        assert_eq!(e1.seq, 1);
        assert_eq!(e1.origin, "inst_a");
        assert_eq!(e1.next_mover.as_deref(), Some("p2"));

        let e2 = store.apply_action(&action("p2", "e7e5"), &rules, |_| {}).unwrap();
        assert_eq!(e2.seq, 2);
        assert_eq!(e2.next_mover.as_deref(), Some("p1"));
    }

    #[test]
    fn action_against_unknown_session() {
        let store = SessionStore::new("inst_a");
        let rules = RuleBook::with_defaults();
        let err = store.apply_action(&action("p1", "e2e4"), &rules, |_| {}).unwrap_err();
        assert_eq!(err, Rejection::SessionNotFound);
    }

    #[test]
    fn resign_makes_session_terminal() {
        let (store, rules) = store_with_game();
        let event = store.apply_action(&action("p1", "resign"), &rules, |_| {}).unwrap();
        assert!(event.terminal);
        assert_eq!(event.next_mover, None);

        let err = store.apply_action(&action("p2", "e7e5"), &rules, |_| {}).unwrap_err();
        assert_eq!(err, Rejection::SessionTerminal);
    }

    #[test]
    fn concurrent_actions_one_winner_per_slot() {
        let (store, rules) = store_with_game();
        let store = Arc::new(store);
        let rules = Arc::new(rules);

        // Eight copies of p1's move race for seq slot 1; exactly one wins,
        // the rest see post-mutation state and get NotYourTurn.
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                let rules = rules.clone();
                std::thread::spawn(move || store.apply_action(&action("p1", "e2e4"), &rules, |_| {}))
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let accepted: Vec<_> = results.iter().filter(|r| r.is_ok()).collect();
        assert_eq!(accepted.len(), 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| *e == Rejection::NotYourTurn));
        assert_eq!(store.get("g1").unwrap().seq, 1);
    }

    #[test]
    fn delivery_order_matches_sequence_order() {
        let (store, rules) = store_with_game();
        let store = Arc::new(store);
        let rules = Arc::new(rules);
        let delivered = Arc::new(parking_lot::Mutex::new(Vec::new()));

        // p1 and p2 hammer the session from two threads. Delivery runs under
        // the session lock, so whatever interleaving the threads produce, the
        // delivered sequence numbers come out strictly increasing.
        let handles: Vec<_> = ["p1", "p2"]
            .into_iter()
            .map(|player| {
                let store = store.clone();
                let rules = rules.clone();
                let delivered = delivered.clone();
                std::thread::spawn(move || {
                    let mut accepted = 0;
                    while accepted < 10 {
                        let result = store.apply_action(&action(player, "e2e4"), &rules, |e| {
                            delivered.lock().push(e.seq);
                        });
                        if result.is_ok() {
                            accepted += 1;
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let delivered = delivered.lock();
        assert_eq!(delivered.len(), 20);
        assert!(delivered.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn independent_sessions_do_not_interfere() {
        let (store, rules) = store_with_game();
        store
            .create("g2", "move_log", vec!["p3".into(), "p4".into()], &rules)
            .unwrap();

        store.apply_action(&action("p1", "e2e4"), &rules, |_| {}).unwrap();
        let mut a = action("p3", "d2d4");
        a.game_id = "g2".into();
        let e = store.apply_action(&a, &rules, |_| {}).unwrap();
        assert_eq!(e.seq, 1);
        assert_eq!(store.get("g1").unwrap().seq, 1);
    }

    #[test]
    fn remote_event_applies_once() {
        let (store, rules) = store_with_game();
        let _ = rules;

        let event = Event {
            game_id: "g1".into(),
            seq: 1,
            origin: "inst_b".into(),
            player_id: "p1".into(),
            data: serde_json::json!({ "move": "e2e4" }),
            state: serde_json::json!({ "moves": [{ "by": 0, "move": "e2e4" }] }),
            next_mover: Some("p2".into()),
            terminal: false,
        };

        assert!(store.apply_remote(&event, |_| {}));
        // Redelivery is a silent no-op.
        assert!(!store.apply_remote(&event, |_| {}));

        let snap = store.get("g1").unwrap();
        assert_eq!(snap.seq, 1);
        assert_eq!(snap.current_mover.as_deref(), Some("p2"));
    }

    #[test]
    fn stale_remote_event_discarded() {
        let (store, rules) = store_with_game();
        store.apply_action(&action("p1", "e2e4"), &rules, |_| {}).unwrap();
        store.apply_action(&action("p2", "e7e5"), &rules, |_| {}).unwrap();

        let stale = Event {
            game_id: "g1".into(),
            seq: 1,
            origin: "inst_b".into(),
            player_id: "p1".into(),
            data: serde_json::json!({ "move": "e2e4" }),
            state: serde_json::json!({ "moves": [] }),
            next_mover: Some("p2".into()),
            terminal: false,
        };
        assert!(!store.apply_remote(&stale, |_| {}));
        assert_eq!(store.get("g1").unwrap().seq, 2);
    }

    #[test]
    fn remote_event_for_unknown_session_discarded() {
        let store = SessionStore::new("inst_a");
        let event = Event {
            game_id: "g9".into(),
            seq: 1,
            origin: "inst_b".into(),
            player_id: "p1".into(),
            data: serde_json::json!({ "move": "e2e4" }),
            state: serde_json::json!({}),
            next_mover: None,
            terminal: false,
        };
        assert!(!store.apply_remote(&event, |_| {}));
    }

    #[test]
    fn remove_expired_sweeps_idle_sessions() {
        let (store, rules) = store_with_game();
        store
            .create("g2", "move_log", vec!["p3".into(), "p4".into()], &rules)
            .unwrap();

        // Backdate g1's activity.
        {
            let entry = store.sessions.get("g1").unwrap();
            entry.lock().touched_at = Instant::now() - Duration::from_secs(7200);
        }

        let removed = store.remove_expired(Duration::from_secs(3600));
        assert_eq!(removed, 1);
        assert!(store.get("g1").is_none());
        assert!(store.get("g2").is_some());
    }
}
