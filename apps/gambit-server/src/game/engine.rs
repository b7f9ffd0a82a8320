//! Turn validation: a pure function of (session state, action).
//!
//! Callers hold the store's per-session lock, so validation always sees the
//! latest applied state. The loser of a race for the lock is re-validated
//! against post-mutation state and comes back [`Rejection::NotYourTurn`].

use serde_json::Value;

use super::rules::RuleSet;
use super::session::GameSession;
use super::types::{Action, Rejection};

/// An accepted state transition, not yet applied to the session.
#[derive(Debug)]
pub struct Accepted {
    pub new_state: Value,
    pub terminal: bool,
}

/// Validate `action` against `session` under the given rule set.
///
/// No side effects; the store applies the result under its lock.
pub fn validate(
    session: &GameSession,
    action: &Action,
    rules: &dyn RuleSet,
) -> Result<Accepted, Rejection> {
    if session.terminal {
        return Err(Rejection::SessionTerminal);
    }
    if !session.is_participant(&action.player_id) {
        return Err(Rejection::NotAParticipant);
    }
    if let Some(nonce) = &action.nonce {
        if session.accepted_nonces.get(&action.player_id) == Some(nonce) {
            return Err(Rejection::DuplicateAction);
        }
    }
    if session.current_mover() != Some(action.player_id.as_str()) {
        return Err(Rejection::NotYourTurn);
    }
    if !rules.legal(&session.state, session.mover_idx, &action.data) {
        return Err(Rejection::IllegalMove);
    }

    let outcome = rules.apply(&session.state, session.mover_idx, &action.data);
    Ok(Accepted {
        new_state: outcome.state,
        terminal: outcome.terminal,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::rules::MoveLog;

    fn session() -> GameSession {
        let rules = MoveLog;
        let participants = vec!["p1".to_string(), "p2".to_string()];
        let state = rules.initial_state(&participants);
        GameSession::new("g1".into(), "move_log".into(), participants, state)
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
    fn accepts_current_mover() {
        let s = session();
        let accepted = validate(&s, &action("p1", "e2e4"), &MoveLog).unwrap();
        assert!(!accepted.terminal);
        assert_eq!(accepted.new_state["moves"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn rejects_out_of_turn() {
        let s = session();
        let err = validate(&s, &action("p2", "e7e5"), &MoveLog).unwrap_err();
        assert_eq!(err, Rejection::NotYourTurn);
    }

    #[test]
    fn rejects_non_participant() {
        let s = session();
        let err = validate(&s, &action("p3", "e2e4"), &MoveLog).unwrap_err();
        assert_eq!(err, Rejection::NotAParticipant);
    }

    #[test]
    fn rejects_terminal_session() {
        let mut s = session();
        s.terminal = true;
        let err = validate(&s, &action("p1", "e2e4"), &MoveLog).unwrap_err();
        assert_eq!(err, Rejection::SessionTerminal);
    }

    #[test]
    fn rejects_illegal_move() {
        let s = session();
        let mut a = action("p1", "e2e4");
        a.data = serde_json::json!({ "move": "" });
        let err = validate(&s, &a, &MoveLog).unwrap_err();
        assert_eq!(err, Rejection::IllegalMove);
    }

    #[test]
    fn rejects_replayed_nonce() {
        let mut s = session();
        s.accepted_nonces.insert("p1".into(), "n-1".into());

        let mut a = action("p1", "e2e4");
        a.nonce = Some("n-1".into());
        assert_eq!(validate(&s, &a, &MoveLog).unwrap_err(), Rejection::DuplicateAction);

        // A fresh nonce goes through.
        a.nonce = Some("n-2".into());
        assert!(validate(&s, &a, &MoveLog).is_ok());
    }

    #[test]
    fn rejection_leaves_session_untouched() {
        let s = session();
        let before = s.state.clone();
        let _ = validate(&s, &action("p2", "e7e5"), &MoveLog);
        assert_eq!(s.state, before);
        assert_eq!(s.seq, 0);
    }
}
