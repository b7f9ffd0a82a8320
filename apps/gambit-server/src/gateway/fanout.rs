//! Instance-local fan-out hub.
//!
//! Uses a single `tokio::sync::broadcast` channel. Each connection loop
//! subscribes once and filters payloads by the game it is watching. Both
//! locally accepted events and events adopted off the cross-instance bus go
//! through here, after the session store has already enforced
//! `(game_id, seq)` idempotence.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::game::Event;

use super::events::{EventName, GatewayMessage};

/// Capacity of the broadcast channel. Slow receivers that fall behind will
/// skip messages (RecvError::Lagged).
const BROADCAST_CAPACITY: usize = 4096;

/// A payload fanned out to all connected gateway sessions on this instance.
#[derive(Debug, Clone)]
pub struct EventPayload {
    /// The game this event belongs to; connection loops filter on it.
    pub game_id: String,
    pub event_name: &'static str,
    pub seq: Option<u64>,
    pub message: GatewayMessage,
}

impl EventPayload {
    /// Wrap an accepted event for local delivery.
    pub fn game_event(event: &Event) -> Self {
        Self {
            game_id: event.game_id.clone(),
            event_name: EventName::GAME_EVENT,
            seq: Some(event.seq),
            message: GatewayMessage::game_event(event),
        }
    }
}

/// The per-instance fan-out hub. Cloneable — store in AppState.
#[derive(Clone)]
pub struct GameBroadcast {
    sender: broadcast::Sender<Arc<EventPayload>>,
}

impl GameBroadcast {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self { sender }
    }

    /// Subscribe to the hub. Each connection loop calls this once.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<EventPayload>> {
        self.sender.subscribe()
    }

    /// Fan an event payload out to all connection loops on this instance.
    pub fn dispatch(&self, payload: EventPayload) {
        // send() returns Err if there are no receivers — that's fine.
        let _ = self.sender.send(Arc::new(payload));
    }
}

impl Default for GameBroadcast {
    fn default() -> Self {
        Self::new()
    }
}
