//! Dispatch paths: client actions in, bus events in, fan-out and publish out.
//!
//! Client path: resolve session → apply under the store's per-session lock →
//! on Accept, deliver locally via the fan-out hub and publish to the bus; on
//! Reject, the caller writes the rejection to its own socket only. Bus path:
//! adopt if the sequence number is new, then deliver locally without
//! re-running the turn engine; stale and duplicate events drop silently.
//!
//! Both paths hand the fan-out to the store's delivery hook, which runs
//! while the per-session lock is held: local subscribers see each game's
//! events in sequence order.

use std::sync::Arc;
use std::time::Duration;

use gambit_common::id::{prefix, prefixed_ulid};
use rand::Rng;

use crate::bus::{codec, BroadcastBus};
use crate::game::{Action, Event, Rejection};
use crate::AppState;

use super::events::{ActionPayload, EventName, GatewayMessage, IdentifyPayload, JoinPayload};
use super::fanout::EventPayload;
use super::session::GatewaySession;

const MAX_PUBLISH_ATTEMPTS: u32 = 5;
const PUBLISH_BACKOFF_BASE_MS: u64 = 50;

/// Process an IDENTIFY opcode. Registers the connection and builds the READY
/// dispatch.
pub fn handle_identify(state: &AppState, payload: IdentifyPayload) -> (GatewaySession, GatewayMessage) {
    let conn_id = prefixed_ulid(prefix::CONNECTION);
    if let Some(previous) = state.registry.lookup(&payload.player_id) {
        tracing::debug!(
            player_id = %payload.player_id,
            previous_conn = %previous,
            "player identified again; newest connection wins the mapping"
        );
    }
    state.registry.register(&conn_id, &payload.player_id);

    let ready = GatewayMessage::dispatch(
        EventName::READY,
        None,
        serde_json::json!({
            "conn_id": conn_id,
            "player_id": payload.player_id,
            "instance_id": state.config.instance_id,
            "heartbeat_interval": state.config.heartbeat_interval_ms,
        }),
    );
    (GatewaySession::new(conn_id, payload.player_id), ready)
}

/// Process a JOIN opcode. Creates the session on first join, binds the
/// connection to the game, and returns the message to send back.
pub fn handle_join(
    state: &AppState,
    session: &mut GatewaySession,
    payload: JoinPayload,
) -> GatewayMessage {
    let snapshot = match state.store.get(&payload.game_id) {
        Some(snapshot) => snapshot,
        None => {
            let Some(participants) = payload.participants else {
                return GatewayMessage::protocol_error("participants required to create a game");
            };
            if participants.is_empty() {
                return GatewayMessage::protocol_error("participants must not be empty");
            }
            match state
                .store
                .create(&payload.game_id, &payload.game_type, participants, &state.rules)
            {
                Ok(snapshot) => snapshot,
                Err(rejection) => return GatewayMessage::rejection(&payload.game_id, rejection),
            }
        }
    };

    state.registry.join_game(&session.conn_id, &payload.game_id);
    session.game_id = Some(payload.game_id.clone());

    tracing::info!(
        conn_id = %session.conn_id,
        player_id = %session.player_id,
        game_id = %payload.game_id,
        local_watchers = state.registry.connections_for(&payload.game_id).len(),
        "connection joined game"
    );

    GatewayMessage::dispatch(
        EventName::GAME_JOINED,
        Some(snapshot.seq),
        serde_json::to_value(&snapshot).unwrap_or_default(),
    )
}

/// Process an ACTION opcode.
///
/// On acceptance the event is fanned out to local connections and handed to
/// the bus publisher on an independent task, so tearing down the submitting
/// connection never cancels an in-flight publish.
pub fn handle_action(
    state: &AppState,
    session: &GatewaySession,
    payload: ActionPayload,
) -> Result<Event, Rejection> {
    // Acting in a game requires a JOIN first; the submitter would otherwise
    // never see the resulting event.
    if !session.is_watching(&payload.game_id) {
        if state.store.contains(&payload.game_id) {
            return Err(Rejection::NotJoined);
        }
        return Err(Rejection::SessionNotFound);
    }

    let action = Action {
        game_id: payload.game_id,
        player_id: session.player_id.clone(),
        data: payload.data,
        nonce: payload.nonce,
    };

    // Fan out under the session lock so local delivery order matches
    // sequence order.
    let event = state.store.apply_action(&action, &state.rules, |event| {
        state.broadcast.dispatch(EventPayload::game_event(event));
    })?;

    tracing::info!(
        game_id = %event.game_id,
        seq = event.seq,
        player_id = %event.player_id,
        terminal = event.terminal,
        "action accepted"
    );

    tokio::spawn(publish_event(state.bus.clone(), event.clone()));
    Ok(event)
}

/// Adopt an event received off the bus and fan it out locally.
///
/// Returns whether the event advanced local state. The turn engine is not
/// re-run: the originating instance already validated the action.
pub fn handle_bus_event(state: &AppState, event: Event) -> bool {
    let applied = state.store.apply_remote(&event, |event| {
        state.broadcast.dispatch(EventPayload::game_event(event));
    });
    if applied {
        tracing::debug!(
            game_id = %event.game_id,
            seq = event.seq,
            origin = %event.origin,
            "adopted remote event"
        );
        true
    } else {
        tracing::trace!(
            game_id = %event.game_id,
            seq = event.seq,
            origin = %event.origin,
            "discarded stale or duplicate bus event"
        );
        false
    }
}

/// Long-lived drain task: one per instance, runs for the process lifetime.
pub async fn run_bus_drain(state: AppState) {
    let mut rx = match state.bus.subscribe().await {
        Ok(rx) => rx,
        Err(e) => {
            tracing::error!(?e, "bus subscribe failed; cross-instance events disabled");
            return;
        }
    };

    tracing::info!(instance_id = %state.config.instance_id, "bus drain started");
    while let Some(bytes) = rx.recv().await {
        let event = match codec::decode_event(&bytes) {
            Ok(event) => event,
            Err(e) => {
                tracing::debug!(?e, "malformed bus payload");
                continue;
            }
        };
        // Self-originated events were already delivered locally at publish time.
        if event.origin == state.config.instance_id {
            continue;
        }
        handle_bus_event(&state, event);
    }
    tracing::warn!("bus drain stream ended");
}

/// Publish an accepted event to the bus, retrying with bounded exponential
/// backoff. A lost publish means remote instances silently diverge, so this
/// is the one failure class that gets active recovery.
pub async fn publish_event(bus: Arc<dyn BroadcastBus>, event: Event) {
    let bytes = codec::encode_event(&event);
    for attempt in 0..MAX_PUBLISH_ATTEMPTS {
        match bus.publish(bytes.clone()).await {
            Ok(()) => return,
            Err(e) => {
                if attempt + 1 == MAX_PUBLISH_ATTEMPTS {
                    tracing::error!(
                        ?e,
                        game_id = %event.game_id,
                        seq = event.seq,
                        attempts = MAX_PUBLISH_ATTEMPTS,
                        "giving up on bus publish"
                    );
                    return;
                }
                let jitter = rand::thread_rng().gen_range(0..PUBLISH_BACKOFF_BASE_MS);
                let delay = (PUBLISH_BACKOFF_BASE_MS << attempt) + jitter;
                tracing::warn!(
                    ?e,
                    game_id = %event.game_id,
                    seq = event.seq,
                    retry_in_ms = delay,
                    "bus publish failed; retrying"
                );
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
        }
    }
}
