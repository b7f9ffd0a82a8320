//! Bus payload encoding.
//!
//! JSON today; isolated here so a compact binary codec can replace it without
//! touching the dispatch paths.

use crate::game::Event;

pub fn encode_event(event: &Event) -> Vec<u8> {
    serde_json::to_vec(event).unwrap()
}

pub fn decode_event(bytes: &[u8]) -> Result<Event, serde_json::Error> {
    serde_json::from_slice(bytes)
}
