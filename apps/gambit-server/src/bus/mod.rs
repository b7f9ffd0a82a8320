//! Cross-instance broadcast bus.
//!
//! The core depends only on [`BroadcastBus`]: publish bytes on a shared
//! channel, subscribe to an infinite stream of bytes. Delivery is assumed
//! at-least-once and unordered; the dispatcher enforces `(game_id, seq)`
//! idempotence on receipt.

pub mod codec;
pub mod local;
pub mod redis;

use async_trait::async_trait;
use tokio::sync::mpsc;

pub use local::LocalBus;
pub use redis::RedisBus;

/// An error from the bus transport. Publish failures are retried by the
/// dispatcher with bounded backoff.
#[derive(Debug)]
pub struct BusError(pub String);

impl std::fmt::Display for BusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "bus error: {}", self.0)
    }
}

impl std::error::Error for BusError {}

/// Publish/subscribe primitive bridging instances. Implementations must be
/// safe to share behind an `Arc` across connection tasks.
#[async_trait]
pub trait BroadcastBus: Send + Sync {
    /// Publish an encoded event to every instance, including this one.
    async fn publish(&self, bytes: Vec<u8>) -> Result<(), BusError>;

    /// Subscribe to the shared channel. The stream is infinite and not
    /// restartable; each instance drains exactly one subscription.
    async fn subscribe(&self) -> Result<mpsc::Receiver<Vec<u8>>, BusError>;
}
