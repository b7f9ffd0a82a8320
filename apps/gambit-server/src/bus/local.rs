//! In-process loopback bus for tests and single-instance deployments.

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};

use super::{BroadcastBus, BusError};

const CHANNEL_CAPACITY: usize = 1024;

/// A `BroadcastBus` backed by a `tokio::sync::broadcast` channel. Sharing one
/// `LocalBus` between several in-process instances gives them the same
/// at-least-once, every-instance-sees-everything semantics as a real bus.
pub struct LocalBus {
    sender: broadcast::Sender<Vec<u8>>,
}

impl LocalBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BroadcastBus for LocalBus {
    async fn publish(&self, bytes: Vec<u8>) -> Result<(), BusError> {
        // send() errors only when there are no subscribers; nothing to sync
        // with in that case.
        let _ = self.sender.send(bytes);
        Ok(())
    }

    async fn subscribe(&self) -> Result<mpsc::Receiver<Vec<u8>>, BusError> {
        let mut rx = self.sender.subscribe();
        let (tx, out) = mpsc::channel(CHANNEL_CAPACITY);
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(bytes) => {
                        if tx.send(bytes).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "local bus subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        Ok(out)
    }
}
