//! Redis Pub/Sub implementation of the broadcast bus.
//!
//! One shared channel for the whole fleet. Redis Pub/Sub gives at-least-once
//! delivery to live subscribers and no ordering guarantee across publishers,
//! which is exactly the contract the dispatcher is built to tolerate.

use async_trait::async_trait;
use futures_util::StreamExt;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::mpsc;

use super::{BroadcastBus, BusError};

const CHANNEL_CAPACITY: usize = 1024;

pub struct RedisBus {
    client: redis::Client,
    /// Auto-reconnecting connection used for publishes.
    manager: ConnectionManager,
    channel: String,
}

impl RedisBus {
    pub async fn connect(url: &str, channel: &str) -> Result<Self, BusError> {
        let client = redis::Client::open(url).map_err(|e| BusError(e.to_string()))?;
        let manager = ConnectionManager::new(client.clone())
            .await
            .map_err(|e| BusError(e.to_string()))?;
        Ok(Self {
            client,
            manager,
            channel: channel.to_string(),
        })
    }
}

#[async_trait]
impl BroadcastBus for RedisBus {
    async fn publish(&self, bytes: Vec<u8>) -> Result<(), BusError> {
        let mut conn = self.manager.clone();
        let _receivers: i64 = conn
            .publish(&self.channel, bytes)
            .await
            .map_err(|e| BusError(e.to_string()))?;
        Ok(())
    }

    async fn subscribe(&self) -> Result<mpsc::Receiver<Vec<u8>>, BusError> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| BusError(e.to_string()))?;
        pubsub
            .subscribe(&self.channel)
            .await
            .map_err(|e| BusError(e.to_string()))?;

        let (tx, out) = mpsc::channel(CHANNEL_CAPACITY);
        tokio::spawn(async move {
            let mut stream = pubsub.into_on_message();
            while let Some(msg) = stream.next().await {
                if tx.send(msg.get_payload_bytes().to_vec()).await.is_err() {
                    break;
                }
            }
            tracing::warn!("redis pubsub stream ended");
        });
        Ok(out)
    }
}
