pub mod bus;
pub mod config;
pub mod game;
pub mod gateway;

use std::sync::Arc;

use bus::BroadcastBus;
use config::Config;
use game::{RuleBook, SessionStore};
use gateway::fanout::GameBroadcast;
use gateway::registry::ConnectionRegistry;

/// Shared per-instance state, created at startup and passed to every
/// component by reference. No ambient globals.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<ConnectionRegistry>,
    pub store: Arc<SessionStore>,
    pub rules: Arc<RuleBook>,
    pub broadcast: Arc<GameBroadcast>,
    pub bus: Arc<dyn BroadcastBus>,
}

impl AppState {
    pub fn new(config: Arc<Config>, bus: Arc<dyn BroadcastBus>) -> Self {
        let store = Arc::new(SessionStore::new(config.instance_id.clone()));
        Self {
            config,
            registry: Arc::new(ConnectionRegistry::new()),
            store,
            rules: Arc::new(RuleBook::with_defaults()),
            broadcast: Arc::new(GameBroadcast::new()),
            bus,
        }
    }
}
