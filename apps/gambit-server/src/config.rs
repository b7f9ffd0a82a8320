use gambit_common::id::{prefix, prefixed_ulid};

/// Which broadcast bus implementation to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusKind {
    /// Redis Pub/Sub; required for multi-instance deployments.
    Redis,
    /// In-process loopback; single-instance and test deployments.
    Local,
}

/// Server configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Stable identifier for this server instance; stamped on every event it
    /// accepts. Generated when not configured.
    pub instance_id: String,
    /// Port the WebSocket gateway binds to.
    pub port: u16,
    /// Redis connection string.
    pub redis_url: String,
    /// Shared Pub/Sub channel all instances publish and subscribe on.
    pub bus_channel: String,
    pub bus: BusKind,
    /// Connections with no inbound activity within this window are closed.
    pub idle_timeout_secs: u64,
    /// Heartbeat interval advertised to clients in READY (ms).
    pub heartbeat_interval_ms: u64,
    /// Sessions untouched for this long are swept from the store.
    pub session_ttl_secs: u64,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            instance_id: std::env::var("GAMBIT_INSTANCE_ID")
                .unwrap_or_else(|_| prefixed_ulid(prefix::INSTANCE)),
            port: parsed_var("PORT", 4010),
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379/0".to_string()),
            bus_channel: std::env::var("GAMBIT_BUS_CHANNEL")
                .unwrap_or_else(|_| "gambit:events".to_string()),
            bus: match std::env::var("GAMBIT_BUS").as_deref() {
                Ok("local") => BusKind::Local,
                _ => BusKind::Redis,
            },
            // Both drive `tokio::time::interval`, which requires a non-zero
            // period.
            idle_timeout_secs: parsed_var("IDLE_TIMEOUT_SECS", 60).max(1),
            heartbeat_interval_ms: parsed_var("HEARTBEAT_INTERVAL_MS", 30_000).max(1),
            session_ttl_secs: parsed_var("SESSION_TTL_SECS", 3_600).max(1),
        }
    }

    /// A config for in-process tests: local bus, fixed instance id.
    pub fn for_instance(instance_id: &str) -> Self {
        Self {
            instance_id: instance_id.to_string(),
            port: 0,
            redis_url: "redis://localhost:6379/0".to_string(),
            bus_channel: "gambit:events".to_string(),
            bus: BusKind::Local,
            idle_timeout_secs: 60,
            heartbeat_interval_ms: 30_000,
            session_ttl_secs: 3_600,
        }
    }
}

fn parsed_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
