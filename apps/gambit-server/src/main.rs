use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gambit_server::bus::{BroadcastBus, LocalBus, RedisBus};
use gambit_server::config::{BusKind, Config};
use gambit_server::gateway::dispatch::run_bus_drain;
use gambit_server::AppState;

#[tokio::main]
async fn main() {
    // Load .env file (silently skip if missing — env vars may be set externally)
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Arc::new(Config::from_env());
    let port = config.port;

    let bus: Arc<dyn BroadcastBus> = match config.bus {
        BusKind::Redis => Arc::new(
            RedisBus::connect(&config.redis_url, &config.bus_channel)
                .await
                .expect("failed to connect to redis"),
        ),
        BusKind::Local => Arc::new(LocalBus::new()),
    };

    tracing::info!(
        instance_id = %config.instance_id,
        bus = ?config.bus,
        "gambit-server configured"
    );

    let state = AppState::new(config.clone(), bus);

    // One drain task per instance for the bus subscription.
    tokio::spawn(run_bus_drain(state.clone()));

    // Periodic sweep of idle sessions.
    let sweeper = state.clone();
    tokio::spawn(async move {
        let ttl = Duration::from_secs(sweeper.config.session_ttl_secs);
        let mut interval = tokio::time::interval(ttl / 4);
        interval.tick().await;
        loop {
            interval.tick().await;
            let removed = sweeper.store.remove_expired(ttl);
            if removed > 0 {
                tracing::info!(removed, "swept expired game sessions");
            }
        }
    });

    let app = gambit_server::gateway::server::router()
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "gambit-server listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    axum::serve(listener, app).await.expect("server error");
}
