mod api;
mod config;
mod error;
mod model;
mod realtime;
mod server;
mod session;

use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::time::interval;

use crate::api::ApiClient;
use crate::config::Config;
use crate::realtime::SyncEngine;
use crate::server::MockStore;
use crate::session::{FileTokenStore, SessionContext};

const STATS_INTERVAL_SECS: u64 = 30;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env();

    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or(&config.log_level));

    config.log_config();
    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        return Err(e.into());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Optional embedded mock backend for local development
    if config.mock {
        start_mock_backend(&config, shutdown_rx.clone()).await?;
    }

    // Explicitly constructed session; nothing reads a global at import time
    let session = Arc::new(SessionContext::new(Arc::new(FileTokenStore::new(
        &config.token_file,
    ))));
    let client = ApiClient::new(config.api_base_url.clone(), session.clone())?;

    if let (Some(email), Some(password)) = (config.email.as_deref(), config.password.as_deref()) {
        match client.login(email, password).await {
            Ok(response) => info!(
                "Authenticated as {} ({})",
                response.user.email, response.user.role
            ),
            Err(e) => warn!("Login failed, continuing unauthenticated: {}", e),
        }
    } else if session.is_authenticated() {
        info!("Reusing persisted session token");
    } else {
        warn!("No credentials configured; realtime connection will carry no token");
    }

    let mut engine = SyncEngine::new(&config, session.clone());
    let state = engine.state().clone();
    engine.start();

    // Seed the merged view with the startup notification batch
    if session.is_authenticated() {
        match client.notifications().await {
            Ok(batch) => {
                info!("Loaded {} notifications", batch.len());
                state.replace_notifications(batch);
            }
            Err(e) => warn!("Failed to load notification batch: {}", e),
        }
    }

    // Periodic merged-state stats
    let stats_state = state.clone();
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(STATS_INTERVAL_SECS));
        loop {
            ticker.tick().await;
            let ticks = stats_state
                .market_stats()
                .map(|s| s.tick_count)
                .unwrap_or(0);
            info!(
                "Sync state - connection: {:?}, ticks: {}, unread: {}",
                stats_state.connection_state(),
                ticks,
                stats_state.unread_count()
            );
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    let _ = shutdown_tx.send(true);
    engine.shutdown().await;

    Ok(())
}

async fn start_mock_backend(
    config: &Config,
    shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(MockStore::seeded());

    let api_listener = TcpListener::bind(&config.mock_bind).await?;
    info!("Mock API server running at http://{}", config.mock_bind);
    let router = server::create_mock_router(store.clone());
    tokio::spawn(async move {
        if let Err(e) = axum::serve(api_listener, router).await {
            error!("Mock API server stopped: {}", e);
        }
    });

    let ws_listener = TcpListener::bind(&config.mock_ws_bind).await?;
    info!(
        "Mock realtime channel running at ws://{}",
        config.mock_ws_bind
    );
    let tick_interval_ms = config.tick_interval_ms;
    tokio::spawn(server::run_ws_server(
        ws_listener,
        store,
        tick_interval_ms,
        shutdown,
    ));

    Ok(())
}
