pub mod connection;
pub mod router;
pub mod state;

pub use connection::ConnectionManager;
pub use router::{EventHandler, EventRouter, HandlerGuard};
pub use state::SharedState;

use std::sync::Arc;

use log::warn;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::model::{MarketStatsSnapshot, Notification};
use crate::session::SessionContext;

// Named events on the realtime channel. The first two are server-pushed;
// the rest are synthetic lifecycle events routed like any other.
pub const EVENT_MARKET_STATS: &str = "market_stats";
pub const EVENT_NOTIFICATION_CREATED: &str = "notification_created";
pub const EVENT_CONNECT: &str = "connect";
pub const EVENT_DISCONNECT: &str = "disconnect";
pub const EVENT_CONNECT_ERROR: &str = "connect_error";

/// Wires the connection manager, router and merged view together and owns
/// their lifecycle. Dropping the engine (or calling `shutdown`) tears down
/// the merge handlers, so no state update can outlive it.
pub struct SyncEngine {
    state: SharedState,
    router: Arc<EventRouter>,
    manager: Option<Arc<ConnectionManager>>,
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
    _guards: Vec<HandlerGuard>,
}

impl SyncEngine {
    pub fn new(config: &Config, session: Arc<SessionContext>) -> Self {
        let state = SharedState::new();
        let router = EventRouter::new();
        let mut guards = Vec::new();

        let merge = state.clone();
        guards.push(router.register(EVENT_MARKET_STATS, move |data| {
            match serde_json::from_value::<MarketStatsSnapshot>(data) {
                Ok(snapshot) => merge.apply_market_stats(snapshot),
                Err(e) => warn!("Dropping malformed market_stats payload: {}", e),
            }
        }));

        let merge = state.clone();
        guards.push(router.register(EVENT_NOTIFICATION_CREATED, move |data| {
            match serde_json::from_value::<Notification>(data) {
                Ok(notification) => merge.push_notification(notification),
                Err(e) => warn!("Dropping malformed notification payload: {}", e),
            }
        }));

        let (shutdown, _) = watch::channel(false);
        let manager = Arc::new(ConnectionManager::new(
            config,
            session,
            state.clone(),
            router.clone(),
        ));

        Self {
            state,
            router,
            manager: Some(manager),
            shutdown,
            task: None,
            _guards: guards,
        }
    }

    pub fn state(&self) -> &SharedState {
        &self.state
    }

    pub fn router(&self) -> Arc<EventRouter> {
        self.router.clone()
    }

    /// Spawns the connection task. Calling twice is a no-op.
    pub fn start(&mut self) {
        if let Some(manager) = self.manager.take() {
            let shutdown_rx = self.shutdown.subscribe();
            self.task = Some(tokio::spawn(async move {
                manager.run(shutdown_rx).await;
            }));
        }
    }

    pub async fn shutdown(&mut self) {
        self.shutdown.send_replace(true);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        DEFAULT_MOCK_BIND, DEFAULT_MOCK_WS_BIND, DEFAULT_TOKEN_FILE, RECONNECT_MAX_DELAY_MS,
    };
    use crate::model::ConnectionState;
    use crate::server::{run_ws_server, MockStore, MOCK_TOKEN};
    use crate::session::MemoryTokenStore;
    use std::time::Duration;

    fn test_config(ws_url: String) -> Config {
        Config {
            api_base_url: "http://127.0.0.1:0".to_string(),
            ws_url,
            token_file: DEFAULT_TOKEN_FILE.to_string(),
            email: None,
            password: None,
            mock: false,
            mock_bind: DEFAULT_MOCK_BIND.to_string(),
            mock_ws_bind: DEFAULT_MOCK_WS_BIND.to_string(),
            tick_interval_ms: 20,
            reconnect_base_ms: 50,
            max_reconnect_attempts: 3,
            log_level: "warn".to_string(),
        }
    }

    async fn spawn_mock_ws(tick_interval_ms: u64) -> (String, watch::Sender<bool>) {
        let store = Arc::new(MockStore::seeded());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind ephemeral port");
        let addr = listener.local_addr().expect("local addr");
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(run_ws_server(listener, store, tick_interval_ms, shutdown_rx));
        (format!("ws://{}", addr), shutdown_tx)
    }

    #[tokio::test]
    async fn engine_merges_pushed_snapshots_end_to_end() {
        let (ws_url, server_shutdown) = spawn_mock_ws(20).await;

        let session = Arc::new(SessionContext::new(Arc::new(MemoryTokenStore::with_token(
            MOCK_TOKEN,
        ))));
        let mut engine = SyncEngine::new(&test_config(ws_url), session);
        let state = engine.state().clone();
        engine.start();

        let mut watcher = state.watch_connection();
        tokio::time::timeout(Duration::from_secs(5), async {
            while *watcher.borrow() != ConnectionState::Connected {
                watcher.changed().await.expect("watch open");
            }
        })
        .await
        .expect("connected in time");

        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if state.market_stats().map(|s| s.tick_count >= 2).unwrap_or(false) {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("snapshots merged in time");

        engine.shutdown().await;
        assert_eq!(state.connection_state(), ConnectionState::Disconnected);
        let _ = server_shutdown.send(true);
    }

    #[tokio::test]
    async fn unauthenticated_engine_parks_in_error_after_cap() {
        // No server listening at all: every attempt fails, and the bounded
        // retry policy must park the machine in Error.
        let session = Arc::new(SessionContext::in_memory());
        let mut config = test_config("ws://127.0.0.1:1".to_string());
        config.max_reconnect_attempts = 2;
        config.reconnect_base_ms = 10;
        assert!(config.reconnect_base_ms <= RECONNECT_MAX_DELAY_MS);

        let mut engine = SyncEngine::new(&config, session);
        let state = engine.state().clone();
        engine.start();

        let mut watcher = state.watch_connection();
        tokio::time::timeout(Duration::from_secs(5), async {
            while *watcher.borrow() != ConnectionState::Error {
                watcher.changed().await.expect("watch open");
            }
        })
        .await
        .expect("parked in Error in time");

        engine.shutdown().await;
    }
}
