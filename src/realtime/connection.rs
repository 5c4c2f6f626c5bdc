use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use rand::Rng;
use tokio::sync::watch;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use crate::config::{Config, RECONNECT_MAX_DELAY_MS};
use crate::model::{ConnectionState, RealtimeEvent};
use crate::realtime::router::EventRouter;
use crate::realtime::state::SharedState;
use crate::realtime::{EVENT_CONNECT, EVENT_CONNECT_ERROR, EVENT_DISCONNECT};
use crate::session::SessionContext;

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Owns the single persistent realtime connection and its state machine:
/// `Disconnected -> Connecting -> Connected -> Disconnected`, with bounded
/// jittered backoff between attempts and `Error` once the attempt cap is
/// exhausted.
pub struct ConnectionManager {
    ws_url: String,
    session: Arc<SessionContext>,
    state: SharedState,
    router: Arc<EventRouter>,
    reconnect_base_ms: u64,
    max_reconnect_attempts: u32,
}

impl ConnectionManager {
    pub fn new(
        config: &Config,
        session: Arc<SessionContext>,
        state: SharedState,
        router: Arc<EventRouter>,
    ) -> Self {
        Self {
            ws_url: config.ws_url.clone(),
            session,
            state,
            router,
            reconnect_base_ms: config.reconnect_base_ms,
            max_reconnect_attempts: config.max_reconnect_attempts,
        }
    }

    /// The token travels as a query parameter because that is the only
    /// credential channel browser websocket clients share with us. An
    /// unauthenticated session produces a bare URL; the server rejects it.
    fn connect_url(&self) -> String {
        build_connect_url(&self.ws_url, self.session.token().as_deref())
    }

    /// Connect/reconnect loop. Returns when shutdown is signalled or the
    /// attempt cap is exhausted.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut failed_attempts: u32 = 0;

        loop {
            if *shutdown.borrow() {
                break;
            }

            self.state.set_connection_state(ConnectionState::Connecting);
            match connect_async(self.connect_url().as_str()).await {
                Ok((stream, _response)) => {
                    failed_attempts = 0;
                    self.state.set_connection_state(ConnectionState::Connected);
                    info!("Realtime channel connected: {}", self.ws_url);
                    self.router.dispatch(EVENT_CONNECT, serde_json::Value::Null);

                    let shutting_down = self.read_loop(stream, &mut shutdown).await;

                    self.state
                        .set_connection_state(ConnectionState::Disconnected);
                    self.router
                        .dispatch(EVENT_DISCONNECT, serde_json::Value::Null);
                    if shutting_down {
                        break;
                    }
                }
                Err(e) => {
                    warn!("Realtime connect attempt failed: {}", e);
                    self.router.dispatch(
                        EVENT_CONNECT_ERROR,
                        serde_json::json!({ "message": e.to_string() }),
                    );

                    failed_attempts += 1;
                    if self.max_reconnect_attempts > 0
                        && failed_attempts >= self.max_reconnect_attempts
                    {
                        error!(
                            "Giving up after {} failed realtime connect attempts",
                            failed_attempts
                        );
                        self.state.set_connection_state(ConnectionState::Error);
                        return;
                    }
                    self.state
                        .set_connection_state(ConnectionState::Disconnected);
                }
            }

            let delay = backoff_delay(self.reconnect_base_ms, failed_attempts);
            debug!("Reconnecting in {:?}", delay);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        self.state
            .set_connection_state(ConnectionState::Disconnected);
    }

    /// Pumps one established connection. Returns true when the exit was a
    /// shutdown request rather than a transport failure.
    async fn read_loop(&self, mut stream: WsStream, shutdown: &mut watch::Receiver<bool>) -> bool {
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        let _ = stream.close(None).await;
                        return true;
                    }
                }
                message = stream.next() => {
                    let Some(message) = message else {
                        info!("Realtime channel closed by peer");
                        return false;
                    };

                    match message {
                        Ok(Message::Text(text)) => self.handle_frame(&text),
                        Ok(Message::Ping(payload)) => {
                            if let Err(e) = stream.send(Message::Pong(payload)).await {
                                error!("Failed to answer realtime ping: {}", e);
                                return false;
                            }
                        }
                        Ok(Message::Close(frame)) => {
                            info!("Realtime channel received close frame: {:?}", frame);
                            return false;
                        }
                        Ok(_) => {}
                        Err(e) => {
                            // Transport errors are fed to the state machine,
                            // never raised to handlers.
                            error!("Realtime read error: {}", e);
                            return false;
                        }
                    }
                }
            }
        }
    }

    fn handle_frame(&self, text: &str) {
        match serde_json::from_str::<RealtimeEvent>(text) {
            Ok(event) => self.router.dispatch(&event.event, event.data),
            Err(e) => warn!("Dropping malformed realtime frame: {}", e),
        }
    }
}

pub fn build_connect_url(ws_url: &str, token: Option<&str>) -> String {
    match token {
        Some(token) => {
            let separator = if ws_url.contains('?') { '&' } else { '?' };
            format!(
                "{}{}token={}",
                ws_url,
                separator,
                urlencoding::encode(token)
            )
        }
        None => ws_url.to_string(),
    }
}

/// Exponential backoff from the base delay with a hard ceiling and ±50%
/// jitter. `failed_attempts` counts consecutive failures; zero (a dropped
/// established connection) retries at the base delay.
pub fn backoff_delay(base_ms: u64, failed_attempts: u32) -> Duration {
    let exponent = failed_attempts.saturating_sub(1).min(16);
    let raw = base_ms
        .saturating_mul(1u64 << exponent)
        .min(RECONNECT_MAX_DELAY_MS);
    let jitter = rand::thread_rng().gen_range(0.5..1.5);
    Duration::from_millis((raw as f64 * jitter) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{MemoryTokenStore, SessionContext};

    #[test]
    fn connect_url_carries_encoded_token() {
        let url = build_connect_url("ws://127.0.0.1:4011", Some("tok en+123"));
        assert_eq!(url, "ws://127.0.0.1:4011?token=tok%20en%2B123");

        let url = build_connect_url("ws://host/ws?mode=live", Some("abc"));
        assert_eq!(url, "ws://host/ws?mode=live&token=abc");
    }

    #[test]
    fn absent_or_null_token_yields_bare_url() {
        assert_eq!(
            build_connect_url("ws://127.0.0.1:4011", None),
            "ws://127.0.0.1:4011"
        );

        // The session applies the "null" rule before the URL is built.
        let session = SessionContext::new(std::sync::Arc::new(MemoryTokenStore::with_token("null")));
        let url = build_connect_url("ws://127.0.0.1:4011", session.token().as_deref());
        assert!(!url.contains("token="));
    }

    #[test]
    fn backoff_grows_and_respects_the_ceiling() {
        // Jitter is ±50%, so assert against the widened bounds.
        let first = backoff_delay(1_000, 1).as_millis() as u64;
        assert!((500..1_500).contains(&first), "first delay {}", first);

        let third = backoff_delay(1_000, 3).as_millis() as u64;
        assert!((2_000..6_000).contains(&third), "third delay {}", third);

        let capped = backoff_delay(1_000, 12).as_millis() as u64;
        assert!(capped <= RECONNECT_MAX_DELAY_MS * 3 / 2, "capped delay {}", capped);
    }

    #[test]
    fn dropped_connection_retries_at_base_delay() {
        let delay = backoff_delay(1_000, 0).as_millis() as u64;
        assert!((500..1_500).contains(&delay), "delay {}", delay);
    }
}
