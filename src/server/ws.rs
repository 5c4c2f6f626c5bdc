use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use log::{error, info, warn};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::time::interval;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;

use crate::model::RealtimeEvent;
use crate::realtime::{EVENT_MARKET_STATS, EVENT_NOTIFICATION_CREATED};
use crate::server::data::{MockStore, MOCK_TOKEN};

// A demo notification rides along every N market ticks.
const NOTIFICATION_EVERY_TICKS: u64 = 10;

/// Pulls the session token out of the connection URL. Browser websocket
/// clients cannot set custom headers, so the query parameter is the only
/// credential channel the console shares with us.
pub fn extract_token_from_request(req: &Request) -> Option<String> {
    let query = req.uri().query()?;
    for param in query.split('&') {
        if let Some((key, value)) = param.split_once('=') {
            if key == "token" {
                if let Ok(decoded) = urlencoding::decode(value) {
                    return Some(decoded.to_string());
                }
            }
        }
    }
    None
}

fn forbidden(message: &str) -> ErrorResponse {
    Response::builder()
        .status(StatusCode::FORBIDDEN)
        .body(Some(message.to_string()))
        .unwrap()
}

/// Accept loop for the mock realtime channel. Each subscriber gets its own
/// push task until it disconnects or shutdown is signalled.
pub async fn run_ws_server(
    listener: TcpListener,
    store: Arc<MockStore>,
    tick_interval_ms: u64,
    shutdown: watch::Receiver<bool>,
) {
    if let Ok(addr) = listener.local_addr() {
        info!("Mock realtime channel listening at ws://{}", addr);
    }

    let mut shutdown_accept = shutdown.clone();
    loop {
        tokio::select! {
            changed = shutdown_accept.changed() => {
                if changed.is_err() || *shutdown_accept.borrow() {
                    info!("Mock realtime channel shutting down");
                    break;
                }
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, addr)) => {
                        let store = store.clone();
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            handle_connection(stream, addr.to_string(), store, tick_interval_ms, shutdown)
                                .await;
                        });
                    }
                    Err(e) => {
                        error!("Failed to accept realtime connection: {}", e);
                        break;
                    }
                }
            }
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer_addr: String,
    store: Arc<MockStore>,
    tick_interval_ms: u64,
    mut shutdown: watch::Receiver<bool>,
) {
    // Credential check happens in the handshake callback so bad tokens are
    // rejected with an HTTP status instead of a silent close.
    let ws_stream = match accept_hdr_async(stream, |req: &Request, response: Response| {
        match extract_token_from_request(req) {
            Some(token) if token == MOCK_TOKEN => Ok(response),
            Some(_) => {
                warn!("Rejected realtime connection with bad token from {}", peer_addr);
                Err(forbidden("Invalid session token"))
            }
            None => {
                warn!("Rejected unauthenticated realtime connection from {}", peer_addr);
                Err(forbidden("Missing token parameter"))
            }
        }
    })
    .await
    {
        Ok(ws) => ws,
        Err(e) => {
            warn!("WebSocket handshake failed for {}: {:?}", peer_addr, e);
            return;
        }
    };

    info!("Realtime subscriber connected from {}", peer_addr);
    let (mut write, mut read) = ws_stream.split();
    let mut ticker = interval(Duration::from_millis(tick_interval_ms));

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    let _ = write.send(Message::Close(None)).await;
                    break;
                }
            }
            _ = ticker.tick() => {
                let snapshot = store.next_tick();
                if !push_event(&mut write, EVENT_MARKET_STATS, &snapshot).await {
                    break;
                }

                if snapshot.tick_count % NOTIFICATION_EVERY_TICKS == 0 {
                    let notification = store.push_notification(&format!(
                        "Signal engine heartbeat #{}",
                        snapshot.tick_count / NOTIFICATION_EVERY_TICKS
                    ));
                    if !push_event(&mut write, EVENT_NOTIFICATION_CREATED, &notification).await {
                        break;
                    }
                }
            }
            message = read.next() => {
                match message {
                    Some(Ok(Message::Close(frame))) => {
                        info!("Subscriber {} sent close frame: {:?}", peer_addr, frame);
                        break;
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        if write.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        error!("WebSocket error for {}: {}", peer_addr, e);
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    info!("Realtime subscriber disconnected: {}", peer_addr);
}

async fn push_event<T: serde::Serialize>(
    write: &mut futures::stream::SplitSink<tokio_tungstenite::WebSocketStream<TcpStream>, Message>,
    event: &str,
    payload: &T,
) -> bool {
    let json = match RealtimeEvent::new(event, payload).and_then(|e| e.to_json()) {
        Ok(json) => json,
        Err(e) => {
            error!("Failed to serialize {} event: {}", event, e);
            return true; // Skip the frame, keep the connection
        }
    };

    if write.send(Message::Text(json)).await.is_err() {
        warn!("Subscriber went away while pushing {} event", event);
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MarketStatsSnapshot;
    use tokio_tungstenite::connect_async;

    async fn spawn_server(tick_interval_ms: u64) -> (String, watch::Sender<bool>) {
        let store = Arc::new(MockStore::seeded());
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(run_ws_server(listener, store, tick_interval_ms, shutdown_rx));
        (format!("ws://{}", addr), shutdown_tx)
    }

    #[tokio::test]
    async fn subscriber_with_token_receives_market_stats() {
        let (ws_url, shutdown) = spawn_server(20).await;

        let url = format!("{}/?token={}", ws_url, MOCK_TOKEN);
        let (mut stream, _) = connect_async(url.as_str()).await.expect("connect");

        let mut snapshot = None;
        while snapshot.is_none() {
            let message = stream.next().await.expect("stream open").expect("frame");
            if let Message::Text(text) = message {
                let event: RealtimeEvent = serde_json::from_str(&text).expect("envelope");
                if event.event == EVENT_MARKET_STATS {
                    snapshot =
                        Some(serde_json::from_value::<MarketStatsSnapshot>(event.data).expect("payload"));
                }
            }
        }

        assert!(snapshot.unwrap().tick_count >= 1);
        let _ = shutdown.send(true);
    }

    #[tokio::test]
    async fn missing_or_bad_token_is_rejected_at_handshake() {
        let (ws_url, shutdown) = spawn_server(1_000).await;

        assert!(connect_async(ws_url.as_str()).await.is_err());

        let bad = format!("{}/?token=stale-token", ws_url);
        assert!(connect_async(bad.as_str()).await.is_err());

        let _ = shutdown.send(true);
    }

    #[test]
    fn token_extraction_handles_encoding_and_position() {
        let req = Request::builder()
            .uri("ws://localhost/?mode=live&token=mock%2Djwt%2Dtoken%2D123")
            .body(())
            .unwrap();
        assert_eq!(
            extract_token_from_request(&req).as_deref(),
            Some("mock-jwt-token-123")
        );

        let req = Request::builder().uri("ws://localhost/").body(()).unwrap();
        assert_eq!(extract_token_from_request(&req), None);
    }
}
