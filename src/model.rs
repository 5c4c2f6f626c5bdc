use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// Typed records for everything that crosses the wire. Field names on the
// wire stay camelCase for compatibility with the existing console clients.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketMode {
    #[serde(rename = "live")]
    Live,
    #[serde(rename = "simulation")]
    Simulation,
}

/// Full-replacement payload pushed on every `market_stats` event. There is
/// no partial merge of fields; the latest processed snapshot wins.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarketStatsSnapshot {
    #[serde(rename = "tickCount")]
    pub tick_count: u64,
    #[serde(rename = "uptime")]
    pub uptime_seconds: u64,
    pub mode: MarketMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub message: String,
    pub read: bool,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: User,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSegment {
    pub id: u32,
    pub name: String,
    pub exchange: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSymbol {
    pub symbol: String,
    pub name: String,
    pub segment: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubBroker {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TicketStatus {
    #[serde(rename = "open")]
    Open,
    #[serde(rename = "in_progress")]
    InProgress,
    #[serde(rename = "closed")]
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupportTicket {
    pub id: Uuid,
    pub subject: String,
    pub status: TicketStatus,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Setting {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SettingUpdate {
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderLoginUrl {
    pub provider: String,
    pub url: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ReadAllResponse {
    pub updated: usize,
}

/// Plain-message error body used by the platform API for every failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiMessage {
    pub message: String,
}

/// One JSON text frame per server-pushed event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeEvent {
    pub event: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl RealtimeEvent {
    pub fn new<T: Serialize>(event: &str, payload: &T) -> Result<Self, serde_json::Error> {
        Ok(Self {
            event: event.to_string(),
            data: serde_json::to_value(payload)?,
        })
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    #[serde(rename = "connecting")]
    Connecting,
    #[serde(rename = "connected")]
    Connected,
    #[serde(rename = "disconnected")]
    Disconnected,
    #[serde(rename = "error")]
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn market_stats_decodes_wire_names() {
        let raw = r#"{"tickCount":42,"uptime":900,"mode":"live"}"#;
        let snapshot: MarketStatsSnapshot = serde_json::from_str(raw).expect("valid payload");
        assert_eq!(snapshot.tick_count, 42);
        assert_eq!(snapshot.uptime_seconds, 900);
        assert_eq!(snapshot.mode, MarketMode::Live);
    }

    #[test]
    fn market_stats_rejects_malformed_payload() {
        // Negative counts fail boundary validation instead of wrapping.
        let raw = r#"{"tickCount":-1,"uptime":900,"mode":"live"}"#;
        assert!(serde_json::from_str::<MarketStatsSnapshot>(raw).is_err());
    }

    #[test]
    fn realtime_event_envelope_round() {
        let snapshot = MarketStatsSnapshot {
            tick_count: 7,
            uptime_seconds: 14,
            mode: MarketMode::Simulation,
        };
        let event = RealtimeEvent::new("market_stats", &snapshot).expect("serializable");
        let json = event.to_json().expect("serializable");
        assert!(json.contains(r#""event":"market_stats""#));
        assert!(json.contains(r#""tickCount":7"#));
    }

    #[test]
    fn event_with_no_data_field_decodes() {
        let event: RealtimeEvent = serde_json::from_str(r#"{"event":"connect"}"#).expect("valid");
        assert_eq!(event.event, "connect");
        assert!(event.data.is_null());
    }
}
