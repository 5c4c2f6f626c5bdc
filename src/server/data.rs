use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use chrono::{Duration as ChronoDuration, Utc};
use uuid::Uuid;

use crate::model::{
    LoginResponse, MarketMode, MarketSegment, MarketStatsSnapshot, MarketSymbol, Notification,
    ProviderLoginUrl, Setting, SubBroker, SupportTicket, TicketStatus, User,
};

// Demo account baked into the platform's mock layer.
pub const DEMO_EMAIL: &str = "admin@masterstroke.com";
pub const DEMO_PASSWORD: &str = "admin123";
pub const MOCK_TOKEN: &str = "mock-jwt-token-123";
pub const LOGIN_DELAY_MS: u64 = 800;

const PROVIDERS: &[&str] = &["zerodha", "fyers", "angelone"];

/// In-memory fixture store backing the mock REST and realtime surfaces.
pub struct MockStore {
    demo_user: User,
    notifications: Mutex<Vec<Notification>>,
    settings: Mutex<HashMap<String, String>>,
    sub_brokers: Vec<SubBroker>,
    tickets: Vec<SupportTicket>,
    segments: Vec<MarketSegment>,
    symbols: Vec<MarketSymbol>,
    mode: MarketMode,
    started_at: Instant,
    ticks: AtomicU64,
}

impl MockStore {
    pub fn seeded() -> Self {
        let now = Utc::now();

        let notifications = vec![
            Notification {
                id: Uuid::new_v4(),
                message: "New subscriber on the Momentum plan".to_string(),
                read: false,
                created_at: now - ChronoDuration::minutes(5),
            },
            Notification {
                id: Uuid::new_v4(),
                message: "BANKNIFTY signal closed at target".to_string(),
                read: false,
                created_at: now - ChronoDuration::minutes(40),
            },
            Notification {
                id: Uuid::new_v4(),
                message: "Weekly performance report is ready".to_string(),
                read: true,
                created_at: now - ChronoDuration::hours(20),
            },
        ];

        let mut settings = HashMap::new();
        settings.insert(
            "risk_disclaimer".to_string(),
            "Trading in securities involves risk of loss.".to_string(),
        );
        settings.insert("maintenance_banner".to_string(), "".to_string());
        settings.insert("signal_refresh_secs".to_string(), "30".to_string());

        let sub_brokers = vec![
            SubBroker {
                id: Uuid::new_v4(),
                name: "Apex Capital Desk".to_string(),
                email: "desk@apexcapital.in".to_string(),
                active: true,
            },
            SubBroker {
                id: Uuid::new_v4(),
                name: "Nirvana Securities".to_string(),
                email: "ops@nirvanasec.in".to_string(),
                active: false,
            },
        ];

        let tickets = vec![
            SupportTicket {
                id: Uuid::new_v4(),
                subject: "Unable to link broker account".to_string(),
                status: TicketStatus::Open,
                created_at: now - ChronoDuration::hours(3),
            },
            SupportTicket {
                id: Uuid::new_v4(),
                subject: "Refund request for annual plan".to_string(),
                status: TicketStatus::InProgress,
                created_at: now - ChronoDuration::hours(30),
            },
        ];

        let segments = vec![
            MarketSegment {
                id: 1,
                name: "Equity".to_string(),
                exchange: "NSE".to_string(),
            },
            MarketSegment {
                id: 2,
                name: "Futures & Options".to_string(),
                exchange: "NSE".to_string(),
            },
            MarketSegment {
                id: 3,
                name: "Commodity".to_string(),
                exchange: "MCX".to_string(),
            },
        ];

        let symbols = vec![
            MarketSymbol {
                symbol: "NIFTY".to_string(),
                name: "Nifty 50 Index".to_string(),
                segment: "Equity".to_string(),
            },
            MarketSymbol {
                symbol: "BANKNIFTY".to_string(),
                name: "Nifty Bank Index".to_string(),
                segment: "Equity".to_string(),
            },
            MarketSymbol {
                symbol: "RELIANCE".to_string(),
                name: "Reliance Industries".to_string(),
                segment: "Equity".to_string(),
            },
            MarketSymbol {
                symbol: "CRUDEOIL".to_string(),
                name: "Crude Oil Futures".to_string(),
                segment: "Commodity".to_string(),
            },
        ];

        Self {
            demo_user: User {
                id: Uuid::new_v4(),
                email: DEMO_EMAIL.to_string(),
                name: "MasterStroke Admin".to_string(),
                role: "admin".to_string(),
            },
            notifications: Mutex::new(notifications),
            settings: Mutex::new(settings),
            sub_brokers,
            tickets,
            segments,
            symbols,
            mode: MarketMode::Simulation,
            started_at: Instant::now(),
            ticks: AtomicU64::new(0),
        }
    }

    /// Only the fixed demo pair authenticates; everything else is rejected.
    pub fn check_login(&self, email: &str, password: &str) -> Option<LoginResponse> {
        if email == DEMO_EMAIL && password == DEMO_PASSWORD {
            Some(LoginResponse {
                token: MOCK_TOKEN.to_string(),
                user: self.demo_user.clone(),
            })
        } else {
            None
        }
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications.lock().unwrap().clone()
    }

    pub fn mark_read(&self, id: Uuid) -> Option<Notification> {
        let mut notifications = self.notifications.lock().unwrap();
        notifications.iter_mut().find(|n| n.id == id).map(|n| {
            n.read = true;
            n.clone()
        })
    }

    pub fn mark_all_read(&self) -> usize {
        let mut notifications = self.notifications.lock().unwrap();
        let mut updated = 0;
        for notification in notifications.iter_mut() {
            if !notification.read {
                notification.read = true;
                updated += 1;
            }
        }
        updated
    }

    /// Creates a server-side notification; the realtime broadcaster calls
    /// this so the REST list stays consistent with pushed events.
    pub fn push_notification(&self, message: &str) -> Notification {
        let notification = Notification {
            id: Uuid::new_v4(),
            message: message.to_string(),
            read: false,
            created_at: Utc::now(),
        };
        self.notifications
            .lock()
            .unwrap()
            .insert(0, notification.clone());
        notification
    }

    pub fn setting(&self, key: &str) -> Option<Setting> {
        self.settings.lock().unwrap().get(key).map(|value| Setting {
            key: key.to_string(),
            value: value.clone(),
        })
    }

    pub fn put_setting(&self, key: &str, value: &str) -> Setting {
        self.settings
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Setting {
            key: key.to_string(),
            value: value.to_string(),
        }
    }

    pub fn sub_brokers(&self) -> Vec<SubBroker> {
        self.sub_brokers.clone()
    }

    pub fn tickets(&self) -> Vec<SupportTicket> {
        self.tickets.clone()
    }

    pub fn segments(&self) -> Vec<MarketSegment> {
        self.segments.clone()
    }

    pub fn symbols(&self) -> Vec<MarketSymbol> {
        self.symbols.clone()
    }

    pub fn provider_login_url(&self, provider: &str) -> Option<ProviderLoginUrl> {
        if PROVIDERS.contains(&provider) {
            Some(ProviderLoginUrl {
                provider: provider.to_string(),
                url: format!("https://auth.{}.example/login?redirect=masterstroke", provider),
            })
        } else {
            None
        }
    }

    pub fn market_stats(&self) -> MarketStatsSnapshot {
        MarketStatsSnapshot {
            tick_count: self.ticks.load(Ordering::Relaxed),
            uptime_seconds: self.started_at.elapsed().as_secs(),
            mode: self.mode,
        }
    }

    /// Advances the tick counter and returns the fresh snapshot.
    pub fn next_tick(&self) -> MarketStatsSnapshot {
        let tick_count = self.ticks.fetch_add(1, Ordering::Relaxed) + 1;
        MarketStatsSnapshot {
            tick_count,
            uptime_seconds: self.started_at.elapsed().as_secs(),
            mode: self.mode,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_the_demo_pair_logs_in() {
        let store = MockStore::seeded();

        let response = store.check_login(DEMO_EMAIL, DEMO_PASSWORD).expect("demo login");
        assert_eq!(response.token, MOCK_TOKEN);
        assert_eq!(response.user.role, "admin");

        assert!(store.check_login(DEMO_EMAIL, "nope").is_none());
        assert!(store.check_login("someone@else.com", DEMO_PASSWORD).is_none());
    }

    #[test]
    fn mark_read_touches_only_the_target_row() {
        let store = MockStore::seeded();
        let before = store.notifications();
        let target = before.iter().find(|n| !n.read).expect("unread seed");

        let updated = store.mark_read(target.id).expect("known id");
        assert!(updated.read);

        let after = store.notifications();
        for (old, new) in before.iter().zip(after.iter()) {
            if old.id == target.id {
                assert!(new.read);
            } else {
                assert_eq!(old.read, new.read);
            }
        }

        assert!(store.mark_read(Uuid::new_v4()).is_none());
    }

    #[test]
    fn mark_all_read_reports_newly_flipped_rows() {
        let store = MockStore::seeded();
        let unread = store.notifications().iter().filter(|n| !n.read).count();

        assert_eq!(store.mark_all_read(), unread);
        assert!(store.notifications().iter().all(|n| n.read));
        assert_eq!(store.mark_all_read(), 0);
    }

    #[test]
    fn ticks_are_monotonic() {
        let store = MockStore::seeded();
        assert_eq!(store.market_stats().tick_count, 0);
        assert_eq!(store.next_tick().tick_count, 1);
        assert_eq!(store.next_tick().tick_count, 2);
        assert_eq!(store.market_stats().tick_count, 2);
    }
}
