use std::sync::{Arc, Mutex};

use log::debug;
use tokio::sync::watch;
use uuid::Uuid;

use crate::model::{ConnectionState, MarketStatsSnapshot, Notification};

#[derive(Debug, Default)]
struct MergedView {
    market_stats: Option<MarketStatsSnapshot>,
    notifications: Vec<Notification>,
}

/// Merged client-side view of server-pushed state. All writes are
/// last-write-wins in processing order; a late-arriving older snapshot
/// overwrites a newer one.
#[derive(Clone)]
pub struct SharedState {
    view: Arc<Mutex<MergedView>>,
    connection: Arc<watch::Sender<ConnectionState>>,
}

impl SharedState {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ConnectionState::Disconnected);
        Self {
            view: Arc::new(Mutex::new(MergedView::default())),
            connection: Arc::new(tx),
        }
    }

    /// Wholesale replacement; no partial merge of fields.
    pub fn apply_market_stats(&self, snapshot: MarketStatsSnapshot) {
        let mut view = self.view.lock().unwrap();
        view.market_stats = Some(snapshot);
    }

    pub fn market_stats(&self) -> Option<MarketStatsSnapshot> {
        self.view.lock().unwrap().market_stats
    }

    /// Newest first, matching the console's notification panel order.
    pub fn push_notification(&self, notification: Notification) {
        let mut view = self.view.lock().unwrap();
        view.notifications.insert(0, notification);
    }

    /// Replaces the whole list with the batch fetched at startup.
    pub fn replace_notifications(&self, notifications: Vec<Notification>) {
        let mut view = self.view.lock().unwrap();
        view.notifications = notifications;
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.view.lock().unwrap().notifications.clone()
    }

    pub fn unread_count(&self) -> usize {
        self.view
            .lock()
            .unwrap()
            .notifications
            .iter()
            .filter(|n| !n.read)
            .count()
    }

    /// Flips exactly the matching row; returns whether a row matched.
    pub fn mark_read(&self, id: Uuid) -> bool {
        let mut view = self.view.lock().unwrap();
        match view.notifications.iter_mut().find(|n| n.id == id) {
            Some(notification) => {
                notification.read = true;
                true
            }
            None => false,
        }
    }

    /// Returns the number of rows newly flipped.
    pub fn mark_all_read(&self) -> usize {
        let mut view = self.view.lock().unwrap();
        let mut flipped = 0;
        for notification in view.notifications.iter_mut() {
            if !notification.read {
                notification.read = true;
                flipped += 1;
            }
        }
        flipped
    }

    pub fn set_connection_state(&self, state: ConnectionState) {
        let previous = self.connection.send_replace(state);
        if previous != state {
            debug!("Connection state: {:?} -> {:?}", previous, state);
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.connection.borrow()
    }

    /// Watch handle for consumers that render connection status.
    pub fn watch_connection(&self) -> watch::Receiver<ConnectionState> {
        self.connection.subscribe()
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}
