use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use log::debug;
use serde_json::Value;

pub type EventHandler = Arc<dyn Fn(Value) + Send + Sync>;

struct Registration {
    id: u64,
    handler: EventHandler,
}

/// Dispatches named server-pushed events to registered handlers. One
/// handler per event name; delivery order equals transport order, with no
/// reordering or deduplication.
pub struct EventRouter {
    handlers: Mutex<HashMap<String, Registration>>,
    next_id: AtomicU64,
}

impl EventRouter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            handlers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        })
    }

    /// Installs the handler for `name`, replacing any previous one. The
    /// returned guard unregisters on drop; after that no further
    /// deliveries reach the handler.
    pub fn register(
        self: &Arc<Self>,
        name: &str,
        handler: impl Fn(Value) + Send + Sync + 'static,
    ) -> HandlerGuard {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let previous = self.handlers.lock().unwrap().insert(
            name.to_string(),
            Registration {
                id,
                handler: Arc::new(handler),
            },
        );
        if previous.is_some() {
            debug!("Replaced handler for event: {}", name);
        }

        HandlerGuard {
            name: name.to_string(),
            id,
            router: Arc::downgrade(self),
        }
    }

    pub fn dispatch(&self, name: &str, data: Value) {
        // Clone the handler out of the lock so a handler can re-enter the
        // router (e.g. to register during a lifecycle event).
        let handler = self
            .handlers
            .lock()
            .unwrap()
            .get(name)
            .map(|registration| registration.handler.clone());

        match handler {
            Some(handler) => handler(data),
            None => debug!("No handler registered for event: {}", name),
        }
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.lock().unwrap().len()
    }

    fn unregister(&self, name: &str, id: u64) {
        let mut handlers = self.handlers.lock().unwrap();
        // Only remove if the slot still belongs to this registration; a
        // replacement must not be torn down by the stale guard.
        if handlers.get(name).map(|registration| registration.id) == Some(id) {
            handlers.remove(name);
            debug!("Unregistered handler for event: {}", name);
        }
    }
}

pub struct HandlerGuard {
    name: String,
    id: u64,
    router: Weak<EventRouter>,
}

impl Drop for HandlerGuard {
    fn drop(&mut self) {
        if let Some(router) = self.router.upgrade() {
            router.unregister(&self.name, self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn dropped_guard_stops_deliveries() {
        let router = EventRouter::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = hits.clone();
        let guard = router.register("market_stats", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        router.dispatch("market_stats", json!({"tickCount": 1}));
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        drop(guard);
        router.dispatch("market_stats", json!({"tickCount": 2}));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(router.handler_count(), 0);
    }

    #[test]
    fn reregistration_replaces_and_survives_stale_guard_drop() {
        let router = EventRouter::new();
        let first_hits = Arc::new(AtomicUsize::new(0));
        let second_hits = Arc::new(AtomicUsize::new(0));

        let counter = first_hits.clone();
        let stale_guard = router.register("connect", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let counter = second_hits.clone();
        let _guard = router.register("connect", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        // Dropping the stale guard must not tear down the replacement.
        drop(stale_guard);
        router.dispatch("connect", Value::Null);

        assert_eq!(first_hits.load(Ordering::SeqCst), 0);
        assert_eq!(second_hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn events_are_delivered_in_dispatch_order() {
        let router = EventRouter::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        let _guard = router.register("market_stats", move |data| {
            sink.lock().unwrap().push(data["tickCount"].as_u64().unwrap());
        });

        for tick in [4, 2, 7] {
            router.dispatch("market_stats", json!({ "tickCount": tick }));
        }

        assert_eq!(*seen.lock().unwrap(), vec![4, 2, 7]);
    }

    #[test]
    fn unknown_events_are_dropped() {
        let router = EventRouter::new();
        // Must not panic or grow the registry.
        router.dispatch("no_such_event", Value::Null);
        assert_eq!(router.handler_count(), 0);
    }
}
