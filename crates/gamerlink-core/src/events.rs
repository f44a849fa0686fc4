//! Session event fan-out.
//!
//! Listeners registered on a [`EventNotifier`] run synchronously in
//! registration order. After local listeners, every event is also broadcast
//! as a [`Notification`] named `<namespace>:<kind>` so observers without a
//! reference to the client can react through [`EventNotifier::subscribe`].

use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::auth::UserRef;

/// Capacity of the outward notification channel.
/// Slow subscribers lag and skip old notifications instead of blocking emit.
const NOTIFICATION_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Login,
    Logout,
    Error,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Login => "login",
            EventKind::Logout => "logout",
            EventKind::Error => "error",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Login { user: UserRef },
    Logout,
    Error { message: String },
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Login { .. } => EventKind::Login,
            Event::Logout => EventKind::Logout,
            Event::Error { .. } => EventKind::Error,
        }
    }

    /// Event data as sent on the notification channel
    pub fn payload(&self) -> Value {
        match self {
            Event::Login { user } => json!(user),
            Event::Logout => Value::Null,
            Event::Error { message } => json!({ "message": message }),
        }
    }
}

/// A named event on the outward channel
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub name: String,
    pub payload: Value,
}

/// Callback registered for an event kind. Identity is the `Arc` pointer.
pub type Listener = Arc<dyn Fn(&Event) + Send + Sync>;

/// Wrap a closure as a [`Listener`]
pub fn listener<F>(f: F) -> Listener
where
    F: Fn(&Event) + Send + Sync + 'static,
{
    Arc::new(f)
}

pub struct EventNotifier {
    namespace: String,
    listeners: Mutex<HashMap<EventKind, Vec<Listener>>>,
    outward: broadcast::Sender<Notification>,
}

impl EventNotifier {
    pub fn new(namespace: impl Into<String>) -> Self {
        let (outward, _) = broadcast::channel(NOTIFICATION_CHANNEL_CAPACITY);
        Self {
            namespace: namespace.into(),
            listeners: Mutex::new(HashMap::new()),
            outward,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Register a listener. Registering the same listener twice runs it twice.
    pub fn on(&self, kind: EventKind, listener: Listener) {
        self.listeners.lock().entry(kind).or_default().push(listener);
    }

    /// Remove every registration of `listener` for `kind`
    pub fn off(&self, kind: EventKind, listener: &Listener) {
        let mut listeners = self.listeners.lock();
        if let Some(registered) = listeners.get_mut(&kind) {
            registered.retain(|l| !Arc::ptr_eq(l, listener));
        }
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners.lock().get(&kind).map_or(0, Vec::len)
    }

    /// Receive every notification emitted after this call
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.outward.subscribe()
    }

    pub fn emit(&self, event: Event) {
        let kind = event.kind();
        // Run listeners on a snapshot so they may call on/off themselves
        let snapshot: Vec<Listener> = self
            .listeners
            .lock()
            .get(&kind)
            .cloned()
            .unwrap_or_default();

        for (index, listener) in snapshot.iter().enumerate() {
            if catch_unwind(AssertUnwindSafe(|| listener(&event))).is_err() {
                warn!(event = %kind, index, "Event listener panicked");
            }
        }

        let notification = Notification {
            name: format!("{}:{}", self.namespace, kind),
            payload: event.payload(),
        };
        if self.outward.send(notification).is_err() {
            debug!(event = %kind, "No notification subscribers");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn recorder(log: &Arc<Mutex<Vec<String>>>, tag: &'static str) -> Listener {
        let log = Arc::clone(log);
        listener(move |_event| log.lock().push(tag.to_string()))
    }

    #[test]
    fn test_listeners_run_in_registration_order() {
        let notifier = EventNotifier::new("test");
        let log = Arc::new(Mutex::new(Vec::new()));
        notifier.on(EventKind::Logout, recorder(&log, "first"));
        notifier.on(EventKind::Logout, recorder(&log, "second"));
        notifier.on(EventKind::Login, recorder(&log, "other-kind"));

        notifier.emit(Event::Logout);
        assert_eq!(*log.lock(), vec!["first", "second"]);
    }

    #[test]
    fn test_duplicate_registration_runs_twice_and_off_removes_all() {
        let notifier = EventNotifier::new("test");
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = {
            let hits = Arc::clone(&hits);
            listener(move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            })
        };
        notifier.on(EventKind::Error, counter.clone());
        notifier.on(EventKind::Error, counter.clone());
        assert_eq!(notifier.listener_count(EventKind::Error), 2);

        notifier.emit(Event::Error { message: "x".to_string() });
        assert_eq!(hits.load(Ordering::SeqCst), 2);

        notifier.off(EventKind::Error, &counter);
        assert_eq!(notifier.listener_count(EventKind::Error), 0);
        notifier.emit(Event::Error { message: "x".to_string() });
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_off_leaves_other_listeners() {
        let notifier = EventNotifier::new("test");
        let log = Arc::new(Mutex::new(Vec::new()));
        let keep = recorder(&log, "keep");
        let drop_me = recorder(&log, "drop");
        notifier.on(EventKind::Login, keep);
        notifier.on(EventKind::Login, drop_me.clone());

        notifier.off(EventKind::Login, &drop_me);
        // Removing an unknown listener is a no-op
        notifier.off(EventKind::Logout, &drop_me);

        notifier.emit(Event::Login { user: UserRef::new("J", None) });
        assert_eq!(*log.lock(), vec!["keep"]);
    }

    #[test]
    fn test_panicking_listener_does_not_stop_others() {
        let notifier = EventNotifier::new("test");
        let log = Arc::new(Mutex::new(Vec::new()));
        notifier.on(EventKind::Logout, listener(|_| panic!("listener failure")));
        notifier.on(EventKind::Logout, recorder(&log, "after"));

        notifier.emit(Event::Logout);
        assert_eq!(*log.lock(), vec!["after"]);
    }

    #[test]
    fn test_listener_may_unregister_itself() {
        let notifier = Arc::new(EventNotifier::new("test"));
        let slot: Arc<Mutex<Option<Listener>>> = Arc::new(Mutex::new(None));
        let once = {
            let notifier = Arc::clone(&notifier);
            let slot = Arc::clone(&slot);
            listener(move |_| {
                if let Some(me) = slot.lock().take() {
                    notifier.off(EventKind::Logout, &me);
                }
            })
        };
        *slot.lock() = Some(once.clone());
        notifier.on(EventKind::Logout, once);

        notifier.emit(Event::Logout);
        assert_eq!(notifier.listener_count(EventKind::Logout), 0);
    }

    #[tokio::test]
    async fn test_notifications_are_namespaced() {
        let notifier = EventNotifier::new("gamerlink");
        let mut rx = notifier.subscribe();

        notifier.emit(Event::Login { user: UserRef::new("Jackie", Some("a@b.com".to_string())) });
        notifier.emit(Event::Error { message: "boom".to_string() });
        notifier.emit(Event::Logout);

        let login = rx.recv().await.unwrap();
        assert_eq!(login.name, "gamerlink:login");
        assert_eq!(login.payload, json!({"username": "Jackie", "email": "a@b.com"}));

        let error = rx.recv().await.unwrap();
        assert_eq!(error.name, "gamerlink:error");
        assert_eq!(error.payload, json!({"message": "boom"}));

        let logout = rx.recv().await.unwrap();
        assert_eq!(logout.name, "gamerlink:logout");
        assert_eq!(logout.payload, Value::Null);
    }

    #[test]
    fn test_emit_without_subscribers_is_fine() {
        let notifier = EventNotifier::new("test");
        notifier.emit(Event::Logout);
    }
}
