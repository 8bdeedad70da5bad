use crate::error::{Error, ErrorKind};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Callback invoked for application-level message events.
pub type MessageCallback = Arc<dyn Fn(&Value) + Send + Sync>;

/// Identifies a registered message listener so it can be removed later.
///
/// Closures are not comparable, so [`TransportHandle::on`] hands back an id
/// and [`TransportHandle::off`] takes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Transport kinds a connection is allowed to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// WebSocket framing over TCP/TLS
    WebSocket,
    /// Long-polling fallback
    Polling,
}

/// Options the manager passes to the transport factory.
///
/// `auto_connect` and `reconnection` are always set to `false` by the
/// manager: it issues connects itself and is the sole authority on retry
/// policy.
#[derive(Debug, Clone)]
pub struct TransportOptions {
    /// Sub-channel path on the endpoint
    pub path: String,
    /// Allowed transport kinds, in preference order
    pub transports: Vec<TransportKind>,
    /// Whether the handle should connect on creation
    pub auto_connect: bool,
    /// Whether the transport's built-in retry is enabled
    pub reconnection: bool,
    /// Timeout for establishing a single connection
    pub connect_timeout: Duration,
}

/// Why a connection ended.
///
/// An enumerated reason rather than a reason string: the manager matches on
/// `ClientInitiated` to decide whether a drop should trigger a retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The owning side closed the connection on purpose
    ClientInitiated,
    /// The remote endpoint closed the connection
    ServerInitiated,
    /// The connection dropped due to a transport failure
    ConnectionLost,
}

/// Cloneable error surface carried by [`TransportEvent::ConnectError`].
#[derive(Debug, Clone)]
pub struct TransportFailure {
    /// Error class for decision-making
    pub kind: ErrorKind,
    /// Human-readable description
    pub message: String,
}

impl TransportFailure {
    /// Create a failure from a kind and message.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<&Error> for TransportFailure {
    fn from(err: &Error) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl fmt::Display for TransportFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Lifecycle events a transport handle delivers to its subscribers.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// The connection was established
    Connected,
    /// The connection ended
    Disconnected(DisconnectReason),
    /// Connection establishment failed
    ConnectError(TransportFailure),
}

/// One attempt at a live bidirectional connection to the remote endpoint.
///
/// `connect` only issues the attempt; the outcome arrives asynchronously on
/// receivers obtained via `subscribe`. `detach_listeners` makes the handle
/// inert: it clears both message listeners and lifecycle subscribers, so a
/// replaced handle can never deliver stale events.
pub trait TransportHandle: Send + Sync {
    /// Issue the connect. Outcome is reported via subscribed events.
    fn connect(&self);

    /// Close the connection (or abandon an in-flight attempt).
    fn disconnect(&self);

    /// Whether the handle currently reports an established connection.
    fn is_connected(&self) -> bool;

    /// Subscribe to lifecycle events.
    fn subscribe(&self) -> mpsc::UnboundedReceiver<TransportEvent>;

    /// Remove all message listeners and lifecycle subscribers.
    fn detach_listeners(&self);

    /// Register a callback for an application-level message event.
    fn on(&self, event: &str, callback: MessageCallback) -> ListenerId;

    /// Remove a previously registered callback.
    fn off(&self, event: &str, id: ListenerId);

    /// Send an application-level message event.
    fn emit(&self, event: &str, payload: Value);
}

/// Produces a fresh transport handle for a connection target.
pub trait TransportFactory: Send + Sync {
    /// Create a handle for `target` with the given options. The handle must
    /// not connect on its own; the caller issues `connect` explicitly.
    fn create(&self, target: &str, options: &TransportOptions) -> Arc<dyn TransportHandle>;
}

/// Listener table shared by transport implementations.
///
/// Maps event names to registered callbacks and hands out ids for removal.
#[derive(Default)]
pub struct Listeners {
    table: RwLock<HashMap<String, Vec<(ListenerId, MessageCallback)>>>,
    next_id: AtomicU64,
}

impl Listeners {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for an event, returning its id.
    pub fn add(&self, event: &str, callback: MessageCallback) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.table
            .write()
            .entry(event.to_string())
            .or_default()
            .push((id, callback));
        id
    }

    /// Remove a callback. Returns `true` if it was registered.
    pub fn remove(&self, event: &str, id: ListenerId) -> bool {
        let mut table = self.table.write();
        match table.get_mut(event) {
            Some(callbacks) => {
                let before = callbacks.len();
                callbacks.retain(|(registered, _)| *registered != id);
                let removed = before > callbacks.len();
                if callbacks.is_empty() {
                    table.remove(event);
                }
                removed
            }
            None => false,
        }
    }

    /// Invoke every callback registered for an event. Returns the number of
    /// callbacks invoked.
    ///
    /// The matching callbacks are cloned out before invocation, so the lock
    /// is never held across user code and a callback may call
    /// `add`/`remove` on the same table.
    pub fn dispatch(&self, event: &str, payload: &Value) -> usize {
        let callbacks: Vec<MessageCallback> = {
            let table = self.table.read();
            match table.get(event) {
                Some(entries) => entries.iter().map(|(_, cb)| Arc::clone(cb)).collect(),
                None => return 0,
            }
        };
        for callback in &callbacks {
            callback(payload);
        }
        callbacks.len()
    }

    /// Drop every registered callback.
    pub fn clear(&self) {
        self.table.write().clear();
    }
}

impl fmt::Debug for Listeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = self.table.read();
        f.debug_struct("Listeners")
            .field("events", &table.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    fn recording() -> (Arc<Mutex<Vec<Value>>>, MessageCallback) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        (seen, Arc::new(move |value: &Value| sink.lock().push(value.clone())))
    }

    #[test]
    fn test_dispatch_routes_by_event_name() {
        let listeners = Listeners::new();
        let (seen_tick, cb_tick) = recording();
        let (seen_book, cb_book) = recording();
        listeners.add("tick", cb_tick);
        listeners.add("book", cb_book);

        assert_eq!(listeners.dispatch("tick", &json!({"px": 1})), 1);
        assert_eq!(listeners.dispatch("missing", &json!(null)), 0);

        assert_eq!(seen_tick.lock().as_slice(), &[json!({"px": 1})]);
        assert!(seen_book.lock().is_empty());
    }

    #[test]
    fn test_remove_by_id() {
        let listeners = Listeners::new();
        let (seen, cb) = recording();
        let id = listeners.add("tick", cb);

        assert!(listeners.remove("tick", id));
        assert!(!listeners.remove("tick", id));
        assert_eq!(listeners.dispatch("tick", &json!(1)), 0);
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn test_remove_keeps_other_listeners() {
        let listeners = Listeners::new();
        let (_, cb_a) = recording();
        let (seen_b, cb_b) = recording();
        let id_a = listeners.add("tick", cb_a);
        listeners.add("tick", cb_b);

        assert!(listeners.remove("tick", id_a));
        assert_eq!(listeners.dispatch("tick", &json!(2)), 1);
        assert_eq!(seen_b.lock().len(), 1);
    }

    #[test]
    fn test_callback_may_register_listeners_during_dispatch() {
        let listeners = Arc::new(Listeners::new());
        let table = Arc::clone(&listeners);
        listeners.add(
            "tick",
            Arc::new(move |_: &Value| {
                table.add("book", Arc::new(|_: &Value| {}));
            }),
        );

        // Re-entrant add from inside the callback must not deadlock
        assert_eq!(listeners.dispatch("tick", &json!(1)), 1);
        assert_eq!(listeners.dispatch("book", &json!(2)), 1);
    }

    #[test]
    fn test_callback_may_remove_itself_during_dispatch() {
        let listeners = Arc::new(Listeners::new());
        let table = Arc::clone(&listeners);
        let slot: Arc<Mutex<Option<ListenerId>>> = Arc::new(Mutex::new(None));
        let registered = Arc::clone(&slot);
        let id = listeners.add(
            "tick",
            Arc::new(move |_: &Value| {
                if let Some(id) = registered.lock().take() {
                    table.remove("tick", id);
                }
            }),
        );
        *slot.lock() = Some(id);

        assert_eq!(listeners.dispatch("tick", &json!(1)), 1);
        // Gone after removing itself
        assert_eq!(listeners.dispatch("tick", &json!(2)), 0);
    }

    #[test]
    fn test_clear_drops_everything() {
        let listeners = Listeners::new();
        let (_, cb) = recording();
        listeners.add("tick", cb);

        listeners.clear();
        assert_eq!(listeners.dispatch("tick", &json!(1)), 0);
    }
}
