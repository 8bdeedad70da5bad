use crate::transport::{DisconnectReason, TransportFailure};

/// Lifecycle callbacks for a managed connection.
///
/// Every method has a default no-op body, so implementors only override the
/// transitions they care about. All reporting is asynchronous with respect
/// to the lifecycle methods: the manager never returns errors, it calls
/// these hooks.
///
/// Reconnection-cycle semantics: `on_reconnect_attempt` fires when a retry
/// is scheduled (with the 1-based attempt number), `on_reconnect` fires on a
/// successful connect that ends a retry cycle, `on_reconnect_error` fires on
/// a connect error during a retry cycle, and `on_reconnect_failed` fires
/// once when the attempt budget is exhausted.
pub trait LifecycleHooks: Send + Sync + 'static {
    /// The connection was established.
    fn on_connect(&self) {}

    /// The connection dropped (not called for manual disconnects, whose
    /// listeners are detached before the close).
    fn on_disconnect(&self, _reason: DisconnectReason) {}

    /// Connection establishment failed.
    fn on_connect_error(&self, _error: &TransportFailure) {}

    /// A retry cycle ended in a successful connect after `attempt` tries.
    fn on_reconnect(&self, _attempt: u32) {}

    /// Retry number `attempt` was scheduled.
    fn on_reconnect_attempt(&self, _attempt: u32) {}

    /// A connect error occurred mid retry cycle.
    fn on_reconnect_error(&self, _error: &TransportFailure) {}

    /// The attempt budget is exhausted; no further retry will be scheduled
    /// until the caller reconnects explicitly.
    fn on_reconnect_failed(&self) {}
}

/// Hooks implementation that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

impl LifecycleHooks for NoopHooks {}
