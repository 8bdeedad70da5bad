use crate::config::ConnectionConfig;
use crate::hooks::LifecycleHooks;
use crate::metrics::Metrics;
use crate::registry::StatusRegistry;
use crate::transport::{
    DisconnectReason, ListenerId, MessageCallback, TransportEvent, TransportFactory,
    TransportHandle, TransportOptions,
};
use crate::ws::WebSocketFactory;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Delay between closing the old handle and reconnecting in
/// `force_reconnect`, letting the prior close settle first.
const FORCE_RECONNECT_GRACE: Duration = Duration::from_millis(100);

/// Manages one logical persistent connection with application-controlled
/// reconnection.
///
/// The manager owns at most one live transport handle and at most one
/// pending retry timer. Transport lifecycle events drive the state machine:
/// a successful connect resets the attempt counter, a drop or connect error
/// schedules a retry with capped exponential backoff unless the disconnect
/// was manual or the attempt budget is exhausted. Connectivity transitions
/// are written into the injected [`StatusRegistry`] under the configured
/// connection name.
///
/// Lifecycle methods never return errors; failures are reported through the
/// [`LifecycleHooks`] implementation supplied at construction.
///
/// # Thread safety
///
/// All methods can be called from multiple tasks concurrently. Internal
/// state is protected by a `parking_lot::Mutex` that is never held across
/// hook invocations. Must be used within a tokio runtime (retry timers and
/// event pumps are spawned tasks).
pub struct ConnectionManager<H: LifecycleHooks> {
    inner: Arc<Inner<H>>,
}

struct Inner<H: LifecycleHooks> {
    config: ConnectionConfig,
    hooks: Arc<H>,
    factory: Arc<dyn TransportFactory>,
    registry: Arc<dyn StatusRegistry>,
    metrics: Arc<Metrics>,
    state: Mutex<ManagerState>,
}

#[derive(Default)]
struct ManagerState {
    handle: Option<Arc<dyn TransportHandle>>,
    /// Task translating transport events into state transitions; aborted
    /// whenever the handle it serves is detached.
    event_pump: Option<JoinHandle<()>>,
    /// At most one pending retry (or force-reconnect grace) timer.
    retry_timer: Option<JoinHandle<()>>,
    reconnect_attempts: u32,
    manual_disconnect: bool,
}

impl ManagerState {
    fn cancel_retry_timer(&mut self) {
        if let Some(timer) = self.retry_timer.take() {
            timer.abort();
        }
    }

    /// Take the current handle out of the state with its event pump
    /// stopped, so events from it can no longer reach the manager.
    fn detach_handle(&mut self) -> Option<Arc<dyn TransportHandle>> {
        if let Some(pump) = self.event_pump.take() {
            pump.abort();
        }
        self.handle.take()
    }
}

impl<H: LifecycleHooks> ConnectionManager<H> {
    /// Create a new manager with an explicit transport factory and status
    /// registry.
    pub fn new(
        config: ConnectionConfig,
        hooks: H,
        factory: Arc<dyn TransportFactory>,
        registry: Arc<dyn StatusRegistry>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                hooks: Arc::new(hooks),
                factory,
                registry,
                metrics: Arc::new(Metrics::new()),
                state: Mutex::new(ManagerState::default()),
            }),
        }
    }

    /// Create a new manager backed by the built-in tokio-tungstenite
    /// transport.
    pub fn with_websocket_transport(
        config: ConnectionConfig,
        hooks: H,
        registry: Arc<dyn StatusRegistry>,
    ) -> Self {
        Self::new(config, hooks, Arc::new(WebSocketFactory::new()), registry)
    }

    /// Establish the connection, returning the transport handle.
    ///
    /// Idempotent on a live connection: if the current handle reports
    /// connected, it is returned unchanged. Otherwise any stale handle is
    /// detached and closed before a fresh one is created. The handle is
    /// returned synchronously; success or failure arrives via hooks.
    pub fn connect(&self) -> Arc<dyn TransportHandle> {
        self.inner.connect()
    }

    /// Manually disconnect. Cancels any pending retry, detaches and closes
    /// the handle, and suppresses auto-retry until the next
    /// `connect`/`force_reconnect`. Safe to call when already disconnected.
    pub fn disconnect(&self) {
        self.inner.disconnect();
    }

    /// Terminal teardown. Equivalent to `disconnect` plus a final timer
    /// cancellation; the instance is not meant to be used afterwards.
    pub fn destroy(&self) {
        self.inner.destroy();
    }

    /// Close the current handle and reconnect after a short grace delay,
    /// resetting the attempt counter and the manual-disconnect flag.
    pub fn force_reconnect(&self) {
        self.inner.force_reconnect();
    }

    /// Whether a transport handle exists and reports itself connected.
    pub fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    /// The current transport handle, if any.
    pub fn handle(&self) -> Option<Arc<dyn TransportHandle>> {
        self.inner.handle()
    }

    /// Number of retries scheduled in the current reconnection cycle.
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.state.lock().reconnect_attempts
    }

    /// Get a reference to the hooks
    pub fn hooks(&self) -> &Arc<H> {
        &self.inner.hooks
    }

    /// Get the metrics for this manager
    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.inner.metrics)
    }

    /// Register a message listener on the current handle. Returns `None`
    /// when no handle exists; the registration is silently dropped. A handle
    /// still mid-connect accepts registrations.
    pub fn on(&self, event: &str, callback: MessageCallback) -> Option<ListenerId> {
        self.inner
            .handle()
            .map(|handle| handle.on(event, callback))
    }

    /// Remove a message listener from the current handle. No-op when no
    /// handle exists.
    pub fn off(&self, event: &str, id: ListenerId) {
        if let Some(handle) = self.inner.handle() {
            handle.off(event, id);
        }
    }

    /// Send a message event on the current handle. Silently dropped when no
    /// handle exists; callers are expected to tolerate transient gaps.
    pub fn emit(&self, event: &str, payload: Value) {
        if let Some(handle) = self.inner.handle() {
            handle.emit(event, payload);
        }
    }
}

impl<H: LifecycleHooks> Inner<H> {
    fn connect(self: &Arc<Self>) -> Arc<dyn TransportHandle> {
        let mut state = self.state.lock();

        if let Some(handle) = state.handle.as_ref() {
            if handle.is_connected() {
                debug!(
                    connection = %self.config.connection_name,
                    "already connected, returning existing handle"
                );
                return Arc::clone(handle);
            }
        }

        // A stale handle must go quiet before it is replaced, or its late
        // events would reach the manager alongside the new handle's.
        if let Some(stale) = state.detach_handle() {
            debug!(
                connection = %self.config.connection_name,
                "discarding stale transport handle"
            );
            stale.detach_listeners();
            stale.disconnect();
        }

        state.manual_disconnect = false;

        let target = self.config.target();
        info!(
            connection = %self.config.connection_name,
            %target,
            "connecting"
        );

        let options = TransportOptions {
            path: self.config.path.clone(),
            transports: self.config.transports.clone(),
            // The manager issues connects itself and is the sole authority
            // on retry policy.
            auto_connect: false,
            reconnection: false,
            connect_timeout: self.config.connect_timeout,
        };

        let handle = self.factory.create(&target, &options);
        let events = handle.subscribe();
        state.event_pump = Some(self.spawn_event_pump(events));
        handle.connect();
        state.handle = Some(Arc::clone(&handle));
        handle
    }

    fn spawn_event_pump(
        self: &Arc<Self>,
        mut events: mpsc::UnboundedReceiver<TransportEvent>,
    ) -> JoinHandle<()> {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                inner.on_transport_event(event);
            }
        })
    }

    fn on_transport_event(self: &Arc<Self>, event: TransportEvent) {
        let name = self.config.connection_name.as_str();
        match event {
            TransportEvent::Connected => {
                let prior_attempts = {
                    let mut state = self.state.lock();
                    let prior = state.reconnect_attempts;
                    state.reconnect_attempts = 0;
                    state.manual_disconnect = false;
                    prior
                };
                self.metrics.record_connection();
                self.registry.set_status(name, true);
                info!(connection = %name, "connected");
                self.hooks.on_connect();
                if prior_attempts > 0 {
                    self.metrics.record_reconnection();
                    self.hooks.on_reconnect(prior_attempts);
                }
            }
            TransportEvent::Disconnected(reason) => {
                self.registry.set_status(name, false);
                warn!(connection = %name, ?reason, "disconnected");
                self.hooks.on_disconnect(reason);
                let should_retry = {
                    let state = self.state.lock();
                    !state.manual_disconnect && reason != DisconnectReason::ClientInitiated
                };
                if should_retry {
                    self.schedule_reconnect();
                }
            }
            TransportEvent::ConnectError(failure) => {
                self.registry.set_status(name, false);
                self.metrics.record_connect_error();
                warn!(
                    connection = %name,
                    kind = ?failure.kind,
                    error = %failure.message,
                    "connect error"
                );
                let (should_retry, mid_retry) = {
                    let state = self.state.lock();
                    (!state.manual_disconnect, state.reconnect_attempts > 0)
                };
                self.hooks.on_connect_error(&failure);
                if mid_retry {
                    self.hooks.on_reconnect_error(&failure);
                }
                if should_retry {
                    self.schedule_reconnect();
                }
            }
        }
    }

    fn schedule_reconnect(self: &Arc<Self>) {
        let attempt = {
            let mut state = self.state.lock();

            if state.reconnect_attempts >= self.config.retry.max_attempts {
                drop(state);
                error!(
                    connection = %self.config.connection_name,
                    max_attempts = self.config.retry.max_attempts,
                    "retry budget exhausted"
                );
                self.metrics.record_retry_exhaustion();
                self.hooks.on_reconnect_failed();
                return;
            }

            state.reconnect_attempts += 1;
            let attempt = state.reconnect_attempts;
            let delay = self.config.retry.delay_for_attempt(attempt);
            debug!(
                connection = %self.config.connection_name,
                attempt,
                max_attempts = self.config.retry.max_attempts,
                ?delay,
                "scheduling reconnect"
            );

            state.cancel_retry_timer();
            let inner = Arc::clone(self);
            state.retry_timer = Some(tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                if inner.state.lock().manual_disconnect {
                    return;
                }
                debug!(
                    connection = %inner.config.connection_name,
                    "retry timer fired, reconnecting"
                );
                inner.connect();
            }));
            attempt
        };

        self.metrics.record_retry_scheduled();
        self.hooks.on_reconnect_attempt(attempt);
    }

    fn disconnect(&self) {
        info!(connection = %self.config.connection_name, "manual disconnect");
        let handle = {
            let mut state = self.state.lock();
            state.manual_disconnect = true;
            state.cancel_retry_timer();
            state.detach_handle()
        };
        if let Some(handle) = handle {
            handle.detach_listeners();
            handle.disconnect();
        }
        self.registry
            .set_status(&self.config.connection_name, false);
    }

    fn destroy(&self) {
        info!(connection = %self.config.connection_name, "destroying connection manager");
        self.disconnect();
        // A retry scheduled between the disconnect and this point would
        // otherwise outlive the manager; double-cancel is harmless.
        self.state.lock().cancel_retry_timer();
    }

    fn force_reconnect(self: &Arc<Self>) {
        info!(connection = %self.config.connection_name, "forcing reconnect");
        let handle = {
            let mut state = self.state.lock();
            state.reconnect_attempts = 0;
            state.manual_disconnect = false;
            state.cancel_retry_timer();

            let inner = Arc::clone(self);
            state.retry_timer = Some(tokio::spawn(async move {
                tokio::time::sleep(FORCE_RECONNECT_GRACE).await;
                if !inner.state.lock().manual_disconnect {
                    inner.connect();
                }
            }));

            state.detach_handle()
        };
        if let Some(handle) = handle {
            handle.detach_listeners();
            handle.disconnect();
        }
    }

    fn is_connected(&self) -> bool {
        self.state
            .lock()
            .handle
            .as_ref()
            .map(|handle| handle.is_connected())
            .unwrap_or(false)
    }

    fn handle(&self) -> Option<Arc<dyn TransportHandle>> {
        self.state.lock().handle.clone()
    }
}
