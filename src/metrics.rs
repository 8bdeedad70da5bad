use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for observing a managed connection.
///
/// Use `snapshot()` for a point-in-time view, or the individual getters.
#[derive(Debug, Default)]
pub struct Metrics {
    connections_total: AtomicU64,
    reconnections_total: AtomicU64,
    connect_errors_total: AtomicU64,
    retries_scheduled_total: AtomicU64,
    retry_exhaustions_total: AtomicU64,
}

/// Point-in-time copy of all counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Successful connects
    pub connections: u64,
    /// Successful connects that ended a retry cycle
    pub reconnections: u64,
    /// Connect errors reported by the transport
    pub connect_errors: u64,
    /// Retries scheduled by the backoff policy
    pub retries_scheduled: u64,
    /// Times the attempt budget was exhausted
    pub retry_exhaustions: u64,
}

impl Metrics {
    /// Create a new Metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Get total successful connects
    pub fn connections(&self) -> u64 {
        self.connections_total.load(Ordering::Relaxed)
    }

    /// Get total reconnections (successful connects ending a retry cycle)
    pub fn reconnections(&self) -> u64 {
        self.reconnections_total.load(Ordering::Relaxed)
    }

    /// Get total connect errors
    pub fn connect_errors(&self) -> u64 {
        self.connect_errors_total.load(Ordering::Relaxed)
    }

    /// Get total retries scheduled
    pub fn retries_scheduled(&self) -> u64 {
        self.retries_scheduled_total.load(Ordering::Relaxed)
    }

    /// Get total attempt-budget exhaustions
    pub fn retry_exhaustions(&self) -> u64 {
        self.retry_exhaustions_total.load(Ordering::Relaxed)
    }

    /// Get a point-in-time snapshot of all counters
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections: self.connections(),
            reconnections: self.reconnections(),
            connect_errors: self.connect_errors(),
            retries_scheduled: self.retries_scheduled(),
            retry_exhaustions: self.retry_exhaustions(),
        }
    }

    pub(crate) fn record_connection(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_reconnection(&self) {
        self.reconnections_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_connect_error(&self) {
        self.connect_errors_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_retry_scheduled(&self) {
        self.retries_scheduled_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_retry_exhaustion(&self) {
        self.retry_exhaustions_total.fetch_add(1, Ordering::Relaxed);
    }
}
