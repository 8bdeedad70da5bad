//! # ws-reconnect
//!
//! Single-connection WebSocket manager with application-controlled
//! reconnection.
//!
//! The [`ConnectionManager`] owns one logical persistent connection: at most
//! one live transport handle and at most one pending retry timer. The
//! transport's built-in retry is disabled and the manager decides itself
//! when to reconnect, with capped exponential backoff and a bounded attempt
//! budget.
//!
//! ## Features
//!
//! - Capped exponential backoff with a configurable attempt budget
//! - Manual disconnects suppress auto-retry until the next connect
//! - Lifecycle hooks for connect, disconnect, and the retry cycle
//! - Injected status registry tracking per-connection up/down state
//! - Pluggable transport layer; tokio-tungstenite implementation included
//! - Forced reconnect with stale-handle isolation and a short grace delay
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use ws_reconnect::{ConnectionConfig, ConnectionManager, InMemoryStatusRegistry, NoopHooks};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConnectionConfig::builder("wss://stream.example.com", "prices").build()?;
//!     let registry = Arc::new(InMemoryStatusRegistry::new());
//!     let manager = ConnectionManager::with_websocket_transport(config, NoopHooks, registry);
//!
//!     manager.connect();
//!     manager.on("tick", Arc::new(|payload| println!("tick: {payload}")));
//!     Ok(())
//! }
//! ```

mod config;
mod error;
mod hooks;
mod manager;
mod metrics;
mod registry;
mod transport;
mod ws;

pub use config::{ConfigError, ConnectionConfig, ConnectionConfigBuilder, RetryConfig};
pub use error::{Error, ErrorKind};
pub use hooks::{LifecycleHooks, NoopHooks};
pub use manager::ConnectionManager;
pub use metrics::{Metrics, MetricsSnapshot};
pub use registry::{InMemoryStatusRegistry, StatusRegistry};
pub use transport::{
    DisconnectReason, ListenerId, Listeners, MessageCallback, TransportEvent, TransportFactory,
    TransportFailure, TransportHandle, TransportKind, TransportOptions,
};
pub use ws::{WebSocketFactory, WebSocketTransport};

/// Convenience alias for results with this crate's error type.
pub type Result<T> = std::result::Result<T, Error>;
