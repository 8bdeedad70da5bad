use crate::transport::TransportKind;
use std::time::Duration;

/// Default sub-channel path on the remote endpoint.
const DEFAULT_PATH: &str = "/socket.io/";

/// Largest exponent applied to the base delay. 2^20 times any sane base
/// delay is already far beyond any configurable ceiling, and keeping the
/// shift bounded avoids overflow for absurd attempt numbers.
const MAX_BACKOFF_EXP: u32 = 20;

/// Configuration for a single managed connection.
///
/// Immutable once built. Construct via [`ConnectionConfig::builder`].
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Target address (e.g. `wss://feed.example.com`)
    pub url: String,
    /// Sub-channel path on the endpoint
    pub path: String,
    /// Allowed transport kinds, in preference order
    pub transports: Vec<TransportKind>,
    /// Identifier used as log label and status-registry key
    pub connection_name: String,
    /// Optional namespace suffix appended to the URL
    pub namespace: Option<String>,
    /// Reconnection policy
    pub retry: RetryConfig,
    /// Timeout for establishing a single connection
    pub connect_timeout: Duration,
}

impl ConnectionConfig {
    /// Create a new builder. `url` and `connection_name` are required;
    /// everything else has defaults.
    pub fn builder(
        url: impl Into<String>,
        connection_name: impl Into<String>,
    ) -> ConnectionConfigBuilder {
        ConnectionConfigBuilder::new(url.into(), connection_name.into())
    }

    /// The full connection target: base URL plus optional namespace suffix.
    pub fn target(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{}{}", self.url, ns),
            None => self.url.clone(),
        }
    }
}

/// Builder for [`ConnectionConfig`]
#[derive(Debug, Clone)]
pub struct ConnectionConfigBuilder {
    config: ConnectionConfig,
}

impl ConnectionConfigBuilder {
    fn new(url: String, connection_name: String) -> Self {
        Self {
            config: ConnectionConfig {
                url,
                path: DEFAULT_PATH.to_string(),
                transports: vec![TransportKind::WebSocket, TransportKind::Polling],
                connection_name,
                namespace: None,
                retry: RetryConfig::default(),
                connect_timeout: Duration::from_secs(10),
            },
        }
    }

    /// Set the sub-channel path
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.config.path = path.into();
        self
    }

    /// Set the allowed transport kinds
    pub fn transports(mut self, transports: Vec<TransportKind>) -> Self {
        self.config.transports = transports;
        self
    }

    /// Set the namespace suffix
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.config.namespace = Some(namespace.into());
        self
    }

    /// Set the full retry configuration
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self
    }

    /// Set the maximum number of reconnection attempts
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.config.retry.max_attempts = max_attempts;
        self
    }

    /// Set the base retry delay
    pub fn base_delay(mut self, base_delay: Duration) -> Self {
        self.config.retry.base_delay = base_delay;
        self
    }

    /// Set the retry delay ceiling
    pub fn max_delay(mut self, max_delay: Duration) -> Self {
        self.config.retry.max_delay = max_delay;
        self
    }

    /// Set the connect timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Build the configuration with validation.
    pub fn build(self) -> Result<ConnectionConfig, ConfigError> {
        if self.config.url.is_empty() {
            return Err(ConfigError::InvalidConnection(
                "url must not be empty".to_string(),
            ));
        }

        if self.config.connection_name.is_empty() {
            return Err(ConfigError::InvalidConnection(
                "connection_name must not be empty".to_string(),
            ));
        }

        if self.config.transports.is_empty() {
            return Err(ConfigError::InvalidConnection(
                "at least one transport kind is required".to_string(),
            ));
        }

        if self.config.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidRetry(
                "max_attempts must be at least 1".to_string(),
            ));
        }

        if self.config.retry.base_delay.is_zero() {
            return Err(ConfigError::InvalidRetry(
                "base_delay must be non-zero".to_string(),
            ));
        }

        if self.config.retry.max_delay < self.config.retry.base_delay {
            return Err(ConfigError::InvalidRetry(
                "max_delay must be >= base_delay".to_string(),
            ));
        }

        Ok(self.config)
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// Invalid retry configuration
    #[error("invalid retry configuration: {0}")]
    InvalidRetry(String),
    /// Invalid connection configuration
    #[error("invalid connection configuration: {0}")]
    InvalidConnection(String),
}

/// Reconnection policy: attempt budget plus capped exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of reconnection attempts before giving up
    pub max_attempts: u32,
    /// Delay before the first reconnection attempt
    pub base_delay: Duration,
    /// Ceiling on the delay between attempts
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(5000),
        }
    }
}

impl RetryConfig {
    /// Delay before the given attempt (1-based): `base * 2^(attempt-1)`,
    /// clamped to `max_delay`. Attempt 1 uses the base delay.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(MAX_BACKOFF_EXP);
        let millis = (self.base_delay.as_millis() as u64).saturating_mul(1u64 << exp);
        Duration::from_millis(millis).min(self.max_delay)
    }
}
