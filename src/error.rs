use crate::transport::TransportKind;
use std::time::Duration;
use thiserror::Error;

/// Categorizes errors for hook decision-making.
///
/// This is a lightweight, cloneable representation of the error type
/// that rides along transport events so hooks can branch on the error
/// class without holding the full (non-`Clone`) error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// WebSocket protocol error
    WebSocket,
    /// Connection establishment failed (refused, DNS, TLS, ...)
    ConnectionFailed,
    /// Connection attempt timed out
    Timeout,
    /// The target URL could not be parsed
    InvalidTarget,
    /// None of the configured transport kinds is supported
    UnsupportedTransport,
}

/// Errors that can occur inside a transport implementation.
///
/// The manager's lifecycle methods never return these; failures surface
/// asynchronously through [`LifecycleHooks`](crate::LifecycleHooks) as
/// [`TransportFailure`](crate::TransportFailure) values.
#[derive(Error, Debug)]
pub enum Error {
    /// WebSocket connection error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Connection establishment failed
    #[error("connection to {target} failed: {message}")]
    ConnectionFailed { target: String, message: String },

    /// Connection attempt exceeded the configured timeout
    #[error("connect timed out after {0:?}")]
    Timeout(Duration),

    /// The target URL could not be parsed
    #[error("invalid target URL: {0}")]
    InvalidTarget(#[from] url::ParseError),

    /// None of the allowed transport kinds is supported by this transport
    #[error("no supported transport kind in {0:?}")]
    UnsupportedTransport(Vec<TransportKind>),
}

impl Error {
    /// Get the kind of this error for decision-making.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::WebSocket(_) => ErrorKind::WebSocket,
            Error::ConnectionFailed { .. } => ErrorKind::ConnectionFailed,
            Error::Timeout(_) => ErrorKind::Timeout,
            Error::InvalidTarget(_) => ErrorKind::InvalidTarget,
            Error::UnsupportedTransport(_) => ErrorKind::UnsupportedTransport,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        let err = Error::ConnectionFailed {
            target: "ws://example".to_string(),
            message: "refused".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::ConnectionFailed);

        let err = Error::Timeout(Duration::from_secs(10));
        assert_eq!(err.kind(), ErrorKind::Timeout);

        let err = Error::UnsupportedTransport(vec![TransportKind::Polling]);
        assert_eq!(err.kind(), ErrorKind::UnsupportedTransport);
    }
}
