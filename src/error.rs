//! Error types for the l2-book-feed crate.
//!
//! Errors are split by the layer that produces them:
//!
//! - [`ConnectError`] - the transport could not establish a connection
//! - [`RecvError`] - an established connection failed while receiving
//! - [`DecodeError`] - a received frame is not a usable depth update
//! - [`Error`] - the crate-level error returned from public operations
//!
//! Only connection exhaustion is fatal to a running client. Receive errors
//! trigger reconnection and decode errors drop a single frame.

use thiserror::Error;

/// The main error type for this crate
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid configuration (bad URL, zero retries, ...)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A single connection attempt failed with a non-retryable error
    #[error("Connection error: {0}")]
    Connect(#[from] ConnectError),

    /// Every connection attempt failed
    #[error("Failed to connect to {url} after {attempts} attempts: {source}")]
    ConnectionExhausted {
        /// Endpoint that could not be reached
        url: String,
        /// Number of attempts made
        attempts: u32,
        /// Error from the final attempt
        #[source]
        source: ConnectError,
    },

    /// The operation was interrupted by `stop()`
    #[error("Operation cancelled")]
    Cancelled,

}

/// Failure to establish a connection
#[derive(Debug, Error)]
pub enum ConnectError {
    /// The endpoint address itself is unusable; retrying cannot help
    #[error("invalid endpoint {url}: {reason}")]
    InvalidEndpoint {
        /// Offending address
        url: String,
        /// Why it was rejected
        reason: String,
    },

    /// WebSocket handshake, DNS or TLS failure
    #[error("handshake failed: {0}")]
    Handshake(#[from] tokio_tungstenite::tungstenite::Error),

    /// Socket-level failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConnectError {
    /// Whether another attempt may succeed
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ConnectError::InvalidEndpoint { .. })
    }
}

/// Failure while receiving from an established connection
///
/// `FeedClient` never surfaces it: the receive loop reports it as
/// [`FeedEvent::Disconnected`](crate::telemetry::FeedEvent::Disconnected)
/// and reconnects.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecvError {
    /// The peer closed the connection (close frame, end of stream, reset)
    #[error("connection closed by peer")]
    Closed,

    /// Transport-level framing violation
    #[error("protocol violation: {0}")]
    Protocol(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for RecvError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;

        match err {
            WsError::ConnectionClosed | WsError::AlreadyClosed | WsError::Io(_) => {
                RecvError::Closed
            }
            other => RecvError::Protocol(other.to_string()),
        }
    }
}

/// A frame that could not be turned into a depth update
///
/// Returned by [`decode`](crate::decoder::decode); the client logs it and
/// drops the frame.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The payload is not well-formed JSON
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Valid JSON without depth data (control traffic)
    #[error("payload carries no asks/bids")]
    MissingFields,

    /// A price level is not a pair of non-negative numbers
    #[error("invalid {side} level at index {index}: {reason}")]
    InvalidLevel {
        /// `"asks"` or `"bids"`
        side: &'static str,
        /// Position of the level in its array
        index: usize,
        /// What was wrong with it
        reason: String,
    },
}

impl DecodeError {
    /// Whether this is expected control traffic rather than a broken frame
    pub fn is_control(&self) -> bool {
        matches!(self, DecodeError::MissingFields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exhausted_display() {
        let err = Error::ConnectionExhausted {
            url: "wss://example.test/ws".to_string(),
            attempts: 4,
            source: ConnectError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "refused",
            )),
        };
        let text = err.to_string();
        assert!(text.contains("wss://example.test/ws"));
        assert!(text.contains('4'));
        assert!(text.contains("refused"));
    }

    #[test]
    fn test_invalid_endpoint_not_retryable() {
        let err = ConnectError::InvalidEndpoint {
            url: "ftp://nope".to_string(),
            reason: "unsupported scheme".to_string(),
        };
        assert!(!err.is_retryable());

        let io = ConnectError::Io(std::io::Error::new(std::io::ErrorKind::TimedOut, "slow"));
        assert!(io.is_retryable());
    }

    #[test]
    fn test_recv_error_from_tungstenite() {
        use tokio_tungstenite::tungstenite::Error as WsError;

        assert_eq!(RecvError::from(WsError::ConnectionClosed), RecvError::Closed);
        assert_eq!(RecvError::from(WsError::AlreadyClosed), RecvError::Closed);
        assert!(matches!(
            RecvError::from(WsError::Utf8),
            RecvError::Protocol(_)
        ));
    }

    #[test]
    fn test_decode_error_is_control() {
        assert!(DecodeError::MissingFields.is_control());
        let invalid = DecodeError::InvalidLevel {
            side: "asks",
            index: 2,
            reason: "negative price".to_string(),
        };
        assert!(!invalid.is_control());
        assert!(invalid.to_string().contains("asks"));
    }
}
