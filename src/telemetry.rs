//! Structured events emitted by the feed client.
//!
//! The client never configures logging itself. Every observable occurrence is
//! a [`FeedEvent`] handed to an injected [`EventSink`]. The default
//! [`TracingSink`] forwards events to `tracing` with structured fields; install
//! whatever subscriber you like in the host process.

use std::fmt;

use tracing::Level;

use crate::client::feed::LoopExit;
use crate::client::ConnectionState;

/// Something the feed client wants the outside world to know
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    /// About to attempt a connection
    ConnectAttempt {
        /// Endpoint
        url: String,
        /// 1-based attempt number
        attempt: u32,
        /// Total attempts allowed
        max_attempts: u32,
    },
    /// Connection established
    Connected {
        /// Endpoint
        url: String,
        /// Attempt that succeeded
        attempt: u32,
    },
    /// A connection attempt failed
    ConnectFailed {
        /// Endpoint
        url: String,
        /// Attempt that failed
        attempt: u32,
        /// Error text
        error: String,
    },
    /// Every connection attempt failed
    RetriesExhausted {
        /// Endpoint
        url: String,
        /// Attempts made
        attempts: u32,
    },
    /// An established connection dropped
    Disconnected {
        /// Why
        reason: String,
    },
    /// Connection state transition
    StateChanged {
        /// Previous state
        from: ConnectionState,
        /// New state
        to: ConnectionState,
    },
    /// A depth message was applied
    MessageProcessed {
        /// Decode + apply time
        latency_ms: f64,
        /// Ask levels in the new book
        asks: usize,
        /// Bid levels in the new book
        bids: usize,
    },
    /// Periodic latency summary
    LatencySummary {
        /// Messages applied so far
        message_count: u64,
        /// Latency of the latest message
        last_latency_ms: f64,
        /// Mean latency over all messages
        average_latency_ms: f64,
    },
    /// A frame without depth data was skipped
    ControlMessage {
        /// Start of the frame
        preview: String,
    },
    /// A frame could not be decoded and was dropped
    DecodeFailed {
        /// Error text
        error: String,
        /// Start of the frame
        preview: String,
        /// Whether the payload was not JSON at all
        malformed: bool,
    },
    /// `start()` was called on a running client
    AlreadyRunning,
    /// The client was stopped and its connection closed
    Stopped,
    /// The receive loop finished
    LoopExited {
        /// Terminal status
        exit: LoopExit,
    },
}

impl FeedEvent {
    /// Severity of this event
    pub fn level(&self) -> Level {
        match self {
            FeedEvent::MessageProcessed { .. }
            | FeedEvent::ControlMessage { .. }
            | FeedEvent::StateChanged { .. } => Level::DEBUG,
            FeedEvent::ConnectAttempt { .. }
            | FeedEvent::Connected { .. }
            | FeedEvent::LatencySummary { .. }
            | FeedEvent::Stopped => Level::INFO,
            FeedEvent::Disconnected { .. } | FeedEvent::AlreadyRunning => Level::WARN,
            FeedEvent::DecodeFailed { malformed, .. } => {
                if *malformed {
                    Level::ERROR
                } else {
                    Level::WARN
                }
            }
            FeedEvent::ConnectFailed { .. } | FeedEvent::RetriesExhausted { .. } => Level::ERROR,
            FeedEvent::LoopExited { exit } => match exit {
                LoopExit::Stopped => Level::INFO,
                LoopExit::Exhausted { .. } | LoopExit::Fatal(_) => Level::ERROR,
            },
        }
    }
}

impl fmt::Display for FeedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedEvent::ConnectAttempt {
                url,
                attempt,
                max_attempts,
            } => write!(f, "Connecting to {url} (attempt {attempt}/{max_attempts})"),
            FeedEvent::Connected { url, .. } => write!(f, "Connection established to {url}"),
            FeedEvent::ConnectFailed { attempt, error, .. } => {
                write!(f, "Connection attempt {attempt} failed: {error}")
            }
            FeedEvent::RetriesExhausted { attempts, .. } => {
                write!(f, "Giving up after {attempts} connection attempts")
            }
            FeedEvent::Disconnected { reason } => write!(f, "Connection lost: {reason}"),
            FeedEvent::StateChanged { from, to } => write!(f, "State {from:?} -> {to:?}"),
            FeedEvent::MessageProcessed {
                latency_ms,
                asks,
                bids,
            } => write!(
                f,
                "Processed orderbook update in {latency_ms:.2}ms (asks: {asks}, bids: {bids})"
            ),
            FeedEvent::LatencySummary {
                message_count,
                last_latency_ms,
                average_latency_ms,
            } => write!(
                f,
                "Processed {message_count} messages. Current latency: {last_latency_ms:.2}ms, \
                 average latency: {average_latency_ms:.2}ms"
            ),
            FeedEvent::ControlMessage { preview } => {
                write!(f, "Skipped message without orderbook data: {preview}")
            }
            FeedEvent::DecodeFailed { error, preview, .. } => {
                write!(f, "Dropped undecodable message ({error}): {preview}")
            }
            FeedEvent::AlreadyRunning => write!(f, "Client is already running"),
            FeedEvent::Stopped => write!(f, "Feed client stopped"),
            FeedEvent::LoopExited { exit } => write!(f, "Receive loop exited: {exit:?}"),
        }
    }
}

/// Receiver of [`FeedEvent`]s
///
/// Implementations must be cheap and must not block; `emit` is called inline
/// on the receive loop.
pub trait EventSink: Send + Sync + fmt::Debug {
    /// Handle one event
    fn emit(&self, event: &FeedEvent);
}

/// Emit a `tracing` event at a level chosen at runtime
macro_rules! event_at {
    ($level:expr, $($arg:tt)+) => {
        match $level {
            level if level == Level::ERROR => tracing::error!($($arg)+),
            level if level == Level::WARN => tracing::warn!($($arg)+),
            level if level == Level::INFO => tracing::info!($($arg)+),
            level if level == Level::DEBUG => tracing::debug!($($arg)+),
            _ => tracing::trace!($($arg)+),
        }
    };
}

/// Sink forwarding events to `tracing`
///
/// Every event is logged at [`FeedEvent::level`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &FeedEvent) {
        let level = event.level();

        match event {
            FeedEvent::ConnectAttempt {
                url,
                attempt,
                max_attempts,
            } => event_at!(level, url = %url, attempt, max_attempts, "connecting to feed"),
            FeedEvent::Connected { url, attempt } => {
                event_at!(level, url = %url, attempt, "feed connection established")
            }
            FeedEvent::ConnectFailed { url, attempt, error } => {
                event_at!(level, url = %url, attempt, error = %error, "feed connection attempt failed")
            }
            FeedEvent::RetriesExhausted { url, attempts } => {
                event_at!(level, url = %url, attempts, "max retries reached, giving up")
            }
            FeedEvent::Disconnected { reason } => {
                event_at!(level, reason = %reason, "feed connection closed")
            }
            FeedEvent::StateChanged { from, to } => {
                event_at!(level, from = ?from, to = ?to, "connection state changed")
            }
            FeedEvent::MessageProcessed {
                latency_ms,
                asks,
                bids,
            } => event_at!(level, latency_ms, asks, bids, "processed orderbook update"),
            FeedEvent::LatencySummary {
                message_count,
                last_latency_ms,
                average_latency_ms,
            } => event_at!(
                level,
                message_count,
                last_latency_ms,
                average_latency_ms,
                "latency summary"
            ),
            FeedEvent::ControlMessage { preview } => {
                event_at!(level, preview = %preview, "message without orderbook data")
            }
            FeedEvent::DecodeFailed {
                error,
                preview,
                malformed,
            } => event_at!(
                level,
                error = %error,
                preview = %preview,
                malformed,
                "dropped undecodable message"
            ),
            FeedEvent::AlreadyRunning => event_at!(level, "client is already running"),
            FeedEvent::Stopped => event_at!(level, "feed client stopped"),
            FeedEvent::LoopExited { exit } => match exit {
                LoopExit::Stopped => event_at!(level, "receive loop stopped"),
                LoopExit::Exhausted { attempts } => {
                    event_at!(level, attempts, "receive loop ended: reconnection exhausted")
                }
                LoopExit::Fatal(reason) => {
                    event_at!(level, reason = %reason, "receive loop ended on fatal error")
                }
            },
        }
    }
}

/// Sink that drops every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: &FeedEvent) {}
}
