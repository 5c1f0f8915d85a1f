//! Feed client orchestration.
//!
//! This module contains:
//!
//! - [`feed`] - [`FeedClient`], which connects, receives, decodes and publishes
//! - [`retry`] - retry policies used while (re)connecting

pub mod feed;
pub mod retry;

pub use feed::{FeedClient, LoopExit};
pub use retry::{ExponentialBackoff, FixedDelay, RetryPolicy};

/// Lifecycle state of the feed connection
///
/// ```text
/// Disconnected -> Connecting -> Connected -> (drop) -> Connecting -> ...
///                                         -> (stop) -> Closing -> Disconnected
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// No connection and no attempt in progress
    #[default]
    Disconnected,
    /// Connecting, or retrying after a failure or a drop
    Connecting,
    /// Handshake complete; frames are flowing
    Connected,
    /// `stop()` is tearing the connection down
    Closing,
}
