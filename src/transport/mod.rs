//! Network transport abstraction.
//!
//! The client talks to the feed through two traits so the connection layer can
//! be swapped (a recorded-session replayer, an in-memory script for tests):
//!
//! - [`Transport`] - knows the endpoint and opens connections
//! - [`Connection`] - one open connection yielding raw frames
//!
//! [`websocket::WsTransport`] is the production implementation.

pub mod websocket;

use async_trait::async_trait;

use crate::error::{ConnectError, RecvError};

pub use websocket::{WsConnection, WsTransport};

/// Factory for connections to one feed endpoint
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Connection type produced by [`connect`](Self::connect)
    type Connection: Connection;

    /// Endpoint address, for telemetry
    fn endpoint(&self) -> &str;

    /// Open a new connection
    ///
    /// # Errors
    ///
    /// Returns a [`ConnectError`] on DNS, TCP, TLS or handshake failure.
    async fn connect(&self) -> Result<Self::Connection, ConnectError>;
}

/// One open connection
#[async_trait]
pub trait Connection: Send + 'static {
    /// Wait for the next frame
    ///
    /// Suspends until a data frame arrives or the connection fails.
    ///
    /// # Errors
    ///
    /// [`RecvError::Closed`] when the peer goes away, [`RecvError::Protocol`]
    /// on a framing violation.
    async fn receive(&mut self) -> Result<Vec<u8>, RecvError>;

    /// Close the connection
    ///
    /// Calling this more than once is harmless.
    async fn close(&mut self);
}
