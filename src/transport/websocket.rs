//! WebSocket transport built on `tokio-tungstenite`.
//!
//! # Example
//!
//! ```rust,no_run
//! use l2_book_feed::transport::{Connection, Transport, WsTransport};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = WsTransport::new("wss://ws.gomarket-cpp.goquant.io/ws/l2-orderbook/okx/BTC-USDT-SWAP");
//! let mut conn = transport.connect().await?;
//!
//! let frame = conn.receive().await?;
//! println!("{}", String::from_utf8_lossy(&frame));
//!
//! conn.close().await;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

use super::{Connection, Transport};
use crate::error::{ConnectError, RecvError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Transport opening WebSocket connections to a fixed URL
#[derive(Debug, Clone)]
pub struct WsTransport {
    url: String,
}

impl WsTransport {
    /// Create a transport for the given `ws://` or `wss://` URL
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    fn check_url(&self) -> Result<(), ConnectError> {
        let invalid = |reason: String| ConnectError::InvalidEndpoint {
            url: self.url.clone(),
            reason,
        };

        let parsed = Url::parse(&self.url).map_err(|e| invalid(e.to_string()))?;
        match parsed.scheme() {
            "ws" | "wss" => Ok(()),
            other => Err(invalid(format!("unsupported scheme {other}"))),
        }
    }
}

#[async_trait]
impl Transport for WsTransport {
    type Connection = WsConnection;

    fn endpoint(&self) -> &str {
        &self.url
    }

    async fn connect(&self) -> Result<WsConnection, ConnectError> {
        self.check_url()?;

        let (stream, _response) = tokio_tungstenite::connect_async(self.url.as_str()).await?;

        Ok(WsConnection {
            stream,
            closed: false,
        })
    }
}

/// An open WebSocket connection
///
/// Pings are answered automatically while receiving.
#[derive(Debug)]
pub struct WsConnection {
    stream: WsStream,
    closed: bool,
}

#[async_trait]
impl Connection for WsConnection {
    async fn receive(&mut self) -> Result<Vec<u8>, RecvError> {
        if self.closed {
            return Err(RecvError::Closed);
        }

        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(text.into_bytes()),
                Some(Ok(Message::Binary(data))) => return Ok(data),
                Some(Ok(Message::Ping(data))) => {
                    // Respond to pings so the venue keeps the session alive
                    self.stream.send(Message::Pong(data)).await?;
                }
                Some(Ok(Message::Close(_))) | None => {
                    self.closed = true;
                    return Err(RecvError::Closed);
                }
                Some(Ok(_)) => {
                    // Ignore other message types (Pong, Frame)
                    continue;
                }
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.stream.close(None).await {
            tracing::debug!(error = %e, "error while closing websocket");
        }
    }
}
