//! # l2-book-feed
//!
//! A streaming Level-2 orderbook client for a single instrument.
//!
//! ## Features
//!
//! - **WebSocket Transport** - `tokio-tungstenite` with automatic ping replies
//! - **Retry & Recovery** - fixed-delay connect retries and reconnect on drop
//! - **Snapshot Book** - every message replaces the book; readers get an
//!   immutable `Arc<Snapshot>` that is never mutated under them
//! - **Latency Telemetry** - per-message latency, running averages and
//!   rolling percentiles, emitted as structured events
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use l2_book_feed::{Config, FeedClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), l2_book_feed::Error> {
//!     let client = FeedClient::new(Config::from_env()?)?;
//!     client.start().await?;
//!
//!     tokio::time::sleep(std::time::Duration::from_secs(5)).await;
//!
//!     let book = client.snapshot();
//!     println!("spread: {:?}, latency: {:.2}ms", book.spread(), book.latency_ms);
//!
//!     client.stop().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Wire Format
//!
//! One JSON object per frame; `asks` and `bids` are arrays of
//! `[price, size]` with values as strings or numbers. Frames without both
//! keys are treated as control traffic and skipped.
//!
//! ## Architecture
//!
//! This crate is organized into several modules:
//!
//! - [`transport`] - connection traits and the WebSocket implementation
//! - [`decoder`] - frame bytes to validated depth updates
//! - [`orderbook`] - sorted book sides and atomically published snapshots
//! - [`client`] - the orchestrating [`FeedClient`] and retry policies
//! - [`telemetry`] - structured events and sinks
//! - [`stats`] - running counters and latency percentiles
//! - [`config`] - configuration
//! - [`error`] - error types for the crate

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

pub mod client;
pub mod config;
pub mod decoder;
pub mod error;
pub mod orderbook;
pub mod stats;
pub mod telemetry;
pub mod transport;
pub mod types;

// Re-export main types at crate root for convenience
pub use client::{ConnectionState, FeedClient, LoopExit};
pub use config::Config;
pub use error::Error;
pub use orderbook::Snapshot;
pub use stats::ClientStats;
pub use telemetry::{EventSink, FeedEvent};

/// Result type alias using the crate's Error type
pub type Result<T> = std::result::Result<T, Error>;
