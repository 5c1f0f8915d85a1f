//! Feed message types.
//!
//! The feed sends one JSON object per frame:
//!
//! ```json
//! {
//!   "timestamp": "2025-05-04T10:39:13Z",
//!   "exchange": "OKX",
//!   "symbol": "BTC-USDT-SWAP",
//!   "asks": [["95445.5", "9.06"], ["95448", "2.05"]],
//!   "bids": [["95445.4", "1104.23"], ["95445.3", "0.02"]]
//! }
//! ```
//!
//! Prices and sizes may be strings or numbers.

use serde::Deserialize;

use super::{PriceLevel, TimestampMs};

/// A validated depth update: the complete book as of one message
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DepthUpdate {
    /// Ask levels in feed order
    pub asks: Vec<PriceLevel>,
    /// Bid levels in feed order
    pub bids: Vec<PriceLevel>,
    /// Instrument symbol, if the feed sent one
    pub symbol: Option<String>,
    /// Venue name, if the feed sent one
    pub exchange: Option<String>,
    /// Venue timestamp as sent (string or number rendered as text)
    pub timestamp: Option<String>,
}

impl DepthUpdate {
    /// Build an update from `(price, size)` pairs
    pub fn from_pairs(asks: &[(f64, f64)], bids: &[(f64, f64)]) -> Self {
        Self {
            asks: asks.iter().copied().map(PriceLevel::from).collect(),
            bids: bids.iter().copied().map(PriceLevel::from).collect(),
            ..Self::default()
        }
    }
}

/// A numeric field as it appears on the wire
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum WireNumber {
    /// JSON number
    Number(f64),
    /// Decimal string, e.g. `"95445.5"`
    Text(String),
}

impl WireNumber {
    /// Parse into `f64`
    ///
    /// Returns `None` for strings that are not numbers.
    pub fn to_f64(&self) -> Option<f64> {
        match self {
            WireNumber::Number(n) => Some(*n),
            WireNumber::Text(s) => s.trim().parse().ok(),
        }
    }
}

/// A raw `[price, size, ...]` level before validation
pub type WireLevel = Vec<WireNumber>;

/// Exchange timestamps may be ISO strings or epoch milliseconds
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum WireTimestamp {
    /// Epoch milliseconds
    Millis(TimestampMs),
    /// Anything textual
    Text(String),
}

impl WireTimestamp {
    /// Render as text
    pub fn into_string(self) -> String {
        match self {
            WireTimestamp::Millis(ms) => ms.to_string(),
            WireTimestamp::Text(s) => s,
        }
    }
}
