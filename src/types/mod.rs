//! Core value types shared by the decoder and the orderbook.
//!
//! - [`PriceLevel`] - one aggregated row of the book
//! - [`Side`] - ask or bid
//! - [`messages`] - decoded feed messages

pub mod messages;

use std::fmt;

use serde::Serialize;

pub use messages::DepthUpdate;

/// Price in quote currency
///
/// Feed prices arrive as decimal strings; they are held as `f64` because
/// consumers only read, compare and display them.
pub type Price = f64;

/// Size (aggregated quantity) at a price level
pub type Size = f64;

/// Timestamp in milliseconds since Unix epoch
pub type TimestampMs = u64;

/// Side of the book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    /// Sell orders, best = lowest price
    Ask,
    /// Buy orders, best = highest price
    Bid,
}

impl Side {
    /// Field name of this side in feed messages
    pub const fn as_str(self) -> &'static str {
        match self {
            Side::Ask => "asks",
            Side::Bid => "bids",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One price level: total size resting at a price
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PriceLevel {
    /// Level price (non-negative, finite)
    pub price: Price,
    /// Aggregated size (non-negative, finite)
    pub size: Size,
}

impl PriceLevel {
    /// Create a level; `-0.0` prices are normalized to `0.0`
    #[must_use]
    pub fn new(price: Price, size: Size) -> Self {
        Self {
            price: if price == 0.0 { 0.0 } else { price },
            size,
        }
    }
}

impl From<(Price, Size)> for PriceLevel {
    fn from((price, size): (Price, Size)) -> Self {
        Self::new(price, size)
    }
}

/// Current wall-clock time in milliseconds since Unix epoch
pub(crate) fn now_ms() -> TimestampMs {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as TimestampMs)
        .unwrap_or(0)
}
