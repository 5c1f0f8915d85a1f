//! Core orderbook data structures.
//!
//! Every feed message is a complete picture of depth, so the book is never
//! patched in place. [`BookState::apply`] builds a fresh [`Snapshot`] and swaps
//! it in behind a lock; readers clone the `Arc` and never observe a half-built
//! book.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use serde::Serialize;

use crate::types::{now_ms, DepthUpdate, Price, PriceLevel, Side, Size, TimestampMs};

/// One side of the book, best price first
///
/// Asks are strictly ascending by price, bids strictly descending.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookSide {
    side: Side,
    levels: Vec<PriceLevel>,
}

impl BookSide {
    /// Create an empty side
    #[must_use]
    pub const fn empty(side: Side) -> Self {
        Self {
            side,
            levels: Vec::new(),
        }
    }

    /// Build a side from levels in arbitrary order
    ///
    /// Levels sharing a price collapse to the one that came last in `levels`.
    #[must_use]
    pub fn from_levels(side: Side, levels: &[PriceLevel]) -> Self {
        let mut sorted = levels.to_vec();
        // Stable sort keeps input order among equal prices.
        sorted.sort_by(|a, b| a.price.total_cmp(&b.price));

        let mut deduped: Vec<PriceLevel> = Vec::with_capacity(sorted.len());
        for level in sorted {
            match deduped.last_mut() {
                Some(last) if last.price == level.price => *last = level,
                _ => deduped.push(level),
            }
        }

        if side == Side::Bid {
            deduped.reverse();
        }

        Self {
            side,
            levels: deduped,
        }
    }

    /// Which side this is
    #[must_use]
    pub const fn side(&self) -> Side {
        self.side
    }

    /// All levels, best first
    #[must_use]
    pub fn levels(&self) -> &[PriceLevel] {
        &self.levels
    }

    /// Best level on this side
    #[must_use]
    pub fn best(&self) -> Option<PriceLevel> {
        self.levels.first().copied()
    }

    /// Iterate levels, best first
    pub fn iter(&self) -> impl Iterator<Item = &PriceLevel> + '_ {
        self.levels.iter()
    }

    /// Get the top N levels
    #[must_use]
    pub fn top(&self, n: usize) -> &[PriceLevel] {
        &self.levels[..n.min(self.levels.len())]
    }

    /// Sum of sizes over all levels
    #[must_use]
    pub fn total_size(&self) -> Size {
        self.levels.iter().map(|l| l.size).sum()
    }

    /// Number of price levels
    #[must_use]
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    /// Whether the side has no levels
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

/// Immutable picture of the book as of one applied message
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    /// Ask side, lowest price first
    pub asks: BookSide,
    /// Bid side, highest price first
    pub bids: BookSide,
    /// Time spent decoding and applying the message that produced this book
    pub latency_ms: f64,
    /// Wall-clock publication time (ms since Unix epoch)
    pub captured_at: TimestampMs,
    /// Publication counter; 0 is the empty book present before any message
    pub version: u64,
    /// Instrument symbol from the feed, if any
    pub symbol: Option<String>,
    /// Venue timestamp from the feed, if any
    pub exchange_timestamp: Option<String>,
}

impl Snapshot {
    /// The empty book
    #[must_use]
    pub fn empty() -> Self {
        Self {
            asks: BookSide::empty(Side::Ask),
            bids: BookSide::empty(Side::Bid),
            latency_ms: 0.0,
            captured_at: now_ms(),
            version: 0,
            symbol: None,
            exchange_timestamp: None,
        }
    }

    /// Get the best ask (lowest ask)
    #[must_use]
    pub fn best_ask(&self) -> Option<PriceLevel> {
        self.asks.best()
    }

    /// Get the best bid (highest bid)
    #[must_use]
    pub fn best_bid(&self) -> Option<PriceLevel> {
        self.bids.best()
    }

    /// Best ask minus best bid
    #[must_use]
    pub fn spread(&self) -> Option<Price> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(ask.price - bid.price),
            _ => None,
        }
    }

    /// Average of best bid and best ask
    #[must_use]
    pub fn mid_price(&self) -> Option<Price> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some((bid.price + ask.price) / 2.0),
            _ => None,
        }
    }

    /// Check if the book is crossed (best bid >= best ask)
    ///
    /// This shouldn't happen in a healthy market but is useful for validation.
    #[must_use]
    pub fn is_crossed(&self) -> bool {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => bid.price >= ask.price,
            _ => false,
        }
    }

    /// Whether both sides are empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.asks.is_empty() && self.bids.is_empty()
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::empty()
    }
}

/// Holder of the latest published [`Snapshot`]
///
/// # Thread Safety
///
/// A single writer calls [`apply`](Self::apply); any number of readers call
/// [`snapshot`](Self::snapshot). The new book is built outside the lock and
/// the write lock is held only for the pointer swap, so readers never wait on
/// sorting and never see a partially built book.
#[derive(Debug)]
pub struct BookState {
    current: RwLock<Arc<Snapshot>>,
}

impl BookState {
    /// Create a state holding the empty book
    #[must_use]
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(Snapshot::empty())),
        }
    }

    /// Replace the book with the given levels
    ///
    /// Latency is measured from the start of this call.
    pub fn apply(&self, asks: &[PriceLevel], bids: &[PriceLevel]) -> Arc<Snapshot> {
        self.publish(asks, bids, None, None, Instant::now())
    }

    /// Replace the book with a decoded update
    ///
    /// `received_at` is when the raw frame was taken off the wire; the
    /// published latency covers decode and apply.
    pub fn apply_update(&self, update: &DepthUpdate, received_at: Instant) -> Arc<Snapshot> {
        self.publish(
            &update.asks,
            &update.bids,
            update.symbol.clone(),
            update.timestamp.clone(),
            received_at,
        )
    }

    fn publish(
        &self,
        asks: &[PriceLevel],
        bids: &[PriceLevel],
        symbol: Option<String>,
        exchange_timestamp: Option<String>,
        started: Instant,
    ) -> Arc<Snapshot> {
        let asks = BookSide::from_levels(Side::Ask, asks);
        let bids = BookSide::from_levels(Side::Bid, bids);

        let mut current = self.current.write();
        let snapshot = Arc::new(Snapshot {
            asks,
            bids,
            latency_ms: started.elapsed().as_secs_f64() * 1000.0,
            captured_at: now_ms(),
            version: current.version + 1,
            symbol,
            exchange_timestamp,
        });
        *current = Arc::clone(&snapshot);
        snapshot
    }

    /// Get the latest snapshot
    ///
    /// Returns a shared handle; the snapshot it points to never changes.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&*self.current.read())
    }
}

impl Default for BookState {
    fn default() -> Self {
        Self::new()
    }
}
