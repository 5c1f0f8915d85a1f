//! Snapshot orderbook for a single instrument.
//!
//! Each feed message fully replaces the book. The module provides:
//!
//! - [`BookSide`] - one side, sorted best-first
//! - [`Snapshot`] - an immutable, self-consistent view of both sides
//! - [`BookState`] - the latest snapshot behind an atomically swapped handle
//!
//! # Example
//!
//! ```rust
//! use l2_book_feed::orderbook::BookState;
//! use l2_book_feed::types::PriceLevel;
//!
//! let state = BookState::new();
//! state.apply(
//!     &[PriceLevel::new(100.5, 2.0), PriceLevel::new(100.2, 1.0)],
//!     &[PriceLevel::new(99.9, 3.0)],
//! );
//!
//! let snapshot = state.snapshot();
//! if let Some(ask) = snapshot.best_ask() {
//!     println!("Best ask: {} @ {}", ask.size, ask.price);
//! }
//! ```

pub mod book;

pub use book::{BookSide, BookState, Snapshot};
