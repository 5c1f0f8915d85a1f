//! Live orderbook monitor - streams the configured feed and prints the top of book
//!
//! Usage:
//!   cargo run --example live_book
//!
//! Optional:
//!   L2_FEED_URL=wss://...          # Feed endpoint (default: OKX BTC-USDT-SWAP)
//!   L2_FEED_MAX_RETRIES=3          # Retries after the first connect attempt
//!   L2_FEED_RETRY_DELAY_SECS=2     # Delay between attempts
//!   LIVE_BOOK_SECONDS=10           # How long to watch before stopping
//!   RUST_LOG=l2_book_feed=debug    # Show per-message events

use std::time::Duration;

use l2_book_feed::stats::OP_PROCESS;
use l2_book_feed::{Config, FeedClient, Snapshot};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("l2_book_feed=info".parse()?),
        )
        .init();

    let config = Config::from_env()?;
    let seconds: u64 = std::env::var("LIVE_BOOK_SECONDS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(10);

    println!("=== L2 Orderbook Live Monitor ===\n");
    println!("Connecting to {}...", config.url());

    let client = FeedClient::new(config)?;
    client.start().await?;
    println!("Connected!\n");

    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    ticker.tick().await;

    for _ in 0..seconds {
        tokio::select! {
            _ = ticker.tick() => print_book_summary(&client.snapshot()),
            _ = tokio::signal::ctrl_c() => break,
        }

        if !client.is_running() {
            println!("\nFeed ended: {:?}", client.last_exit());
            break;
        }
    }

    client.stop().await;

    let stats = client.stats();
    let process = client.latency_stats(OP_PROCESS);
    println!(
        "\n--- {} messages | avg {:.3}ms | p50 {:.3}ms | p99 {:.3}ms | max {:.3}ms ---",
        stats.message_count,
        stats.average_latency_ms(),
        process.median,
        process.p99,
        process.max
    );

    Ok(())
}

fn print_book_summary(book: &Snapshot) {
    let (Some(bid), Some(ask)) = (book.best_bid(), book.best_ask()) else {
        println!("         (waiting for first book)");
        return;
    };

    println!(
        "         BID: {} @ {:.2} | ASK: {} @ {:.2} | spread: {:.2} | mid: {:.2} | depth: {}x{} | {:.3}ms",
        bid.size,
        bid.price,
        ask.size,
        ask.price,
        book.spread().unwrap_or(0.0),
        book.mid_price().unwrap_or(0.0),
        book.bids.len(),
        book.asks.len(),
        book.latency_ms
    );
}
