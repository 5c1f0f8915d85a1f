//! The feed client: connection lifecycle, receive loop and snapshot access.
//!
//! [`FeedClient::start`] connects (retrying per the [`RetryPolicy`]) and spawns
//! a receive loop on the Tokio runtime. The loop is the only writer of the
//! book and the statistics; [`FeedClient::snapshot`] and
//! [`FeedClient::stats`] may be called from anywhere at any time.
//!
//! When the connection drops, the loop reconnects and resumes. If that
//! reconnection fails the loop ends with [`LoopExit::Exhausted`] and stays
//! down: relaunching is left to whoever supervises the client.
//!
//! # Example
//!
//! ```rust,no_run
//! use l2_book_feed::{Config, FeedClient};
//!
//! # async fn example() -> l2_book_feed::Result<()> {
//! let client = FeedClient::new(Config::default())?;
//! client.start().await?;
//!
//! let snapshot = client.snapshot();
//! if let (Some(bid), Some(ask)) = (snapshot.best_bid(), snapshot.best_ask()) {
//!     println!("{} / {} ({:.2}ms)", bid.price, ask.price, snapshot.latency_ms);
//! }
//!
//! client.stop().await;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::retry::{FixedDelay, RetryPolicy};
use super::ConnectionState;
use crate::config::Config;
use crate::decoder::{self, preview};
use crate::error::{DecodeError, Error};
use crate::orderbook::{BookState, Snapshot};
use crate::stats::{ClientStats, LatencyStats, LatencyTracker, OP_DECODE, OP_PROCESS};
use crate::telemetry::{EventSink, FeedEvent, TracingSink};
use crate::transport::{Connection, Transport, WsTransport};
use crate::Result;

/// Why the receive loop ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopExit {
    /// `stop()` was called
    Stopped,
    /// The connection dropped and every reconnection attempt failed
    Exhausted {
        /// Attempts made during the final reconnection
        attempts: u32,
    },
    /// Reconnection hit a non-retryable error, or the task panicked
    Fatal(String),
}

/// State shared between the client handle and its receive loop
struct Shared {
    book: BookState,
    stats: Mutex<Recorder>,
    state: Mutex<ConnectionState>,
    running: AtomicBool,
    cancel: Mutex<CancellationToken>,
    last_exit: Mutex<Option<LoopExit>>,
    summary_interval: u64,
}

#[derive(Debug)]
struct Recorder {
    totals: ClientStats,
    latency: LatencyTracker,
}

impl Shared {
    fn new(config: &Config) -> Self {
        Self {
            book: BookState::new(),
            stats: Mutex::new(Recorder {
                totals: ClientStats::default(),
                latency: LatencyTracker::new(config.latency_window()),
            }),
            state: Mutex::new(ConnectionState::Disconnected),
            running: AtomicBool::new(false),
            cancel: Mutex::new(CancellationToken::new()),
            last_exit: Mutex::new(None),
            summary_interval: config.summary_interval().max(1),
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn set_state(&self, to: ConnectionState, sink: &dyn EventSink) {
        let from = std::mem::replace(&mut *self.state.lock(), to);
        if from != to {
            sink.emit(&FeedEvent::StateChanged { from, to });
        }
    }

    /// Mark the client `Disconnected` unless a new `start()` has claimed it
    ///
    /// `running` is read under the state lock, and `start()` flips `running`
    /// before taking that lock, so a concurrent restart is never overwritten.
    fn settle_if_idle(&self, sink: &dyn EventSink) {
        let to = ConnectionState::Disconnected;
        let from = {
            let mut state = self.state.lock();
            if self.is_running() {
                return;
            }
            std::mem::replace(&mut *state, to)
        };
        if from != to {
            sink.emit(&FeedEvent::StateChanged { from, to });
        }
    }

    /// Decode one frame and publish it
    ///
    /// Returns the new snapshot, or `None` if the frame was dropped. Dropped
    /// frames leave the book and the statistics untouched.
    fn handle_frame(&self, raw: &[u8], sink: &dyn EventSink) -> Option<Arc<Snapshot>> {
        let received_at = Instant::now();

        let update = match decoder::decode(raw) {
            Ok(update) => update,
            Err(e) if e.is_control() => {
                sink.emit(&FeedEvent::ControlMessage {
                    preview: preview(raw),
                });
                return None;
            }
            Err(e) => {
                sink.emit(&FeedEvent::DecodeFailed {
                    malformed: matches!(e, DecodeError::Malformed(_)),
                    error: e.to_string(),
                    preview: preview(raw),
                });
                return None;
            }
        };
        let decode_ms = received_at.elapsed().as_secs_f64() * 1000.0;

        let snapshot = self.book.apply_update(&update, received_at);

        let totals = {
            let mut recorder = self.stats.lock();
            recorder.totals.record(snapshot.latency_ms);
            recorder.latency.record(OP_DECODE, decode_ms);
            recorder.latency.record(OP_PROCESS, snapshot.latency_ms);
            recorder.totals
        };

        sink.emit(&FeedEvent::MessageProcessed {
            latency_ms: snapshot.latency_ms,
            asks: snapshot.asks.len(),
            bids: snapshot.bids.len(),
        });

        if totals.message_count % self.summary_interval == 0 {
            sink.emit(&FeedEvent::LatencySummary {
                message_count: totals.message_count,
                last_latency_ms: totals.last_latency_ms,
                average_latency_ms: totals.average_latency_ms(),
            });
        }

        Some(snapshot)
    }
}

/// Streaming L2 orderbook client
///
/// Generic over the [`Transport`] so tests and replays can feed it without a
/// network; production code uses the default [`WsTransport`].
///
/// # Thread Safety
///
/// All methods take `&self`. Share the client via `Arc<FeedClient>` to call
/// `snapshot()` from many tasks while another task owns `start()`/`stop()`.
pub struct FeedClient<T: Transport = WsTransport> {
    config: Config,
    transport: Arc<T>,
    retry: Arc<dyn RetryPolicy>,
    sink: Arc<dyn EventSink>,
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<LoopExit>>>,
}

impl<T: Transport> fmt::Debug for FeedClient<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeedClient")
            .field("url", &self.transport.endpoint())
            .field("state", &self.connection_state())
            .field("running", &self.is_running())
            .field("retry", &self.retry)
            .finish()
    }
}

impl FeedClient<WsTransport> {
    /// Create a WebSocket client for `config.url()`
    ///
    /// Events go to [`TracingSink`]; retries use [`FixedDelay`] built from
    /// the config.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configuration is invalid.
    pub fn new(config: Config) -> Result<Self> {
        let transport = WsTransport::new(config.url());
        Self::with_transport(config, transport)
    }
}

impl<T: Transport> FeedClient<T> {
    /// Create a client over a custom transport
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configuration is invalid.
    pub fn with_transport(config: Config, transport: T) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            retry: Arc::new(FixedDelay::from(&config)),
            sink: Arc::new(TracingSink),
            shared: Arc::new(Shared::new(&config)),
            transport: Arc::new(transport),
            task: Mutex::new(None),
            config,
        })
    }

    /// Send events to `sink` instead of `tracing`
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Replace the retry policy
    #[must_use]
    pub fn with_retry_policy(mut self, policy: impl RetryPolicy + 'static) -> Self {
        self.retry = Arc::new(policy);
        self
    }

    /// Connect and launch the receive loop
    ///
    /// Calling this while the client is running only emits
    /// [`FeedEvent::AlreadyRunning`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionExhausted`] if every attempt fails,
    /// [`Error::Connect`] on a non-retryable failure, or [`Error::Cancelled`]
    /// if `stop()` is called while connecting. The receive loop is not
    /// launched in any of these cases.
    pub async fn start(&self) -> Result<()> {
        if self.shared.running.swap(true, Ordering::SeqCst) {
            self.sink.emit(&FeedEvent::AlreadyRunning);
            return Ok(());
        }

        let cancel = CancellationToken::new();
        *self.shared.cancel.lock() = cancel.clone();
        *self.shared.last_exit.lock() = None;

        self.shared
            .set_state(ConnectionState::Connecting, self.sink.as_ref());

        let conn = match connect_with_retry(
            self.transport.as_ref(),
            self.retry.as_ref(),
            self.sink.as_ref(),
            &cancel,
        )
        .await
        {
            Ok(conn) => conn,
            Err(e) => {
                self.shared.running.store(false, Ordering::SeqCst);
                self.shared.settle_if_idle(self.sink.as_ref());
                return Err(e);
            }
        };

        self.shared
            .set_state(ConnectionState::Connected, self.sink.as_ref());

        let receive_loop = ReceiveLoop {
            transport: Arc::clone(&self.transport),
            retry: Arc::clone(&self.retry),
            sink: Arc::clone(&self.sink),
            shared: Arc::clone(&self.shared),
            cancel,
        };
        let handle = tokio::spawn(receive_loop.run(conn));
        *self.task.lock() = Some(handle);

        Ok(())
    }

    /// Stop the receive loop and close the connection
    ///
    /// Safe to call at any time and more than once. A loop waiting on the
    /// network is woken immediately. The last snapshot stays readable.
    pub async fn stop(&self) {
        let was_running = self.shared.running.swap(false, Ordering::SeqCst);
        self.shared.cancel.lock().cancel();

        let handle = self.task.lock().take();
        if !was_running && handle.is_none() {
            return;
        }

        self.shared
            .set_state(ConnectionState::Closing, self.sink.as_ref());

        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                let exit = LoopExit::Fatal(e.to_string());
                *self.shared.last_exit.lock() = Some(exit.clone());
                self.sink.emit(&FeedEvent::LoopExited { exit });
            }
        }

        self.shared.settle_if_idle(self.sink.as_ref());
        self.sink.emit(&FeedEvent::Stopped);
    }

    /// Wait for the receive loop to end and return its exit status
    ///
    /// Returns the status of the most recent loop if it has already been
    /// awaited (for example by `stop()`), or `None` if no loop ever ran.
    pub async fn join(&self) -> Option<LoopExit> {
        let handle = self.task.lock().take();
        match handle {
            Some(handle) => Some(
                handle
                    .await
                    .unwrap_or_else(|e| LoopExit::Fatal(e.to_string())),
            ),
            None => self.last_exit(),
        }
    }

    /// Latest published snapshot
    ///
    /// Before the first message this is an empty book with zero latency.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.shared.book.snapshot()
    }

    /// Copy of the running statistics
    pub fn stats(&self) -> ClientStats {
        self.shared.stats.lock().totals
    }

    /// Rolling latency statistics for an operation
    ///
    /// See [`OP_DECODE`] and [`OP_PROCESS`].
    pub fn latency_stats(&self, operation: &str) -> LatencyStats {
        self.shared.stats.lock().latency.stats(operation)
    }

    /// Current connection state
    pub fn connection_state(&self) -> ConnectionState {
        *self.shared.state.lock()
    }

    /// Whether the client has been started and not stopped
    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    /// Exit status of the most recent receive loop, once it has ended
    pub fn last_exit(&self) -> Option<LoopExit> {
        self.shared.last_exit.lock().clone()
    }

    /// Get a reference to the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl<T: Transport> Drop for FeedClient<T> {
    fn drop(&mut self) {
        // Let a detached loop wind down instead of outliving its handle.
        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.cancel.lock().cancel();
    }
}

/// Everything the spawned receive loop owns
struct ReceiveLoop<T: Transport> {
    transport: Arc<T>,
    retry: Arc<dyn RetryPolicy>,
    sink: Arc<dyn EventSink>,
    shared: Arc<Shared>,
    cancel: CancellationToken,
}

impl<T: Transport> ReceiveLoop<T> {
    async fn run(self, mut conn: T::Connection) -> LoopExit {
        let sink = self.sink.as_ref();

        let exit = loop {
            if !self.shared.is_running() || self.cancel.is_cancelled() {
                break LoopExit::Stopped;
            }

            let received = tokio::select! {
                biased;
                () = self.cancel.cancelled() => break LoopExit::Stopped,
                received = conn.receive() => received,
            };

            let err = match received {
                Ok(raw) => {
                    self.shared.handle_frame(&raw, sink);
                    continue;
                }
                Err(err) => err,
            };

            sink.emit(&FeedEvent::Disconnected {
                reason: err.to_string(),
            });
            conn.close().await;

            if !self.shared.is_running() {
                break LoopExit::Stopped;
            }

            self.shared.set_state(ConnectionState::Connecting, sink);
            match connect_with_retry(
                self.transport.as_ref(),
                self.retry.as_ref(),
                sink,
                &self.cancel,
            )
            .await
            {
                Ok(next) => {
                    conn = next;
                    self.shared.set_state(ConnectionState::Connected, sink);
                }
                Err(Error::Cancelled) => break LoopExit::Stopped,
                Err(Error::ConnectionExhausted { attempts, .. }) => {
                    break LoopExit::Exhausted { attempts }
                }
                Err(e) => break LoopExit::Fatal(e.to_string()),
            }
        };

        conn.close().await;

        *self.shared.last_exit.lock() = Some(exit.clone());
        if exit != LoopExit::Stopped {
            self.shared.running.store(false, Ordering::SeqCst);
        }
        // Also covers a stop() that landed before this loop was spawned
        self.shared.settle_if_idle(sink);
        sink.emit(&FeedEvent::LoopExited { exit: exit.clone() });

        exit
    }
}

/// Connect, retrying per `policy` until success, exhaustion or cancellation
async fn connect_with_retry<T: Transport>(
    transport: &T,
    policy: &dyn RetryPolicy,
    sink: &dyn EventSink,
    cancel: &CancellationToken,
) -> Result<T::Connection> {
    let url = transport.endpoint();
    let max_attempts = policy.max_attempts();
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        sink.emit(&FeedEvent::ConnectAttempt {
            url: url.to_string(),
            attempt,
            max_attempts,
        });

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(Error::Cancelled),
            result = transport.connect() => result,
        };

        let err = match result {
            Ok(conn) => {
                sink.emit(&FeedEvent::Connected {
                    url: url.to_string(),
                    attempt,
                });
                return Ok(conn);
            }
            Err(err) => err,
        };

        sink.emit(&FeedEvent::ConnectFailed {
            url: url.to_string(),
            attempt,
            error: err.to_string(),
        });

        if !err.is_retryable() {
            return Err(Error::Connect(err));
        }

        if attempt >= max_attempts {
            sink.emit(&FeedEvent::RetriesExhausted {
                url: url.to_string(),
                attempts: attempt,
            });
            return Err(Error::ConnectionExhausted {
                url: url.to_string(),
                attempts: attempt,
                source: err,
            });
        }

        let delay = policy.delay_for_retry(attempt - 1);
        tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(Error::Cancelled),
            () = tokio::time::sleep(delay) => {}
        }
    }
}
