//! Lifecycle tests for `FeedClient` over a scripted in-memory transport.
//!
//! Each connection attempt pops the next step from the script: either a
//! refusal or a connection whose frames the test pushes through a channel.
//! An exhausted script refuses every further attempt.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use l2_book_feed::client::{ExponentialBackoff, RetryPolicy};
use l2_book_feed::error::{ConnectError, RecvError};
use l2_book_feed::transport::{Connection, Transport};
use l2_book_feed::types::PriceLevel;
use l2_book_feed::{Config, ConnectionState, Error, EventSink, FeedClient, FeedEvent, LoopExit};
use parking_lot::Mutex;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::time::{sleep, timeout};
use tokio_test::{assert_err, assert_ok};

type Frame = Result<Vec<u8>, RecvError>;

enum Step {
    Refuse,
    Reject,
    Accept(UnboundedReceiver<Frame>),
}

#[derive(Default)]
struct Counters {
    attempts: AtomicU32,
    closes: AtomicU32,
}

struct ScriptedTransport {
    steps: Mutex<VecDeque<Step>>,
    counters: Arc<Counters>,
}

impl ScriptedTransport {
    fn new(steps: Vec<Step>) -> (Self, Arc<Counters>) {
        let counters = Arc::new(Counters::default());
        let transport = Self {
            steps: Mutex::new(steps.into()),
            counters: Arc::clone(&counters),
        };
        (transport, counters)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    type Connection = ScriptedConnection;

    fn endpoint(&self) -> &str {
        "ws://scripted.test/feed"
    }

    async fn connect(&self) -> Result<ScriptedConnection, ConnectError> {
        self.counters.attempts.fetch_add(1, Ordering::SeqCst);
        let step = self.steps.lock().pop_front().unwrap_or(Step::Refuse);
        match step {
            Step::Accept(frames) => Ok(ScriptedConnection {
                frames,
                closed: false,
                counters: Arc::clone(&self.counters),
            }),
            Step::Refuse => Err(ConnectError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            ))),
            Step::Reject => Err(ConnectError::InvalidEndpoint {
                url: self.endpoint().to_string(),
                reason: "rejected by script".to_string(),
            }),
        }
    }
}

struct ScriptedConnection {
    frames: UnboundedReceiver<Frame>,
    closed: bool,
    counters: Arc<Counters>,
}

#[async_trait]
impl Connection for ScriptedConnection {
    async fn receive(&mut self) -> Result<Vec<u8>, RecvError> {
        self.frames.recv().await.unwrap_or(Err(RecvError::Closed))
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.frames.close();
            self.counters.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

fn accept() -> (UnboundedSender<Frame>, Step) {
    let (tx, rx) = unbounded_channel();
    (tx, Step::Accept(rx))
}

fn frame(json: &str) -> Frame {
    Ok(json.as_bytes().to_vec())
}

#[derive(Debug, Default)]
struct EventLog(Mutex<Vec<FeedEvent>>);

impl EventSink for EventLog {
    fn emit(&self, event: &FeedEvent) {
        self.0.lock().push(event.clone());
    }
}

impl EventLog {
    fn count(&self, pred: impl Fn(&FeedEvent) -> bool) -> usize {
        self.0.lock().iter().filter(|e| pred(e)).count()
    }
}

fn config() -> Config {
    Config::new("ws://scripted.test/feed")
        .with_max_retries(3)
        .with_retry_delay(Duration::from_millis(10))
}

fn client(steps: Vec<Step>) -> (FeedClient<ScriptedTransport>, Arc<Counters>, Arc<EventLog>) {
    let (transport, counters) = ScriptedTransport::new(steps);
    let events = Arc::new(EventLog::default());
    let client = FeedClient::with_transport(config(), transport)
        .unwrap()
        .with_sink(events.clone());
    (client, counters, events)
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    timeout(Duration::from_secs(5), async {
        while !condition() {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

const BOOK_A: &str = r#"{"asks":[["100.5","2"],["100.2","1"]],"bids":[["99.9","3"],["100.1","5"]]}"#;
const BOOK_B: &str = r#"{"symbol":"BTC-USDT-SWAP","asks":[[101,1]],"bids":[[100,4]]}"#;

#[tokio::test]
async fn test_snapshot_before_first_message() {
    let (client, _, _) = client(vec![]);

    let snapshot = client.snapshot();
    assert!(snapshot.asks.is_empty());
    assert!(snapshot.bids.is_empty());
    assert_eq!(snapshot.latency_ms, 0.0);
    assert_eq!(client.stats().message_count, 0);
}

#[tokio::test]
async fn test_messages_applied_in_order() {
    let (tx, step) = accept();
    let (client, _, _) = client(vec![step]);

    assert_ok!(client.start().await);
    assert_eq!(client.connection_state(), ConnectionState::Connected);

    tx.send(frame(BOOK_A)).unwrap();
    wait_until(|| client.stats().message_count == 1).await;

    let snapshot = client.snapshot();
    assert_eq!(
        snapshot.asks.levels(),
        &[PriceLevel::new(100.2, 1.0), PriceLevel::new(100.5, 2.0)]
    );
    assert_eq!(
        snapshot.bids.levels(),
        &[PriceLevel::new(100.1, 5.0), PriceLevel::new(99.9, 3.0)]
    );

    tx.send(frame(BOOK_B)).unwrap();
    wait_until(|| client.stats().message_count == 2).await;

    let snapshot = client.snapshot();
    assert_eq!(snapshot.best_ask(), Some(PriceLevel::new(101.0, 1.0)));
    assert_eq!(snapshot.best_bid(), Some(PriceLevel::new(100.0, 4.0)));
    assert_eq!(snapshot.spread(), Some(1.0));
    assert_eq!(snapshot.symbol.as_deref(), Some("BTC-USDT-SWAP"));
    assert_eq!(client.stats().last_latency_ms, snapshot.latency_ms);

    client.stop().await;
}

#[tokio::test]
async fn test_bad_frames_are_isolated() {
    let (tx, step) = accept();
    let (client, _, events) = client(vec![step]);
    assert_ok!(client.start().await);

    tx.send(frame(BOOK_A)).unwrap();
    wait_until(|| client.stats().message_count == 1).await;
    let before = client.snapshot();

    tx.send(frame("{this is not json")).unwrap();
    tx.send(frame(r#"{"event":"subscribe","arg":{"channel":"books"}}"#)).unwrap();
    tx.send(frame(r#"{"asks":[["oops","1"]],"bids":[]}"#)).unwrap();
    // A good frame afterwards proves the loop kept going
    tx.send(frame(BOOK_B)).unwrap();
    wait_until(|| client.stats().message_count == 2).await;

    assert_eq!(client.snapshot().version, before.version + 1);
    assert_eq!(events.count(|e| matches!(e, FeedEvent::DecodeFailed { .. })), 2);
    assert_eq!(events.count(|e| matches!(e, FeedEvent::ControlMessage { .. })), 1);
    assert_eq!(events.count(|e| matches!(e, FeedEvent::MessageProcessed { .. })), 2);

    client.stop().await;
}

#[tokio::test]
async fn test_bad_frame_keeps_published_snapshot() {
    let (tx, step) = accept();
    let (client, _, events) = client(vec![step]);
    assert_ok!(client.start().await);

    tx.send(frame(BOOK_A)).unwrap();
    wait_until(|| client.stats().message_count == 1).await;
    let before = client.snapshot();

    tx.send(frame("]]")).unwrap();
    wait_until(|| events.count(|e| matches!(e, FeedEvent::DecodeFailed { .. })) == 1).await;

    assert!(Arc::ptr_eq(&before, &client.snapshot()));
    assert_eq!(client.stats().message_count, 1);

    client.stop().await;
}

#[tokio::test]
async fn test_connects_on_fourth_attempt() {
    let (_tx, step) = accept();
    let (client, counters, events) =
        client(vec![Step::Refuse, Step::Refuse, Step::Refuse, step]);

    assert_ok!(client.start().await);

    assert_eq!(counters.attempts.load(Ordering::SeqCst), 4);
    assert_eq!(events.count(|e| matches!(e, FeedEvent::ConnectFailed { .. })), 3);
    assert_eq!(
        events.count(|e| matches!(e, FeedEvent::Connected { attempt: 4, .. })),
        1
    );
    assert!(client.is_running());

    client.stop().await;
}

#[tokio::test]
async fn test_exhausted_retries_are_fatal() {
    let (client, counters, events) = client(vec![]);

    let err = assert_err!(client.start().await);
    assert!(matches!(err, Error::ConnectionExhausted { attempts: 4, .. }));

    assert_eq!(counters.attempts.load(Ordering::SeqCst), 4);
    assert_eq!(events.count(|e| matches!(e, FeedEvent::RetriesExhausted { .. })), 1);
    assert!(!client.is_running());
    assert_eq!(client.connection_state(), ConnectionState::Disconnected);
    // The receive loop never started
    assert_eq!(client.join().await, None);
}

#[tokio::test]
async fn test_non_retryable_error_stops_immediately() {
    let (client, counters, _) = client(vec![Step::Reject]);

    let err = assert_err!(client.start().await);
    assert!(matches!(err, Error::Connect(ConnectError::InvalidEndpoint { .. })));
    assert_eq!(counters.attempts.load(Ordering::SeqCst), 1);
    assert!(!client.is_running());
}

#[tokio::test]
async fn test_reconnects_after_drop() {
    let (tx1, first) = accept();
    let (tx2, second) = accept();
    let (client, counters, events) = client(vec![first, second]);
    assert_ok!(client.start().await);

    tx1.send(frame(BOOK_A)).unwrap();
    wait_until(|| client.stats().message_count == 1).await;

    tx1.send(Err(RecvError::Closed)).unwrap();
    wait_until(|| counters.attempts.load(Ordering::SeqCst) == 2).await;

    tx2.send(frame(BOOK_B)).unwrap();
    wait_until(|| client.stats().message_count == 2).await;

    assert_eq!(events.count(|e| matches!(e, FeedEvent::Disconnected { .. })), 1);
    assert_eq!(client.connection_state(), ConnectionState::Connected);
    assert_eq!(client.snapshot().best_ask(), Some(PriceLevel::new(101.0, 1.0)));
    assert!(client.is_running());

    client.stop().await;
}

#[tokio::test]
async fn test_protocol_error_takes_recovery_path() {
    let (tx1, first) = accept();
    let (tx2, second) = accept();
    let (client, counters, _) = client(vec![first, second]);
    assert_ok!(client.start().await);

    tx1.send(Err(RecvError::Protocol("bad opcode".to_string()))).unwrap();
    wait_until(|| counters.attempts.load(Ordering::SeqCst) == 2).await;

    tx2.send(frame(BOOK_A)).unwrap();
    wait_until(|| client.stats().message_count == 1).await;

    // The dropped connection was closed before reconnecting
    assert!(counters.closes.load(Ordering::SeqCst) >= 1);

    client.stop().await;
}

#[tokio::test]
async fn test_failed_recovery_ends_loop() {
    let (tx, step) = accept();
    let (client, counters, events) = client(vec![step]);
    assert_ok!(client.start().await);

    tx.send(frame(BOOK_A)).unwrap();
    wait_until(|| client.stats().message_count == 1).await;

    drop(tx);

    let exit = timeout(Duration::from_secs(5), client.join())
        .await
        .expect("loop did not end");
    assert_eq!(exit, Some(LoopExit::Exhausted { attempts: 4 }));

    // 1 initial connect + 4 reconnection attempts
    assert_eq!(counters.attempts.load(Ordering::SeqCst), 5);
    assert!(!client.is_running());
    assert_eq!(client.connection_state(), ConnectionState::Disconnected);
    assert_eq!(client.last_exit(), Some(LoopExit::Exhausted { attempts: 4 }));
    assert_eq!(
        events.count(|e| matches!(e, FeedEvent::LoopExited { .. })),
        1
    );

    // The last good book survives
    assert_eq!(client.snapshot().best_bid(), Some(PriceLevel::new(100.1, 5.0)));
}

#[tokio::test]
async fn test_stop_unblocks_pending_receive() {
    let (tx, step) = accept();
    let (client, counters, events) = client(vec![step]);
    assert_ok!(client.start().await);

    tx.send(frame(BOOK_A)).unwrap();
    wait_until(|| client.stats().message_count == 1).await;

    // The loop is now parked on receive() with the sender still alive
    timeout(Duration::from_secs(1), client.stop())
        .await
        .expect("stop did not complete");

    assert!(!client.is_running());
    assert_eq!(client.connection_state(), ConnectionState::Disconnected);
    assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
    assert_eq!(client.last_exit(), Some(LoopExit::Stopped));
    assert_eq!(events.count(|e| matches!(e, FeedEvent::Stopped)), 1);
    assert_eq!(client.snapshot().best_ask(), Some(PriceLevel::new(100.2, 1.0)));

    // Idempotent
    client.stop().await;
    assert_eq!(events.count(|e| matches!(e, FeedEvent::Stopped)), 1);
    drop(tx);
}

#[tokio::test]
async fn test_second_start_is_noop() {
    let (_tx, step) = accept();
    let (client, counters, events) = client(vec![step]);

    assert_ok!(client.start().await);
    assert_ok!(client.start().await);

    assert_eq!(counters.attempts.load(Ordering::SeqCst), 1);
    assert_eq!(events.count(|e| matches!(e, FeedEvent::AlreadyRunning)), 1);

    client.stop().await;
}

#[tokio::test]
async fn test_stop_cancels_retry_wait() {
    let (transport, counters) = ScriptedTransport::new(vec![]);
    let client = Arc::new(
        FeedClient::with_transport(
            config().with_retry_delay(Duration::from_secs(60)),
            transport,
        )
        .unwrap()
        .with_sink(Arc::new(EventLog::default())),
    );

    let starter = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.start().await })
    };

    wait_until(|| counters.attempts.load(Ordering::SeqCst) == 1).await;
    client.stop().await;

    let result = timeout(Duration::from_secs(1), starter)
        .await
        .expect("start did not return")
        .unwrap();
    assert!(matches!(result, Err(Error::Cancelled)));
    assert_eq!(counters.attempts.load(Ordering::SeqCst), 1);
    assert!(!client.is_running());
}

#[tokio::test]
async fn test_restart_keeps_counting() {
    let (tx1, first) = accept();
    let (tx2, second) = accept();
    let (client, _, _) = client(vec![first, second]);

    assert_ok!(client.start().await);
    tx1.send(frame(BOOK_A)).unwrap();
    wait_until(|| client.stats().message_count == 1).await;
    client.stop().await;

    assert_ok!(client.start().await);
    tx2.send(frame(BOOK_B)).unwrap();
    wait_until(|| client.stats().message_count == 2).await;
    assert_eq!(client.snapshot().best_ask(), Some(PriceLevel::new(101.0, 1.0)));

    client.stop().await;
}

/// Retry policy that records which retries it was asked about
#[derive(Debug, Clone, Default)]
struct RecordingPolicy {
    asked: Arc<Mutex<Vec<u32>>>,
}

impl RetryPolicy for RecordingPolicy {
    fn max_retries(&self) -> u32 {
        2
    }

    fn delay_for_retry(&self, retry: u32) -> Duration {
        self.asked.lock().push(retry);
        Duration::ZERO
    }
}

#[tokio::test]
async fn test_custom_retry_policy_drives_connect() {
    let (_tx, step) = accept();
    let (transport, counters) = ScriptedTransport::new(vec![Step::Refuse, Step::Refuse, step]);
    let policy = RecordingPolicy::default();
    let client = FeedClient::with_transport(config(), transport)
        .unwrap()
        .with_retry_policy(policy.clone());

    assert_ok!(client.start().await);

    assert_eq!(counters.attempts.load(Ordering::SeqCst), 3);
    assert_eq!(*policy.asked.lock(), vec![0, 1]);

    client.stop().await;
}

#[tokio::test]
async fn test_exponential_backoff_replaces_config_retries() {
    let (transport, counters) = ScriptedTransport::new(vec![]);
    let events = Arc::new(EventLog::default());
    let client = FeedClient::with_transport(config(), transport)
        .unwrap()
        .with_sink(events.clone())
        .with_retry_policy(
            ExponentialBackoff::new()
                .max_retries(2)
                .initial_delay_ms(20)
                .backoff_multiplier(2.0),
        );

    let started = Instant::now();
    let err = assert_err!(client.start().await);

    // The config allows 3 retries; the policy's 2 win
    assert!(matches!(err, Error::ConnectionExhausted { attempts: 3, .. }));
    assert_eq!(counters.attempts.load(Ordering::SeqCst), 3);
    assert_eq!(
        events.count(|e| matches!(e, FeedEvent::ConnectAttempt { max_attempts: 3, .. })),
        3
    );
    // 20ms then 40ms between attempts
    assert!(started.elapsed() >= Duration::from_millis(60));
}

/// A full book whose levels arrive unsorted and with repeated prices
fn shuffled_book(seq: u64) -> Frame {
    let side = |base: f64, step: f64| {
        (0..10u64)
            .map(|k| {
                let tick = (seq * 7 + k * 13) % 20;
                format!(r#"["{}","{}"]"#, base + step * tick as f64, k + 1)
            })
            .collect::<Vec<_>>()
            .join(",")
    };
    frame(&format!(
        r#"{{"asks":[{}],"bids":[{}]}}"#,
        side(101.0, 0.5),
        side(100.0, -0.5)
    ))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_readers_see_consistent_books() {
    const FRAMES: u64 = 300;

    let (tx, step) = accept();
    let (client, _, _) = client(vec![step]);
    let client = Arc::new(client);
    assert_ok!(client.start().await);

    let done = Arc::new(AtomicBool::new(false));
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let client = Arc::clone(&client);
            let done = Arc::clone(&done);
            tokio::spawn(async move {
                let mut last_version = 0;
                let mut reads = 0u64;
                loop {
                    let snapshot = client.snapshot();
                    assert!(snapshot.version >= last_version, "version went backwards");
                    assert!(snapshot
                        .asks
                        .levels()
                        .windows(2)
                        .all(|w| w[0].price < w[1].price));
                    assert!(snapshot
                        .bids
                        .levels()
                        .windows(2)
                        .all(|w| w[0].price > w[1].price));
                    last_version = snapshot.version;
                    reads += 1;

                    if done.load(Ordering::SeqCst) {
                        break reads;
                    }
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();

    for seq in 0..FRAMES {
        tx.send(shuffled_book(seq)).unwrap();
        if seq % 25 == 0 {
            tokio::task::yield_now().await;
        }
    }
    wait_until(|| client.stats().message_count == FRAMES).await;
    done.store(true, Ordering::SeqCst);

    for reader in readers {
        assert!(reader.await.unwrap() > 0);
    }
    assert_eq!(client.snapshot().version, FRAMES);

    client.stop().await;
}
