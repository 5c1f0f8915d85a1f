//! Processing statistics.
//!
//! [`ClientStats`] holds the running totals the client exposes to callers.
//! [`LatencyTracker`] keeps a bounded window of samples per named operation
//! and reports percentiles over it.

use std::collections::VecDeque;
use std::time::Instant;

use rustc_hash::FxHashMap;
use serde::Serialize;

/// Operation name for frame decoding
pub const OP_DECODE: &str = "decode";
/// Operation name for decode plus apply (the per-message latency)
pub const OP_PROCESS: &str = "process";

/// Running totals over successfully applied messages
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ClientStats {
    /// Messages decoded and applied
    pub message_count: u64,
    /// Sum of per-message latencies
    pub total_processing_time_ms: f64,
    /// Latency of the most recent message
    pub last_latency_ms: f64,
}

impl ClientStats {
    /// Record one applied message
    pub fn record(&mut self, latency_ms: f64) {
        self.message_count += 1;
        self.total_processing_time_ms += latency_ms;
        self.last_latency_ms = latency_ms;
    }

    /// Mean latency over all applied messages, 0 when none
    #[must_use]
    pub fn average_latency_ms(&self) -> f64 {
        if self.message_count == 0 {
            0.0
        } else {
            self.total_processing_time_ms / self.message_count as f64
        }
    }
}

/// Summary of a latency window, in milliseconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LatencyStats {
    /// Samples in the window
    pub count: usize,
    /// Fastest sample
    pub min: f64,
    /// Slowest sample
    pub max: f64,
    /// Mean
    pub avg: f64,
    /// Median
    pub median: f64,
    /// 95th percentile (max when fewer than 20 samples)
    pub p95: f64,
    /// 99th percentile (max when fewer than 100 samples)
    pub p99: f64,
}

impl LatencyStats {
    fn from_samples(samples: &VecDeque<f64>) -> Self {
        if samples.is_empty() {
            return Self::default();
        }

        let mut sorted: Vec<f64> = samples.iter().copied().collect();
        sorted.sort_by(f64::total_cmp);

        let n = sorted.len();
        let median = if n % 2 == 1 {
            sorted[n / 2]
        } else {
            (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
        };

        Self {
            count: n,
            min: sorted[0],
            max: sorted[n - 1],
            avg: sorted.iter().sum::<f64>() / n as f64,
            median,
            p95: percentile(&sorted, 0.95, 20),
            p99: percentile(&sorted, 0.99, 100),
        }
    }
}

/// Nearest-rank percentile; falls back to the max below `min_samples`
fn percentile(sorted: &[f64], q: f64, min_samples: usize) -> f64 {
    let n = sorted.len();
    if n < min_samples {
        return sorted[n - 1];
    }
    let rank = ((q * n as f64) as usize).max(1);
    sorted[rank - 1]
}

/// Rolling latency samples keyed by operation name
#[derive(Debug, Clone)]
pub struct LatencyTracker {
    max_samples: usize,
    history: FxHashMap<String, VecDeque<f64>>,
    started: FxHashMap<String, Instant>,
}

impl LatencyTracker {
    /// Create a tracker keeping at most `max_samples` per operation
    #[must_use]
    pub fn new(max_samples: usize) -> Self {
        Self {
            max_samples: max_samples.max(1),
            history: FxHashMap::default(),
            started: FxHashMap::default(),
        }
    }

    /// Start timing an operation
    pub fn start(&mut self, operation: &str) {
        self.started.insert(operation.to_string(), Instant::now());
    }

    /// Stop timing an operation and record the elapsed time
    ///
    /// Returns the elapsed milliseconds, or `None` if `start` was never called.
    pub fn stop(&mut self, operation: &str) -> Option<f64> {
        let started = self.started.remove(operation)?;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        self.record(operation, elapsed_ms);
        Some(elapsed_ms)
    }

    /// Record an externally measured sample
    pub fn record(&mut self, operation: &str, elapsed_ms: f64) {
        if !self.history.contains_key(operation) {
            self.history.insert(
                operation.to_string(),
                VecDeque::with_capacity(self.max_samples.min(1024)),
            );
        }
        let Some(samples) = self.history.get_mut(operation) else {
            return;
        };

        if samples.len() >= self.max_samples {
            samples.pop_front();
        }
        samples.push_back(elapsed_ms);
    }

    /// Statistics for one operation (all zero when unknown)
    #[must_use]
    pub fn stats(&self, operation: &str) -> LatencyStats {
        self.history
            .get(operation)
            .map(LatencyStats::from_samples)
            .unwrap_or_default()
    }

    /// Statistics for every tracked operation
    #[must_use]
    pub fn all_stats(&self) -> Vec<(String, LatencyStats)> {
        let mut all: Vec<_> = self
            .history
            .iter()
            .map(|(op, samples)| (op.clone(), LatencyStats::from_samples(samples)))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    /// Clear one operation, or everything when `operation` is `None`
    pub fn reset(&mut self, operation: Option<&str>) {
        match operation {
            Some(op) => {
                self.history.remove(op);
                self.started.remove(op);
            }
            None => {
                self.history.clear();
                self.started.clear();
            }
        }
    }
}

impl Default for LatencyTracker {
    fn default() -> Self {
        Self::new(1000)
    }
}
