//! Concurrent outcome collection for load test execution.
//!
//! Provides [`MetricsCollector`], an append-only sink that every virtual user
//! writes [`RequestOutcome`] values into, and that the caller snapshots once
//! the run is over.
//!
//! # Design
//!
//! - **Sharded**: outcomes land in one of several `parking_lot` mutex shards,
//!   picked by a global atomic sequence number. Concurrent writers almost
//!   always hit different shards, so no single lock serializes the hot path.
//! - **Ordered snapshots**: every entry carries its sequence number, and
//!   [`MetricsCollector::snapshot`] merges the shards back into record order.
//!   Outcomes from one VU therefore stay in iteration order.
//! - **Independent copies**: a snapshot is an owned `Vec`; later records never
//!   show up in it.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Result of one HTTP attempt.
///
/// Created by a virtual user after each attempt and moved into the collector.
/// Never mutated afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestOutcome {
    /// Wall-clock time around the send, in milliseconds.
    pub latency_ms: u64,
    /// HTTP status code, or 0 when no response was received.
    pub status_code: u16,
    /// `true` for non-success statuses and transport failures.
    pub is_error: bool,
}

impl RequestOutcome {
    /// An attempt that received a response. Non-2xx statuses count as errors.
    pub fn response(latency: Duration, status_code: u16) -> Self {
        Self {
            latency_ms: latency.as_millis() as u64,
            status_code,
            is_error: !(200..300).contains(&status_code),
        }
    }

    /// An attempt that failed before a response arrived.
    pub fn failure(latency: Duration) -> Self {
        Self {
            latency_ms: latency.as_millis() as u64,
            status_code: 0,
            is_error: true,
        }
    }
}

/// Minimum shard count, regardless of detected parallelism.
const MIN_SHARDS: usize = 8;

/// Append-only, multi-writer outcome sink.
///
/// Cheap to share behind an `Arc`; every method takes `&self`.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use stagehand::loadtest::metrics::{MetricsCollector, RequestOutcome};
///
/// let collector = MetricsCollector::new();
/// collector.record(RequestOutcome::response(Duration::from_millis(42), 200));
/// collector.record(RequestOutcome::failure(Duration::from_millis(7)));
///
/// let snapshot = collector.snapshot();
/// assert_eq!(snapshot.len(), 2);
/// assert_eq!(snapshot[0].latency_ms, 42);
/// assert!(snapshot[1].is_error);
/// ```
pub struct MetricsCollector {
    shards: Box<[Mutex<Vec<(u64, RequestOutcome)>>]>,
    sequence: AtomicU64,
}

impl MetricsCollector {
    /// Create a collector sized for the machine's available parallelism.
    pub fn new() -> Self {
        let parallelism = std::thread::available_parallelism().map_or(1, |n| n.get());
        Self::with_shards((parallelism * 4).max(MIN_SHARDS))
    }

    /// Create a collector with an explicit shard count (at least 1).
    pub fn with_shards(count: usize) -> Self {
        let shards = (0..count.max(1))
            .map(|_| Mutex::new(Vec::new()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            shards,
            sequence: AtomicU64::new(0),
        }
    }

    /// Append an outcome. Never blocks on other shards and never drops entries.
    pub fn record(&self, outcome: RequestOutcome) {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let shard = &self.shards[(seq % self.shards.len() as u64) as usize];
        shard.lock().push((seq, outcome));
    }

    /// Number of outcomes recorded so far.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.lock().len()).sum()
    }

    /// Returns `true` if nothing has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy out every outcome recorded so far, in record order.
    pub fn snapshot(&self) -> Vec<RequestOutcome> {
        let mut entries: Vec<(u64, RequestOutcome)> = Vec::new();
        for shard in self.shards.iter() {
            entries.extend_from_slice(&shard.lock());
        }
        entries.sort_unstable_by_key(|(seq, _)| *seq);
        entries.into_iter().map(|(_, outcome)| outcome).collect()
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
