//! Reduction of a collector snapshot into summary statistics.
//!
//! [`aggregate`] is a pure function: same outcomes in, same
//! [`AggregatedResult`] out. Latency statistics only consider successful
//! outcomes so that fast-failing errors (connection refused) or slow ones
//! (timeouts) do not skew the percentiles.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::loadtest::metrics::RequestOutcome;

/// Summary statistics for one run.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AggregatedResult {
    /// Every recorded attempt, errors included.
    pub total_requests: u64,
    /// Attempts with the error flag set.
    pub error_count: u64,
    /// Mean latency of successful attempts (milliseconds).
    pub average_latency_ms: f64,
    /// Nearest-rank P90 of successful latencies (milliseconds).
    pub p90_ms: u64,
    /// Nearest-rank P95 of successful latencies (milliseconds).
    pub p95_ms: u64,
    /// Nearest-rank P99 of successful latencies (milliseconds).
    pub p99_ms: u64,
    /// Attempts per status code; 0 collects attempts with no response.
    pub status_counts: BTreeMap<u16, u64>,
}

impl AggregatedResult {
    /// Attempts that did not error.
    pub fn success_count(&self) -> u64 {
        self.total_requests - self.error_count
    }

    /// Fraction of successful attempts (0.0..=1.0). 0.0 when nothing ran.
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            return 0.0;
        }
        self.success_count() as f64 / self.total_requests as f64
    }

    /// Requests per second over `elapsed`. 0.0 for a zero-length window.
    pub fn throughput(&self, elapsed: Duration) -> f64 {
        let secs = elapsed.as_secs_f64();
        if secs > 0.0 {
            self.total_requests as f64 / secs
        } else {
            0.0
        }
    }
}

/// Reduce outcomes into an [`AggregatedResult`].
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use stagehand::loadtest::aggregate::aggregate;
/// use stagehand::loadtest::metrics::RequestOutcome;
///
/// let outcomes = [
///     RequestOutcome::response(Duration::from_millis(50), 200),
///     RequestOutcome::response(Duration::from_millis(150), 200),
///     RequestOutcome::failure(Duration::from_millis(3000)),
/// ];
/// let result = aggregate(&outcomes);
/// assert_eq!(result.total_requests, 3);
/// assert_eq!(result.error_count, 1);
/// assert_eq!(result.average_latency_ms, 100.0);
/// ```
pub fn aggregate(outcomes: &[RequestOutcome]) -> AggregatedResult {
    let mut latencies: Vec<u64> = Vec::with_capacity(outcomes.len());
    let mut error_count = 0u64;
    let mut status_counts: BTreeMap<u16, u64> = BTreeMap::new();

    for outcome in outcomes {
        *status_counts.entry(outcome.status_code).or_insert(0) += 1;
        if outcome.is_error {
            error_count += 1;
        } else {
            latencies.push(outcome.latency_ms);
        }
    }

    latencies.sort_unstable();

    let average_latency_ms = if latencies.is_empty() {
        0.0
    } else {
        latencies.iter().map(|&l| l as f64).sum::<f64>() / latencies.len() as f64
    };

    AggregatedResult {
        total_requests: outcomes.len() as u64,
        error_count,
        average_latency_ms,
        p90_ms: percentile(&latencies, 0.90),
        p95_ms: percentile(&latencies, 0.95),
        p99_ms: percentile(&latencies, 0.99),
        status_counts,
    }
}

/// Nearest-rank percentile of an ascending slice.
///
/// Index is `ceil(p * n) - 1`, clamped to `[0, n - 1]`. Returns 0 for an
/// empty slice.
pub fn percentile(sorted: &[u64], p: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = (p * sorted.len() as f64).ceil() as i64 - 1;
    let index = rank.clamp(0, sorted.len() as i64 - 1) as usize;
    sorted[index]
}
