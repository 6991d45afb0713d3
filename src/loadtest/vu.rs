//! Virtual user (VU) task loop.
//!
//! A VU is one logical concurrent user: it issues a request, records the
//! outcome into the shared [`MetricsCollector`], optionally pauses, and
//! repeats until its cancellation token fires. VUs never coordinate with each
//! other; the only shared state is the read-only scenario, the pooled
//! transport, the collector, and the optional [`RequestBudget`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::loadtest::metrics::{MetricsCollector, RequestOutcome};
use crate::loadtest::scenario::Scenario;
use crate::loadtest::transport::{RequestPlan, Transport};

/// Shared cap on total request attempts across all VUs of a run.
///
/// The VU that finds the budget exhausted cancels the whole run, so whichever
/// limit is reached first (budget or last stage) ends the test. Requests
/// still in flight at that point are dropped unrecorded.
#[derive(Debug, Clone)]
pub struct RequestBudget {
    issued: Arc<AtomicU64>,
    max: u64,
    run: CancellationToken,
}

impl RequestBudget {
    /// Budget of `max` attempts that cancels `run` once spent.
    pub fn new(max: u64, run: CancellationToken) -> Self {
        Self {
            issued: Arc::new(AtomicU64::new(0)),
            max,
            run,
        }
    }

    /// Claim one attempt. Returns `false` (and cancels the run) when spent.
    pub fn try_acquire(&self) -> bool {
        let prev = self.issued.fetch_add(1, Ordering::Relaxed);
        if prev >= self.max {
            self.run.cancel();
            return false;
        }
        true
    }

    /// Attempts claimed so far, capped at the budget.
    pub fn issued(&self) -> u64 {
        self.issued.load(Ordering::Relaxed).min(self.max)
    }

    pub fn max(&self) -> u64 {
        self.max
    }
}

/// One request-issuing worker.
pub struct VirtualUser {
    id: u64,
    scenario: Arc<Scenario>,
    transport: Arc<dyn Transport>,
    collector: Arc<MetricsCollector>,
    budget: Option<RequestBudget>,
}

impl VirtualUser {
    pub fn new(
        id: u64,
        scenario: Arc<Scenario>,
        transport: Arc<dyn Transport>,
        collector: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            id,
            scenario,
            transport,
            collector,
            budget: None,
        }
    }

    /// Attach a shared request budget.
    pub fn with_budget(mut self, budget: Option<RequestBudget>) -> Self {
        self.budget = budget;
        self
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Issue requests until `cancel` fires.
    ///
    /// Each attempt records exactly one outcome, except an attempt that is
    /// still in flight when cancellation arrives: that one is dropped
    /// unrecorded. Transport failures and timeouts are recorded as errors
    /// with status 0 and never end the loop.
    pub async fn run(self, cancel: CancellationToken) {
        let timeout = self.scenario.timeout();
        let pause = self.scenario.sleep();
        let mut iteration: u64 = 0;

        tracing::trace!(vu = self.id, "virtual user started");

        loop {
            if cancel.is_cancelled() {
                break;
            }
            if let Some(budget) = &self.budget {
                if !budget.try_acquire() {
                    break;
                }
            }

            let plan = RequestPlan::for_iteration(&self.scenario, iteration).with_vu(self.id);
            iteration += 1;

            let start = Instant::now();
            let attempt = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                result = tokio::time::timeout(timeout, self.transport.send(&plan)) => result,
            };
            let elapsed = start.elapsed();

            let outcome = match attempt {
                Ok(Ok(status)) => RequestOutcome::response(elapsed, status),
                Ok(Err(err)) => {
                    tracing::trace!(vu = self.id, category = err.category(), error = %err, "request failed");
                    RequestOutcome::failure(elapsed)
                }
                Err(_) => {
                    tracing::trace!(vu = self.id, category = "timeout", "request timed out");
                    RequestOutcome::failure(elapsed)
                }
            };
            self.collector.record(outcome);

            if let Some(pause) = pause {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(pause) => {}
                }
            }
        }

        tracing::trace!(vu = self.id, iterations = iteration, "virtual user stopped");
    }
}
