//! Staged concurrency scheduler.
//!
//! [`LoadCoordinator`] walks a scenario's stages in order and ramps the
//! number of active [`VirtualUser`]s from the previous stage's target to the
//! current one, one 500 ms tick at a time:
//!
//! - Every tick computes the linearly interpolated target (rounded to nearest,
//!   ties to even) and starts or stops exactly enough workers to match it.
//! - A stage shorter than one tick makes no adjustment; the next stage ramps
//!   from its target.
//! - Ramp-down stops the oldest workers first.
//! - After the last stage every worker is cancelled and the coordinator waits
//!   at most [`SHUTDOWN_TIMEOUT`] for them to finish, then aborts stragglers.
//!
//! # Design
//!
//! The coordinator is a single sequential control loop and never performs
//! request I/O itself. All per-run mutable state (registry, task tracker, id
//! counter) lives on the stack of [`LoadCoordinator::run`], so the
//! coordinator can be reused for several runs. Each worker gets a child of
//! the run's [`CancellationToken`], so stopping one worker never affects
//! another while cancelling the run reaches all of them.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::loadtest::metrics::MetricsCollector;
use crate::loadtest::scenario::Scenario;
use crate::loadtest::transport::Transport;
use crate::loadtest::vu::{RequestBudget, VirtualUser};

/// Control loop period.
pub const TICK_INTERVAL: Duration = Duration::from_millis(500);

/// Upper bound on the final wait for workers to stop.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Number of whole ticks in a stage. A trailing partial tick is dropped.
pub fn ramp_steps(duration: Duration) -> u64 {
    (duration.as_millis() / TICK_INTERVAL.as_millis()) as u64
}

/// Interpolated worker target at `step` of `total_steps`, ramping from
/// `prev` to `target`. Rounds to nearest, ties to even.
pub fn interpolate(prev: u32, target: u32, step: u64, total_steps: u64) -> u32 {
    let total = i128::from(total_steps.max(1));
    let step = i128::from(step.min(total_steps));
    let delta = i128::from(target) - i128::from(prev);

    // Exact value is numerator / total and never negative.
    let numerator = i128::from(prev) * total + delta * step;
    let (quotient, remainder) = (numerator / total, numerator % total);
    let rounded = match (2 * remainder).cmp(&total) {
        std::cmp::Ordering::Less => quotient,
        std::cmp::Ordering::Greater => quotient + 1,
        std::cmp::Ordering::Equal => quotient + (quotient & 1),
    };
    rounded as u32
}

/// Every tick's target for one stage, in order. Empty for a stage shorter
/// than one tick.
///
/// ```
/// use std::time::Duration;
/// use stagehand::loadtest::coordinator::ramp_targets;
///
/// let targets = ramp_targets(0, 10, Duration::from_secs(5));
/// assert_eq!(targets, vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
/// ```
pub fn ramp_targets(prev: u32, target: u32, duration: Duration) -> Vec<u32> {
    let total = ramp_steps(duration);
    (1..=total)
        .map(|step| interpolate(prev, target, step, total))
        .collect()
}

/// Concurrently readable count of registered workers.
#[derive(Debug, Clone, Default)]
pub struct ActiveWorkers(Arc<AtomicUsize>);

impl ActiveWorkers {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::Acquire)
    }

    fn set(&self, value: usize) {
        self.0.store(value, Ordering::Release);
    }
}

/// A running worker as seen by the coordinator.
#[derive(Debug)]
pub struct WorkerHandle {
    pub id: u64,
    pub cancel: CancellationToken,
    task: AbortHandle,
}

/// Active workers ordered by id, which is also spawn order.
///
/// Single writer (the coordinator). The size is mirrored into an
/// [`ActiveWorkers`] counter for concurrent readers.
#[derive(Debug, Default)]
pub struct WorkerRegistry {
    workers: BTreeMap<u64, WorkerHandle>,
    size: ActiveWorkers,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty registry that mirrors its size into `size`.
    pub fn with_counter(size: ActiveWorkers) -> Self {
        size.set(0);
        Self {
            workers: BTreeMap::new(),
            size,
        }
    }

    pub fn insert(&mut self, handle: WorkerHandle) {
        self.workers.insert(handle.id, handle);
        self.size.set(self.workers.len());
    }

    /// Remove up to `count` of the oldest workers, oldest first.
    pub fn remove_oldest(&mut self, count: usize) -> Vec<WorkerHandle> {
        let mut removed = Vec::with_capacity(count.min(self.workers.len()));
        for _ in 0..count {
            match self.workers.pop_first() {
                Some((_, handle)) => removed.push(handle),
                None => break,
            }
        }
        self.size.set(self.workers.len());
        removed
    }

    /// Remove every worker, oldest first.
    pub fn drain(&mut self) -> Vec<WorkerHandle> {
        let removed = std::mem::take(&mut self.workers).into_values().collect();
        self.size.set(0);
        removed
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Registered ids in ascending order.
    pub fn ids(&self) -> Vec<u64> {
        self.workers.keys().copied().collect()
    }

    /// Shared view of the registry size.
    pub fn active(&self) -> ActiveWorkers {
        self.size.clone()
    }
}

/// What one control-loop tick did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RampTick {
    /// Zero-based stage index.
    pub stage: usize,
    /// One-based tick within the stage.
    pub step: u64,
    /// Interpolated target for this tick.
    pub target: u32,
    /// Registry size after the adjustment.
    pub active: usize,
    pub started: u32,
    pub stopped: u32,
    /// Time since the run started, in milliseconds.
    pub at_ms: u64,
}

/// Latest control-loop state, published on the progress channel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RampProgress {
    pub stage: usize,
    pub stages: usize,
    pub step: u64,
    pub total_steps: u64,
    pub target: u32,
    pub active: usize,
    pub requests: usize,
    pub elapsed: Duration,
}

/// Outcome of [`LoadCoordinator::run`].
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub elapsed: Duration,
    pub ticks: Vec<RampTick>,
    pub workers_spawned: u64,
    pub peak_active: usize,
    /// The caller's token fired before the last stage completed.
    pub cancelled: bool,
    /// The request budget ran out before the last stage completed.
    pub budget_exhausted: bool,
    /// Some workers were still running after the shutdown timeout.
    pub shutdown_timed_out: bool,
}

/// Drives workers through a scenario's stages.
pub struct LoadCoordinator {
    transport: Arc<dyn Transport>,
    collector: Arc<MetricsCollector>,
    max_requests: Option<u64>,
    shutdown_timeout: Duration,
    progress: watch::Sender<RampProgress>,
    active: ActiveWorkers,
}

impl LoadCoordinator {
    pub fn new(transport: Arc<dyn Transport>, collector: Arc<MetricsCollector>) -> Self {
        let (progress, _) = watch::channel(RampProgress::default());
        Self {
            transport,
            collector,
            max_requests: None,
            shutdown_timeout: SHUTDOWN_TIMEOUT,
            progress,
            active: ActiveWorkers::default(),
        }
    }

    /// Cap total request attempts across all workers. The run ends when
    /// the cap or the last stage is reached, whichever comes first.
    pub fn with_max_requests(mut self, max: u64) -> Self {
        self.max_requests = Some(max);
        self
    }

    /// Override the final shutdown bound.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn max_requests(&self) -> Option<u64> {
        self.max_requests
    }

    pub fn collector(&self) -> &Arc<MetricsCollector> {
        &self.collector
    }

    /// Live count of registered workers, readable while a run is in
    /// progress.
    pub fn active_workers(&self) -> ActiveWorkers {
        self.active.clone()
    }

    /// Receiver for per-tick progress updates.
    pub fn subscribe(&self) -> watch::Receiver<RampProgress> {
        self.progress.subscribe()
    }

    /// Execute every stage of `scenario`, then stop all workers.
    ///
    /// Cancelling `cancel` ends the current stage early and goes straight to
    /// shutdown; it is not an error.
    pub async fn run(&self, scenario: &Scenario, cancel: CancellationToken) -> RunSummary {
        let run_token = cancel.child_token();
        let budget = self
            .max_requests
            .map(|max| RequestBudget::new(max, run_token.clone()));
        let mut run = ActiveRun {
            scenario: Arc::new(scenario.clone()),
            transport: Arc::clone(&self.transport),
            collector: Arc::clone(&self.collector),
            budget,
            token: run_token.clone(),
            registry: WorkerRegistry::with_counter(self.active.clone()),
            tracker: TaskTracker::new(),
            stopping: Vec::new(),
            next_id: 0,
            peak_active: 0,
        };

        let started = Instant::now();
        let stages = scenario.stages.len();
        let mut ticks = Vec::new();
        let mut prev = 0u32;

        'stages: for (index, stage) in scenario.stages.iter().enumerate() {
            let total_steps = ramp_steps(stage.duration);
            if total_steps == 0 {
                tracing::debug!(
                    stage = index + 1,
                    duration_ms = stage.duration.as_millis() as u64,
                    "stage shorter than one tick, skipped"
                );
                prev = stage.target;
                continue;
            }
            tracing::info!(
                stage = index + 1,
                of = stages,
                from = prev,
                target = stage.target,
                duration_ms = stage.duration.as_millis() as u64,
                "stage started"
            );

            for step in 1..=total_steps {
                tokio::select! {
                    biased;
                    _ = run_token.cancelled() => break 'stages,
                    _ = tokio::time::sleep(TICK_INTERVAL) => {}
                }

                let target = interpolate(prev, stage.target, step, total_steps);
                let (spawned, stopped) = run.adjust(target as usize);
                let elapsed = started.elapsed();
                if spawned > 0 || stopped > 0 {
                    tracing::debug!(
                        stage = index + 1,
                        step,
                        target,
                        spawned,
                        stopped,
                        active = run.registry.len(),
                        "adjusted workers"
                    );
                }

                ticks.push(RampTick {
                    stage: index,
                    step,
                    target,
                    active: run.registry.len(),
                    started: spawned,
                    stopped,
                    at_ms: elapsed.as_millis() as u64,
                });
                self.progress.send_replace(RampProgress {
                    stage: index,
                    stages,
                    step,
                    total_steps,
                    target,
                    active: run.registry.len(),
                    requests: self.collector.len(),
                    elapsed,
                });
            }

            prev = stage.target;
        }

        let cancelled = cancel.is_cancelled();
        let budget_exhausted = !cancelled && run_token.is_cancelled();
        if cancelled {
            tracing::info!("run cancelled, stopping workers");
        } else if budget_exhausted {
            tracing::info!("request budget exhausted, stopping workers");
        }

        let shutdown_timed_out = run.shutdown(self.shutdown_timeout).await;

        RunSummary {
            elapsed: started.elapsed(),
            ticks,
            workers_spawned: run.next_id,
            peak_active: run.peak_active,
            cancelled,
            budget_exhausted,
            shutdown_timed_out,
        }
    }
}

/// Per-run state owned by the control loop.
struct ActiveRun {
    scenario: Arc<Scenario>,
    transport: Arc<dyn Transport>,
    collector: Arc<MetricsCollector>,
    budget: Option<RequestBudget>,
    token: CancellationToken,
    registry: WorkerRegistry,
    tracker: TaskTracker,
    /// Tasks of workers removed from the registry that have not finished
    /// yet. Pruned every tick.
    stopping: Vec<AbortHandle>,
    next_id: u64,
    peak_active: usize,
}

impl ActiveRun {
    /// Start or stop workers until the registry holds `target`.
    /// Returns `(started, stopped)`.
    fn adjust(&mut self, target: usize) -> (u32, u32) {
        self.stopping.retain(|task| !task.is_finished());

        let current = self.registry.len();
        if target > current {
            let count = target - current;
            for _ in 0..count {
                self.spawn_worker();
            }
            self.peak_active = self.peak_active.max(self.registry.len());
            (count as u32, 0)
        } else if target < current {
            let removed = self.registry.remove_oldest(current - target);
            let count = removed.len() as u32;
            for handle in removed {
                handle.cancel.cancel();
                self.stopping.push(handle.task);
            }
            (0, count)
        } else {
            (0, 0)
        }
    }

    fn spawn_worker(&mut self) {
        let id = self.next_id;
        self.next_id += 1;

        let cancel = self.token.child_token();
        let worker = VirtualUser::new(
            id,
            Arc::clone(&self.scenario),
            Arc::clone(&self.transport),
            Arc::clone(&self.collector),
        )
        .with_budget(self.budget.clone());
        let task = self.tracker.spawn(worker.run(cancel.clone())).abort_handle();

        self.registry.insert(WorkerHandle { id, cancel, task });
    }

    /// Cancel everything and wait up to `timeout`. Returns `true` when the
    /// wait timed out and stragglers had to be aborted.
    async fn shutdown(&mut self, timeout: Duration) -> bool {
        for handle in self.registry.drain() {
            handle.cancel.cancel();
            self.stopping.push(handle.task);
        }
        self.tracker.close();

        if tokio::time::timeout(timeout, self.tracker.wait()).await.is_ok() {
            return false;
        }

        tracing::warn!(
            remaining = self.tracker.len(),
            timeout_ms = timeout.as_millis() as u64,
            "workers did not stop in time, aborting"
        );
        for task in &self.stopping {
            task.abort();
        }
        true
    }
}
