// CLASSIFICATION: COMMUNITY
// Filename: stats.rs v0.7
// Author: Lukas Bower
// Date Modified: 2026-03-21

//! Ray-movement accounting and demand estimation.
//!
//! Workers scope seven counters by the treelet that was current when the
//! event happened, snapshot and reset them every stats tick, and ship the
//! snapshot to the master. The master folds snapshots into per-worker and
//! global aggregates and feeds a per-(worker, treelet) rate estimator.

use std::collections::HashMap;
use std::time::Instant;

use swarm_model::{TreeletId, WorkerId};
use swarm_wire::{QueueSnapshot, RayCounters, WorkerStatsMsg};

/// Counters a worker accumulates between stats ticks.
#[derive(Debug, Default, Clone)]
pub struct WorkerStats {
    /// Paths finished since the last snapshot.
    pub finished_paths: u64,
    /// Counters across all treelets.
    pub aggregate: RayCounters,
    /// Queue depths; overwritten at snapshot time.
    pub queue: QueueSnapshot,
    /// Counters scoped by treelet.
    pub per_treelet: HashMap<TreeletId, RayCounters>,
}

macro_rules! record {
    ($name:ident, $field:ident) => {
        /// Count one event against `treelet`.
        pub fn $name(&mut self, treelet: TreeletId) {
            self.aggregate.$field += 1;
            self.per_treelet.entry(treelet).or_default().$field += 1;
        }
    };
}

impl WorkerStats {
    record!(record_waiting_ray, waiting);
    record!(record_processed_ray, processed);
    record!(record_sent_ray, sent);
    record!(record_received_ray, received);
    record!(record_demanded_ray, demanded);
    record!(record_sending_ray, sending);
    record!(record_pending_ray, pending);

    /// Count one finished path.
    pub fn record_finished_path(&mut self) {
        self.finished_paths += 1;
    }

    /// Take a wire snapshot and reset the interval counters.
    pub fn snapshot(&mut self, queue: QueueSnapshot) -> WorkerStatsMsg {
        self.queue = queue;
        let mut per_treelet: Vec<(TreeletId, RayCounters)> =
            self.per_treelet.drain().collect();
        per_treelet.sort_by_key(|(t, _)| *t);
        let msg = WorkerStatsMsg {
            finished_paths: self.finished_paths,
            aggregate: self.aggregate,
            queue,
            per_treelet,
            bytes_sent: 0,
            bytes_received: 0,
            diagnostics: false,
        };
        self.finished_paths = 0;
        self.aggregate = RayCounters::default();
        msg
    }

    /// Fold a snapshot from a worker into this aggregate. Queue depths are
    /// replaced (they are instantaneous); counters accumulate.
    pub fn merge_msg(&mut self, msg: &WorkerStatsMsg) {
        self.finished_paths += msg.finished_paths;
        self.aggregate.merge(&msg.aggregate);
        self.queue = msg.queue;
        for (treelet, counters) in &msg.per_treelet {
            self.per_treelet.entry(*treelet).or_default().merge(counters);
        }
    }
}

/// Exponentially weighted moving average over a stream of counted events,
/// yielding a rate in events per second.
///
/// `update` takes an explicit timestamp so callers (and tests) control the
/// clock. Each update is O(1).
#[derive(Debug, Clone)]
pub struct RateEstimator {
    rate: f64,
    last: Option<Instant>,
    tau: f64,
}

impl RateEstimator {
    /// Estimator with the given decay time constant in seconds.
    #[must_use]
    pub fn new(tau_seconds: f64) -> Self {
        Self { rate: 0.0, last: None, tau: tau_seconds }
    }

    /// Feed `count` events observed at `now`.
    pub fn update(&mut self, count: f64, now: Instant) {
        match self.last {
            None => {
                self.last = Some(now);
                // No interval yet; seed the estimate from the decay window.
                self.rate = count / self.tau;
            }
            Some(last) => {
                let dt = now.duration_since(last).as_secs_f64().max(1e-6);
                let alpha = 1.0 - (-dt / self.tau).exp();
                let instantaneous = count / dt;
                self.rate += alpha * (instantaneous - self.rate);
                self.last = Some(now);
            }
        }
    }

    /// Current smoothed rate in events per second.
    #[must_use]
    pub fn rate(&self) -> f64 {
        self.rate
    }
}

impl Default for RateEstimator {
    fn default() -> Self {
        Self::new(2.0)
    }
}

/// Tracks how hard each treelet is being demanded, per worker, with O(1)
/// queries for per-worker, per-treelet and net totals.
#[derive(Debug, Default)]
pub struct DemandTracker {
    estimators: HashMap<(WorkerId, TreeletId), RateEstimator>,
    by_worker: HashMap<WorkerId, f64>,
    by_treelet: HashMap<TreeletId, f64>,
    total: f64,
}

impl DemandTracker {
    /// New empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one stats snapshot from `worker`, observed at `now`.
    pub fn submit(&mut self, worker: WorkerId, msg: &WorkerStatsMsg, now: Instant) {
        for (treelet, counters) in &msg.per_treelet {
            let estimator = self
                .estimators
                .entry((worker, *treelet))
                .or_default();
            let old = estimator.rate();
            estimator.update(counters.demanded as f64, now);
            let change = estimator.rate() - old;
            self.total += change;
            *self.by_worker.entry(worker).or_default() += change;
            *self.by_treelet.entry(*treelet).or_default() += change;
        }
    }

    /// Demand from one worker for one treelet, rays per second.
    #[must_use]
    pub fn worker_treelet_demand(&self, worker: WorkerId, treelet: TreeletId) -> f64 {
        self.estimators
            .get(&(worker, treelet))
            .map_or(0.0, RateEstimator::rate)
    }

    /// Demand originating at one worker.
    #[must_use]
    pub fn worker_demand(&self, worker: WorkerId) -> f64 {
        self.by_worker.get(&worker).copied().unwrap_or(0.0)
    }

    /// Demand for one treelet across all workers.
    #[must_use]
    pub fn treelet_demand(&self, treelet: TreeletId) -> f64 {
        self.by_treelet.get(&treelet).copied().unwrap_or(0.0)
    }

    /// Total demand across the whole job.
    #[must_use]
    pub fn net_demand(&self) -> f64 {
        self.total
    }
}
