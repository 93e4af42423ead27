// CLASSIFICATION: COMMUNITY
// Filename: assign.rs v0.5
// Author: Lukas Bower
// Date Modified: 2026-03-22

//! Treelet placement policies.
//!
//! `Uniform` derives each worker's leaf treelet from its id; `Static` packs
//! treelets onto the fleet ahead of time against the manifest's target
//! weights and rejects any allocation that leaves a treelet unowned or a
//! worker empty.

use std::collections::BTreeMap;

use swarm_model::{TreeletId, WorkerId, ROOT_TREELET};

/// Placement policy, fixed for the run at master startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Assignment {
    /// Worker `w` holds the root and treelet `1 + ((w-1) mod (T-1))`.
    #[default]
    Uniform,
    /// Bin-packed ahead of time from manifest weights.
    Static,
}

impl std::fmt::Display for Assignment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Assignment::Uniform => write!(f, "uniform"),
            Assignment::Static => write!(f, "static"),
        }
    }
}

/// Error raised when Static packing cannot place the scene.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AssignError {
    /// After packing every worker, some treelets have no owner.
    #[error("unassigned treelets after packing {workers} workers: {treelets:?}")]
    UnassignedTreelets {
        /// Fleet size that was packed.
        workers: u32,
        /// Treelets left without an owner.
        treelets: Vec<TreeletId>,
    },
    /// A worker could not be given any treelet within its storage budget.
    #[error("worker {0} would receive no treelet")]
    EmptyWorker(WorkerId),
}

/// The leaf treelets `worker` owns under the Uniform policy, given
/// `treelet_count` treelets including the root. Workers are numbered from 1.
#[must_use]
pub fn uniform_leaf_treelets(worker: WorkerId, treelet_count: u32) -> Vec<TreeletId> {
    if treelet_count <= 1 {
        return Vec::new();
    }
    let leaves = treelet_count - 1;
    vec![1 + ((worker as u32 - 1) % leaves)]
}

/// Per-worker storage budget before treelet sizes are debited.
pub const WORKER_FREE_SPACE: u64 = 200 * 1024 * 1024;

/// Bin-packing allocator for the Static policy.
///
/// Each call to [`StaticAllocator::allocate`] grants one treelet to one
/// worker, choosing the treelet whose target weight is most under-served by
/// the allocations made so far, among those that still fit the worker's
/// remaining budget.
#[derive(Debug)]
pub struct StaticAllocator {
    weights: BTreeMap<TreeletId, f64>,
    sizes: BTreeMap<TreeletId, u64>,
    allocations: BTreeMap<TreeletId, u32>,
    fleet: u32,
}

impl StaticAllocator {
    /// Allocator over the manifest's leaf weights and total treelet sizes
    /// (treelet plus transitive dependencies), packing `fleet` workers.
    #[must_use]
    pub fn new(
        weights: impl IntoIterator<Item = (TreeletId, f64)>,
        sizes: impl IntoIterator<Item = (TreeletId, u64)>,
        fleet: u32,
    ) -> Self {
        let weights: BTreeMap<TreeletId, f64> = weights.into_iter().collect();
        let sizes = sizes.into_iter().collect();
        let allocations = weights.keys().map(|&t| (t, 0)).collect();
        Self { weights, sizes, allocations, fleet }
    }

    /// Grant one treelet to a worker with `free_space` bytes left, or
    /// `None` when nothing fits.
    pub fn allocate(&mut self, free_space: u64) -> Option<TreeletId> {
        let fleet = f64::from(self.fleet.max(1));
        let candidate = self
            .weights
            .iter()
            .filter(|(t, _)| self.sizes.get(t).copied().unwrap_or(0) <= free_space)
            .map(|(&t, &w)| {
                let served = f64::from(self.allocations[&t]) / fleet;
                (t, w - served)
            })
            // Most under-served first; ties go to the lowest id for
            // reproducibility.
            .max_by(|a, b| a.1.total_cmp(&b.1).then_with(|| b.0.cmp(&a.0)))
            .map(|(t, _)| t)?;
        *self.allocations.get_mut(&candidate).expect("candidate tracked") += 1;
        Some(candidate)
    }

    /// Treelets that never received an owner.
    #[must_use]
    pub fn unassigned(&self) -> Vec<TreeletId> {
        self.allocations
            .iter()
            .filter_map(|(&t, &n)| (n == 0).then_some(t))
            .collect()
    }

    /// Owners granted to `treelet` so far.
    #[must_use]
    pub fn allocation_count(&self, treelet: TreeletId) -> u32 {
        self.allocations.get(&treelet).copied().unwrap_or(0)
    }
}

/// Pack the whole fleet ahead of time. Returns one treelet list per worker
/// index (the root is implicit and excluded here).
pub fn load_static_assignment(
    weights: &[(TreeletId, f64)],
    total_sizes: &BTreeMap<TreeletId, u64>,
    root_size: u64,
    fleet: u32,
) -> Result<Vec<Vec<TreeletId>>, AssignError> {
    let mut allocator = StaticAllocator::new(
        weights.iter().copied(),
        total_sizes.iter().map(|(&t, &s)| (t, s)),
        fleet,
    );

    // One treelet per worker; the budget is checked net of the root and its
    // dependencies, which every worker carries.
    let free_space = WORKER_FREE_SPACE.saturating_sub(root_size);
    let mut assignments = Vec::with_capacity(fleet as usize);
    for index in 0..fleet {
        let mut mine = Vec::new();
        if let Some(treelet) = allocator.allocate(free_space) {
            mine.push(treelet);
        }
        if mine.is_empty() && !allocator.weights.is_empty() {
            return Err(AssignError::EmptyWorker(u64::from(index) + 1));
        }
        assignments.push(mine);
    }

    let unassigned = allocator.unassigned();
    if !unassigned.is_empty() {
        return Err(AssignError::UnassignedTreelets { workers: fleet, treelets: unassigned });
    }
    Ok(assignments)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_matches_the_rotation() {
        // Three treelets total: workers alternate between leaves 1 and 2.
        assert_eq!(uniform_leaf_treelets(1, 3), vec![1]);
        assert_eq!(uniform_leaf_treelets(2, 3), vec![2]);
        assert_eq!(uniform_leaf_treelets(3, 3), vec![1]);

        // Two treelets total: every worker holds leaf 1.
        assert_eq!(uniform_leaf_treelets(1, 2), vec![1]);
        assert_eq!(uniform_leaf_treelets(2, 2), vec![1]);

        // Root-only scene: no leaves to assign.
        assert!(uniform_leaf_treelets(1, 1).is_empty());
    }

    fn sizes(ids: &[TreeletId]) -> BTreeMap<TreeletId, u64> {
        ids.iter().map(|&t| (t, 1024)).collect()
    }

    #[test]
    fn static_pack_covers_every_treelet() {
        let weights = vec![(1, 0.5), (2, 0.3), (3, 0.2)];
        let assignments =
            load_static_assignment(&weights, &sizes(&[1, 2, 3]), 512, 4).unwrap();
        assert_eq!(assignments.len(), 4);

        let mut owners: BTreeMap<TreeletId, u32> = BTreeMap::new();
        for per_worker in &assignments {
            assert_eq!(per_worker.len(), 1);
            *owners.entry(per_worker[0]).or_default() += 1;
        }
        assert!(owners.keys().copied().eq([1, 2, 3]));
        // The heaviest treelet receives the surplus worker.
        assert_eq!(owners[&1], 2);
    }

    #[test]
    fn more_treelets_than_workers_is_infeasible() {
        let weights = vec![(1, 0.4), (2, 0.3), (3, 0.3)];
        let err = load_static_assignment(&weights, &sizes(&[1, 2, 3]), 512, 2).unwrap_err();
        match err {
            AssignError::UnassignedTreelets { workers, treelets } => {
                assert_eq!(workers, 2);
                assert_eq!(treelets.len(), 1);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn oversized_treelets_leave_a_worker_empty() {
        let weights = vec![(1, 1.0)];
        let mut big = BTreeMap::new();
        big.insert(1, WORKER_FREE_SPACE * 2);
        let err = load_static_assignment(&weights, &big, 0, 1).unwrap_err();
        assert_eq!(err, AssignError::EmptyWorker(1));
    }

    #[test]
    fn root_only_scene_packs_trivially() {
        let assignments = load_static_assignment(&[], &BTreeMap::new(), 512, 3).unwrap();
        assert!(assignments.iter().all(Vec::is_empty));
    }

    #[test]
    fn allocator_balances_toward_target_weights() {
        let weights = vec![(1, 0.75), (2, 0.25)];
        let mut allocator =
            StaticAllocator::new(weights, [(1, 1024u64), (2, 1024u64)], 8);
        for _ in 0..8 {
            allocator.allocate(WORKER_FREE_SPACE).unwrap();
        }
        assert_eq!(allocator.allocation_count(1), 6);
        assert_eq!(allocator.allocation_count(2), 2);
    }
}
