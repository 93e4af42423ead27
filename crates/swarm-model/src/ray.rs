// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: The movable ray record exchanged between workers.
// Author: Lukas Bower

//! [`RayState`] is the unit of work of the distributed tracer. It carries a
//! ray's traversal stack, accumulated throughput and sample identity, and is
//! transferred by value between queues, peers and the master.

use glam::{Affine3A, IVec2, Vec2};
use serde::{Deserialize, Serialize};

use crate::geom::{Ray, Rgb};
use crate::ids::{SampleId, TreeletId};
use crate::ROOT_TREELET;

/// Identity of the camera sample a ray contributes to.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SampleInfo {
    /// Job-wide unique sample id.
    pub id: SampleId,
    /// Index of the sample within its pixel.
    pub num: u32,
    /// Integer pixel coordinates.
    pub pixel: IVec2,
    /// Continuous film position.
    pub p_film: Vec2,
    /// Camera sample weight.
    pub weight: f32,
}

/// A position inside a treelet's traversal: the treelet, a node index within
/// it, and an optional instance transform into the node's object space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TreeletRef {
    /// Treelet being visited.
    pub treelet: TreeletId,
    /// Node index within the treelet.
    pub node: u32,
    /// Instance transform, when the node is an instanced subtree.
    pub transform: Option<Affine3A>,
}

impl TreeletRef {
    /// Reference to `node` of `treelet` with no instance transform.
    #[must_use]
    pub fn new(treelet: TreeletId, node: u32) -> Self {
        Self { treelet, node, transform: None }
    }
}

/// The state of one ray in flight.
///
/// A ray is active iff `to_visit` is non-empty, or `to_visit` is empty with
/// `hit` present and shading still owed. It lives in exactly one container at
/// any instant and moves by value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RayState {
    /// Sample identity.
    pub sample: SampleInfo,
    /// Current ray.
    pub ray: Ray,
    /// Stack of treelet nodes left to inspect; the top is visited next.
    pub to_visit: Vec<TreeletRef>,
    /// Nearest intersection found so far.
    pub hit: Option<TreeletRef>,
    /// Path throughput.
    pub beta: Rgb,
    /// Direct-lighting contribution carried by a shadow ray.
    pub ld: Rgb,
    /// Bounces taken so far.
    pub bounces: u32,
    /// Bounces still allowed; 0 suppresses the next scatter.
    pub remaining_bounces: u32,
    /// Whether this is an occlusion probe toward a light.
    pub is_shadow_ray: bool,
}

impl Default for RayState {
    fn default() -> Self {
        Self {
            sample: SampleInfo::default(),
            ray: Ray::default(),
            to_visit: Vec::new(),
            hit: None,
            beta: Rgb::ONE,
            ld: Rgb::ZERO,
            bounces: 0,
            remaining_bounces: 0,
            is_shadow_ray: false,
        }
    }
}

impl RayState {
    /// Reset traversal to the root treelet, discarding any previous hit.
    pub fn start_trace(&mut self) {
        self.hit = None;
        self.to_visit.clear();
        self.to_visit.push(TreeletRef::new(ROOT_TREELET, 0));
    }

    /// The treelet this ray needs next: the top of `to_visit`, or the hit
    /// treelet once traversal has drained.
    ///
    /// # Panics
    /// Panics if the ray is inactive (empty stack and no hit); such a ray
    /// must never be queued.
    #[must_use]
    pub fn current_treelet(&self) -> TreeletId {
        self.to_visit
            .last()
            .map(|r| r.treelet)
            .or_else(|| self.hit.as_ref().map(|h| h.treelet))
            .expect("inactive ray has no current treelet")
    }

    /// Whether the ray still carries work.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.to_visit.is_empty() || self.hit.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_trace_targets_root() {
        let mut ray = RayState::default();
        ray.hit = Some(TreeletRef::new(4, 2));
        ray.start_trace();
        assert_eq!(ray.current_treelet(), ROOT_TREELET);
        assert!(ray.hit.is_none());
    }

    #[test]
    fn current_treelet_prefers_stack_top() {
        let mut ray = RayState::default();
        ray.to_visit.push(TreeletRef::new(1, 0));
        ray.to_visit.push(TreeletRef::new(3, 5));
        ray.hit = Some(TreeletRef::new(2, 0));
        assert_eq!(ray.current_treelet(), 3);

        ray.to_visit.clear();
        assert_eq!(ray.current_treelet(), 2);
    }

    #[test]
    #[should_panic(expected = "inactive ray")]
    fn inactive_ray_panics() {
        RayState::default().current_treelet();
    }
}
