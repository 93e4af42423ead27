// CLASSIFICATION: COMMUNITY
// Filename: treelet.rs v0.6
// Author: Lukas Bower
// Date Modified: 2026-03-08

//! Treelet geometry and the one-step intersection kernel.
//!
//! A treelet is a self-contained subtree of the acceleration structure. The
//! root treelet additionally indexes the leaf treelets by bounding box, so
//! tracing the root pushes the leaf visits a ray must make. The kernel's
//! contract is a single step: pop one entry from the ray's `to_visit`
//! stack, intersect the resident geometry, and push any further sub-trees
//! to visit.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use swarm_model::{Ray, RayState, Rgb, TreeletId, TreeletRef};

/// Minimum parametric distance; avoids self-intersection at spawn points.
pub const T_MIN: f32 = 1e-3;

/// A sphere primitive with a Lambertian surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sphere {
    /// Center position.
    pub center: Vec3,
    /// Radius.
    pub radius: f32,
    /// Lambertian albedo.
    pub albedo: Rgb,
}

impl Sphere {
    /// Nearest intersection in `(T_MIN, t_max)`, if any.
    #[must_use]
    pub fn intersect(&self, ray: &Ray, t_max: f32) -> Option<f32> {
        let oc = ray.origin - self.center;
        let a = ray.direction.dot(ray.direction);
        let half_b = oc.dot(ray.direction);
        let c = oc.dot(oc) - self.radius * self.radius;
        let disc = half_b * half_b - a * c;
        if disc < 0.0 {
            return None;
        }
        let sqrt_disc = disc.sqrt();
        for t in [(-half_b - sqrt_disc) / a, (-half_b + sqrt_disc) / a] {
            if t > T_MIN && t < t_max {
                return Some(t);
            }
        }
        None
    }
}

/// Routing entry held by the root treelet: a leaf treelet and its bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChildRef {
    /// Leaf treelet id.
    pub treelet: TreeletId,
    /// Lower corner of the leaf's bounding box.
    pub bounds_min: Vec3,
    /// Upper corner of the leaf's bounding box.
    pub bounds_max: Vec3,
}

impl ChildRef {
    /// Parametric entry distance of `ray` into the box within
    /// `[0, t_max]`, or `None` when the box is missed entirely.
    #[must_use]
    pub fn entry_distance(&self, ray: &Ray, t_max: f32) -> Option<f32> {
        let mut t0 = 0.0f32;
        let mut t1 = t_max;
        for axis in 0..3 {
            let origin = ray.origin[axis];
            let dir = ray.direction[axis];
            let (lo, hi) = (self.bounds_min[axis], self.bounds_max[axis]);
            if dir.abs() < 1e-12 {
                if origin < lo || origin > hi {
                    return None;
                }
                continue;
            }
            let inv = 1.0 / dir;
            let (mut near, mut far) = ((lo - origin) * inv, (hi - origin) * inv);
            if near > far {
                std::mem::swap(&mut near, &mut far);
            }
            t0 = t0.max(near);
            t1 = t1.min(far);
            if t0 > t1 {
                return None;
            }
        }
        Some(t0)
    }
}

/// One stored treelet, object `T_<id>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Treelet {
    /// This treelet's id.
    pub id: TreeletId,
    /// Geometry local to this treelet.
    pub spheres: Vec<Sphere>,
    /// Leaf routing table; populated only on the root.
    #[serde(default)]
    pub children: Vec<ChildRef>,
}

/// The treelets resident at one worker.
#[derive(Debug, Default)]
pub struct TreeletStore {
    treelets: std::collections::HashMap<TreeletId, Treelet>,
}

impl TreeletStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a treelet resident.
    pub fn insert(&mut self, treelet: Treelet) {
        self.treelets.insert(treelet.id, treelet);
    }

    /// Whether `id` is resident.
    #[must_use]
    pub fn contains(&self, id: TreeletId) -> bool {
        self.treelets.contains_key(&id)
    }

    /// Fetch a resident treelet.
    #[must_use]
    pub fn get(&self, id: TreeletId) -> Option<&Treelet> {
        self.treelets.get(&id)
    }

    /// Ids of all resident treelets, sorted.
    #[must_use]
    pub fn resident_ids(&self) -> Vec<TreeletId> {
        let mut ids: Vec<TreeletId> = self.treelets.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

/// Advance `ray` by one traversal step against the resident treelets.
///
/// Pops the top of `to_visit` (which the router guarantees is resident),
/// intersects that treelet's geometry, shrinking `t_max` and recording
/// `hit` on success, and pushes any leaf treelets the ray may still enter,
/// nearest on top.
///
/// # Panics
/// Panics if the stack is empty or the top treelet is not resident; both
/// indicate a routing bug.
pub fn trace_step(ray: &mut RayState, store: &TreeletStore) {
    let visit = ray.to_visit.pop().expect("trace_step on a drained ray");
    let treelet = store
        .get(visit.treelet)
        .expect("trace_step on a non-resident treelet");

    for (index, sphere) in treelet.spheres.iter().enumerate() {
        if let Some(t) = sphere.intersect(&ray.ray, ray.ray.t_max) {
            ray.ray.t_max = t;
            ray.hit = Some(TreeletRef::new(treelet.id, index as u32));
        }
    }

    if !treelet.children.is_empty() {
        let mut entries: Vec<(f32, &ChildRef)> = treelet
            .children
            .iter()
            .filter_map(|c| c.entry_distance(&ray.ray, ray.ray.t_max).map(|t| (t, c)))
            .collect();
        // Farthest first, so the nearest leaf ends on top of the stack.
        entries.sort_by(|a, b| b.0.total_cmp(&a.0));
        for (_, child) in entries {
            ray.to_visit.push(TreeletRef::new(child.treelet, 0));
        }
    }
}

#[cfg(test)]
mod tests {
    use swarm_model::ROOT_TREELET;

    use super::*;

    fn unit_sphere_at(z: f32) -> Sphere {
        Sphere { center: Vec3::new(0.0, 0.0, z), radius: 1.0, albedo: Rgb::splat(0.5) }
    }

    #[test]
    fn sphere_intersection_picks_near_root() {
        let s = unit_sphere_at(-5.0);
        let ray = Ray::new(Vec3::ZERO, Vec3::new(0.0, 0.0, -1.0));
        let t = s.intersect(&ray, f32::INFINITY).unwrap();
        assert!((t - 4.0).abs() < 1e-4);
    }

    #[test]
    fn sphere_intersection_respects_t_max() {
        let s = unit_sphere_at(-5.0);
        let ray = Ray::new(Vec3::ZERO, Vec3::new(0.0, 0.0, -1.0));
        assert!(s.intersect(&ray, 3.5).is_none());
    }

    #[test]
    fn interior_origin_hits_far_side() {
        let s = unit_sphere_at(0.0);
        let ray = Ray::new(Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0));
        let t = s.intersect(&ray, f32::INFINITY).unwrap();
        assert!((t - 1.0).abs() < 1e-4);
    }

    #[test]
    fn root_trace_pushes_nearest_leaf_on_top() {
        let mut store = TreeletStore::new();
        store.insert(Treelet {
            id: ROOT_TREELET,
            spheres: vec![],
            children: vec![
                ChildRef {
                    treelet: 1,
                    bounds_min: Vec3::new(-1.0, -1.0, -12.0),
                    bounds_max: Vec3::new(1.0, 1.0, -10.0),
                },
                ChildRef {
                    treelet: 2,
                    bounds_min: Vec3::new(-1.0, -1.0, -6.0),
                    bounds_max: Vec3::new(1.0, 1.0, -4.0),
                },
            ],
        });

        let mut ray = RayState::default();
        ray.ray = Ray::new(Vec3::ZERO, Vec3::new(0.0, 0.0, -1.0));
        ray.start_trace();
        trace_step(&mut ray, &store);

        assert_eq!(ray.to_visit.len(), 2);
        assert_eq!(ray.current_treelet(), 2);
        assert_eq!(ray.to_visit[0].treelet, 1);
        assert!(ray.hit.is_none());
    }

    #[test]
    fn leaf_hit_shrinks_extent_and_prunes_farther_leaves() {
        let mut store = TreeletStore::new();
        store.insert(Treelet {
            id: ROOT_TREELET,
            spheres: vec![unit_sphere_at(-3.0)],
            children: vec![ChildRef {
                treelet: 1,
                bounds_min: Vec3::new(-1.0, -1.0, -20.0),
                bounds_max: Vec3::new(1.0, 1.0, -18.0),
            }],
        });

        let mut ray = RayState::default();
        ray.ray = Ray::new(Vec3::ZERO, Vec3::new(0.0, 0.0, -1.0));
        ray.start_trace();
        trace_step(&mut ray, &store);

        // The sphere at t = 2 occludes the leaf box past t = 18.
        let hit = ray.hit.expect("sphere hit");
        assert_eq!(hit.treelet, ROOT_TREELET);
        assert!(ray.to_visit.is_empty());
        assert!((ray.ray.t_max - 2.0).abs() < 1e-4);
    }

    #[test]
    fn missed_boxes_are_not_visited() {
        let c = ChildRef {
            treelet: 1,
            bounds_min: Vec3::new(5.0, 5.0, 5.0),
            bounds_max: Vec3::new(6.0, 6.0, 6.0),
        };
        let ray = Ray::new(Vec3::ZERO, Vec3::new(0.0, 0.0, -1.0));
        assert!(c.entry_distance(&ray, f32::INFINITY).is_none());
    }

    #[test]
    fn origin_inside_box_enters_at_zero() {
        let c = ChildRef {
            treelet: 1,
            bounds_min: Vec3::splat(-1.0),
            bounds_max: Vec3::splat(1.0),
        };
        let ray = Ray::new(Vec3::ZERO, Vec3::new(0.0, 0.0, -1.0));
        assert_eq!(c.entry_distance(&ray, f32::INFINITY), Some(0.0));
    }
}
