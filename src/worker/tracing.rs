// CLASSIFICATION: COMMUNITY
// Filename: tracing.rs v0.5
// Author: Lukas Bower
// Date Modified: 2026-03-26

//! The bounded local tracing step shared by the worker event loop and the
//! reference integrator.

use std::collections::VecDeque;

use swarm_model::{RayState, Rgb};
use swarm_wire::FinishedRay;

use crate::scene::shade::{shade_into, ShadeArena};
use crate::scene::treelet::trace_step;
use crate::scene::SceneContext;
use crate::stats::WorkerStats;

/// Per-iteration ray budget; keeps the other event sources responsive.
pub const MAX_TRACE_BATCH: usize = 20_000;

/// Radiance a finished ray contributes to its sample.
#[must_use]
pub fn finished_radiance(ray: &RayState) -> Rgb {
    if ray.is_shadow_ray && ray.hit.is_none() {
        ray.beta * ray.ld
    } else {
        Rgb::ZERO
    }
}

fn finish(ray: &RayState, finished: &mut VecDeque<FinishedRay>) {
    finished.push_back(FinishedRay {
        p_film: ray.sample.p_film,
        l: finished_radiance(ray),
        weight: ray.sample.weight,
    });
}

/// Pop and process up to [`MAX_TRACE_BATCH`] rays from `queue`.
///
/// Rays mid-traversal advance one step and are classified: shadow rays
/// finish on any hit or on stack drain, ordinary rays finish on a
/// background miss, and everything else is returned for routing. Rays whose
/// traversal drained with a hit are shaded, and their offspring are
/// likewise returned for routing.
pub fn trace_ray_batch(
    ctx: &SceneContext,
    queue: &mut VecDeque<RayState>,
    arena: &mut ShadeArena,
    stats: &mut WorkerStats,
    finished: &mut VecDeque<FinishedRay>,
) -> Vec<RayState> {
    let mut routed = Vec::new();

    for _ in 0..MAX_TRACE_BATCH {
        let Some(mut ray) = queue.pop_front() else { break };
        stats.record_processed_ray(ray.current_treelet());

        if !ray.to_visit.is_empty() {
            trace_step(&mut ray, &ctx.store);
            let hit = ray.hit.is_some();
            let drained = ray.to_visit.is_empty();

            if ray.is_shadow_ray {
                if hit || drained {
                    finish(&ray, finished);
                } else {
                    routed.push(ray);
                }
            } else if !drained || hit {
                routed.push(ray);
            } else {
                // Background miss ends the path with no contribution.
                stats.record_finished_path();
                finish(&ray, finished);
            }
        } else if ray.hit.is_some() {
            let path_finished = shade_into(&ray, ctx, arena);
            if path_finished {
                stats.record_finished_path();
            }
            routed.append(&mut arena.rays);
        } else {
            unreachable!("inactive ray in the local queue");
        }
    }

    routed
}

#[cfg(test)]
mod tests {
    use glam::IVec2;

    use swarm_model::ROOT_TREELET;

    use crate::scene::manifest::demo_scene;
    use crate::scene::generate_camera_rays;

    use super::*;

    fn run_to_completion(
        ctx: &SceneContext,
        mut queue: VecDeque<RayState>,
    ) -> (VecDeque<FinishedRay>, WorkerStats) {
        let mut arena = ShadeArena::new();
        let mut stats = WorkerStats::default();
        let mut finished = VecDeque::new();
        while !queue.is_empty() {
            let routed = trace_ray_batch(ctx, &mut queue, &mut arena, &mut stats, &mut finished);
            queue.extend(routed);
        }
        (finished, stats)
    }

    #[test]
    fn shadow_ray_semantics_hold() {
        // A shadow ray that drains without a hit contributes beta * Ld.
        let mut clear = RayState::default();
        clear.sample.weight = 1.0;
        clear.beta = Rgb::splat(0.5);
        clear.ld = Rgb::new(2.0, 4.0, 8.0);
        clear.is_shadow_ray = true;
        clear.ray.origin = glam::Vec3::new(0.0, 200.0, 0.0);
        clear.ray.direction = glam::Vec3::Y;
        clear.start_trace();

        let setup = demo_scene(IVec2::new(2, 2), 1, 1);
        let ctx = setup.context_with_all_treelets();
        let (finished, _) = run_to_completion(&ctx, VecDeque::from([clear]));
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].l, Rgb::new(1.0, 2.0, 4.0));

        // The same ray aimed through the geometry contributes zero.
        let mut blocked = RayState::default();
        blocked.sample.weight = 1.0;
        blocked.beta = Rgb::splat(0.5);
        blocked.ld = Rgb::new(2.0, 4.0, 8.0);
        blocked.is_shadow_ray = true;
        blocked.ray.origin = glam::Vec3::new(0.0, 0.0, 4.0);
        blocked.ray.direction = glam::Vec3::new(0.0, 0.0, -80.0);
        blocked.start_trace();

        let (finished, _) = run_to_completion(&ctx, VecDeque::from([blocked]));
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].l, Rgb::ZERO);
    }

    #[test]
    fn background_miss_finishes_with_zero() {
        let setup = demo_scene(IVec2::new(2, 2), 1, 1);
        let ctx = setup.context_with_all_treelets();

        let mut ray = RayState::default();
        ray.sample.weight = 1.0;
        ray.remaining_bounces = 5;
        ray.ray.origin = glam::Vec3::new(0.0, 300.0, 0.0);
        ray.ray.direction = glam::Vec3::Y;
        ray.start_trace();

        let (finished, stats) = run_to_completion(&ctx, VecDeque::from([ray]));
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].l, Rgb::ZERO);
        assert_eq!(stats.finished_paths, 1);
    }

    #[test]
    fn batch_budget_is_respected() {
        let setup = demo_scene(IVec2::new(2, 2), 1, 1);
        let ctx = setup.context_with_all_treelets();

        let mut queue = VecDeque::new();
        for _ in 0..(MAX_TRACE_BATCH + 50) {
            let mut ray = RayState::default();
            ray.sample.weight = 1.0;
            ray.ray.origin = glam::Vec3::new(0.0, 300.0, 0.0);
            ray.ray.direction = glam::Vec3::Y;
            ray.start_trace();
            queue.push_back(ray);
        }
        let mut arena = ShadeArena::new();
        let mut stats = WorkerStats::default();
        let mut finished = VecDeque::new();
        trace_ray_batch(&ctx, &mut queue, &mut arena, &mut stats, &mut finished);
        assert_eq!(queue.len(), 50);
        assert_eq!(stats.aggregate.processed, MAX_TRACE_BATCH as u64);
    }

    #[test]
    fn camera_rays_of_a_full_scene_all_terminate() {
        let setup = demo_scene(IVec2::new(4, 4), 3, 1);
        let ctx = setup.context_with_all_treelets();
        let mut fresh = Vec::new();
        generate_camera_rays(&ctx, ctx.camera.sample_bounds(), &mut fresh);
        let (_, stats) = run_to_completion(&ctx, fresh.into_iter().collect());
        assert_eq!(stats.finished_paths, 16);
        assert!(stats.per_treelet.contains_key(&ROOT_TREELET));
    }
}
