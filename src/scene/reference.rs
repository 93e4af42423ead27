// CLASSIFICATION: COMMUNITY
// Filename: reference.rs v0.4
// Author: Lukas Bower
// Date Modified: 2026-03-26

//! In-process reference integrator.
//!
//! Renders a scene in one process using the very same trace batch the
//! distributed workers run, with every treelet resident and every routed
//! ray re-entering the local queue. A distributed run over the same scene
//! must reproduce this film exactly at integer pixel positions.

use std::collections::VecDeque;

use crate::film::Film;
use crate::scene::generate_camera_rays;
use crate::scene::manifest::SceneSetup;
use crate::scene::shade::ShadeArena;
use crate::stats::WorkerStats;
use crate::worker::tracing::trace_ray_batch;

/// Render `setup` to a film in this process.
#[must_use]
pub fn render(setup: &SceneSetup) -> Film {
    render_counting_paths(setup).0
}

/// Render and also report how many paths finished; used to validate sample
/// accounting.
#[must_use]
pub fn render_counting_paths(setup: &SceneSetup) -> (Film, u64) {
    let ctx = setup.context_with_all_treelets();
    let mut film = Film::new(ctx.camera.sample_bounds());

    let mut fresh = Vec::new();
    generate_camera_rays(&ctx, ctx.camera.sample_bounds(), &mut fresh);
    let mut queue: VecDeque<_> = fresh.into_iter().collect();

    let mut arena = ShadeArena::new();
    let mut stats = WorkerStats::default();
    let mut finished = VecDeque::new();
    let mut paths = 0u64;

    while !queue.is_empty() {
        let routed = trace_ray_batch(&ctx, &mut queue, &mut arena, &mut stats, &mut finished);
        // Everything is resident here, so every routed ray goes back on the
        // local queue.
        queue.extend(routed);
        paths += stats.finished_paths;
        stats.finished_paths = 0;
        for sample in finished.drain(..) {
            film.add_sample(sample.p_film, sample.l, sample.weight);
        }
    }
    (film, paths)
}
