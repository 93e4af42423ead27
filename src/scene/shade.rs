// CLASSIFICATION: COMMUNITY
// Filename: shade.rs v0.5
// Author: Lukas Bower
// Date Modified: 2026-03-08

//! The shading kernel.
//!
//! Given a ray whose traversal has drained with a recorded hit, produce up
//! to two new rays: a cosine-sampled scatter ray continuing the path and a
//! shadow ray probing one light. Returns whether the path terminated here,
//! which happens when no scatter ray is produced.

use glam::Vec3;

use swarm_model::{Ray, RayState, Rgb};

use crate::scene::sampler::{dim_bsdf, dim_light};
use crate::scene::treelet::{Sphere, T_MIN};
use crate::scene::SceneContext;

/// Reusable output buffer for shading; cleared and refilled on every call so
/// the per-ray allocations amortize away.
#[derive(Debug, Default)]
pub struct ShadeArena {
    /// New rays produced by the last shading call.
    pub rays: Vec<RayState>,
}

impl ShadeArena {
    /// Empty arena.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn orthonormal_basis(n: Vec3) -> (Vec3, Vec3) {
    let sign = 1.0f32.copysign(n.z);
    let a = -1.0 / (sign + n.z);
    let b = n.x * n.y * a;
    (
        Vec3::new(1.0 + sign * n.x * n.x * a, sign * b, -sign * n.x),
        Vec3::new(b, sign + n.y * n.y * a, -n.y),
    )
}

fn cosine_sample_hemisphere(n: Vec3, u: glam::Vec2) -> Vec3 {
    let r = u.x.sqrt();
    let phi = std::f32::consts::TAU * u.y;
    let (t, b) = orthonormal_basis(n);
    let z = (1.0 - u.x).max(0.0).sqrt();
    (t * (r * phi.cos()) + b * (r * phi.sin()) + n * z).normalize()
}

struct SurfaceHit {
    point: Vec3,
    normal: Vec3,
    albedo: Rgb,
}

fn resolve_hit(ray: &RayState, sphere: &Sphere) -> SurfaceHit {
    // Re-intersect the recorded primitive with an unbounded extent; the
    // shipped t_max already equals the hit distance, but recomputing keeps
    // the hit independent of float drift in transit.
    let mut probe = ray.ray;
    probe.t_max = f32::INFINITY;
    let t = sphere.intersect(&probe, f32::INFINITY).unwrap_or(ray.ray.t_max);
    let point = probe.at(t);
    let normal = ((point - sphere.center) / sphere.radius).normalize();
    SurfaceHit { point, normal, albedo: sphere.albedo }
}

/// Shade `ray` at its recorded hit, pushing new rays into `arena.rays`.
/// Returns `true` when the path finished at this vertex.
///
/// # Panics
/// Panics if the ray has no hit or the hit treelet is not resident; the
/// router only queues shading work locally.
pub fn shade_into(ray: &RayState, ctx: &SceneContext, arena: &mut ShadeArena) -> bool {
    arena.rays.clear();
    let hit = ray.hit.as_ref().expect("shade without a hit");
    let treelet = ctx
        .store
        .get(hit.treelet)
        .expect("shade on a non-resident treelet");
    let sphere = &treelet.spheres[hit.node as usize];
    let surface = resolve_hit(ray, sphere);

    // Flip the shading normal toward the incoming ray.
    let wo = -ray.ray.direction.normalize();
    let normal = if surface.normal.dot(wo) < 0.0 { -surface.normal } else { surface.normal };

    let mut path_finished = true;
    if ray.remaining_bounces > 0 && !surface.albedo.is_black() {
        let u = ctx.sampler.get_2d(ray.sample.id, dim_bsdf(ray.bounces));
        let wi = cosine_sample_hemisphere(normal, u);
        // Cosine-weighted sampling of a Lambertian: f cos / pdf = albedo.
        let mut scatter = RayState {
            sample: ray.sample,
            ray: Ray::new(surface.point + normal * T_MIN, wi),
            beta: ray.beta * surface.albedo,
            bounces: ray.bounces + 1,
            remaining_bounces: ray.remaining_bounces - 1,
            ..RayState::default()
        };
        scatter.start_trace();
        arena.rays.push(scatter);
        path_finished = false;
    }

    if !ctx.lights.is_empty() {
        let n_lights = ctx.lights.len();
        let u = ctx.sampler.get_1d(ray.sample.id, dim_light(ray.bounces));
        let index = ((u * n_lights as f32) as usize).min(n_lights - 1);
        let light = &ctx.lights[index];
        let light_select_pdf = 1.0 / n_lights as f32;

        let to_light = light.position - surface.point;
        let dist2 = to_light.dot(to_light);
        let cos_theta = to_light.normalize().dot(normal);
        if dist2 > 0.0 && cos_theta > 0.0 {
            let f = surface.albedo * (cos_theta / std::f32::consts::PI);
            let li = light.intensity / dist2;
            let ld = (f * li) / light_select_pdf;
            if !ld.is_black() {
                let mut shadow_ray = Ray::new(surface.point + normal * T_MIN, to_light);
                shadow_ray.t_max = 1.0 - 1e-2;
                let mut shadow = RayState {
                    sample: ray.sample,
                    ray: shadow_ray,
                    beta: ray.beta,
                    ld,
                    bounces: ray.bounces,
                    remaining_bounces: ray.remaining_bounces,
                    is_shadow_ray: true,
                    ..RayState::default()
                };
                shadow.start_trace();
                arena.rays.push(shadow);
            }
        }
    }

    path_finished
}
