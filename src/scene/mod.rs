// CLASSIFICATION: COMMUNITY
// Filename: mod.rs v0.8
// Author: Lukas Bower
// Date Modified: 2026-04-02

//! Scene collaborators behind narrow contracts: the camera, the
//! deterministic sampler, the light list, treelet geometry with its one-step
//! trace, and the shading kernel. The distributed substrate only ever calls
//! [`treelet::trace_step`], [`shade::shade_into`] and
//! [`generate_camera_rays`]; everything else is implementation detail.

pub mod camera;
pub mod manifest;
pub mod reference;
pub mod sampler;
pub mod shade;
pub mod treelet;

use std::collections::HashMap;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use swarm_model::{ObjectKey, ObjectKind, RayState, Rgb};

use crate::scene::camera::Camera;
use crate::scene::sampler::{HashSampler, SamplerConfig};
use crate::scene::treelet::{Treelet, TreeletStore};

/// Global scene parameters stored under `SCENE_0`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneConfig {
    /// Maximum path depth.
    pub max_depth: u32,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self { max_depth: 5 }
    }
}

/// An isotropic point light.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointLight {
    /// World-space position.
    pub position: glam::Vec3,
    /// Radiant intensity.
    pub intensity: Rgb,
}

/// Error raised while decoding stored scene objects.
#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    /// A required object was not among the fetched set.
    #[error("scene object {0} was not fetched")]
    MissingObject(ObjectKey),
    /// A stored object failed to parse.
    #[error("scene object {key} is malformed: {source}")]
    Malformed {
        /// Key of the offending object.
        key: ObjectKey,
        /// Underlying JSON error.
        source: serde_json::Error,
    },
}

/// A worker's loaded view of the scene: the shared objects plus whichever
/// treelets were assigned to it.
pub struct SceneContext {
    /// Camera for ray generation.
    pub camera: Camera,
    /// Deterministic sample source.
    pub sampler: HashSampler,
    /// Scene lights.
    pub lights: Vec<PointLight>,
    /// Global parameters.
    pub config: SceneConfig,
    /// Resident treelets.
    pub store: TreeletStore,
}

fn parse<T: serde::de::DeserializeOwned>(
    objects: &HashMap<ObjectKey, Vec<u8>>,
    key: ObjectKey,
) -> Result<T, SceneError> {
    let bytes = objects.get(&key).ok_or(SceneError::MissingObject(key))?;
    serde_json::from_slice(bytes).map_err(|source| SceneError::Malformed { key, source })
}

impl SceneContext {
    /// Assemble a context from fetched object bytes. Treelet objects become
    /// resident; triangle meshes are embedded in treelets and never appear
    /// here.
    pub fn from_objects(objects: &HashMap<ObjectKey, Vec<u8>>) -> Result<Self, SceneError> {
        let camera: Camera = parse(objects, ObjectKey::new(ObjectKind::Camera, 0))?;
        let sampler_cfg: SamplerConfig = parse(objects, ObjectKey::new(ObjectKind::Sampler, 0))?;
        let lights: Vec<PointLight> = parse(objects, ObjectKey::new(ObjectKind::Lights, 0))?;
        let config: SceneConfig = parse(objects, ObjectKey::new(ObjectKind::Scene, 0))?;

        let mut store = TreeletStore::new();
        for (key, bytes) in objects {
            if key.kind == ObjectKind::Treelet {
                let treelet: Treelet =
                    serde_json::from_slice(bytes).map_err(|source| SceneError::Malformed {
                        key: *key,
                        source,
                    })?;
                store.insert(treelet);
            }
        }

        Ok(Self {
            camera,
            sampler: HashSampler::new(sampler_cfg),
            lights,
            config,
            store,
        })
    }
}

/// Generate camera rays for every sample of every pixel inside `tile`,
/// appending them in sample-major, row-major order.
pub fn generate_camera_rays(ctx: &SceneContext, tile: swarm_model::Bounds2i, out: &mut Vec<RayState>) {
    let sample_bounds = ctx.camera.sample_bounds();
    let extent = sample_bounds.diagonal();
    let spp = ctx.sampler.samples_per_pixel();
    let ray_scale = 1.0 / (spp as f32).sqrt();

    for sample in 0..spp {
        for pixel in tile.pixels() {
            if !sample_bounds.contains(pixel) {
                continue;
            }
            let sample_id = ((pixel.x + pixel.y * extent.x) as u64) * u64::from(spp)
                + u64::from(sample);
            let jitter = ctx.sampler.get_2d(sample_id, sampler::DIM_CAMERA);
            let p_film = Vec2::new(pixel.x as f32, pixel.y as f32) + jitter;

            let mut state = RayState::default();
            state.sample.id = sample_id;
            state.sample.num = sample;
            state.sample.pixel = pixel;
            state.sample.p_film = p_film;
            state.sample.weight = 1.0;
            state.ray = ctx.camera.generate_ray(p_film);
            state.ray.scale_differentials(ray_scale);
            state.remaining_bounces = ctx.config.max_depth;
            state.start_trace();
            out.push(state);
        }
    }
}

#[cfg(test)]
mod tests {
    use glam::IVec2;

    use swarm_model::Bounds2i;

    use super::manifest::demo_scene;
    use super::*;

    #[test]
    fn camera_rays_cover_the_tile_once_per_sample() {
        let setup = demo_scene(IVec2::new(4, 4), 2, 2);
        let ctx = setup.context_with_all_treelets();
        let mut rays = Vec::new();
        generate_camera_rays(&ctx, ctx.camera.sample_bounds(), &mut rays);
        assert_eq!(rays.len(), 32);

        // Sample ids partition the grid uniquely.
        let mut ids: Vec<u64> = rays.iter().map(|r| r.sample.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 32);
    }

    #[test]
    fn tile_restriction_generates_only_inside() {
        let setup = demo_scene(IVec2::new(4, 4), 1, 1);
        let ctx = setup.context_with_all_treelets();
        let tile = Bounds2i::new(IVec2::new(0, 0), IVec2::new(2, 4));
        let mut rays = Vec::new();
        generate_camera_rays(&ctx, tile, &mut rays);
        assert_eq!(rays.len(), 8);
        assert!(rays.iter().all(|r| tile.contains(r.sample.pixel)));
    }

    #[test]
    fn fresh_rays_start_at_the_root() {
        let setup = demo_scene(IVec2::new(2, 2), 1, 1);
        let ctx = setup.context_with_all_treelets();
        let mut rays = Vec::new();
        generate_camera_rays(&ctx, ctx.camera.sample_bounds(), &mut rays);
        for ray in &rays {
            assert_eq!(ray.current_treelet(), swarm_model::ROOT_TREELET);
            assert_eq!(ray.remaining_bounces, 5);
            assert!((ray.ray.direction.length() - 1.0).abs() < 1e-5);
            assert!(ray.ray.differentials.is_some());
        }
    }
}
