// CLASSIFICATION: COMMUNITY
// Filename: manifest.rs v0.6
// Author: Lukas Bower
// Date Modified: 2026-03-19

//! The scene manifest and scene packing.
//!
//! The manifest (object `MANIFEST_0`) lists every stored object with its
//! byte size, the dependency edges between objects, and the target demand
//! weights the Static assignment policy packs against. [`SceneSetup`] packs
//! a scene into a storage backend; [`demo_scene`] builds the small sphere
//! scene the tests and examples render.

use glam::{IVec2, Vec3};
use serde::{Deserialize, Serialize};

use swarm_model::{ObjectKey, ObjectKind, Rgb, TreeletId, ROOT_TREELET};

use crate::scene::camera::Camera;
use crate::scene::sampler::SamplerConfig;
use crate::scene::treelet::{ChildRef, Sphere, Treelet};
use crate::scene::{PointLight, SceneConfig, SceneContext};
use crate::storage::{StorageBackend, StorageError};

/// One stored object and its size on disk.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Object key.
    pub key: ObjectKey,
    /// Serialized size in bytes.
    pub size: u64,
}

/// The scene manifest.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    /// Every stored object.
    pub objects: Vec<ManifestEntry>,
    /// Dependency edges: an object and the objects it requires.
    pub dependencies: Vec<(ObjectKey, Vec<ObjectKey>)>,
    /// Target demand weight per leaf treelet, from scene profiling.
    pub treelet_weights: Vec<(TreeletId, f64)>,
}

/// A scene ready to be packed into object storage.
#[derive(Debug, Clone)]
pub struct SceneSetup {
    /// Camera object.
    pub camera: Camera,
    /// Sampler object.
    pub sampler: SamplerConfig,
    /// Light list object.
    pub lights: Vec<PointLight>,
    /// Global parameters object.
    pub config: SceneConfig,
    /// All treelets, root first.
    pub treelets: Vec<Treelet>,
    /// Auxiliary objects (materials, textures) stored verbatim.
    pub extras: Vec<(ObjectKey, Vec<u8>)>,
    /// Dependency edges to record in the manifest.
    pub dependencies: Vec<(ObjectKey, Vec<ObjectKey>)>,
    /// Target weights for Static assignment.
    pub treelet_weights: Vec<(TreeletId, f64)>,
}

/// Error raised while packing a scene.
#[derive(Debug, thiserror::Error)]
pub enum PackError {
    /// Serialization failed.
    #[error("serialize {key}: {source}")]
    Serialize {
        /// Offending object.
        key: ObjectKey,
        /// Underlying error.
        source: serde_json::Error,
    },
    /// Storage failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

fn put_json<T: Serialize>(
    backend: &dyn StorageBackend,
    manifest: &mut Manifest,
    key: ObjectKey,
    value: &T,
) -> Result<(), PackError> {
    let bytes =
        serde_json::to_vec_pretty(value).map_err(|source| PackError::Serialize { key, source })?;
    backend.put(&key.storage_key(), &bytes)?;
    manifest.objects.push(ManifestEntry { key, size: bytes.len() as u64 });
    Ok(())
}

impl SceneSetup {
    /// Serialize every object into `backend` and write the manifest.
    pub fn store(&self, backend: &dyn StorageBackend) -> Result<Manifest, PackError> {
        let mut manifest = Manifest {
            dependencies: self.dependencies.clone(),
            treelet_weights: self.treelet_weights.clone(),
            ..Manifest::default()
        };

        put_json(backend, &mut manifest, ObjectKey::new(ObjectKind::Scene, 0), &self.config)?;
        put_json(backend, &mut manifest, ObjectKey::new(ObjectKind::Camera, 0), &self.camera)?;
        put_json(backend, &mut manifest, ObjectKey::new(ObjectKind::Sampler, 0), &self.sampler)?;
        put_json(backend, &mut manifest, ObjectKey::new(ObjectKind::Lights, 0), &self.lights)?;
        for treelet in &self.treelets {
            put_json(backend, &mut manifest, ObjectKey::treelet(treelet.id), treelet)?;
        }
        for (key, bytes) in &self.extras {
            backend.put(&key.storage_key(), bytes)?;
            manifest.objects.push(ManifestEntry { key: *key, size: bytes.len() as u64 });
        }

        let manifest_key = ObjectKey::new(ObjectKind::Manifest, 0);
        let bytes = serde_json::to_vec_pretty(&manifest)
            .map_err(|source| PackError::Serialize { key: manifest_key, source })?;
        backend.put(&manifest_key.storage_key(), &bytes)?;
        Ok(manifest)
    }

    /// Build a context holding every treelet, as a fully-assigned worker
    /// (or the reference integrator) would see the scene.
    #[must_use]
    pub fn context_with_all_treelets(&self) -> SceneContext {
        let mut store = crate::scene::treelet::TreeletStore::new();
        for treelet in &self.treelets {
            store.insert(treelet.clone());
        }
        SceneContext {
            camera: self.camera.clone(),
            sampler: crate::scene::sampler::HashSampler::new(self.sampler),
            lights: self.lights.clone(),
            config: self.config.clone(),
            store,
        }
    }
}

/// The sphere scene used by tests and demos: a floor sphere in the root
/// treelet and one unit sphere per leaf treelet, lit by a single point
/// light. With `treelet_count == 1` everything lives in the root.
#[must_use]
pub fn demo_scene(resolution: IVec2, treelet_count: u32, samples_per_pixel: u32) -> SceneSetup {
    assert!(treelet_count >= 1, "a scene has at least the root treelet");

    let camera = Camera {
        position: Vec3::new(0.0, 0.5, 4.0),
        look_at: Vec3::new(0.0, 0.0, -3.0),
        up: Vec3::Y,
        vfov_degrees: 55.0,
        resolution,
    };
    let lights = vec![PointLight {
        position: Vec3::new(3.0, 6.0, 2.0),
        intensity: Rgb::new(320.0, 300.0, 280.0),
    }];

    let floor = Sphere {
        center: Vec3::new(0.0, -101.0, -3.0),
        radius: 100.0,
        albedo: Rgb::new(0.55, 0.55, 0.5),
    };

    let leaf_count = treelet_count - 1;
    let leaf_sphere = |k: u32| Sphere {
        center: Vec3::new(
            2.5 * k as f32 - 1.25 * leaf_count.saturating_sub(1) as f32,
            0.0,
            -3.0,
        ),
        radius: 1.0,
        albedo: Rgb::new(
            0.2 + 0.6 * (k as f32 / leaf_count.max(1) as f32),
            0.4,
            0.8 - 0.5 * (k as f32 / leaf_count.max(1) as f32),
        ),
    };

    let mut treelets = Vec::new();
    let mut root = Treelet { id: ROOT_TREELET, spheres: vec![floor], children: vec![] };
    if leaf_count == 0 {
        root.spheres.push(Sphere {
            center: Vec3::new(0.0, 0.0, -3.0),
            radius: 1.0,
            albedo: Rgb::new(0.7, 0.3, 0.3),
        });
    } else {
        for k in 0..leaf_count {
            let sphere = leaf_sphere(k);
            let id = k + 1;
            root.children.push(ChildRef {
                treelet: id,
                bounds_min: sphere.center - Vec3::splat(sphere.radius),
                bounds_max: sphere.center + Vec3::splat(sphere.radius),
            });
            treelets.push(Treelet { id, spheres: vec![sphere], children: vec![] });
        }
    }
    treelets.insert(0, root);

    // Leaf treelets share one material object so assignment exercises the
    // dependency graph.
    let material = ObjectKey::new(ObjectKind::Material, 0);
    let dependencies = treelets
        .iter()
        .filter(|t| t.id != ROOT_TREELET)
        .map(|t| (ObjectKey::treelet(t.id), vec![material]))
        .collect::<Vec<_>>();
    let extras = if dependencies.is_empty() {
        Vec::new()
    } else {
        vec![(material, br#"{"model":"lambert"}"#.to_vec())]
    };

    SceneSetup {
        camera,
        sampler: SamplerConfig { samples_per_pixel, seed: 0x5eed },
        lights,
        config: SceneConfig::default(),
        treelets,
        extras,
        dependencies,
        treelet_weights: (1..treelet_count)
            .map(|t| (t, 1.0 / f64::from(leaf_count.max(1))))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::MemBackend;

    use super::*;

    #[test]
    fn manifest_lists_every_stored_object() {
        let backend = MemBackend::new();
        let setup = demo_scene(IVec2::new(8, 8), 3, 2);
        let manifest = setup.store(&backend).unwrap();

        // Scene, camera, sampler, lights, three treelets, one material.
        assert_eq!(manifest.objects.len(), 8);
        for entry in &manifest.objects {
            let bytes = backend.get(&entry.key.storage_key()).unwrap();
            assert_eq!(bytes.len() as u64, entry.size);
        }
        let stored: Manifest =
            serde_json::from_slice(&backend.get("MANIFEST_0").unwrap()).unwrap();
        assert_eq!(stored.objects.len(), manifest.objects.len());
        assert_eq!(stored.treelet_weights.len(), 2);
    }

    #[test]
    fn dependencies_point_at_stored_objects() {
        let setup = demo_scene(IVec2::new(8, 8), 3, 1);
        let backend = MemBackend::new();
        let manifest = setup.store(&backend).unwrap();
        for (_, deps) in &manifest.dependencies {
            for dep in deps {
                assert!(
                    manifest.objects.iter().any(|e| e.key == *dep),
                    "dangling dependency {dep}"
                );
            }
        }
    }

    #[test]
    fn single_treelet_scene_has_no_children() {
        let setup = demo_scene(IVec2::new(4, 4), 1, 1);
        assert_eq!(setup.treelets.len(), 1);
        assert!(setup.treelets[0].children.is_empty());
        assert_eq!(setup.treelets[0].spheres.len(), 2);
        assert!(setup.treelet_weights.is_empty());
        assert!(setup.dependencies.is_empty());
    }

    #[test]
    fn leaf_bounds_enclose_their_spheres() {
        let setup = demo_scene(IVec2::new(4, 4), 4, 1);
        let root = &setup.treelets[0];
        assert_eq!(root.children.len(), 3);
        for child in &root.children {
            let leaf = setup
                .treelets
                .iter()
                .find(|t| t.id == child.treelet)
                .unwrap();
            let s = &leaf.spheres[0];
            assert!(child.bounds_min.cmple(s.center - Vec3::splat(s.radius)).all());
            assert!(child.bounds_max.cmpge(s.center + Vec3::splat(s.radius)).all());
        }
    }

    #[test]
    fn packed_context_round_trips_through_objects() {
        let backend = MemBackend::new();
        let setup = demo_scene(IVec2::new(4, 4), 2, 1);
        let manifest = setup.store(&backend).unwrap();

        let mut objects = std::collections::HashMap::new();
        for entry in &manifest.objects {
            objects.insert(entry.key, backend.get(&entry.key.storage_key()).unwrap());
        }
        let ctx = SceneContext::from_objects(&objects).unwrap();
        assert!(ctx.store.contains(ROOT_TREELET));
        assert!(ctx.store.contains(1));
        assert_eq!(ctx.sampler.samples_per_pixel(), 1);
    }
}
