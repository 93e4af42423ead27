// CLASSIFICATION: COMMUNITY
// Filename: sampler.rs v0.3
// Author: Lukas Bower
// Date Modified: 2026-02-17

//! Deterministic counter-hashed sampler.
//!
//! Sample values are pure functions of (scene seed, sample id, dimension),
//! so a ray shaded on any worker draws exactly the values the reference
//! integrator would draw for the same sample. Dimensions are laid out per
//! bounce: two for the BSDF, one for light selection.

use serde::{Deserialize, Serialize};

/// First dimension pair: camera jitter.
pub const DIM_CAMERA: u32 = 0;

/// Dimensions consumed per bounce.
const DIMS_PER_BOUNCE: u32 = 4;

/// BSDF sample dimensions for `bounce`.
#[must_use]
pub fn dim_bsdf(bounce: u32) -> u32 {
    2 + bounce * DIMS_PER_BOUNCE
}

/// Light-selection dimension for `bounce`.
#[must_use]
pub fn dim_light(bounce: u32) -> u32 {
    4 + bounce * DIMS_PER_BOUNCE
}

/// Stored sampler description, object `SAMPLER_0`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SamplerConfig {
    /// Samples per pixel.
    pub samples_per_pixel: u32,
    /// Scene-wide sampler seed.
    pub seed: u64,
}

/// Stateless sample source over a counter hash.
#[derive(Debug, Clone, Copy)]
pub struct HashSampler {
    config: SamplerConfig,
}

fn split_mix(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^ (x >> 31)
}

impl HashSampler {
    /// Sampler over `config`.
    #[must_use]
    pub fn new(config: SamplerConfig) -> Self {
        Self { config }
    }

    /// Samples per pixel.
    #[must_use]
    pub fn samples_per_pixel(&self) -> u32 {
        self.config.samples_per_pixel
    }

    /// One uniform value in `[0, 1)` for `(sample_id, dim)`.
    #[must_use]
    pub fn get_1d(&self, sample_id: u64, dim: u32) -> f32 {
        let h = split_mix(
            self.config
                .seed
                .wrapping_mul(0x1000_0000_01B3)
                .wrapping_add(split_mix(sample_id))
                .wrapping_add(u64::from(dim)),
        );
        // Top 24 bits give full f32 precision in [0, 1).
        (h >> 40) as f32 / 16_777_216.0
    }

    /// Two uniform values for consecutive dimensions.
    #[must_use]
    pub fn get_2d(&self, sample_id: u64, dim: u32) -> glam::Vec2 {
        glam::Vec2::new(self.get_1d(sample_id, dim), self.get_1d(sample_id, dim + 1))
    }
}
