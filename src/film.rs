// CLASSIFICATION: COMMUNITY
// Filename: film.rs v0.4
// Author: Lukas Bower
// Date Modified: 2026-01-28

//! The output film: a write-through accumulator of weighted radiance.
//!
//! Finished-sample aggregation is commutative: each pixel sums
//! `L * weight` and the weights, so delivery order never changes the
//! image. Radiance that is NaN or carries negative luminance is masked to
//! zero before accumulation.

use std::path::Path;

use glam::Vec2;

use swarm_model::{Bounds2i, Rgb};

/// Accumulated state of one pixel.
#[derive(Debug, Clone, Copy, Default)]
struct Pixel {
    sum: Rgb,
    weight: f32,
}

/// Radiance accumulator over the sample bounds.
#[derive(Debug)]
pub struct Film {
    bounds: Bounds2i,
    pixels: Vec<Pixel>,
}

impl Film {
    /// Empty film covering `bounds`.
    #[must_use]
    pub fn new(bounds: Bounds2i) -> Self {
        let pixels = vec![Pixel::default(); bounds.area().max(0) as usize];
        Self { bounds, pixels }
    }

    /// Sample bounds this film covers.
    #[must_use]
    pub fn bounds(&self) -> Bounds2i {
        self.bounds
    }

    fn index(&self, p_film: Vec2) -> Option<usize> {
        let pixel = glam::IVec2::new(p_film.x.floor() as i32, p_film.y.floor() as i32);
        if !self.bounds.contains(pixel) {
            return None;
        }
        let d = self.bounds.diagonal();
        let local = pixel - self.bounds.min;
        Some((local.y * d.x + local.x) as usize)
    }

    /// Accumulate one finished sample. Invalid radiance is masked to zero;
    /// samples outside the bounds are discarded.
    pub fn add_sample(&mut self, p_film: Vec2, l: Rgb, weight: f32) {
        let l = if l.has_nan() || l.luminance() < -1e-5 || l.luminance().is_infinite() {
            Rgb::ZERO
        } else {
            l
        };
        if let Some(i) = self.index(p_film) {
            let px = &mut self.pixels[i];
            px.sum += l * weight;
            px.weight += weight;
        }
    }

    /// Weight-normalized radiance of the pixel at `(x, y)` in film
    /// coordinates.
    #[must_use]
    pub fn pixel(&self, x: i32, y: i32) -> Rgb {
        let d = self.bounds.diagonal();
        let local = glam::IVec2::new(x, y) - self.bounds.min;
        let px = self.pixels[(local.y * d.x + local.x) as usize];
        if px.weight > 0.0 {
            px.sum / px.weight
        } else {
            Rgb::ZERO
        }
    }

    /// Total accumulated filter weight, a proxy for delivered samples.
    #[must_use]
    pub fn total_weight(&self) -> f64 {
        self.pixels.iter().map(|p| f64::from(p.weight)).sum()
    }

    /// Write the film as an 8-bit PNG with gamma 1/2.2.
    pub fn write_png(&self, path: &Path) -> anyhow::Result<()> {
        let d = self.bounds.diagonal();
        let (w, h) = (d.x.max(0) as u32, d.y.max(0) as u32);
        let mut img = image::RgbImage::new(w, h);
        for y in 0..h as i32 {
            for x in 0..w as i32 {
                let c = self.pixel(self.bounds.min.x + x, self.bounds.min.y + y);
                let to8 = |v: f32| (v.max(0.0).powf(1.0 / 2.2).min(1.0) * 255.0 + 0.5) as u8;
                img.put_pixel(x as u32, y as u32, image::Rgb([to8(c.r), to8(c.g), to8(c.b)]));
            }
        }
        img.save(path)?;
        Ok(())
    }
}
