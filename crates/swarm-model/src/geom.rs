// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Pixel-space bounds, RGB spectra and ray primitives.
// Author: Lukas Bower

//! Small geometric vocabulary shared across the renderer.

use std::ops::{Add, AddAssign, Div, Mul};

use glam::{IVec2, Vec3};
use serde::{Deserialize, Serialize};

/// An axis-aligned pixel rectangle with inclusive min and exclusive max.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds2i {
    /// Inclusive lower corner.
    pub min: IVec2,
    /// Exclusive upper corner.
    pub max: IVec2,
}

impl Bounds2i {
    /// Construct bounds from corners.
    #[must_use]
    pub fn new(min: IVec2, max: IVec2) -> Self {
        Self { min, max }
    }

    /// Extent along both axes.
    #[must_use]
    pub fn diagonal(&self) -> IVec2 {
        self.max - self.min
    }

    /// Number of pixels covered.
    #[must_use]
    pub fn area(&self) -> i64 {
        let d = self.diagonal();
        i64::from(d.x.max(0)) * i64::from(d.y.max(0))
    }

    /// Whether `p` lies inside (min-inclusive, max-exclusive).
    #[must_use]
    pub fn contains(&self, p: IVec2) -> bool {
        p.x >= self.min.x && p.x < self.max.x && p.y >= self.min.y && p.y < self.max.y
    }

    /// Iterate contained pixels in row-major order.
    pub fn pixels(&self) -> impl Iterator<Item = IVec2> {
        let b = *self;
        (b.min.y..b.max.y).flat_map(move |y| (b.min.x..b.max.x).map(move |x| IVec2::new(x, y)))
    }
}

/// An RGB radiance or throughput value.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rgb {
    /// Red component.
    pub r: f32,
    /// Green component.
    pub g: f32,
    /// Blue component.
    pub b: f32,
}

impl Rgb {
    /// Black.
    pub const ZERO: Rgb = Rgb { r: 0.0, g: 0.0, b: 0.0 };
    /// Unit throughput.
    pub const ONE: Rgb = Rgb { r: 1.0, g: 1.0, b: 1.0 };

    /// Construct from components.
    #[must_use]
    pub fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    /// Uniform gray value.
    #[must_use]
    pub fn splat(v: f32) -> Self {
        Self::new(v, v, v)
    }

    /// Whether all components are zero.
    #[must_use]
    pub fn is_black(&self) -> bool {
        self.r == 0.0 && self.g == 0.0 && self.b == 0.0
    }

    /// Whether any component is NaN.
    #[must_use]
    pub fn has_nan(&self) -> bool {
        self.r.is_nan() || self.g.is_nan() || self.b.is_nan()
    }

    /// CIE-weighted luminance.
    #[must_use]
    pub fn luminance(&self) -> f32 {
        0.212_671 * self.r + 0.715_160 * self.g + 0.072_169 * self.b
    }
}

impl Add for Rgb {
    type Output = Rgb;
    fn add(self, o: Rgb) -> Rgb {
        Rgb::new(self.r + o.r, self.g + o.g, self.b + o.b)
    }
}

impl AddAssign for Rgb {
    fn add_assign(&mut self, o: Rgb) {
        *self = *self + o;
    }
}

impl Mul for Rgb {
    type Output = Rgb;
    fn mul(self, o: Rgb) -> Rgb {
        Rgb::new(self.r * o.r, self.g * o.g, self.b * o.b)
    }
}

impl Mul<f32> for Rgb {
    type Output = Rgb;
    fn mul(self, s: f32) -> Rgb {
        Rgb::new(self.r * s, self.g * s, self.b * s)
    }
}

impl Div<f32> for Rgb {
    type Output = Rgb;
    fn div(self, s: f32) -> Rgb {
        Rgb::new(self.r / s, self.g / s, self.b / s)
    }
}

/// Differential origins and directions for texture filtering.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RayDiff {
    /// Origin of the x-offset ray.
    pub rx_origin: Vec3,
    /// Origin of the y-offset ray.
    pub ry_origin: Vec3,
    /// Direction of the x-offset ray.
    pub rx_direction: Vec3,
    /// Direction of the y-offset ray.
    pub ry_direction: Vec3,
}

/// A ray with a parametric extent and optional differentials.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ray {
    /// Origin point.
    pub origin: Vec3,
    /// Direction; not necessarily normalized.
    pub direction: Vec3,
    /// Parametric extent; intersections beyond this are ignored.
    pub t_max: f32,
    /// Optional differentials.
    pub differentials: Option<RayDiff>,
}

impl Ray {
    /// Construct a ray with unbounded extent.
    #[must_use]
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self { origin, direction, t_max: f32::INFINITY, differentials: None }
    }

    /// Point at parameter `t`.
    #[must_use]
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }

    /// Scale differentials by `s`, as done after camera-ray generation.
    pub fn scale_differentials(&mut self, s: f32) {
        if let Some(d) = &mut self.differentials {
            d.rx_origin = self.origin + (d.rx_origin - self.origin) * s;
            d.ry_origin = self.origin + (d.ry_origin - self.origin) * s;
            d.rx_direction = self.direction + (d.rx_direction - self.direction) * s;
            d.ry_direction = self.direction + (d.ry_direction - self.direction) * s;
        }
    }
}

impl Default for Ray {
    fn default() -> Self {
        Self::new(Vec3::ZERO, Vec3::Z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_area_and_membership() {
        let b = Bounds2i::new(IVec2::new(1, 2), IVec2::new(4, 5));
        assert_eq!(b.area(), 9);
        assert!(b.contains(IVec2::new(1, 2)));
        assert!(b.contains(IVec2::new(3, 4)));
        assert!(!b.contains(IVec2::new(4, 4)));
        assert_eq!(b.pixels().count(), 9);
    }

    #[test]
    fn degenerate_bounds_have_zero_area() {
        let b = Bounds2i::new(IVec2::new(3, 3), IVec2::new(3, 8));
        assert_eq!(b.area(), 0);
        assert_eq!(b.pixels().count(), 0);
    }

    #[test]
    fn luminance_weights() {
        assert!((Rgb::ONE.luminance() - 1.0).abs() < 1e-5);
        assert_eq!(Rgb::ZERO.luminance(), 0.0);
    }
}
