// CLASSIFICATION: COMMUNITY
// Filename: camera.rs v0.3
// Author: Lukas Bower
// Date Modified: 2026-02-17

//! Pinhole camera stored under `CAMERA_0`.

use glam::{IVec2, Vec2, Vec3};
use serde::{Deserialize, Serialize};

use swarm_model::{Bounds2i, Ray, RayDiff};

/// A perspective pinhole camera.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Camera {
    /// Eye position.
    pub position: Vec3,
    /// Point the camera looks at.
    pub look_at: Vec3,
    /// Up hint.
    pub up: Vec3,
    /// Vertical field of view in degrees.
    pub vfov_degrees: f32,
    /// Output resolution in pixels.
    pub resolution: IVec2,
}

impl Camera {
    /// The film's sample bounds: `(0, 0)` to the resolution.
    #[must_use]
    pub fn sample_bounds(&self) -> Bounds2i {
        Bounds2i::new(IVec2::ZERO, self.resolution)
    }

    fn basis(&self) -> (Vec3, Vec3, Vec3) {
        let forward = (self.look_at - self.position).normalize();
        let right = forward.cross(self.up).normalize();
        let down = forward.cross(right).normalize();
        (forward, right, down)
    }

    fn direction_at(&self, p_film: Vec2) -> Vec3 {
        let (forward, right, down) = self.basis();
        let res = Vec2::new(self.resolution.x as f32, self.resolution.y as f32);
        let half_height = (self.vfov_degrees.to_radians() / 2.0).tan();
        let half_width = half_height * res.x / res.y;
        // Film coordinates run left-to-right, top-to-bottom.
        let ndc = (p_film / res) * 2.0 - Vec2::ONE;
        (forward + right * (ndc.x * half_width) + down * (ndc.y * half_height)).normalize()
    }

    /// Generate the camera ray through the film position, with one-pixel
    /// differentials.
    #[must_use]
    pub fn generate_ray(&self, p_film: Vec2) -> Ray {
        let mut ray = Ray::new(self.position, self.direction_at(p_film));
        ray.differentials = Some(RayDiff {
            rx_origin: self.position,
            ry_origin: self.position,
            rx_direction: self.direction_at(p_film + Vec2::X),
            ry_direction: self.direction_at(p_film + Vec2::Y),
        });
        ray
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera() -> Camera {
        Camera {
            position: Vec3::new(0.0, 0.0, 5.0),
            look_at: Vec3::ZERO,
            up: Vec3::Y,
            vfov_degrees: 60.0,
            resolution: IVec2::new(8, 6),
        }
    }

    #[test]
    fn center_ray_points_forward() {
        let cam = camera();
        let ray = cam.generate_ray(Vec2::new(4.0, 3.0));
        assert!(ray.direction.z < -0.99);
        assert_eq!(ray.origin, cam.position);
    }

    #[test]
    fn film_axes_match_screen_orientation() {
        let cam = camera();
        let left = cam.generate_ray(Vec2::new(0.5, 3.0)).direction;
        let right = cam.generate_ray(Vec2::new(7.5, 3.0)).direction;
        assert!(left.x < right.x);

        let top = cam.generate_ray(Vec2::new(4.0, 0.5)).direction;
        let bottom = cam.generate_ray(Vec2::new(4.0, 5.5)).direction;
        assert!(top.y > bottom.y);
    }

    #[test]
    fn differentials_straddle_the_center_ray() {
        let cam = camera();
        let ray = cam.generate_ray(Vec2::new(2.0, 2.0));
        let d = ray.differentials.unwrap();
        assert!(d.rx_direction.x > ray.direction.x);
        assert!(d.ry_direction.y < ray.direction.y);
    }
}
