/// Orbit controller with damping, driving the camera around a target
use std::f32::consts::{PI, TAU};

use nalgebra::{Point3, Vector3};

use crate::projection::Camera;

/// Keep the camera off the poles so `look_at` stays well defined
const POLAR_EPSILON: f32 = 1e-4;

/// Orbit state in spherical coordinates around `target`.
///
/// Input methods only queue deltas; [`OrbitController::update`] integrates a
/// fraction of them each frame and writes the camera eye, so motion eases
/// out over several frames.
#[derive(Debug, Clone)]
pub struct OrbitController {
    pub target: Point3<f32>,
    pub enable_damping: bool,
    pub damping_factor: f32,
    pub auto_rotate: bool,
    pub auto_rotate_speed: f32,
    pub min_distance: f32,
    pub max_distance: f32,
    radius: f32,
    /// Azimuth around +Y, zero on +Z
    theta: f32,
    /// Angle down from +Y
    phi: f32,
    delta_theta: f32,
    delta_phi: f32,
    scale: f32,
    enabled: bool,
}

impl OrbitController {
    /// Bind to `camera`, taking its current eye and target as the start pose.
    pub fn new(camera: &Camera) -> Self {
        let offset = camera.position - camera.target;
        let radius = offset.norm().max(f32::EPSILON);
        Self {
            target: camera.target,
            enable_damping: true,
            damping_factor: 0.05,
            auto_rotate: false,
            auto_rotate_speed: 2.0,
            min_distance: 0.0,
            max_distance: f32::INFINITY,
            radius,
            theta: offset.x.atan2(offset.z),
            phi: (offset.y / radius).clamp(-1.0, 1.0).acos(),
            delta_theta: 0.0,
            delta_phi: 0.0,
            scale: 1.0,
            enabled: true,
        }
    }

    pub fn rotate_left(&mut self, angle: f32) {
        self.delta_theta -= angle;
    }

    pub fn rotate_up(&mut self, angle: f32) {
        self.delta_phi -= angle;
    }

    /// `factor > 1` moves the eye away from the target
    pub fn dolly(&mut self, factor: f32) {
        if factor > 0.0 {
            self.scale *= factor;
        }
    }

    pub fn distance(&self) -> f32 {
        self.radius
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Per-frame auto-rotate step, a full turn per minute at speed 1 and 60 fps
    fn auto_rotation_angle(&self) -> f32 {
        TAU / 60.0 / 60.0 * self.auto_rotate_speed
    }

    /// Advance one frame and reposition `camera`.
    pub fn update(&mut self, camera: &mut Camera) {
        if !self.enabled {
            return;
        }

        if self.auto_rotate {
            self.rotate_left(self.auto_rotation_angle());
        }

        let step = if self.enable_damping {
            self.damping_factor
        } else {
            1.0
        };

        self.theta = (self.theta + self.delta_theta * step).rem_euclid(TAU);
        self.phi = (self.phi + self.delta_phi * step).clamp(POLAR_EPSILON, PI - POLAR_EPSILON);
        self.radius = (self.radius * self.scale).clamp(self.min_distance, self.max_distance);

        if self.enable_damping {
            self.delta_theta *= 1.0 - self.damping_factor;
            self.delta_phi *= 1.0 - self.damping_factor;
        } else {
            self.delta_theta = 0.0;
            self.delta_phi = 0.0;
        }
        self.scale = 1.0;

        let offset = Vector3::new(
            self.radius * self.phi.sin() * self.theta.sin(),
            self.radius * self.phi.cos(),
            self.radius * self.phi.sin() * self.theta.cos(),
        );
        camera.position = self.target + offset;
        camera.target = self.target;
    }

    /// Stop reacting to input and updates. Idempotent.
    pub fn dispose(&mut self) {
        self.enabled = false;
        self.delta_theta = 0.0;
        self.delta_phi = 0.0;
        self.scale = 1.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera() -> Camera {
        Camera::new(800, 600)
    }

    #[test]
    fn test_update_without_input_keeps_pose() {
        let mut cam = camera();
        let start = cam.position;
        let mut controls = OrbitController::new(&cam);
        controls.update(&mut cam);
        assert!((cam.position - start).norm() < 1e-4);
    }

    #[test]
    fn test_damping_spreads_rotation_over_frames() {
        let mut cam = camera();
        let mut controls = OrbitController::new(&cam);
        let start = controls.theta;
        controls.rotate_left(-1.0);

        controls.update(&mut cam);
        let first = controls.theta - start;
        assert!((first - 0.05).abs() < 1e-5);

        for _ in 0..500 {
            controls.update(&mut cam);
        }
        // Geometric series converges to the full requested angle
        assert!(((controls.theta - start) - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_distance_is_preserved_while_orbiting() {
        let mut cam = camera();
        let mut controls = OrbitController::new(&cam);
        let r = controls.distance();
        controls.rotate_left(0.7);
        controls.rotate_up(0.3);
        for _ in 0..20 {
            controls.update(&mut cam);
        }
        assert!(((cam.position - cam.target).norm() - r).abs() < 1e-3);
    }

    #[test]
    fn test_polar_angle_is_clamped() {
        let mut cam = camera();
        let mut controls = OrbitController::new(&cam);
        controls.enable_damping = false;
        controls.rotate_up(10.0);
        controls.update(&mut cam);
        assert!(controls.phi >= POLAR_EPSILON);
        assert!(cam.position.y > 0.0);
    }

    #[test]
    fn test_dolly_respects_limits() {
        let mut cam = camera();
        let mut controls = OrbitController::new(&cam);
        controls.max_distance = 12.0;
        controls.dolly(10.0);
        controls.update(&mut cam);
        assert!((controls.distance() - 12.0).abs() < 1e-5);
    }

    #[test]
    fn test_auto_rotate_moves_camera_each_frame() {
        let mut cam = camera();
        let mut controls = OrbitController::new(&cam);
        controls.auto_rotate = true;
        let before = cam.position;
        controls.update(&mut cam);
        controls.update(&mut cam);
        assert!((cam.position - before).norm() > 0.0);
    }

    #[test]
    fn test_disposed_controller_ignores_updates() {
        let mut cam = camera();
        let mut controls = OrbitController::new(&cam);
        controls.rotate_left(1.0);
        controls.dispose();
        controls.dispose();
        let before = cam.position;
        controls.update(&mut cam);
        assert_eq!(cam.position, before);
        assert!(!controls.is_enabled());
    }
}
