//! Perspective cameras, picking rays and damped orbit controls.
//!
//! Each scene owns one [`PerspectiveCamera`]. Only the gallery camera is
//! driven by [`OrbitControls`]; the ambient camera stays put.

use glam::{Mat4, Vec2, Vec3};

use crate::config::{CameraParams, OrbitConfig};

// ============================================================================
// Perspective Camera
// ============================================================================

/// A look-at perspective camera.
#[derive(Debug, Clone)]
pub struct PerspectiveCamera {
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    /// Vertical field of view in degrees.
    pub fov_degrees: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl PerspectiveCamera {
    /// Camera on the +Z axis at `params.distance`, looking at the origin.
    pub fn new(params: &CameraParams, aspect: f32) -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, params.distance),
            target: Vec3::ZERO,
            up: Vec3::Y,
            fov_degrees: params.fov_degrees,
            aspect: if aspect.is_finite() && aspect > 0.0 { aspect } else { 1.0 },
            near: params.near,
            far: params.far,
        }
    }

    /// Update the aspect ratio. Non-finite or non-positive values are ignored.
    pub fn set_aspect(&mut self, aspect: f32) -> bool {
        if !aspect.is_finite() || aspect <= 0.0 {
            return false;
        }
        self.aspect = aspect;
        true
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_degrees.to_radians(), self.aspect, self.near, self.far)
    }

    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// World-space ray from the eye through a point in normalized device
    /// coordinates (x right, y up, both in [-1, 1]).
    pub fn ray_from_ndc(&self, ndc: Vec2) -> Ray {
        let inverse = self.view_projection_matrix().inverse();
        let far_point = inverse.project_point3(Vec3::new(ndc.x, ndc.y, 1.0));
        let direction = (far_point - self.position).normalize_or_zero();
        Ray { origin: self.position, direction }
    }
}

/// A half-line used for picking.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Ray {
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }

    /// The same ray expressed in the local space of `world_from_local`.
    pub fn to_local(&self, world_from_local: Mat4) -> Ray {
        let local_from_world = world_from_local.inverse();
        Ray {
            origin: local_from_world.transform_point3(self.origin),
            direction: local_from_world.transform_vector3(self.direction),
        }
    }
}

// ============================================================================
// Orbit Controls
// ============================================================================

/// Keeps the polar angle away from the poles so `look_at` never degenerates.
const POLAR_EPSILON: f32 = 1e-6;

/// Drag/wheel driven orbit around a target point, with optional damping.
///
/// Input only accumulates deltas; [`OrbitControls::update`] applies them to a
/// camera and must run once per frame for damping to settle.
#[derive(Debug, Clone)]
pub struct OrbitControls {
    pub target: Vec3,
    enable_damping: bool,
    damping_factor: f32,
    min_distance: f32,
    max_distance: f32,
    rotate_speed: f32,
    zoom_speed: f32,
    /// Pending (theta, phi) rotation.
    spherical_delta: Vec2,
    scale: f32,
    drag_origin: Option<Vec2>,
}

impl OrbitControls {
    pub fn new(config: &OrbitConfig) -> Self {
        Self {
            target: Vec3::ZERO,
            enable_damping: config.enable_damping,
            damping_factor: config.damping_factor,
            min_distance: config.min_distance,
            max_distance: config.max_distance,
            rotate_speed: config.rotate_speed,
            zoom_speed: config.zoom_speed,
            spherical_delta: Vec2::ZERO,
            scale: 1.0,
            drag_origin: None,
        }
    }

    pub fn begin_drag(&mut self, x: f32, y: f32) {
        self.drag_origin = Some(Vec2::new(x, y));
    }

    /// Convert pointer motion into orbit rotation. A full viewport height of
    /// vertical travel is one full turn.
    pub fn drag_to(&mut self, x: f32, y: f32, viewport_height: f32) {
        let Some(origin) = self.drag_origin else {
            return;
        };
        let current = Vec2::new(x, y);
        if viewport_height > 0.0 {
            let delta = (current - origin) * self.rotate_speed;
            let turn = std::f32::consts::TAU / viewport_height;
            self.spherical_delta.x -= delta.x * turn;
            self.spherical_delta.y -= delta.y * turn;
        }
        self.drag_origin = Some(current);
    }

    pub fn end_drag(&mut self) {
        self.drag_origin = None;
    }

    /// Wheel input: negative `delta_y` moves closer.
    pub fn wheel(&mut self, delta_y: f32) {
        let zoom_scale = 0.95_f32.powf(self.zoom_speed);
        if delta_y < 0.0 {
            self.scale *= zoom_scale;
        } else if delta_y > 0.0 {
            self.scale /= zoom_scale;
        }
    }

    /// Apply pending input to `camera`. Returns whether the camera moved.
    pub fn update(&mut self, camera: &mut PerspectiveCamera) -> bool {
        let offset = camera.position - self.target;
        let mut radius = offset.length();
        let (mut theta, mut phi) = if radius > 0.0 {
            (offset.x.atan2(offset.z), (offset.y / radius).clamp(-1.0, 1.0).acos())
        } else {
            (0.0, std::f32::consts::FRAC_PI_2)
        };

        if self.enable_damping {
            theta += self.spherical_delta.x * self.damping_factor;
            phi += self.spherical_delta.y * self.damping_factor;
        } else {
            theta += self.spherical_delta.x;
            phi += self.spherical_delta.y;
        }
        phi = phi.clamp(POLAR_EPSILON, std::f32::consts::PI - POLAR_EPSILON);

        radius = (radius * self.scale).clamp(self.min_distance, self.max_distance);

        let sin_phi = phi.sin();
        let new_offset = Vec3::new(
            radius * sin_phi * theta.sin(),
            radius * phi.cos(),
            radius * sin_phi * theta.cos(),
        );
        let new_position = self.target + new_offset;
        let moved = new_position.distance_squared(camera.position) > 1e-12;

        camera.position = new_position;
        camera.target = self.target;

        if self.enable_damping {
            self.spherical_delta *= 1.0 - self.damping_factor;
        } else {
            self.spherical_delta = Vec2::ZERO;
        }
        self.scale = 1.0;

        moved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CameraSetup;

    fn gallery_camera() -> PerspectiveCamera {
        PerspectiveCamera::new(&CameraSetup::default().gallery, 16.0 / 9.0)
    }

    #[test]
    fn test_center_ray_points_at_target() {
        let camera = gallery_camera();
        let ray = camera.ray_from_ndc(Vec2::ZERO);
        assert_eq!(ray.origin, Vec3::new(0.0, 0.0, 8.0));
        assert!((ray.direction - Vec3::NEG_Z).length() < 1e-4);
    }

    #[test]
    fn test_ray_follows_ndc_sign() {
        let camera = gallery_camera();
        let ray = camera.ray_from_ndc(Vec2::new(0.5, 0.5));
        assert!(ray.direction.x > 0.0);
        assert!(ray.direction.y > 0.0);
        assert!(ray.direction.z < 0.0);
        assert!((ray.direction.length() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_set_aspect_rejects_degenerate() {
        let mut camera = gallery_camera();
        assert!(!camera.set_aspect(f32::INFINITY));
        assert!(!camera.set_aspect(0.0));
        assert_eq!(camera.aspect, 16.0 / 9.0);
        assert!(camera.set_aspect(2.0));
        assert_eq!(camera.aspect, 2.0);
    }

    #[test]
    fn test_orbit_idle_update_keeps_camera() {
        let mut camera = gallery_camera();
        let mut controls = OrbitControls::new(&OrbitConfig::default());
        assert!(!controls.update(&mut camera));
        assert!((camera.position - Vec3::new(0.0, 0.0, 8.0)).length() < 1e-4);
    }

    #[test]
    fn test_orbit_drag_rotates_and_damps() {
        let mut camera = gallery_camera();
        let mut controls = OrbitControls::new(&OrbitConfig::default());
        controls.begin_drag(100.0, 100.0);
        controls.drag_to(160.0, 100.0, 600.0);
        controls.end_drag();
        assert!(controls.drag_origin.is_none());

        assert!(controls.update(&mut camera));
        let first_step = camera.position;
        assert!(first_step.x < 0.0, "dragging right orbits toward -X");
        // Distance is preserved by rotation.
        assert!((camera.position.length() - 8.0).abs() < 1e-3);

        // Damping keeps the camera coasting for a while, with shrinking steps.
        let mut previous = first_step;
        let mut last_step = f32::MAX;
        for _ in 0..10 {
            controls.update(&mut camera);
            let step = camera.position.distance(previous);
            assert!(step <= last_step + 1e-6);
            last_step = step;
            previous = camera.position;
        }
        assert!(last_step > 0.0);
    }

    #[test]
    fn test_orbit_distance_clamped() {
        let config = OrbitConfig::default();
        let mut camera = gallery_camera();
        let mut controls = OrbitControls::new(&config);
        for _ in 0..200 {
            controls.wheel(-1.0);
            controls.update(&mut camera);
        }
        assert!((camera.position.length() - config.min_distance).abs() < 1e-3);

        for _ in 0..400 {
            controls.wheel(1.0);
            controls.update(&mut camera);
        }
        assert!((camera.position.length() - config.max_distance).abs() < 1e-3);
    }

    #[test]
    fn test_orbit_polar_clamp() {
        let mut camera = gallery_camera();
        let config = OrbitConfig { enable_damping: false, ..OrbitConfig::default() };
        let mut controls = OrbitControls::new(&config);
        controls.begin_drag(0.0, 0.0);
        controls.drag_to(0.0, 10_000.0, 100.0);
        controls.update(&mut camera);
        assert!(camera.position.y.is_finite());
        assert!(camera.position.x.is_finite());
        assert!(camera.view_matrix().is_finite());
    }

    #[test]
    fn test_ray_to_local() {
        let ray = Ray { origin: Vec3::new(0.0, 0.0, 5.0), direction: Vec3::NEG_Z };
        let world_from_local = Mat4::from_translation(Vec3::new(0.0, 0.0, -2.0));
        let local = ray.to_local(world_from_local);
        assert!((local.origin - Vec3::new(0.0, 0.0, 7.0)).length() < 1e-5);
        assert!((local.direction - Vec3::NEG_Z).length() < 1e-5);
        assert_eq!(ray.at(2.0), Vec3::new(0.0, 0.0, 3.0));
    }
}
