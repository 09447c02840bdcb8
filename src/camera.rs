use glam::{Mat4, Vec3};

use crate::config::CameraConfig;

/// Perspective camera looking down -z from its position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerspectiveCamera {
    /// Vertical field of view in degrees.
    pub fov: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    pub position: Vec3,
}

impl PerspectiveCamera {
    pub fn new(config: &CameraConfig, aspect: f32) -> Self {
        Self {
            fov: config.fov,
            aspect,
            near: config.near,
            far: config.far,
            position: config.position,
        }
    }

    pub fn set_aspect(&mut self, aspect: f32) {
        self.aspect = aspect;
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_to_rh(self.position, Vec3::NEG_Z, Vec3::Y)
    }

    /// Projection with a 0..1 depth range.
    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov.to_radians(), self.aspect.max(0.01), self.near, self.far)
    }

    pub fn view_proj(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_stock_scene() {
        let camera = PerspectiveCamera::new(&CameraConfig::default(), 2.0);
        assert_eq!(camera.fov, 75.0);
        assert_eq!(camera.near, 0.1);
        assert_eq!(camera.far, 1000.0);
        assert_eq!(camera.position, Vec3::new(0.0, 0.0, 5.0));
    }

    #[test]
    fn origin_projects_to_screen_centre() {
        let camera = PerspectiveCamera::new(&CameraConfig::default(), 16.0 / 9.0);
        let clip = camera.view_proj() * Vec3::ZERO.extend(1.0);
        let ndc = clip.truncate() / clip.w;
        assert!(ndc.x.abs() < 1e-6 && ndc.y.abs() < 1e-6);
        assert!(ndc.z > 0.0 && ndc.z < 1.0);
    }

    #[test]
    fn moving_camera_right_shifts_scene_left() {
        let mut camera = PerspectiveCamera::new(&CameraConfig::default(), 1.0);
        camera.position.x += 1.0;
        let clip = camera.view_proj() * Vec3::ZERO.extend(1.0);
        assert!(clip.x / clip.w < 0.0);
    }
}
