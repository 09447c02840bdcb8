use glam::{Mat4, Vec3};

/// Camera parameters consumed by the renderer's uniform buffer.
#[derive(Clone, Debug)]
pub struct CameraParams {
    pub view_proj: Mat4,
    pub position: Vec3,
}

/// Point light state consumed by the renderer's uniform buffer.
#[derive(Clone, Debug)]
pub struct LightParams {
    pub position: Vec3,
    pub color: Vec3,
    pub intensity: f32,
    /// Range after which the light contributes nothing; zero disables the cut-off.
    pub distance: f32,
    pub decay: f32,
}
