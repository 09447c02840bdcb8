mod bloom;
pub mod common;
pub mod gpu;
mod shaders;
mod targets;

pub use common::{CameraParams, LightParams};
pub use gpu::GpuRenderer;
