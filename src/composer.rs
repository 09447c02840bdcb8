use anyhow::Result;

use crate::config::BloomConfig;
use crate::scene::Stage;

/// CSS-pixel size of the output plus the device pixel ratio.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
    pub pixel_ratio: f32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixel_ratio: 1.0,
        }
    }

    pub fn with_pixel_ratio(mut self, pixel_ratio: f32) -> Self {
        self.pixel_ratio = pixel_ratio.max(0.25);
        self
    }

    pub fn aspect(&self) -> f32 {
        if self.height == 0 {
            1.0
        } else {
            self.width as f32 / self.height as f32
        }
    }

    /// Backing-store size in device pixels, never zero.
    pub fn physical_size(&self) -> (u32, u32) {
        let scale = |v: u32| ((v as f32 * self.pixel_ratio).round() as u32).max(1);
        (scale(self.width), scale(self.height))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BloomParams {
    /// Resolution the bloom chain is sized from, in CSS pixels.
    pub resolution: (u32, u32),
    pub strength: f32,
    pub radius: f32,
    pub threshold: f32,
}

impl BloomParams {
    pub const MIP_COUNT: usize = 5;
    pub const KERNEL_RADII: [u32; Self::MIP_COUNT] = [3, 5, 7, 9, 11];
    const MIP_FACTORS: [f32; Self::MIP_COUNT] = [1.0, 0.8, 0.6, 0.4, 0.2];
    pub const SMOOTH_WIDTH: f32 = 0.01;

    pub fn new(config: &BloomConfig, resolution: (u32, u32)) -> Self {
        Self {
            resolution,
            strength: config.strength,
            radius: config.radius,
            threshold: config.threshold,
        }
    }

    /// Weight of each blur mip in the composite, strength not included.
    pub fn mip_weights(&self) -> [f32; Self::MIP_COUNT] {
        Self::MIP_FACTORS.map(|factor| factor + (1.2 - factor - factor) * self.radius)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Pass {
    /// Draws the scene through the camera.
    Render,
    Bloom(BloomParams),
}

/// Ordered post-processing chain, kept the same size as the renderer.
#[derive(Debug, Clone)]
pub struct Composer {
    passes: Vec<Pass>,
    size: (u32, u32),
}

impl Composer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            passes: Vec::new(),
            size: (width, height),
        }
    }

    pub fn add_pass(&mut self, pass: Pass) {
        self.passes.push(pass);
    }

    pub fn passes(&self) -> &[Pass] {
        &self.passes
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    pub fn set_size(&mut self, width: u32, height: u32) {
        self.size = (width, height);
        for pass in &mut self.passes {
            if let Pass::Bloom(bloom) = pass {
                bloom.resolution = (width, height);
            }
        }
    }

    pub fn bloom(&self) -> Option<&BloomParams> {
        self.passes.iter().find_map(|pass| match pass {
            Pass::Bloom(bloom) => Some(bloom),
            Pass::Render => None,
        })
    }

    pub fn renders_scene(&self) -> bool {
        self.passes.contains(&Pass::Render)
    }

    /// Runs the chain into `sink`: one draw call per invocation.
    pub fn render(&self, stage: &Stage, sink: &mut dyn FrameSink) -> Result<()> {
        sink.draw(&Frame {
            stage,
            passes: &self.passes,
            size: self.size,
        })
    }
}

/// What a sink needs to produce one composed image.
pub struct Frame<'a> {
    pub stage: &'a Stage,
    pub passes: &'a [Pass],
    pub size: (u32, u32),
}

impl Frame<'_> {
    pub fn renders_scene(&self) -> bool {
        self.passes.contains(&Pass::Render)
    }

    pub fn bloom(&self) -> Option<&BloomParams> {
        self.passes.iter().find_map(|pass| match pass {
            Pass::Bloom(bloom) => Some(bloom),
            Pass::Render => None,
        })
    }
}

/// Destination of composed frames: the GPU renderer, or a recorder in
/// headless runs and tests.
pub trait FrameSink {
    fn resize(&mut self, viewport: Viewport);
    fn draw(&mut self, frame: &Frame<'_>) -> Result<()>;
}

/// Sink that only counts what it was asked to do.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RecordingSink {
    pub frames: usize,
    pub size: Option<(u32, u32)>,
    pub last_pass_count: usize,
}

impl FrameSink for RecordingSink {
    fn resize(&mut self, viewport: Viewport) {
        self.size = Some((viewport.width, viewport.height));
    }

    fn draw(&mut self, frame: &Frame<'_>) -> Result<()> {
        self.frames += 1;
        self.last_pass_count = frame.passes.len();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::PerspectiveCamera;
    use crate::config::CameraConfig;

    #[test]
    fn mip_weights_lean_towards_mirror_with_radius() {
        let bloom = BloomParams::new(&BloomConfig::default(), (800, 600));
        let weights = bloom.mip_weights();
        // 1.0 -> 1.0 + (0.2 - 1.0) * 0.1
        assert!((weights[0] - 0.92).abs() < 1e-6);
        assert!((weights[4] - 0.28).abs() < 1e-6);

        let flat = BloomParams { radius: 0.0, ..bloom };
        assert_eq!(flat.mip_weights(), [1.0, 0.8, 0.6, 0.4, 0.2]);
    }

    #[test]
    fn resizing_updates_bloom_resolution() {
        let mut composer = Composer::new(800, 600);
        composer.add_pass(Pass::Render);
        composer.add_pass(Pass::Bloom(BloomParams::new(&BloomConfig::default(), (800, 600))));
        composer.set_size(1024, 768);
        assert_eq!(composer.size(), (1024, 768));
        assert_eq!(composer.bloom().unwrap().resolution, (1024, 768));
    }

    #[test]
    fn render_draws_once_per_call() {
        let stage = Stage::new(PerspectiveCamera::new(&CameraConfig::default(), 1.0));
        let mut composer = Composer::new(10, 10);
        composer.add_pass(Pass::Render);
        let mut sink = RecordingSink::default();
        composer.render(&stage, &mut sink).unwrap();
        composer.render(&stage, &mut sink).unwrap();
        assert_eq!(sink.frames, 2);
        assert_eq!(sink.last_pass_count, 1);
    }

    #[test]
    fn viewport_scales_by_pixel_ratio() {
        let viewport = Viewport::new(640, 0).with_pixel_ratio(2.0);
        assert_eq!(viewport.physical_size(), (1280, 1));
        assert_eq!(viewport.aspect(), 1.0);
        assert_eq!(Viewport::new(1920, 1080).aspect(), 1920.0 / 1080.0);
    }
}
