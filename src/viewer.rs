use std::sync::Arc;

use anyhow::Result;
use glam::Vec3;
use log::{info, warn};

use crate::animation::{AnimationLoop, LoopHandle};
use crate::camera::PerspectiveCamera;
use crate::composer::{BloomParams, Composer, FrameSink, Pass, Viewport};
use crate::config::{color_from_hex, ViewerConfig};
use crate::environment::EnvironmentSlot;
use crate::error::{LoadError, LoadResult};
use crate::geometry::{box_geometry, text_geometry, TextOptions};
use crate::input::{InputController, KeyCode};
use crate::material::Material;
use crate::scene::{MeshRole, Node, PointLight, Stage, Transform};
use crate::typeface::Typeface;

/// One mounted scene: stage, composer and the sink frames go to.
pub struct Viewer<S> {
    config: ViewerConfig,
    stage: Stage,
    composer: Composer,
    controller: Option<InputController>,
    viewport: Viewport,
    sink: S,
}

impl<S: FrameSink> Viewer<S> {
    /// Creates the empty scene, camera and the single composer for a
    /// viewport. `sink` must already be sized to `viewport`.
    pub fn bootstrap(config: ViewerConfig, viewport: Viewport, sink: S) -> Self {
        let camera = PerspectiveCamera::new(&config.camera, viewport.aspect());
        let composer = Composer::new(viewport.width, viewport.height);
        info!(
            "viewer bootstrapped at {}x{} (pixel ratio {})",
            viewport.width, viewport.height, viewport.pixel_ratio
        );
        Self {
            config,
            stage: Stage::new(camera),
            composer,
            controller: None,
            viewport,
            sink,
        }
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn stage(&self) -> &Stage {
        &self.stage
    }

    pub fn composer(&self) -> &Composer {
        &self.composer
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Slot the environment loader writes into.
    pub fn environment(&self) -> &EnvironmentSlot {
        self.stage.scene.environment()
    }

    pub fn is_populated(&self) -> bool {
        self.controller.is_some()
    }

    /// Adds the glyphs, the emissive cube and its light, then the render
    /// and bloom passes. A glyph whose text yields no geometry is skipped.
    /// On a malformed outline the scene is left untouched.
    pub fn populate(&mut self, face: &Typeface) -> LoadResult<()> {
        let slot = self.environment().clone();
        let mut glyphs = Vec::with_capacity(self.config.glyphs.len());
        for spec in &self.config.glyphs {
            let options = TextOptions {
                size: spec.size,
                depth: spec.depth,
                ..TextOptions::default()
            };
            let mesh = match text_geometry(face, &spec.text, &options) {
                Ok(mesh) => mesh,
                Err(LoadError::EmptyText(text)) => {
                    warn!("glyph {text:?} has no outline, skipped");
                    continue;
                }
                Err(err) => return Err(err),
            };
            glyphs.push(Node::mesh(
                &spec.text,
                Arc::new(mesh),
                Material::for_glyph(&spec.material, &slot),
                MeshRole::Text,
                Transform::at(spec.position),
            ));
        }
        for glyph in glyphs {
            self.stage.scene.add(glyph);
        }

        let cube = &self.config.cube;
        let cube_material = Material::Standard {
            color: color_from_hex(cube.color),
            roughness: 1.0,
            metalness: 0.0,
            emissive: color_from_hex(cube.emissive),
            emissive_intensity: cube.emissive_intensity,
            environment: Some(slot),
        };
        let cube_transform = Transform {
            scale: Vec3::splat(cube.scale),
            ..Transform::default()
        };
        self.stage.cube = Some(self.stage.scene.add(Node::mesh(
            "cube",
            Arc::new(box_geometry(cube.edge)),
            cube_material,
            MeshRole::Cube,
            cube_transform,
        )));

        let light = &self.config.light;
        let point_light = PointLight {
            color: color_from_hex(light.color),
            intensity: light.intensity,
            distance: light.distance,
            decay: light.decay,
        };
        self.stage.light = Some(
            self.stage
                .scene
                .add(Node::light("cube-light", point_light, cube_transform.position)),
        );

        self.composer.add_pass(Pass::Render);
        let (width, height) = self.composer.size();
        self.composer
            .add_pass(Pass::Bloom(BloomParams::new(&self.config.bloom, (width, height))));
        self.controller = Some(InputController::new(&self.config.controls));

        info!("scene populated with {} nodes", self.stage.scene.len());
        Ok(())
    }

    /// Keeps camera aspect, sink and composer in step with the viewport.
    pub fn on_resize(&mut self, viewport: Viewport) {
        self.viewport = viewport;
        self.stage.camera.set_aspect(viewport.aspect());
        self.sink.resize(viewport);
        self.composer.set_size(viewport.width, viewport.height);
    }

    /// Routes a key press to the controller. Keys arriving before the scene
    /// is populated are ignored.
    pub fn on_key(&mut self, key: KeyCode) -> bool {
        match &self.controller {
            Some(controller) => controller.handle_key(key, &mut self.stage),
            None => false,
        }
    }

    /// [`Viewer::on_key`] for a `KeyboardEvent.key` style name.
    pub fn on_key_name(&mut self, name: &str) -> bool {
        match &self.controller {
            Some(controller) => controller.handle_key_name(name, &mut self.stage),
            None => false,
        }
    }

    /// Starts the per-frame loop; only available once populated.
    pub fn start_animation(&self) -> Option<(AnimationLoop, LoopHandle)> {
        self.is_populated()
            .then(|| AnimationLoop::start(self.config.controls.jitter))
    }

    /// Runs one animation frame into the sink.
    pub fn tick<R: rand::Rng>(&mut self, animation: &mut AnimationLoop<R>) -> Result<bool> {
        animation.tick(&mut self.stage, &self.composer, &mut self.sink)
    }
}
