use std::fmt;

use glam::Vec3;
use log::warn;

use crate::assets::{load_environment, load_typeface, AssetSource};
use crate::composer::{FrameSink, Pass};
use crate::config::AssetConfig;
use crate::environment::EnvironmentMap;
use crate::scene::MeshRole;
use crate::typeface::Typeface;
use crate::viewer::Viewer;

/// Both assets fetched up front, for hosts that load before they have a
/// window to draw into. Either may be missing.
#[derive(Debug, Default)]
pub struct LoadedAssets {
    pub environment: Option<EnvironmentMap>,
    pub typeface: Option<Typeface>,
}

impl LoadedAssets {
    pub async fn load<S: AssetSource>(source: &S, assets: &AssetConfig) -> Self {
        let environment = match load_environment(source, &assets.environment).await {
            Ok(map) => Some(map),
            Err(err) => {
                warn!("environment {} unavailable: {err}", assets.environment);
                None
            }
        };
        let typeface = match load_typeface(source, &assets.typeface).await {
            Ok(face) => Some(face),
            Err(err) => {
                warn!("typeface {} unavailable, scene left empty: {err}", assets.typeface);
                None
            }
        };
        Self {
            environment,
            typeface,
        }
    }

    /// Installs the environment and populates the scene. Returns whether the
    /// scene was populated.
    pub fn apply<K: FrameSink>(self, viewer: &mut Viewer<K>) -> bool {
        if let Some(map) = self.environment {
            viewer.environment().install(map);
        }
        let Some(face) = self.typeface else {
            return false;
        };
        match viewer.populate(&face) {
            Ok(()) => true,
            Err(err) => {
                warn!("scene not populated: {err}");
                false
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectState {
    pub name: String,
    pub position: Vec3,
}

/// What a viewer currently shows, for printing at exit.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneSummary {
    pub text_meshes: usize,
    pub cubes: usize,
    pub lights: usize,
    pub environment: Option<(u32, u32)>,
    pub passes: Vec<String>,
    pub objects: Vec<ObjectState>,
    pub camera_position: Vec3,
}

impl SceneSummary {
    pub fn of<K: FrameSink>(viewer: &Viewer<K>) -> Self {
        let stage = viewer.stage();
        let scene = &stage.scene;
        let passes = viewer
            .composer()
            .passes()
            .iter()
            .map(|pass| match pass {
                Pass::Render => "render".to_string(),
                Pass::Bloom(bloom) => format!(
                    "bloom(strength={:.2} radius={:.2} threshold={:.2})",
                    bloom.strength, bloom.radius, bloom.threshold
                ),
            })
            .collect();
        let objects = scene
            .nodes()
            .iter()
            .map(|node| ObjectState {
                name: node.name.clone(),
                position: node.transform.position,
            })
            .collect();
        Self {
            text_meshes: scene.count_meshes(MeshRole::Text),
            cubes: scene.count_meshes(MeshRole::Cube),
            lights: scene.light_count(),
            environment: scene.environment().get().map(|map| (map.width, map.height)),
            passes,
            objects,
            camera_position: stage.camera.position,
        }
    }
}

impl fmt::Display for SceneSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Scene: {} text meshes, {} cube(s), {} light(s)",
            self.text_meshes, self.cubes, self.lights
        )?;
        match self.environment {
            Some((width, height)) => writeln!(f, "Environment: {width}x{height}")?,
            None => writeln!(f, "Environment: none")?,
        }
        if self.passes.is_empty() {
            writeln!(f, "Passes: none")?;
        } else {
            writeln!(f, "Passes: {}", self.passes.join(", "))?;
        }
        writeln!(f, "Final object states:")?;
        for object in &self.objects {
            writeln!(
                f,
                " - {} pos=({:.2}, {:.2}, {:.2})",
                object.name, object.position.x, object.position.y, object.position.z
            )?;
        }
        write!(
            f,
            "Camera pos=({:.2}, {:.2}, {:.2})",
            self.camera_position.x, self.camera_position.y, self.camera_position.z
        )
    }
}

pub fn print_final_state(summary: &SceneSummary) {
    println!("{summary}");
}
