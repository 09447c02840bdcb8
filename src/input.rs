use std::collections::HashMap;

use glam::Vec3;

use crate::config::ControlConfig;
use crate::scene::Stage;

#[cfg(target_arch = "wasm32")]
pub mod wasm;

/// Key identifier in the form the browser reports through
/// `KeyboardEvent.key`. Characters keep their case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyCode {
    Named(NamedKey),
    Character(char),
}

impl KeyCode {
    pub fn from_name(name: &str) -> Option<Self> {
        if let Some(key) = parse_named_key(name) {
            return Some(key);
        }
        let mut chars = name.chars();
        match (chars.next(), chars.next()) {
            (Some(ch), None) => Some(Self::Character(ch)),
            _ => None,
        }
    }
}

fn parse_named_key(name: &str) -> Option<KeyCode> {
    use NamedKey::*;
    let key = match name {
        "ArrowLeft" => Left,
        "ArrowRight" => Right,
        "ArrowUp" => Up,
        "ArrowDown" => Down,
        "Escape" => Escape,
        "Enter" => Enter,
        " " => Space,
        _ => return None,
    };
    Some(KeyCode::Named(key))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NamedKey {
    Left,
    Right,
    Up,
    Down,
    Escape,
    Enter,
    Space,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveTarget {
    Cube,
    Camera,
}

/// Translation applied by one key press.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Movement {
    pub target: MoveTarget,
    pub delta: Vec3,
}

/// Maps key presses to cube and camera movement.
#[derive(Debug, Clone)]
pub struct InputController {
    bindings: HashMap<KeyCode, Movement>,
}

impl InputController {
    /// Default layout: `w`/`s` cube y, `q`/`e` cube z, `a`/`d` camera x.
    pub fn new(controls: &ControlConfig) -> Self {
        let step = controls.step;
        let bindings = [
            ('w', MoveTarget::Cube, Vec3::Y),
            ('s', MoveTarget::Cube, Vec3::NEG_Y),
            ('q', MoveTarget::Cube, Vec3::Z),
            ('e', MoveTarget::Cube, Vec3::NEG_Z),
            ('a', MoveTarget::Camera, Vec3::X),
            ('d', MoveTarget::Camera, Vec3::NEG_X),
        ]
        .into_iter()
        .map(|(key, target, axis)| {
            (
                KeyCode::Character(key),
                Movement {
                    target,
                    delta: axis * step,
                },
            )
        })
        .collect();
        Self { bindings }
    }

    pub fn movement(&self, key: KeyCode) -> Option<Movement> {
        self.bindings.get(&key).copied()
    }

    /// Applies the movement bound to `key`, then puts the light back on the
    /// cube. Returns whether the key was bound.
    pub fn handle_key(&self, key: KeyCode, stage: &mut Stage) -> bool {
        let movement = self.movement(key);
        if let Some(movement) = movement {
            match movement.target {
                MoveTarget::Cube => {
                    if let Some(transform) = stage.cube_transform_mut() {
                        transform.position += movement.delta;
                    }
                }
                MoveTarget::Camera => stage.camera.position += movement.delta,
            }
        }
        stage.sync_light_to_cube();
        movement.is_some()
    }

    /// Handles a key given by its browser name.
    pub fn handle_key_name(&self, name: &str, stage: &mut Stage) -> bool {
        match KeyCode::from_name(name) {
            Some(key) => self.handle_key(key, stage),
            None => {
                stage.sync_light_to_cube();
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::camera::PerspectiveCamera;
    use crate::config::CameraConfig;
    use crate::geometry::box_geometry;
    use crate::material::Material;
    use crate::scene::{MeshRole, Node, PointLight, Transform};

    fn stage() -> Stage {
        let mut stage = Stage::new(PerspectiveCamera::new(&CameraConfig::default(), 1.0));
        let material = Material::Standard {
            color: Vec3::ONE,
            roughness: 1.0,
            metalness: 0.0,
            emissive: Vec3::ONE,
            emissive_intensity: 5.0,
            environment: None,
        };
        stage.cube = Some(stage.scene.add(Node::mesh(
            "cube",
            Arc::new(box_geometry(0.5)),
            material,
            MeshRole::Cube,
            Transform::default(),
        )));
        let light = PointLight {
            color: Vec3::ONE,
            intensity: 10.0,
            distance: 1000.0,
            decay: 2.0,
        };
        stage.light = Some(stage.scene.add(Node::light("light", light, Vec3::ZERO)));
        stage
    }

    fn cube_position(stage: &Stage) -> Vec3 {
        stage.cube_transform().unwrap().position
    }

    #[test]
    fn parses_browser_key_names() {
        assert_eq!(KeyCode::from_name("w"), Some(KeyCode::Character('w')));
        assert_eq!(KeyCode::from_name("W"), Some(KeyCode::Character('W')));
        assert_eq!(KeyCode::from_name("ArrowUp"), Some(KeyCode::Named(NamedKey::Up)));
        assert_eq!(KeyCode::from_name("Shift"), None);
    }

    #[test]
    fn light_tracks_cube_after_every_key() {
        let controller = InputController::new(&ControlConfig::default());
        let mut stage = stage();
        for key in "wwqsxeadd!wq".chars() {
            controller.handle_key(KeyCode::Character(key), &mut stage);
            assert_eq!(stage.light_position(), Some(cube_position(&stage)));
        }
    }

    #[test]
    fn inverse_pairs_restore_the_cube() {
        let controller = InputController::new(&ControlConfig::default());
        let mut stage = stage();
        for key in "wwwqqsssee".chars() {
            controller.handle_key(KeyCode::Character(key), &mut stage);
        }
        assert!(cube_position(&stage).abs().max_element() < 1e-5);
    }

    #[test]
    fn only_a_and_d_move_the_camera() {
        let controller = InputController::new(&ControlConfig::default());
        let mut stage = stage();
        for key in "wsqezx".chars() {
            controller.handle_key(KeyCode::Character(key), &mut stage);
            assert_eq!(stage.camera.position.x, 0.0);
        }
        controller.handle_key(KeyCode::Character('a'), &mut stage);
        assert!((stage.camera.position.x - 0.1).abs() < 1e-6);
        controller.handle_key(KeyCode::Character('d'), &mut stage);
        controller.handle_key(KeyCode::Character('d'), &mut stage);
        assert!((stage.camera.position.x + 0.1).abs() < 1e-6);
    }

    #[test]
    fn keys_are_case_sensitive() {
        let controller = InputController::new(&ControlConfig::default());
        let mut stage = stage();
        assert!(!controller.handle_key_name("W", &mut stage));
        assert_eq!(cube_position(&stage), Vec3::ZERO);
        assert!(controller.handle_key_name("w", &mut stage));
        assert!((cube_position(&stage).y - 0.1).abs() < 1e-6);
    }
}
