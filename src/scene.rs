use std::sync::Arc;

use glam::{EulerRot, Mat4, Quat, Vec3};

use crate::camera::PerspectiveCamera;
use crate::environment::EnvironmentSlot;
use crate::geometry::Mesh;
use crate::material::Material;

/// Index of a node inside its [`Scene`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// Position, Euler rotation (radians, XYZ order) and scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Vec3,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    pub fn matrix(&self) -> Mat4 {
        let rotation = Quat::from_euler(EulerRot::XYZ, self.rotation.x, self.rotation.y, self.rotation.z);
        Mat4::from_scale_rotation_translation(self.scale, rotation, self.position)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeshRole {
    Text,
    Cube,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointLight {
    pub color: Vec3,
    pub intensity: f32,
    /// Cut-off range; zero means unlimited.
    pub distance: f32,
    pub decay: f32,
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Mesh {
        mesh: Arc<Mesh>,
        material: Material,
        role: MeshRole,
    },
    PointLight(PointLight),
}

#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub transform: Transform,
    pub kind: NodeKind,
}

impl Node {
    pub fn mesh(name: &str, mesh: Arc<Mesh>, material: Material, role: MeshRole, transform: Transform) -> Self {
        Self {
            name: name.to_string(),
            transform,
            kind: NodeKind::Mesh { mesh, material, role },
        }
    }

    pub fn light(name: &str, light: PointLight, position: Vec3) -> Self {
        Self {
            name: name.to_string(),
            transform: Transform::at(position),
            kind: NodeKind::PointLight(light),
        }
    }

    pub fn role(&self) -> Option<MeshRole> {
        match self.kind {
            NodeKind::Mesh { role, .. } => Some(role),
            NodeKind::PointLight(_) => None,
        }
    }
}

/// Flat scene graph plus the environment slot its materials read from.
#[derive(Debug, Default)]
pub struct Scene {
    nodes: Vec<Node>,
    environment: EnvironmentSlot,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn environment(&self) -> &EnvironmentSlot {
        &self.environment
    }

    pub fn add(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0)
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn count_meshes(&self, role: MeshRole) -> usize {
        self.nodes.iter().filter(|n| n.role() == Some(role)).count()
    }

    pub fn lights(&self) -> impl Iterator<Item = (&Node, &PointLight)> {
        self.nodes.iter().filter_map(|node| match &node.kind {
            NodeKind::PointLight(light) => Some((node, light)),
            NodeKind::Mesh { .. } => None,
        })
    }

    pub fn light_count(&self) -> usize {
        self.lights().count()
    }
}

/// Everything the input controller and the frame loop mutate.
#[derive(Debug)]
pub struct Stage {
    pub scene: Scene,
    pub camera: PerspectiveCamera,
    pub cube: Option<NodeId>,
    pub light: Option<NodeId>,
}

impl Stage {
    pub fn new(camera: PerspectiveCamera) -> Self {
        Self {
            scene: Scene::new(),
            camera,
            cube: None,
            light: None,
        }
    }

    pub fn cube_transform(&self) -> Option<&Transform> {
        self.cube.and_then(|id| self.scene.node(id)).map(|n| &n.transform)
    }

    pub fn cube_transform_mut(&mut self) -> Option<&mut Transform> {
        let id = self.cube?;
        self.scene.node_mut(id).map(|n| &mut n.transform)
    }

    pub fn light_position(&self) -> Option<Vec3> {
        self.light
            .and_then(|id| self.scene.node(id))
            .map(|n| n.transform.position)
    }

    /// Copies the cube position onto the point light.
    pub fn sync_light_to_cube(&mut self) {
        let Some(position) = self.cube_transform().map(|t| t.position) else {
            return;
        };
        if let Some(light) = self.light.and_then(|id| self.scene.node_mut(id)) {
            light.transform.position = position;
        }
    }
}
