//! CPU-side meshes: the emissive box and extruded text.

pub mod shape;
pub mod text;
pub mod triangulate;

use glam::Vec3;

pub use text::{text_geometry, TextOptions};

/// Interleaved triangle mesh ready for GPU upload.
///
/// Vertices are laid out as `position.xyz` followed by `normal.xyz`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Mesh {
    pub vertices: Vec<f32>,
    pub indices: Vec<u32>,
}

pub const FLOATS_PER_VERTEX: usize = 6;

impl Mesh {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / FLOATS_PER_VERTEX
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn position(&self, index: usize) -> Vec3 {
        let base = index * FLOATS_PER_VERTEX;
        Vec3::from_slice(&self.vertices[base..base + 3])
    }

    pub fn normal(&self, index: usize) -> Vec3 {
        let base = index * FLOATS_PER_VERTEX + 3;
        Vec3::from_slice(&self.vertices[base..base + 3])
    }

    /// Appends a vertex and returns its index.
    pub fn push_vertex(&mut self, position: Vec3, normal: Vec3) -> u32 {
        let index = self.vertex_count() as u32;
        self.vertices.extend_from_slice(&position.to_array());
        self.vertices.extend_from_slice(&normal.to_array());
        index
    }

    pub fn push_triangle(&mut self, a: u32, b: u32, c: u32) {
        self.indices.extend_from_slice(&[a, b, c]);
    }

    /// Axis-aligned bounds, or `None` for an empty mesh.
    pub fn bounds(&self) -> Option<(Vec3, Vec3)> {
        (0..self.vertex_count()).map(|i| self.position(i)).fold(None, |acc, p| match acc {
            None => Some((p, p)),
            Some((min, max)) => Some((min.min(p), max.max(p))),
        })
    }
}

/// Axis-aligned cube centred on the origin with flat per-face normals.
pub fn box_geometry(edge: f32) -> Mesh {
    let half = edge * 0.5;
    let faces = [
        (Vec3::Z, Vec3::X, Vec3::Y),
        (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
        (Vec3::X, Vec3::NEG_Z, Vec3::Y),
        (Vec3::NEG_X, Vec3::Z, Vec3::Y),
        (Vec3::Y, Vec3::X, Vec3::NEG_Z),
        (Vec3::NEG_Y, Vec3::X, Vec3::Z),
    ];

    let mut mesh = Mesh::new();
    for (normal, u, v) in faces {
        let center = normal * half;
        let corners = [
            center - u * half - v * half,
            center + u * half - v * half,
            center + u * half + v * half,
            center - u * half + v * half,
        ];
        let first = mesh.push_vertex(corners[0], normal);
        for corner in &corners[1..] {
            mesh.push_vertex(*corner, normal);
        }
        mesh.push_triangle(first, first + 1, first + 2);
        mesh.push_triangle(first, first + 2, first + 3);
    }
    mesh
}
