use glam::{Vec2, Vec3};

use super::shape::{build_shapes, Shape};
use super::triangulate::triangulate;
use super::Mesh;
use crate::error::{LoadError, LoadResult};
use crate::typeface::Typeface;

/// Parameters of an extruded text mesh.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextOptions {
    /// Height of a full em square in world units.
    pub size: f32,
    /// Extrusion along +z.
    pub depth: f32,
    pub curve_segments: usize,
}

impl Default for TextOptions {
    fn default() -> Self {
        Self {
            size: 100.0,
            depth: 50.0,
            curve_segments: 12,
        }
    }
}

/// Builds a closed, flat-shaded mesh of `text` extruded from z = 0 to
/// z = `depth`.
pub fn text_geometry(face: &Typeface, text: &str, options: &TextOptions) -> LoadResult<Mesh> {
    let contours = face.layout(text, options.size, options.curve_segments)?;
    let mut mesh = Mesh::new();
    for shape in build_shapes(contours) {
        extrude_shape(&mut mesh, &shape, options.depth);
    }
    if mesh.indices.is_empty() {
        return Err(LoadError::EmptyText(text.to_string()));
    }
    Ok(mesh)
}

fn extrude_shape(mesh: &mut Mesh, shape: &Shape, depth: f32) {
    let (points, triangles) = triangulate(shape);

    let front: Vec<u32> = points
        .iter()
        .map(|p| mesh.push_vertex(p.extend(depth), Vec3::Z))
        .collect();
    for [a, b, c] in &triangles {
        mesh.push_triangle(front[*a as usize], front[*b as usize], front[*c as usize]);
    }

    let back: Vec<u32> = points
        .iter()
        .map(|p| mesh.push_vertex(p.extend(0.0), Vec3::NEG_Z))
        .collect();
    for [a, b, c] in &triangles {
        mesh.push_triangle(back[*a as usize], back[*c as usize], back[*b as usize]);
    }

    for ring in std::iter::once(&shape.outer).chain(shape.holes.iter()) {
        extrude_walls(mesh, ring, depth);
    }
}

/// Side walls of one contour. Outer contours run counter-clockwise and holes
/// clockwise, so the right-hand normal of every edge points out of the solid.
fn extrude_walls(mesh: &mut Mesh, ring: &[Vec2], depth: f32) {
    for (i, &a) in ring.iter().enumerate() {
        let b = ring[(i + 1) % ring.len()];
        let edge = b - a;
        let normal = Vec2::new(edge.y, -edge.x).normalize_or_zero().extend(0.0);

        let a0 = mesh.push_vertex(a.extend(0.0), normal);
        let b0 = mesh.push_vertex(b.extend(0.0), normal);
        let b1 = mesh.push_vertex(b.extend(depth), normal);
        let a1 = mesh.push_vertex(a.extend(depth), normal);
        mesh.push_triangle(a0, b0, b1);
        mesh.push_triangle(a0, b1, a1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typeface::tests::SAMPLE_TYPEFACE;

    fn face() -> Typeface {
        Typeface::from_json_str(SAMPLE_TYPEFACE).unwrap()
    }

    fn options(size: f32, depth: f32) -> TextOptions {
        TextOptions {
            size,
            depth,
            curve_segments: 12,
        }
    }

    #[test]
    fn extrusion_spans_zero_to_depth() {
        let mesh = text_geometry(&face(), "I", &options(1.0, 0.2)).unwrap();
        let (min, max) = mesh.bounds().unwrap();
        assert_eq!(min.z, 0.0);
        assert_eq!(max.z, 0.2);
        assert!((max.y - 1.0).abs() < 1e-6);
        assert!((max.x - 0.3).abs() < 1e-6);
    }

    #[test]
    fn indices_are_in_range() {
        let mesh = text_geometry(&face(), "OD", &options(1.0, 0.1)).unwrap();
        let count = mesh.vertex_count() as u32;
        assert!(mesh.indices.iter().all(|&i| i < count));
        assert_eq!(mesh.indices.len() % 3, 0);
    }

    #[test]
    fn box_glyph_has_caps_and_four_walls() {
        let mesh = text_geometry(&face(), "I", &options(1.0, 0.2)).unwrap();
        // 2 cap triangles front + back, 2 per wall
        assert_eq!(mesh.triangle_count(), 2 + 2 + 4 * 2);
    }

    #[test]
    fn triangles_face_their_normals() {
        let mesh = text_geometry(&face(), "OD", &options(1.0, 0.1)).unwrap();
        for triangle in mesh.indices.chunks_exact(3) {
            let [a, b, c] = [0, 1, 2].map(|i| mesh.position(triangle[i] as usize));
            let winding = (b - a).cross(c - a);
            if winding.length_squared() < 1e-12 {
                continue;
            }
            assert!(winding.dot(mesh.normal(triangle[0] as usize)) > 0.0);
        }
    }

    #[test]
    fn whitespace_only_text_is_empty() {
        let err = text_geometry(&face(), " ", &options(1.0, 0.1)).unwrap_err();
        assert!(matches!(err, LoadError::EmptyText(_)));
    }
}
