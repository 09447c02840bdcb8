use glam::Vec2;

use super::shape::Shape;

/// Triangulates a shape by ear clipping.
///
/// Returns the shape's points (outer contour first, then every hole in
/// order) together with counter-clockwise triangles indexing into them.
pub fn triangulate(shape: &Shape) -> (Vec<Vec2>, Vec<[u32; 3]>) {
    let mut points = shape.outer.clone();
    let mut hole_rings = Vec::with_capacity(shape.holes.len());
    for hole in &shape.holes {
        let start = points.len();
        points.extend_from_slice(hole);
        hole_rings.push((start..points.len()).collect::<Vec<usize>>());
    }

    let mut ring: Vec<usize> = (0..shape.outer.len()).collect();

    // Holes whose right-most point lies further right are bridged first so
    // their bridges cannot cross the ones added later.
    hole_rings.sort_by(|a, b| {
        let max_x = |ring: &Vec<usize>| {
            ring.iter()
                .map(|&i| points[i].x)
                .fold(f32::NEG_INFINITY, f32::max)
        };
        max_x(b).total_cmp(&max_x(a))
    });
    for (index, hole) in hole_rings.iter().enumerate() {
        ring = bridge_hole(&points, ring, hole, &hole_rings[index + 1..]);
    }

    let triangles = clip_ears(&points, ring)
        .into_iter()
        .map(|[a, b, c]| [a as u32, b as u32, c as u32])
        .collect();
    (points, triangles)
}

/// Splices `hole` into `ring` through the closest mutually visible pair of
/// vertices.
fn bridge_hole(points: &[Vec2], ring: Vec<usize>, hole: &[usize], pending: &[Vec<usize>]) -> Vec<usize> {
    let hole_start = (0..hole.len())
        .max_by(|&a, &b| points[hole[a]].x.total_cmp(&points[hole[b]].x))
        .unwrap_or(0);
    let from = points[hole[hole_start]];

    let blocked = |target: usize| {
        let to = points[ring[target]];
        let ring_edges = (0..ring.len()).map(|i| (ring[i], ring[(i + 1) % ring.len()]));
        let hole_edges = (0..hole.len()).map(|i| (hole[i], hole[(i + 1) % hole.len()]));
        let pending_edges = pending
            .iter()
            .flat_map(|other| (0..other.len()).map(move |i| (other[i], other[(i + 1) % other.len()])));
        ring_edges
            .chain(hole_edges)
            .chain(pending_edges)
            .any(|(a, b)| {
                let (pa, pb) = (points[a], points[b]);
                // edges sharing an endpoint with the bridge never block it
                if pa == from || pb == from || pa == to || pb == to {
                    return false;
                }
                segments_cross(from, to, pa, pb)
            })
    };

    let target = (0..ring.len())
        .filter(|&i| !blocked(i))
        .min_by(|&a, &b| {
            from.distance_squared(points[ring[a]])
                .total_cmp(&from.distance_squared(points[ring[b]]))
        })
        .or_else(|| {
            (0..ring.len()).min_by(|&a, &b| {
                from.distance_squared(points[ring[a]])
                    .total_cmp(&from.distance_squared(points[ring[b]]))
            })
        })
        .unwrap_or(0);

    let mut merged = Vec::with_capacity(ring.len() + hole.len() + 2);
    merged.extend_from_slice(&ring[..=target]);
    merged.extend((0..=hole.len()).map(|k| hole[(hole_start + k) % hole.len()]));
    merged.extend_from_slice(&ring[target..]);
    merged
}

fn clip_ears(points: &[Vec2], mut ring: Vec<usize>) -> Vec<[usize; 3]> {
    let mut triangles = Vec::with_capacity(ring.len().saturating_sub(2));
    let mut cursor = 0;
    let mut failures = 0;

    while ring.len() > 3 {
        let n = ring.len();
        let (prev, current, next) = (ring[(cursor + n - 1) % n], ring[cursor % n], ring[(cursor + 1) % n]);
        let ear = is_ear(points, &ring, prev, current, next);
        if ear || failures > n {
            // A full lap without an ear means the remaining ring is
            // degenerate; clip anyway so the loop terminates.
            if ear || cross(points[prev], points[current], points[next]) > f32::EPSILON {
                triangles.push([prev, current, next]);
            }
            ring.remove(cursor % n);
            failures = 0;
            cursor %= ring.len();
        } else {
            cursor = (cursor + 1) % n;
            failures += 1;
        }
    }
    if let [a, b, c] = ring[..] {
        if cross(points[a], points[b], points[c]).abs() > f32::EPSILON {
            triangles.push([a, b, c]);
        }
    }
    triangles
}

fn is_ear(points: &[Vec2], ring: &[usize], prev: usize, current: usize, next: usize) -> bool {
    let (a, b, c) = (points[prev], points[current], points[next]);
    if cross(a, b, c) <= 0.0 {
        return false;
    }
    ring.iter().all(|&i| {
        let p = points[i];
        p == a || p == b || p == c || !inside_triangle(a, b, c, p)
    })
}

fn cross(a: Vec2, b: Vec2, c: Vec2) -> f32 {
    (b - a).perp_dot(c - a)
}

fn inside_triangle(a: Vec2, b: Vec2, c: Vec2, p: Vec2) -> bool {
    cross(a, b, p) >= 0.0 && cross(b, c, p) >= 0.0 && cross(c, a, p) >= 0.0
}

fn segments_cross(p1: Vec2, p2: Vec2, q1: Vec2, q2: Vec2) -> bool {
    let d1 = cross(q1, q2, p1);
    let d2 = cross(q1, q2, p2);
    let d3 = cross(p1, p2, q1);
    let d4 = cross(p1, p2, q2);
    (d1 > 0.0) != (d2 > 0.0) && (d3 > 0.0) != (d4 > 0.0) && d1 != 0.0 && d2 != 0.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::shape::signed_area;

    fn square(min: f32, max: f32) -> Vec<Vec2> {
        vec![
            Vec2::new(min, min),
            Vec2::new(max, min),
            Vec2::new(max, max),
            Vec2::new(min, max),
        ]
    }

    fn covered_area(points: &[Vec2], triangles: &[[u32; 3]]) -> f32 {
        triangles
            .iter()
            .map(|t| {
                let tri = [points[t[0] as usize], points[t[1] as usize], points[t[2] as usize]];
                signed_area(&tri)
            })
            .sum()
    }

    #[test]
    fn square_becomes_two_triangles() {
        let shape = Shape { outer: square(0.0, 1.0), holes: vec![] };
        let (points, triangles) = triangulate(&shape);
        assert_eq!(points.len(), 4);
        assert_eq!(triangles.len(), 2);
        assert!((covered_area(&points, &triangles) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn concave_outline_is_covered_exactly() {
        // L-shape, area 3
        let outer = vec![
            Vec2::new(0.0, 0.0),
            Vec2::new(2.0, 0.0),
            Vec2::new(2.0, 1.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(1.0, 2.0),
            Vec2::new(0.0, 2.0),
        ];
        let (points, triangles) = triangulate(&Shape { outer, holes: vec![] });
        assert_eq!(triangles.len(), 4);
        for t in &triangles {
            let tri = [points[t[0] as usize], points[t[1] as usize], points[t[2] as usize]];
            assert!(signed_area(&tri) > 0.0);
        }
        assert!((covered_area(&points, &triangles) - 3.0).abs() < 1e-5);
    }

    #[test]
    fn hole_area_is_left_uncovered() {
        let mut hole = square(1.0, 3.0);
        hole.reverse();
        let shape = Shape { outer: square(0.0, 4.0), holes: vec![hole] };
        let (points, triangles) = triangulate(&shape);
        assert_eq!(points.len(), 8);
        assert!((covered_area(&points, &triangles) - 12.0).abs() < 1e-4);
        for t in &triangles {
            let tri = [points[t[0] as usize], points[t[1] as usize], points[t[2] as usize]];
            let centroid = (tri[0] + tri[1] + tri[2]) / 3.0;
            let in_hole = centroid.x > 1.0 && centroid.x < 3.0 && centroid.y > 1.0 && centroid.y < 3.0;
            assert!(!in_hole, "triangle {tri:?} covers the hole");
        }
    }

    #[test]
    fn two_holes_are_both_bridged() {
        let mut left = square(1.0, 2.0);
        left.reverse();
        let mut right = vec![
            Vec2::new(4.0, 1.0),
            Vec2::new(5.0, 1.0),
            Vec2::new(5.0, 2.0),
            Vec2::new(4.0, 2.0),
        ];
        right.reverse();
        let outer = vec![
            Vec2::new(0.0, 0.0),
            Vec2::new(6.0, 0.0),
            Vec2::new(6.0, 3.0),
            Vec2::new(0.0, 3.0),
        ];
        let (points, triangles) = triangulate(&Shape { outer, holes: vec![left, right] });
        assert!((covered_area(&points, &triangles) - 16.0).abs() < 1e-4);
    }
}
