use glam::Vec2;

use crate::typeface::Contour;

/// Filled region: one outer contour (counter-clockwise) and its holes
/// (clockwise).
#[derive(Debug, Clone, PartialEq)]
pub struct Shape {
    pub outer: Contour,
    pub holes: Vec<Contour>,
}

/// Shoelace area; positive for counter-clockwise contours.
pub fn signed_area(contour: &[Vec2]) -> f32 {
    let n = contour.len();
    (0..n)
        .map(|i| contour[i].perp_dot(contour[(i + 1) % n]))
        .sum::<f32>()
        * 0.5
}

/// Even-odd point in polygon test.
pub fn contains_point(contour: &[Vec2], point: Vec2) -> bool {
    let n = contour.len();
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (a, b) = (contour[i], contour[j]);
        if (a.y > point.y) != (b.y > point.y)
            && point.x < (b.x - a.x) * (point.y - a.y) / (b.y - a.y) + a.x
        {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Groups flattened contours into shapes.
///
/// A contour nested inside an odd number of other contours is a hole of the
/// smallest contour enclosing it; everything else is an outer boundary. The
/// result does not depend on the winding the font author used.
pub fn build_shapes(contours: Vec<Contour>) -> Vec<Shape> {
    let areas: Vec<f32> = contours.iter().map(|c| signed_area(c).abs()).collect();
    let parents: Vec<Vec<usize>> = contours
        .iter()
        .enumerate()
        .map(|(i, contour)| {
            (0..contours.len())
                .filter(|&j| j != i && areas[j] > areas[i] && contains_point(&contours[j], contour[0]))
                .collect()
        })
        .collect();

    let is_hole: Vec<bool> = parents.iter().map(|p| p.len() % 2 == 1).collect();
    let mut shapes: Vec<Option<Shape>> = contours
        .iter()
        .enumerate()
        .map(|(i, contour)| {
            (!is_hole[i]).then(|| Shape {
                outer: with_winding(contour.clone(), true),
                holes: Vec::new(),
            })
        })
        .collect();

    for (i, contour) in contours.into_iter().enumerate() {
        if !is_hole[i] {
            continue;
        }
        let owner = parents[i]
            .iter()
            .copied()
            .filter(|&j| !is_hole[j])
            .min_by(|&a, &b| areas[a].total_cmp(&areas[b]));
        if let Some(shape) = owner.and_then(|j| shapes[j].as_mut()) {
            shape.holes.push(with_winding(contour, false));
        }
    }

    shapes.into_iter().flatten().collect()
}

fn with_winding(mut contour: Contour, counter_clockwise: bool) -> Contour {
    if (signed_area(&contour) > 0.0) != counter_clockwise {
        contour.reverse();
    }
    contour
}
