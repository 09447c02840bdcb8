//! Typeface documents in the JSON layout produced by the `facetype.js`
//! converter: one outline string per glyph, in font units.

use std::collections::HashMap;

use glam::Vec2;
use serde::Deserialize;

use crate::error::{LoadError, LoadResult};

/// Glyph used when the text asks for a character the typeface lacks.
const FALLBACK_GLYPH: char = '?';

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Typeface {
    #[serde(rename = "familyName", default)]
    pub family_name: String,
    pub resolution: f32,
    #[serde(rename = "boundingBox", default)]
    pub bounding_box: BoundingBox,
    #[serde(rename = "underlineThickness", default)]
    pub underline_thickness: f32,
    #[serde(rename = "underlinePosition", default)]
    pub underline_position: f32,
    glyphs: HashMap<String, GlyphData>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
pub struct BoundingBox {
    #[serde(rename = "xMin", default)]
    pub x_min: f32,
    #[serde(rename = "xMax", default)]
    pub x_max: f32,
    #[serde(rename = "yMin", default)]
    pub y_min: f32,
    #[serde(rename = "yMax", default)]
    pub y_max: f32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct GlyphData {
    /// Horizontal advance.
    ha: f32,
    #[serde(default)]
    o: Option<String>,
}

/// Closed polyline of a glyph outline, already scaled and offset.
pub type Contour = Vec<Vec2>;

impl Typeface {
    pub fn from_json_slice(bytes: &[u8]) -> LoadResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn from_json_str(text: &str) -> LoadResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn glyph_count(&self) -> usize {
        self.glyphs.len()
    }

    pub fn has_glyph(&self, ch: char) -> bool {
        self.glyph(ch).is_some()
    }

    fn glyph(&self, ch: char) -> Option<&GlyphData> {
        let mut buf = [0u8; 4];
        self.glyphs.get(&*ch.encode_utf8(&mut buf))
    }

    /// Lays out `text` at the given size and returns every outline contour.
    ///
    /// Characters advance left to right; `\n` starts a new line below.
    /// Curves are flattened into `curve_segments` straight segments.
    pub fn layout(&self, text: &str, size: f32, curve_segments: usize) -> LoadResult<Vec<Contour>> {
        let scale = size / self.resolution;
        let line_height =
            (self.bounding_box.y_max - self.bounding_box.y_min + self.underline_thickness) * scale;

        let mut contours = Vec::new();
        let mut offset = Vec2::ZERO;
        for ch in text.chars() {
            if ch == '\n' {
                offset.x = 0.0;
                offset.y -= line_height;
                continue;
            }
            let Some((glyph_char, glyph)) = self
                .glyph(ch)
                .map(|glyph| (ch, glyph))
                .or_else(|| self.glyph(FALLBACK_GLYPH).map(|glyph| (FALLBACK_GLYPH, glyph)))
            else {
                log::warn!("typeface {:?} has no glyph for {ch:?}", self.family_name);
                continue;
            };
            if let Some(outline) = glyph.o.as_deref() {
                contours.extend(parse_outline(glyph_char, outline, scale, offset, curve_segments)?);
            }
            offset.x += glyph.ha * scale;
        }
        Ok(contours)
    }
}

/// Turns an outline command string into flattened contours.
///
/// Commands are `m x y`, `l x y`, `q x y cx cy` and `b x y c1x c1y c2x c2y`,
/// with the end point listed before the control points.
fn parse_outline(
    glyph: char,
    outline: &str,
    scale: f32,
    offset: Vec2,
    curve_segments: usize,
) -> LoadResult<Vec<Contour>> {
    let mut tokens = outline.split_whitespace();
    let mut contours: Vec<Contour> = Vec::new();
    let mut current: Contour = Vec::new();
    let segments = curve_segments.max(1);

    let invalid = |reason: String| LoadError::InvalidOutline { glyph, reason };
    let point = |tokens: &mut std::str::SplitWhitespace<'_>| -> LoadResult<Vec2> {
        let mut coordinate = || -> LoadResult<f32> {
            let token = tokens
                .next()
                .ok_or_else(|| invalid("missing coordinate".to_string()))?;
            token
                .parse::<f32>()
                .map_err(|err| invalid(format!("bad coordinate {token:?}: {err}")))
        };
        let x = coordinate()?;
        let y = coordinate()?;
        Ok(Vec2::new(x, y) * scale + offset)
    };

    while let Some(command) = tokens.next() {
        match command {
            "m" => {
                finish_contour(&mut contours, std::mem::take(&mut current));
                current.push(point(&mut tokens)?);
            }
            "l" => {
                let to = point(&mut tokens)?;
                current.push(to);
            }
            "q" => {
                let to = point(&mut tokens)?;
                let control = point(&mut tokens)?;
                let from = *current
                    .last()
                    .ok_or_else(|| invalid("curve without a start point".to_string()))?;
                for step in 1..=segments {
                    let t = step as f32 / segments as f32;
                    current.push(quadratic(from, control, to, t));
                }
            }
            "b" => {
                let to = point(&mut tokens)?;
                let control_a = point(&mut tokens)?;
                let control_b = point(&mut tokens)?;
                let from = *current
                    .last()
                    .ok_or_else(|| invalid("curve without a start point".to_string()))?;
                for step in 1..=segments {
                    let t = step as f32 / segments as f32;
                    current.push(cubic(from, control_a, control_b, to, t));
                }
            }
            "z" => finish_contour(&mut contours, std::mem::take(&mut current)),
            other => return Err(invalid(format!("unknown command {other:?}"))),
        }
    }
    finish_contour(&mut contours, current);
    Ok(contours)
}

fn finish_contour(contours: &mut Vec<Contour>, mut contour: Contour) {
    contour.dedup_by(|a, b| a.distance_squared(*b) <= f32::EPSILON);
    while contour.len() > 1
        && contour[0].distance_squared(contour[contour.len() - 1]) <= f32::EPSILON
    {
        contour.pop();
    }
    if contour.len() >= 3 {
        contours.push(contour);
    }
}

fn quadratic(p0: Vec2, p1: Vec2, p2: Vec2, t: f32) -> Vec2 {
    let k = 1.0 - t;
    p0 * (k * k) + p1 * (2.0 * k * t) + p2 * (t * t)
}

fn cubic(p0: Vec2, p1: Vec2, p2: Vec2, p3: Vec2, t: f32) -> Vec2 {
    let k = 1.0 - t;
    p0 * (k * k * k) + p1 * (3.0 * k * k * t) + p2 * (3.0 * k * t * t) + p3 * (t * t * t)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Square `I`, square `O` with a square hole, a curved `D`, and a space.
    pub(crate) const SAMPLE_TYPEFACE: &str = r#"{
        "familyName": "Sample",
        "resolution": 1000,
        "underlineThickness": 50,
        "underlinePosition": -100,
        "boundingBox": { "xMin": 0, "xMax": 1000, "yMin": -200, "yMax": 1000 },
        "glyphs": {
            "I": { "ha": 400, "x_min": 0, "x_max": 300, "o": "m 0 0 l 300 0 l 300 1000 l 0 1000 z" },
            "O": { "ha": 1100, "x_min": 0, "x_max": 1000,
                   "o": "m 0 0 l 1000 0 l 1000 1000 l 0 1000 z m 250 250 l 250 750 l 750 750 l 750 250 z" },
            "D": { "ha": 900, "x_min": 0, "x_max": 800,
                   "o": "m 0 0 l 400 0 q 800 500 800 0 q 400 1000 800 1000 l 0 1000 z" },
            "?": { "ha": 500, "x_min": 0, "x_max": 400, "o": "m 0 0 l 400 0 l 400 400 z" },
            " ": { "ha": 300 }
        }
    }"#;

    fn sample() -> Typeface {
        Typeface::from_json_str(SAMPLE_TYPEFACE).unwrap()
    }

    #[test]
    fn parses_metadata_and_glyphs() {
        let face = sample();
        assert_eq!(face.family_name, "Sample");
        assert_eq!(face.glyph_count(), 5);
        assert!(face.has_glyph('O'));
        assert!(!face.has_glyph('Z'));
    }

    #[test]
    fn layout_scales_and_advances() {
        let contours = sample().layout("II", 2.0, 12).unwrap();
        assert_eq!(contours.len(), 2);
        assert!(contours[0][2].abs_diff_eq(Vec2::new(0.6, 2.0), 1e-6));
        // second glyph starts one advance (400 units at 2/1000) to the right
        assert!(contours[1][0].abs_diff_eq(Vec2::new(0.8, 0.0), 1e-6));
    }

    #[test]
    fn curves_are_flattened() {
        let contours = sample().layout("D", 1.0, 4).unwrap();
        assert_eq!(contours.len(), 1);
        // start, line end, 4 + 4 curve points, last line
        assert_eq!(contours[0].len(), 1 + 1 + 4 + 4 + 1);
        assert!(contours[0].iter().all(|p| p.x <= 0.8 + 1e-6));
    }

    #[test]
    fn hole_glyph_yields_two_contours() {
        let contours = sample().layout("O", 1.0, 12).unwrap();
        assert_eq!(contours.len(), 2);
    }

    #[test]
    fn missing_glyphs_fall_back_and_spaces_only_advance() {
        let contours = sample().layout("Z I", 1.0, 12).unwrap();
        assert_eq!(contours.len(), 2);
        // '?' advance 500 plus space 300
        assert!((contours[1][0].x - 0.8).abs() < 1e-6);
    }

    #[test]
    fn newline_moves_down_one_line() {
        let contours = sample().layout("I\nI", 1.0, 12).unwrap();
        assert!((contours[1][0].y + 1.25).abs() < 1e-6);
        assert_eq!(contours[1][0].x, 0.0);
    }

    #[test]
    fn malformed_outline_is_an_error() {
        let face = Typeface::from_json_str(
            r#"{ "resolution": 1000, "glyphs": { "X": { "ha": 1, "o": "m 0 zero" } } }"#,
        )
        .unwrap();
        let err = face.layout("X", 1.0, 12).unwrap_err();
        assert!(matches!(err, LoadError::InvalidOutline { glyph: 'X', .. }));
    }

    #[test]
    fn invalid_json_is_a_typeface_error() {
        assert!(matches!(
            Typeface::from_json_str("{").unwrap_err(),
            LoadError::Typeface(_)
        ));
    }
}
