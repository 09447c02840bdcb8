use std::path::Path;

use anyhow::{Context, Result};
use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Every tunable constant of the viewer.
///
/// `Default` reproduces the stock scene; a JSON file may override any subset
/// of the fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub assets: AssetConfig,
    pub camera: CameraConfig,
    pub glyphs: Vec<GlyphSpec>,
    pub cube: CubeConfig,
    pub light: LightConfig,
    pub bloom: BloomConfig,
    pub controls: ControlConfig,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            assets: AssetConfig::default(),
            camera: CameraConfig::default(),
            glyphs: default_glyphs(),
            cube: CubeConfig::default(),
            light: LightConfig::default(),
            bloom: BloomConfig::default(),
            controls: ControlConfig::default(),
        }
    }
}

impl ViewerConfig {
    /// Reads a JSON override file. Missing fields keep their defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("unable to read config {}", path.display()))?;
        Self::from_json_str(&text)
            .with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Locations of the two fetched resources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetConfig {
    pub environment: String,
    pub typeface: String,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            environment: "public/nighttime.hdr".to_string(),
            typeface: "https://threejs.org/examples/fonts/helvetiker_regular.typeface.json"
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Vertical field of view in degrees.
    pub fov: f32,
    pub near: f32,
    pub far: f32,
    pub position: Vec3,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov: 75.0,
            near: 0.1,
            far: 1000.0,
            position: Vec3::new(0.0, 0.0, 5.0),
        }
    }
}

/// One extruded text mesh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlyphSpec {
    pub text: String,
    pub size: f32,
    pub depth: f32,
    pub position: Vec3,
    pub material: GlyphMaterial,
}

/// Material presets for the glyphs. Colours are `0xRRGGBB`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GlyphMaterial {
    Phong {
        color: u32,
        specular: u32,
        shininess: f32,
    },
    Standard {
        color: u32,
        roughness: f32,
        metalness: f32,
    },
}

fn default_glyphs() -> Vec<GlyphSpec> {
    vec![
        GlyphSpec {
            text: "N".to_string(),
            size: 1.0,
            depth: 0.2,
            position: Vec3::new(-2.0, 0.0, 0.0),
            material: GlyphMaterial::Phong {
                color: 0xf92d28,
                specular: 0xffffff,
                shininess: 30.0,
            },
        },
        GlyphSpec {
            text: "1".to_string(),
            size: 1.0,
            depth: 0.1,
            position: Vec3::new(1.0, 0.0, 0.0),
            material: GlyphMaterial::Standard {
                color: 0x06d2d7,
                roughness: 0.2,
                metalness: 1.0,
            },
        },
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CubeConfig {
    pub edge: f32,
    pub scale: f32,
    pub color: u32,
    pub emissive: u32,
    pub emissive_intensity: f32,
}

impl Default for CubeConfig {
    fn default() -> Self {
        Self {
            edge: 0.5,
            scale: 0.4,
            color: 0xffffff,
            emissive: 0xffffff,
            emissive_intensity: 5.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightConfig {
    pub color: u32,
    pub intensity: f32,
    pub distance: f32,
    pub decay: f32,
}

impl Default for LightConfig {
    fn default() -> Self {
        Self {
            color: 0xffffff,
            intensity: 10.0,
            distance: 1000.0,
            decay: 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BloomConfig {
    pub strength: f32,
    pub radius: f32,
    pub threshold: f32,
}

impl Default for BloomConfig {
    fn default() -> Self {
        Self {
            strength: 5.0,
            radius: 0.1,
            threshold: 0.85,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Translation applied per key press.
    pub step: f32,
    /// Maximum absolute rotation change per frame and axis.
    pub jitter: f32,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            step: 0.1,
            jitter: 0.005,
        }
    }
}

/// Converts a packed `0xRRGGBB` colour into linear RGB.
pub fn color_from_hex(hex: u32) -> Vec3 {
    let channel = |shift: u32| srgb_to_linear(((hex >> shift) & 0xff) as f32 / 255.0);
    Vec3::new(channel(16), channel(8), channel(0))
}

fn srgb_to_linear(value: f32) -> f32 {
    if value <= 0.04045 {
        value / 12.92
    } else {
        ((value + 0.055) / 1.055).powf(2.4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn white_stays_white_in_linear_space() {
        assert_eq!(color_from_hex(0xffffff), Vec3::ONE);
        assert_eq!(color_from_hex(0x000000), Vec3::ZERO);
    }

    #[test]
    fn partial_override_keeps_defaults() {
        let config = ViewerConfig::from_json_str(r#"{ "bloom": { "strength": 2.0 } }"#).unwrap();
        assert_eq!(config.bloom.strength, 2.0);
        assert_eq!(config.bloom.threshold, 0.85);
        assert_eq!(config.camera.fov, 75.0);
        assert_eq!(config.glyphs.len(), 2);
    }

    #[test]
    fn glyph_material_is_tagged() {
        let spec: GlyphSpec = serde_json::from_str(
            r#"{ "text": "A", "size": 2.0, "depth": 0.5, "position": [0.0, 1.0, 0.0],
                 "material": { "kind": "standard", "color": 255, "roughness": 0.5, "metalness": 0.0 } }"#,
        )
        .unwrap();
        assert!(matches!(spec.material, GlyphMaterial::Standard { .. }));
        assert_eq!(spec.position, Vec3::Y);
    }
}
