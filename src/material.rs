use std::sync::Arc;

use glam::Vec3;

use crate::config::{color_from_hex, GlyphMaterial};
use crate::environment::{EnvironmentMap, EnvironmentSlot};

/// Surface description attached to a mesh node.
#[derive(Debug, Clone)]
pub enum Material {
    /// Shiny, specular, non-metallic surface (Blinn-Phong).
    Phong {
        color: Vec3,
        specular: Vec3,
        shininess: f32,
        /// How strongly the environment tints the lit colour.
        reflectivity: f32,
        environment: Option<EnvironmentSlot>,
    },
    /// Metallic/roughness surface with optional emission.
    Standard {
        color: Vec3,
        roughness: f32,
        metalness: f32,
        emissive: Vec3,
        emissive_intensity: f32,
        environment: Option<EnvironmentSlot>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadingModel {
    Phong,
    Standard,
}

/// Snapshot of a material for one frame, with the environment looked up.
#[derive(Debug, Clone)]
pub struct ResolvedMaterial {
    pub model: ShadingModel,
    pub color: Vec3,
    pub specular: Vec3,
    pub shininess: f32,
    pub reflectivity: f32,
    pub roughness: f32,
    pub metalness: f32,
    /// Emissive colour already scaled by its intensity.
    pub emission: Vec3,
    pub environment: Option<Arc<EnvironmentMap>>,
}

impl Material {
    /// Material for a glyph preset, reading reflections from `slot`.
    pub fn for_glyph(preset: &GlyphMaterial, slot: &EnvironmentSlot) -> Self {
        match *preset {
            GlyphMaterial::Phong {
                color,
                specular,
                shininess,
            } => Self::Phong {
                color: color_from_hex(color),
                specular: color_from_hex(specular),
                shininess,
                reflectivity: 1.0,
                environment: Some(slot.clone()),
            },
            GlyphMaterial::Standard {
                color,
                roughness,
                metalness,
            } => Self::Standard {
                color: color_from_hex(color),
                roughness,
                metalness,
                emissive: Vec3::ZERO,
                emissive_intensity: 1.0,
                environment: Some(slot.clone()),
            },
        }
    }

    pub fn environment_slot(&self) -> Option<&EnvironmentSlot> {
        match self {
            Self::Phong { environment, .. } | Self::Standard { environment, .. } => {
                environment.as_ref()
            }
        }
    }

    pub fn resolve(&self) -> ResolvedMaterial {
        let environment = self.environment_slot().and_then(EnvironmentSlot::get);
        match *self {
            Self::Phong {
                color,
                specular,
                shininess,
                reflectivity,
                ..
            } => ResolvedMaterial {
                model: ShadingModel::Phong,
                color,
                specular,
                shininess,
                reflectivity,
                roughness: 1.0,
                metalness: 0.0,
                emission: Vec3::ZERO,
                environment,
            },
            Self::Standard {
                color,
                roughness,
                metalness,
                emissive,
                emissive_intensity,
                ..
            } => ResolvedMaterial {
                model: ShadingModel::Standard,
                color,
                specular: Vec3::ONE,
                shininess: 0.0,
                reflectivity: 0.0,
                roughness,
                metalness,
                emission: emissive * emissive_intensity,
                environment,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::Mapping;

    #[test]
    fn environment_installed_later_is_seen_at_resolve_time() {
        let slot = EnvironmentSlot::new();
        let preset = GlyphMaterial::Standard {
            color: 0x06d2d7,
            roughness: 0.2,
            metalness: 1.0,
        };
        let material = Material::for_glyph(&preset, &slot);
        assert!(material.resolve().environment.is_none());

        slot.install(EnvironmentMap {
            width: 1,
            height: 1,
            pixels: vec![1.0, 1.0, 1.0],
            mapping: Mapping::EquirectangularReflection,
        });
        assert!(material.resolve().environment.is_some());
    }

    #[test]
    fn emission_is_scaled_by_intensity() {
        let material = Material::Standard {
            color: Vec3::ONE,
            roughness: 1.0,
            metalness: 0.0,
            emissive: Vec3::ONE,
            emissive_intensity: 5.0,
            environment: None,
        };
        let resolved = material.resolve();
        assert_eq!(resolved.emission, Vec3::splat(5.0));
        assert_eq!(resolved.model, ShadingModel::Standard);
    }

    #[test]
    fn phong_preset_keeps_specular_colour() {
        let slot = EnvironmentSlot::new();
        let preset = GlyphMaterial::Phong {
            color: 0xf92d28,
            specular: 0xffffff,
            shininess: 30.0,
        };
        let resolved = Material::for_glyph(&preset, &slot).resolve();
        assert_eq!(resolved.model, ShadingModel::Phong);
        assert_eq!(resolved.specular, Vec3::ONE);
        assert!(resolved.color.x > resolved.color.y);
    }
}
