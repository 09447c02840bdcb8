use std::sync::Arc;

use glam::Vec3;
use image::ImageFormat;
use parking_lot::RwLock;

use crate::error::LoadResult;

/// How a texture is projected when sampled as an environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mapping {
    #[default]
    Uv,
    EquirectangularReflection,
}

/// Decoded high dynamic range image in linear RGB.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvironmentMap {
    pub width: u32,
    pub height: u32,
    /// Row-major RGB triplets, top row first.
    pub pixels: Vec<f32>,
    pub mapping: Mapping,
}

impl EnvironmentMap {
    /// Decodes a Radiance `.hdr` file.
    pub fn from_hdr_bytes(bytes: &[u8]) -> LoadResult<Self> {
        let image = image::load_from_memory_with_format(bytes, ImageFormat::Hdr)?.into_rgb32f();
        let (width, height) = image.dimensions();
        Ok(Self {
            width,
            height,
            pixels: image.into_raw(),
            mapping: Mapping::Uv,
        })
    }

    pub fn with_mapping(mut self, mapping: Mapping) -> Self {
        self.mapping = mapping;
        self
    }

    pub fn texel(&self, x: u32, y: u32) -> Vec3 {
        let index = ((y * self.width + x) * 3) as usize;
        Vec3::from_slice(&self.pixels[index..index + 3])
    }

    /// Box-filters the map by powers of two until both sides fit in
    /// `max_dimension`.
    pub fn fit_within(&self, max_dimension: u32) -> EnvironmentMap {
        let mut factor = 1;
        while self.width / factor > max_dimension || self.height / factor > max_dimension {
            factor *= 2;
        }
        if factor == 1 {
            return self.clone();
        }

        let width = (self.width / factor).max(1);
        let height = (self.height / factor).max(1);
        let mut pixels = Vec::with_capacity((width * height * 3) as usize);
        for y in 0..height {
            for x in 0..width {
                let mut sum = Vec3::ZERO;
                let mut count = 0.0;
                for sy in y * factor..((y + 1) * factor).min(self.height) {
                    for sx in x * factor..((x + 1) * factor).min(self.width) {
                        sum += self.texel(sx, sy);
                        count += 1.0;
                    }
                }
                pixels.extend_from_slice(&(sum / count).to_array());
            }
        }
        EnvironmentMap {
            width,
            height,
            pixels,
            mapping: self.mapping,
        }
    }

    /// Packs the pixels into RGB9E5 texels ready for upload.
    pub fn to_rgb9e5(&self) -> Vec<u32> {
        self.pixels
            .chunks_exact(3)
            .map(|rgb| pack_rgb9e5(Vec3::new(rgb[0], rgb[1], rgb[2])))
            .collect()
    }
}

const MANTISSA_BITS: i32 = 9;
const EXPONENT_BIAS: i32 = 15;
const MAX_EXPONENT: i32 = 31;

fn rgb9e5_max() -> f32 {
    let mantissa_values = (1 << MANTISSA_BITS) as f32;
    (mantissa_values - 1.0) / mantissa_values * 2f32.powi(MAX_EXPONENT - EXPONENT_BIAS)
}

/// Encodes a linear colour as a shared-exponent `RGB9E5` texel.
pub fn pack_rgb9e5(color: Vec3) -> u32 {
    let max = rgb9e5_max();
    let color = color.clamp(Vec3::ZERO, Vec3::splat(max));
    let largest = color.max_element();

    let mut exponent = (largest.log2().floor() as i32).max(-EXPONENT_BIAS - 1) + 1 + EXPONENT_BIAS;
    let scale = |exponent: i32| 2f32.powi(exponent - EXPONENT_BIAS - MANTISSA_BITS);
    if (largest / scale(exponent) + 0.5).floor() as i32 == 1 << MANTISSA_BITS {
        exponent += 1;
    }

    let quantize = |value: f32| (value / scale(exponent) + 0.5).floor() as u32;
    quantize(color.x)
        | (quantize(color.y) << 9)
        | (quantize(color.z) << 18)
        | ((exponent as u32) << 27)
}

/// Decodes a texel produced by [`pack_rgb9e5`].
pub fn unpack_rgb9e5(texel: u32) -> Vec3 {
    let exponent = (texel >> 27) as i32;
    let scale = 2f32.powi(exponent - EXPONENT_BIAS - MANTISSA_BITS);
    Vec3::new(
        (texel & 0x1ff) as f32,
        ((texel >> 9) & 0x1ff) as f32,
        ((texel >> 18) & 0x1ff) as f32,
    ) * scale
}

/// Shared cell holding the scene's environment map.
///
/// Materials keep a clone of the slot and look the map up when a frame is
/// drawn, so the map may arrive before or after they were created.
#[derive(Debug, Clone, Default)]
pub struct EnvironmentSlot {
    inner: Arc<RwLock<SlotState>>,
}

#[derive(Debug, Default)]
struct SlotState {
    map: Option<Arc<EnvironmentMap>>,
    generation: u64,
}

impl EnvironmentSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a new map and bumps the generation counter.
    pub fn install(&self, map: EnvironmentMap) {
        let mut state = self.inner.write();
        state.map = Some(Arc::new(map));
        state.generation += 1;
    }

    pub fn get(&self) -> Option<Arc<EnvironmentMap>> {
        self.inner.read().map.clone()
    }

    pub fn is_set(&self) -> bool {
        self.inner.read().map.is_some()
    }

    /// Increases every time a map is installed; zero while empty.
    pub fn generation(&self) -> u64 {
        self.inner.read().generation
    }

    pub fn same_slot(&self, other: &EnvironmentSlot) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::LoadError;

    /// Builds an uncompressed Radiance file; scanlines narrower than eight
    /// pixels are always stored flat.
    pub(crate) fn tiny_hdr(width: u32, height: u32, rgbe: [u8; 4]) -> Vec<u8> {
        let mut bytes = format!("#?RADIANCE\nFORMAT=32-bit_rle_rgbe\n\n-Y {height} +X {width}\n")
            .into_bytes();
        for _ in 0..width * height {
            bytes.extend_from_slice(&rgbe);
        }
        bytes
    }

    #[test]
    fn decodes_flat_radiance_file() {
        // mantissa 128 with exponent 129 encodes 1.0
        let map = EnvironmentMap::from_hdr_bytes(&tiny_hdr(2, 1, [128, 128, 128, 129])).unwrap();
        assert_eq!((map.width, map.height), (2, 1));
        assert_eq!(map.pixels.len(), 6);
        let texel = map.texel(1, 0);
        assert!((texel - Vec3::ONE).abs().max_element() < 0.01, "{texel}");
        assert_eq!(map.mapping, Mapping::Uv);
    }

    #[test]
    fn fit_within_averages_blocks() {
        let map = EnvironmentMap {
            width: 4,
            height: 2,
            pixels: vec![
                1.0, 1.0, 1.0, 3.0, 3.0, 3.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, //
                1.0, 1.0, 1.0, 3.0, 3.0, 3.0, 4.0, 4.0, 4.0, 4.0, 4.0, 4.0,
            ],
            mapping: Mapping::EquirectangularReflection,
        };
        let small = map.fit_within(2);
        assert_eq!((small.width, small.height), (2, 1));
        assert_eq!(small.texel(0, 0), Vec3::splat(2.0));
        assert_eq!(small.texel(1, 0), Vec3::splat(2.0));
        assert_eq!(small.mapping, Mapping::EquirectangularReflection);
        assert_eq!(map.fit_within(8), map);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(EnvironmentMap::from_hdr_bytes(b"not an image").is_err());
    }

    #[test]
    fn leading_run_length_marker_is_rejected() {
        // rgb 1,1,1 is the old-style repeat marker and cannot start a scanline
        let err = EnvironmentMap::from_hdr_bytes(&tiny_hdr(2, 2, [1, 1, 1, 128])).unwrap_err();
        assert!(matches!(err, LoadError::Hdr(_)), "{err}");
        assert!(EnvironmentMap::from_hdr_bytes(&tiny_hdr(2, 2, [10, 20, 30, 128])).is_ok());
    }

    #[test]
    fn rgb9e5_keeps_hdr_values() {
        for color in [
            Vec3::new(1.0, 0.5, 0.25),
            Vec3::new(12.0, 3.0, 0.1),
            Vec3::new(0.02, 0.03, 0.04),
        ] {
            let decoded = unpack_rgb9e5(pack_rgb9e5(color));
            let error = (decoded - color).abs().max_element() / color.max_element();
            assert!(error < 0.01, "{color} decoded as {decoded}");
        }
    }

    #[test]
    fn rgb9e5_clamps_negative_and_zero() {
        assert_eq!(unpack_rgb9e5(pack_rgb9e5(Vec3::ZERO)), Vec3::ZERO);
        assert_eq!(unpack_rgb9e5(pack_rgb9e5(Vec3::splat(-4.0))), Vec3::ZERO);
    }

    #[test]
    fn slot_is_shared_between_clones() {
        let slot = EnvironmentSlot::new();
        let material_view = slot.clone();
        assert!(!material_view.is_set());
        assert_eq!(material_view.generation(), 0);

        let map = EnvironmentMap {
            width: 1,
            height: 1,
            pixels: vec![0.5, 0.5, 0.5],
            mapping: Mapping::EquirectangularReflection,
        };
        slot.install(map);

        assert!(material_view.is_set());
        assert_eq!(material_view.generation(), 1);
        assert!(material_view.same_slot(&slot));
        assert_eq!(
            material_view.get().unwrap().mapping,
            Mapping::EquirectangularReflection
        );
    }
}
