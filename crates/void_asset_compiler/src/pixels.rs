//! Per-pixel texture conversions
//!
//! Embedded textures of an imported model are decoded, converted to the
//! metallic/roughness conventions the runtime expects and written beside the
//! source as PNG.

use crate::error::{CompileError, CompileResult};
use crate::material::{embedded_texture_name, metallic_from_specular_color, ImportedTexture, TextureSemantic};
use crate::scene::{EmbeddedData, EmbeddedTexture};
use glam::Vec3;
use image::{DynamicImage, ImageFormat, RgbaImage};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use void_asset::{atomic_write_bytes, ConversionThresholds};

/// Conversion applied to every pixel of a texture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelTransform {
    SpecularToMetallic,
    GlossToRoughness,
    SpecularToRoughness,
    /// R = 1, G = roughness, B = metallic
    SpecularToMetallicRoughness,
    /// Blue channel as grayscale
    ExtractMetallic,
    /// Green channel as grayscale
    ExtractRoughness,
    Invert,
}

/// Transform for a texture semantic
///
/// Semantic conversions win over the inverse flag; a plain inverse becomes
/// [`PixelTransform::Invert`].
pub fn transform_for(semantic: TextureSemantic, inverse: bool) -> Option<PixelTransform> {
    match semantic {
        TextureSemantic::SpecularToMetallicRoughness => Some(PixelTransform::SpecularToMetallicRoughness),
        TextureSemantic::GlossToRoughness => Some(PixelTransform::GlossToRoughness),
        TextureSemantic::SpecularToRoughness => Some(PixelTransform::SpecularToRoughness),
        TextureSemantic::SpecularToMetallic => Some(PixelTransform::SpecularToMetallic),
        TextureSemantic::ExtractMetallic => Some(PixelTransform::ExtractMetallic),
        TextureSemantic::ExtractRoughness => Some(PixelTransform::ExtractRoughness),
        _ if inverse => Some(PixelTransform::Invert),
        _ => None,
    }
}

impl PixelTransform {
    /// Apply to one normalized RGBA pixel
    pub fn apply(self, [r, g, b, a]: [f32; 4], thresholds: &ConversionThresholds) -> [f32; 4] {
        match self {
            Self::SpecularToMetallic => {
                let metallic = metallic_from_specular_color(Vec3::new(r, g, b), thresholds);
                [metallic, metallic, metallic, 1.0]
            }
            Self::GlossToRoughness => {
                if (r - g).abs() < 0.01 && (g - b).abs() < 0.01 {
                    let roughness = 1.0 - r;
                    [roughness, roughness, roughness, a]
                } else if a < 1.0 {
                    [r, g, b, 1.0 - a]
                } else {
                    [r, 1.0 - g, b, a]
                }
            }
            Self::SpecularToRoughness => {
                let roughness = roughness_from_specular(r, g, b, a);
                [roughness, roughness, roughness, 1.0]
            }
            Self::SpecularToMetallicRoughness => {
                let metallic = metallic_from_specular_color(Vec3::new(r, g, b), thresholds);
                [1.0, roughness_from_specular(r, g, b, a), metallic, 1.0]
            }
            Self::ExtractMetallic => [b, b, b, 1.0],
            Self::ExtractRoughness => [g, g, g, 1.0],
            Self::Invert => [1.0 - r, 1.0 - g, 1.0 - b, 1.0 - a],
        }
    }

    /// Apply to every pixel of `image` in place
    ///
    /// Grayscale images feed their luminance to all three color channels and
    /// keep the red result. Formats other than 8-bit L, LA, RGB and RGBA are
    /// converted to RGBA8 first.
    pub fn apply_to_image(self, image: &mut DynamicImage, thresholds: &ConversionThresholds) {
        match image {
            DynamicImage::ImageLuma8(buffer) => {
                for pixel in buffer.pixels_mut() {
                    let l = to_unit(pixel[0]);
                    let [r, ..] = self.apply([l, l, l, 1.0], thresholds);
                    pixel[0] = to_byte(r);
                }
            }
            DynamicImage::ImageLumaA8(buffer) => {
                for pixel in buffer.pixels_mut() {
                    let l = to_unit(pixel[0]);
                    let [r, _, _, a] = self.apply([l, l, l, to_unit(pixel[1])], thresholds);
                    pixel[0] = to_byte(r);
                    pixel[1] = to_byte(a);
                }
            }
            DynamicImage::ImageRgb8(buffer) => {
                for pixel in buffer.pixels_mut() {
                    let [r, g, b, _] = self.apply(
                        [to_unit(pixel[0]), to_unit(pixel[1]), to_unit(pixel[2]), 1.0],
                        thresholds,
                    );
                    pixel.0 = [to_byte(r), to_byte(g), to_byte(b)];
                }
            }
            DynamicImage::ImageRgba8(buffer) => transform_rgba(self, buffer, thresholds),
            other => {
                let mut buffer = other.to_rgba8();
                transform_rgba(self, &mut buffer, thresholds);
                *other = DynamicImage::ImageRgba8(buffer);
            }
        }
    }
}

fn transform_rgba(transform: PixelTransform, buffer: &mut RgbaImage, thresholds: &ConversionThresholds) {
    for pixel in buffer.pixels_mut() {
        let out = transform.apply(pixel.0.map(to_unit), thresholds);
        pixel.0 = out.map(to_byte);
    }
}

/// Alpha carries gloss when it isn't opaque, otherwise intensity does
fn roughness_from_specular(r: f32, g: f32, b: f32, a: f32) -> f32 {
    if a < 1.0 {
        1.0 - a
    } else {
        1.0 - (r + g + b) / 3.0
    }
}

fn to_unit(value: u8) -> f32 {
    value as f32 / 255.0
}

fn to_byte(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0) as u8
}

/// Decode an embedded texture payload
pub fn decode_embedded(texture: &EmbeddedTexture) -> CompileResult<DynamicImage> {
    match &texture.data {
        EmbeddedData::Encoded(bytes) => Ok(image::load_from_memory(bytes)?),
        EmbeddedData::Rgba8 { width, height, pixels } => RgbaImage::from_raw(*width, *height, pixels.clone())
            .map(DynamicImage::ImageRgba8)
            .ok_or_else(|| {
                CompileError::Import(format!(
                    "embedded texture {}x{} has {} bytes",
                    width,
                    height,
                    pixels.len()
                ))
            }),
    }
}

/// Encode as PNG and commit atomically
pub fn write_png(image: &DynamicImage, destination: &Path) -> CompileResult<()> {
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    atomic_write_bytes(destination, &bytes)?;
    Ok(())
}

/// File name for an embedded texture no material referenced
fn unreferenced_name(texture: &EmbeddedTexture, index: usize, file: &str) -> String {
    texture
        .file_name
        .as_deref()
        .and_then(|name| Path::new(name).file_stem())
        .and_then(|stem| stem.to_str())
        .map(|stem| format!("{}.png", stem))
        .unwrap_or_else(|| embedded_texture_name(index, "Texture", file))
}

/// Convert and write every embedded texture of a scene into `output_dir`
///
/// Every distinct reference to an embedded index is written under its own
/// name with its own conversion. An index no material referenced is written
/// once unconverted. A texture that fails to decode is logged and skipped.
pub fn write_embedded_textures(
    textures: &[EmbeddedTexture],
    imported: &[ImportedTexture],
    file: &str,
    output_dir: &Path,
    thresholds: &ConversionThresholds,
) -> Vec<PathBuf> {
    let mut written = Vec::new();
    for (index, texture) in textures.iter().enumerate() {
        let mut outputs: Vec<(String, Option<PixelTransform>)> = imported
            .iter()
            .filter(|t| t.embedded_index == Some(index))
            .map(|t| (t.name.clone(), transform_for(t.semantic, t.inverse)))
            .collect();
        if outputs.is_empty() {
            outputs.push((unreferenced_name(texture, index, file), None));
        }

        let decoded = match decode_embedded(texture) {
            Ok(image) => image,
            Err(e) => {
                log::error!("Failed to decode embedded texture {} of {}: {}", index, file, e);
                continue;
            }
        };

        for (name, transform) in outputs {
            let destination = output_dir.join(&name);
            let mut image = decoded.clone();
            if let Some(transform) = transform {
                transform.apply_to_image(&mut image, thresholds);
                log::trace!("Applied {:?} conversion to {}", transform, name);
            }
            match write_png(&image, &destination) {
                Ok(()) => written.push(destination),
                Err(e) => log::error!("Failed to write embedded texture {}: {}", destination.display(), e),
            }
        }
    }
    written
}
