//! Color space capability consumed by paint devices
//!
//! A color space describes how a pixel is laid out in bytes and how it is
//! converted and composited. The engine only talks to the [`ColorSpace`]
//! trait; concrete spaces are `'static` singletons so devices hold a plain
//! reference instead of owning an instance.
//!
//! Every space exchanges color through normalized straight-alpha RGBA
//! (`[f32; 4]`), which is the pivot for conversion and compositing.

mod spaces;
mod value;

use serde::{Deserialize, Serialize};

pub use spaces::{ALPHA8, Alpha8, RGBA8, RGBAF32, Rgba8, RgbaF32};
pub use value::Color;

/// How out-of-gamut colors are brought into a destination space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RenderingIntent {
    /// Compress out-of-range colors, preserving hue
    #[default]
    Perceptual,
    /// Clip each channel independently
    RelativeColorimetric,
    /// Clip each channel independently
    Saturation,
    /// Clip each channel independently
    AbsoluteColorimetric,
}

/// Target encoding for 8-bit RGBA interchange rasters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputProfile {
    /// Nominal values, unchanged
    #[default]
    Srgb,
    /// sRGB transfer curve removed from the color channels
    Linear,
}

/// Pixel compositing operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CompositeOp {
    /// Source over destination
    #[default]
    Over,
    /// Remove destination alpha in proportion to source alpha
    Erase,
    /// Replace destination, interpolated by opacity
    Copy,
}

/// Pixel byte layout, conversion and compositing strategy.
pub trait ColorSpace: Send + Sync + std::fmt::Debug {
    /// Stable identifier, also used by persistence
    fn id(&self) -> &'static str;

    /// Bytes per pixel
    fn pixel_size(&self) -> usize;

    fn channel_count(&self) -> usize;

    fn has_alpha(&self) -> bool;

    /// Whether values above 1.0 are representable
    fn is_hdr(&self) -> bool {
        false
    }

    /// Decode one pixel to straight-alpha RGBA
    fn to_rgba(&self, pixel: &[u8]) -> [f32; 4];

    /// Encode straight-alpha RGBA into one pixel
    fn from_rgba(&self, rgba: [f32; 4], pixel: &mut [u8]);

    /// Space that rendered dabs use before compositing into this one
    fn composition_source(&self) -> &'static dyn ColorSpace;

    fn opacity(&self, pixel: &[u8]) -> f32 {
        self.to_rgba(pixel)[3]
    }

    fn set_opacity(&self, pixel: &mut [u8], opacity: f32) {
        let mut rgba = self.to_rgba(pixel);
        rgba[3] = opacity.clamp(0.0, 1.0);
        self.from_rgba(rgba, pixel);
    }

    fn multiply_opacity(&self, pixel: &mut [u8], factor: f32) {
        let mut rgba = self.to_rgba(pixel);
        rgba[3] = (rgba[3] * factor).clamp(0.0, 1.0);
        self.from_rgba(rgba, pixel);
    }

    /// Composite a source color onto `dst` in place
    fn composite(&self, op: CompositeOp, dst: &mut [u8], src: [f32; 4], opacity: f32) {
        let blended = composite_rgba(op, self.to_rgba(dst), src, opacity);
        self.from_rgba(blended, dst);
    }

    /// Convert a run of pixels into another space
    fn convert_pixels(
        &self,
        src: &[u8],
        dst_space: &dyn ColorSpace,
        dst: &mut [u8],
        intent: RenderingIntent,
    ) {
        let src_pixels = src.chunks_exact(self.pixel_size());
        let dst_pixels = dst.chunks_exact_mut(dst_space.pixel_size());
        for (s, d) in src_pixels.zip(dst_pixels) {
            let rgba = map_to_gamut(self.to_rgba(s), dst_space.is_hdr(), intent);
            dst_space.from_rgba(rgba, d);
        }
    }
}

/// Whether two references denote the same color space
#[inline]
pub fn same_space(a: &dyn ColorSpace, b: &dyn ColorSpace) -> bool {
    a.id() == b.id()
}

/// Look up one of the built-in color spaces by id
pub fn builtin_space(id: &str) -> Option<&'static dyn ColorSpace> {
    match id {
        "RGBA8" => Some(&RGBA8),
        "RGBAF32" => Some(&RGBAF32),
        "ALPHA8" => Some(&ALPHA8),
        _ => None,
    }
}

/// Straight-alpha compositing in normalized RGBA
pub fn composite_rgba(op: CompositeOp, dst: [f32; 4], src: [f32; 4], opacity: f32) -> [f32; 4] {
    let opacity = opacity.clamp(0.0, 1.0);
    match op {
        CompositeOp::Over => {
            let src_alpha = src[3] * opacity;
            if src_alpha <= 0.0 {
                return dst;
            }
            let dst_weight = dst[3] * (1.0 - src_alpha);
            let out_alpha = src_alpha + dst_weight;
            if out_alpha <= 0.0 {
                return [0.0; 4];
            }
            [
                (src[0] * src_alpha + dst[0] * dst_weight) / out_alpha,
                (src[1] * src_alpha + dst[1] * dst_weight) / out_alpha,
                (src[2] * src_alpha + dst[2] * dst_weight) / out_alpha,
                out_alpha,
            ]
        }
        CompositeOp::Erase => {
            // Destination-out: only the alpha fades
            let remaining = (1.0 - src[3] * opacity).max(0.0);
            [dst[0], dst[1], dst[2], dst[3] * remaining]
        }
        CompositeOp::Copy => [
            dst[0] + (src[0] - dst[0]) * opacity,
            dst[1] + (src[1] - dst[1]) * opacity,
            dst[2] + (src[2] - dst[2]) * opacity,
            dst[3] + (src[3] - dst[3]) * opacity,
        ],
    }
}

/// Bring a color into the representable range of a destination space
pub fn map_to_gamut(rgba: [f32; 4], dst_is_hdr: bool, intent: RenderingIntent) -> [f32; 4] {
    let alpha = rgba[3].clamp(0.0, 1.0);
    if dst_is_hdr {
        return [rgba[0], rgba[1], rgba[2], alpha];
    }
    let [r, g, b] = [rgba[0].max(0.0), rgba[1].max(0.0), rgba[2].max(0.0)];
    match intent {
        RenderingIntent::Perceptual => {
            let peak = r.max(g).max(b);
            if peak > 1.0 {
                [r / peak, g / peak, b / peak, alpha]
            } else {
                [r, g, b, alpha]
            }
        }
        RenderingIntent::RelativeColorimetric
        | RenderingIntent::Saturation
        | RenderingIntent::AbsoluteColorimetric => [r.min(1.0), g.min(1.0), b.min(1.0), alpha],
    }
}

/// sRGB decoding of one nominal channel value
pub fn srgb_to_linear(v: f32) -> f32 {
    if v <= 0.04045 {
        v / 12.92
    } else {
        ((v + 0.055) / 1.055).powf(2.4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_over_opaque_replaces() {
        let out = composite_rgba(CompositeOp::Over, [0.0, 0.0, 1.0, 1.0], [1.0, 0.0, 0.0, 1.0], 1.0);
        assert_eq!(out, [1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_over_half_opacity_on_white() {
        let out = composite_rgba(CompositeOp::Over, [1.0, 1.0, 1.0, 1.0], [1.0, 0.0, 0.0, 1.0], 0.5);
        assert!((out[0] - 1.0).abs() < 1e-6);
        assert!((out[1] - 0.5).abs() < 1e-6);
        assert!((out[3] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_over_onto_transparent_keeps_source_color() {
        let out = composite_rgba(CompositeOp::Over, [0.0; 4], [0.2, 0.4, 0.6, 1.0], 0.25);
        assert!((out[0] - 0.2).abs() < 1e-6);
        assert!((out[3] - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_erase_reduces_alpha_only() {
        let out = composite_rgba(CompositeOp::Erase, [1.0, 0.0, 0.0, 1.0], [0.0, 0.0, 0.0, 1.0], 0.75);
        assert_eq!(out[0], 1.0);
        assert!((out[3] - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_perceptual_preserves_hue() {
        let mapped = map_to_gamut([2.0, 1.0, 0.5, 1.0], false, RenderingIntent::Perceptual);
        assert_eq!(mapped, [1.0, 0.5, 0.25, 1.0]);

        let clipped = map_to_gamut([2.0, 1.0, 0.5, 1.0], false, RenderingIntent::RelativeColorimetric);
        assert_eq!(clipped, [1.0, 1.0, 0.5, 1.0]);

        let hdr = map_to_gamut([2.0, 1.0, 0.5, 1.5], true, RenderingIntent::Perceptual);
        assert_eq!(hdr, [2.0, 1.0, 0.5, 1.0]);
    }

    #[test]
    fn test_builtin_lookup() {
        assert_eq!(builtin_space("RGBA8").map(|cs| cs.pixel_size()), Some(4));
        assert_eq!(builtin_space("RGBAF32").map(|cs| cs.pixel_size()), Some(16));
        assert!(builtin_space("CMYK").is_none());
    }
}
