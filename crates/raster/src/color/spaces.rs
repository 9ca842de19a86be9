//! Built-in color spaces

use super::ColorSpace;

/// 8-bit RGBA, straight alpha
#[derive(Debug, Clone, Copy, Default)]
pub struct Rgba8;

/// 32-bit float RGBA, straight alpha, nominal (sRGB encoded) values with
/// unbounded range. Linear output is a profile choice on export.
#[derive(Debug, Clone, Copy, Default)]
pub struct RgbaF32;

/// Single 8-bit coverage channel, used for selection masks
#[derive(Debug, Clone, Copy, Default)]
pub struct Alpha8;

pub static RGBA8: Rgba8 = Rgba8;
pub static RGBAF32: RgbaF32 = RgbaF32;
pub static ALPHA8: Alpha8 = Alpha8;

#[inline]
fn unit_to_u8(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

impl ColorSpace for Rgba8 {
    fn id(&self) -> &'static str {
        "RGBA8"
    }

    fn pixel_size(&self) -> usize {
        4
    }

    fn channel_count(&self) -> usize {
        4
    }

    fn has_alpha(&self) -> bool {
        true
    }

    fn to_rgba(&self, pixel: &[u8]) -> [f32; 4] {
        [
            pixel[0] as f32 / 255.0,
            pixel[1] as f32 / 255.0,
            pixel[2] as f32 / 255.0,
            pixel[3] as f32 / 255.0,
        ]
    }

    fn from_rgba(&self, rgba: [f32; 4], pixel: &mut [u8]) {
        for (dst, v) in pixel[..4].iter_mut().zip(rgba) {
            *dst = unit_to_u8(v);
        }
    }

    fn composition_source(&self) -> &'static dyn ColorSpace {
        &RGBA8
    }

    fn opacity(&self, pixel: &[u8]) -> f32 {
        pixel[3] as f32 / 255.0
    }

    fn multiply_opacity(&self, pixel: &mut [u8], factor: f32) {
        pixel[3] = unit_to_u8(pixel[3] as f32 / 255.0 * factor);
    }
}

impl ColorSpace for RgbaF32 {
    fn id(&self) -> &'static str {
        "RGBAF32"
    }

    fn pixel_size(&self) -> usize {
        16
    }

    fn channel_count(&self) -> usize {
        4
    }

    fn has_alpha(&self) -> bool {
        true
    }

    fn is_hdr(&self) -> bool {
        true
    }

    fn to_rgba(&self, pixel: &[u8]) -> [f32; 4] {
        bytemuck::pod_read_unaligned(&pixel[..16])
    }

    fn from_rgba(&self, rgba: [f32; 4], pixel: &mut [u8]) {
        let stored = [rgba[0], rgba[1], rgba[2], rgba[3].clamp(0.0, 1.0)];
        pixel[..16].copy_from_slice(bytemuck::bytes_of(&stored));
    }

    fn composition_source(&self) -> &'static dyn ColorSpace {
        &RGBAF32
    }
}

impl ColorSpace for Alpha8 {
    fn id(&self) -> &'static str {
        "ALPHA8"
    }

    fn pixel_size(&self) -> usize {
        1
    }

    fn channel_count(&self) -> usize {
        1
    }

    fn has_alpha(&self) -> bool {
        true
    }

    fn to_rgba(&self, pixel: &[u8]) -> [f32; 4] {
        [1.0, 1.0, 1.0, pixel[0] as f32 / 255.0]
    }

    fn from_rgba(&self, rgba: [f32; 4], pixel: &mut [u8]) {
        pixel[0] = unit_to_u8(rgba[3]);
    }

    fn composition_source(&self) -> &'static dyn ColorSpace {
        &RGBA8
    }

    fn opacity(&self, pixel: &[u8]) -> f32 {
        pixel[0] as f32 / 255.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::RenderingIntent;

    #[test]
    fn test_rgba8_round_trip_is_exact() {
        let mut out = [0u8; 4];
        for v in [0u8, 1, 77, 128, 254, 255] {
            let px = [v, 255 - v, v / 2, 200];
            RGBA8.from_rgba(RGBA8.to_rgba(&px), &mut out);
            assert_eq!(out, px);
        }
    }

    #[test]
    fn test_rgbaf32_keeps_hdr_values() {
        let mut px = [0u8; 16];
        RGBAF32.from_rgba([4.0, 0.5, -0.1, 1.0], &mut px);
        assert_eq!(RGBAF32.to_rgba(&px), [4.0, 0.5, -0.1, 1.0]);
    }

    #[test]
    fn test_rgba8_to_rgbaf32_keeps_nominal_values() {
        let src = [128u8, 64, 255, 255];
        let mut wide = [0u8; 16];
        RGBA8.convert_pixels(&src, &RGBAF32, &mut wide, RenderingIntent::Perceptual);
        assert_eq!(RGBAF32.to_rgba(&wide), RGBA8.to_rgba(&src));

        let mut back = [0u8; 4];
        RGBAF32.convert_pixels(&wide, &RGBA8, &mut back, RenderingIntent::Perceptual);
        assert_eq!(back, src);
    }

    #[test]
    fn test_convert_hdr_to_rgba8_perceptual() {
        let mut src = [0u8; 16];
        RGBAF32.from_rgba([2.0, 1.0, 0.0, 1.0], &mut src);
        let mut dst = [0u8; 4];
        RGBAF32.convert_pixels(&src, &RGBA8, &mut dst, RenderingIntent::Perceptual);
        assert_eq!(dst, [255, 128, 0, 255]);
    }

    #[test]
    fn test_alpha8_takes_alpha_channel() {
        let mut mask = [0u8; 1];
        ALPHA8.from_rgba([0.0, 0.0, 0.0, 0.5], &mut mask);
        assert_eq!(mask[0], 128);
        assert!((ALPHA8.opacity(&mask) - 128.0 / 255.0).abs() < 1e-6);
    }

    #[test]
    fn test_multiply_opacity_rgba8() {
        let mut px = [10, 20, 30, 200];
        RGBA8.multiply_opacity(&mut px, 0.5);
        assert_eq!(px, [10, 20, 30, 100]);
    }
}
