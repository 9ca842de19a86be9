//! Pixel bytes tagged with their color space

use super::{ColorSpace, RGBA8, RenderingIntent, map_to_gamut, same_space};

/// One pixel value in a specific color space
#[derive(Debug, Clone)]
pub struct Color {
    data: Vec<u8>,
    space: &'static dyn ColorSpace,
}

impl Color {
    /// Encode normalized straight-alpha RGBA in `space`
    pub fn from_rgba(rgba: [f32; 4], space: &'static dyn ColorSpace) -> Self {
        let mut data = vec![0u8; space.pixel_size()];
        space.from_rgba(rgba, &mut data);
        Self { data, space }
    }

    pub fn from_rgba8(rgba: [u8; 4]) -> Self {
        Self {
            data: rgba.to_vec(),
            space: &RGBA8,
        }
    }

    /// Wrap raw pixel bytes. Returns `None` when the length does not match
    /// the space's pixel size.
    pub fn from_bytes(data: &[u8], space: &'static dyn ColorSpace) -> Option<Self> {
        (data.len() == space.pixel_size()).then(|| Self {
            data: data.to_vec(),
            space,
        })
    }

    /// Fully transparent color in `space`
    pub fn transparent(space: &'static dyn ColorSpace) -> Self {
        Self::from_rgba([0.0; 4], space)
    }

    #[inline]
    pub fn space(&self) -> &'static dyn ColorSpace {
        self.space
    }

    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn to_rgba(&self) -> [f32; 4] {
        self.space.to_rgba(&self.data)
    }

    pub fn to_rgba8(&self) -> [u8; 4] {
        let mut out = [0u8; 4];
        let rgba = map_to_gamut(self.to_rgba(), false, RenderingIntent::Perceptual);
        RGBA8.from_rgba(rgba, &mut out);
        out
    }

    pub fn opacity(&self) -> f32 {
        self.space.opacity(&self.data)
    }

    /// Same color expressed in another space
    pub fn convert_to(&self, space: &'static dyn ColorSpace, intent: RenderingIntent) -> Color {
        if same_space(self.space, space) {
            return self.clone();
        }
        let mut data = vec![0u8; space.pixel_size()];
        self.space
            .convert_pixels(&self.data, space, &mut data, intent);
        Color { data, space }
    }
}

impl PartialEq for Color {
    fn eq(&self, other: &Self) -> bool {
        same_space(self.space, other.space) && self.data == other.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::RGBAF32;

    #[test]
    fn test_rgba8_color_round_trip() {
        let c = Color::from_rgba8([255, 0, 0, 255]);
        assert_eq!(c.bytes(), &[255, 0, 0, 255]);
        assert_eq!(c.to_rgba8(), [255, 0, 0, 255]);
    }

    #[test]
    fn test_convert_between_spaces() {
        let c = Color::from_rgba8([255, 128, 0, 255]);
        let hdr = c.convert_to(&RGBAF32, RenderingIntent::Perceptual);
        assert_eq!(hdr.space().id(), "RGBAF32");
        assert_eq!(hdr.bytes().len(), 16);
        assert_eq!(hdr.to_rgba8(), [255, 128, 0, 255]);
        assert_ne!(hdr, c);
    }

    #[test]
    fn test_from_bytes_checks_length() {
        assert!(Color::from_bytes(&[1, 2, 3], &RGBA8).is_none());
        assert!(Color::from_bytes(&[1, 2, 3, 4], &RGBA8).is_some());
    }
}
