//! Color space conversion and 8-bit RGBA interchange

use image::RgbaImage;
use tracing::debug;

use super::{DeviceEvent, PaintDevice};
use super::events::ProgressReporter;
use crate::color::{
    ColorSpace, OutputProfile, RGBA8, RenderingIntent, map_to_gamut, same_space, srgb_to_linear,
};
use crate::error::RasterError;
use crate::geometry::Rect;
use crate::tiles::TiledDataManager;

impl PaintDevice {
    /// Rewrite every stored pixel and the default pixel into `color_space`.
    ///
    /// Out-of-gamut colors are mapped according to `intent`. The undo
    /// history of the old data is dropped with it.
    pub fn convert_to(
        &mut self,
        color_space: &'static dyn ColorSpace,
        intent: RenderingIntent,
    ) -> Result<(), RasterError> {
        if same_space(self.color_space, color_space) {
            return Ok(());
        }
        let old_space = self.color_space;
        let new_ps = color_space.pixel_size();

        let mut default = vec![0u8; new_ps];
        old_space.convert_pixels(self.data.default_pixel(), color_space, &mut default, intent);
        let mut converted = TiledDataManager::new(new_ps, &default, self.data.tile_size())?;

        let tile_pixels = (self.data.tile_size() * self.data.tile_size()) as usize;
        let mut buffer = vec![0u8; tile_pixels * new_ps];
        let mut progress = ProgressReporter::new(&self.listeners, self.data.tile_count());
        for (done, (coord, bytes)) in self.data.tiles().enumerate() {
            progress.update(done);
            old_space.convert_pixels(bytes, color_space, &mut buffer, intent);
            converted.set_tile(coord, &buffer)?;
        }
        progress.finish();
        debug!(
            "PaintDevice '{}': converted {} tiles {} -> {}",
            self.name,
            converted.tile_count(),
            old_space.id(),
            color_space.id()
        );

        self.data = converted;
        self.color_space = color_space;
        self.pixel_size = new_ps;
        self.channel_count = color_space.channel_count();
        self.emit(DeviceEvent::ProfileChanged {
            color_space: color_space.id(),
        });
        Ok(())
    }

    /// Transcode `rect` to an 8-bit RGBA raster.
    ///
    /// HDR sources are multiplied by `2^exposure` before being mapped into
    /// range; `profile` selects the transfer encoding of the result.
    pub fn convert_to_image(
        &self,
        profile: OutputProfile,
        rect: Rect,
        exposure: f32,
    ) -> Result<RgbaImage, RasterError> {
        if rect.is_empty() {
            return Ok(RgbaImage::new(0, 0));
        }
        let ps = self.pixel_size;
        let mut raw = vec![0u8; rect.area() as usize * ps];
        self.read_bytes(&mut raw, rect)?;

        let gain = if self.color_space.is_hdr() { exposure.exp2() } else { 1.0 };
        let mut out = vec![0u8; rect.area() as usize * 4];
        for (src, dst) in raw.chunks_exact(ps).zip(out.chunks_exact_mut(4)) {
            let mut rgba = self.color_space.to_rgba(src);
            for c in &mut rgba[..3] {
                *c *= gain;
            }
            let mut rgba = map_to_gamut(rgba, false, RenderingIntent::Perceptual);
            if profile == OutputProfile::Linear {
                for c in &mut rgba[..3] {
                    *c = srgb_to_linear(*c);
                }
            }
            RGBA8.from_rgba(rgba, dst);
        }

        let expected = out.len();
        RgbaImage::from_raw(rect.width as u32, rect.height as u32, out).ok_or(RasterError::BufferSize {
            expected,
            actual: expected,
        })
    }

    /// Transcode the whole extent; an empty device gives an empty image
    pub fn convert_to_image_full(&self, profile: OutputProfile, exposure: f32) -> Result<RgbaImage, RasterError> {
        let rect = self.extent().unwrap_or_default();
        self.convert_to_image(profile, rect, exposure)
    }

    /// Write an 8-bit RGBA raster into the device with its top-left corner
    /// at `(x, y)`
    pub fn convert_from_image(&mut self, image: &RgbaImage, x: i32, y: i32) -> Result<(), RasterError> {
        let (width, height) = image.dimensions();
        let rect = Rect::new(x, y, width as i32, height as i32);
        if rect.is_empty() {
            return Ok(());
        }
        let ps = self.pixel_size;
        let mut converted = vec![0u8; rect.area() as usize * ps];
        RGBA8.convert_pixels(image.as_raw(), self.color_space, &mut converted, RenderingIntent::Perceptual);
        self.write_bytes(&converted, rect)
    }
}
