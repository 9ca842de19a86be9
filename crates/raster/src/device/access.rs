//! Pixel and region access in image coordinates

use super::PaintDevice;
use crate::color::{Color, ColorSpace, RGBA8, RenderingIntent};
use crate::error::RasterError;
use crate::geometry::Rect;
use crate::tiles::Memento;

impl PaintDevice {
    #[inline]
    fn to_local(&self, rect: Rect) -> Rect {
        rect.translated(-self.x, -self.y)
    }

    /// Read `rect` into `buffer`. Unwritten pixels read as the default pixel.
    pub fn read_bytes(&self, buffer: &mut [u8], rect: Rect) -> Result<(), RasterError> {
        self.data.read_bytes(buffer, self.to_local(rect))
    }

    /// Write `buffer` into `rect`, growing storage as needed
    pub fn write_bytes(&mut self, buffer: &[u8], rect: Rect) -> Result<(), RasterError> {
        let local = self.to_local(rect);
        self.data.write_bytes(buffer, local)
    }

    pub fn pixel(&self, x: i32, y: i32) -> &[u8] {
        self.data.pixel(x - self.x, y - self.y)
    }

    pub fn writable_pixel(&mut self, x: i32, y: i32) -> Result<&mut [u8], RasterError> {
        let (lx, ly) = (x - self.x, y - self.y);
        self.data.writable_pixel(lx, ly)
    }

    pub fn num_contiguous_columns(&self, x: i32, min_y: i32, max_y: i32) -> i32 {
        self.data
            .num_contiguous_columns(x - self.x, min_y - self.y, max_y - self.y)
    }

    pub fn num_contiguous_rows(&self, y: i32, min_x: i32, max_x: i32) -> i32 {
        self.data
            .num_contiguous_rows(y - self.y, min_x - self.x, max_x - self.x)
    }

    pub fn row_stride(&self, x: i32, y: i32) -> usize {
        self.data.row_stride(x - self.x, y - self.y)
    }

    /// Tile-aligned bounds of the stored content in image coordinates.
    ///
    /// When the extent was marked invalid it is recomputed from the exact
    /// bounds instead of the materialized tiles.
    pub fn extent(&self) -> Option<Rect> {
        if !self.extent_is_valid {
            let tile_size = self.data.tile_size() as i32;
            return self
                .exact_bounds_local()
                .map(|r| r.aligned_to(tile_size).translated(self.x, self.y));
        }
        self.data.extent().map(|r| r.translated(self.x, self.y))
    }

    pub fn extent_is_valid(&self) -> bool {
        self.extent_is_valid
    }

    pub fn set_extent_is_valid(&mut self, valid: bool) {
        self.extent_is_valid = valid;
    }

    /// Whether `(x, y)` lies inside the extent
    pub fn contains(&self, x: i32, y: i32) -> bool {
        self.extent().is_some_and(|e| e.contains(x, y))
    }

    fn exact_bounds_local(&self) -> Option<Rect> {
        let extent = self.data.extent()?;
        let ps = self.pixel_size;
        let default = self.data.default_pixel();
        let mut bounds: Option<Rect> = None;
        self.data.visit_materialized_runs(extent, |x, y, bytes| {
            let mut pixels = bytes.chunks_exact(ps);
            let Some(first) = pixels.position(|p| p != default) else {
                return;
            };
            let last = bytes
                .chunks_exact(ps)
                .rposition(|p| p != default)
                .unwrap_or(first);
            let run = Rect::from_edges(x + first as i32, y, x + last as i32 + 1, y + 1);
            bounds = Some(bounds.map_or(run, |b| b.union(&run)));
        });
        bounds
    }

    /// Tightest rectangle holding every non-default pixel.
    ///
    /// Scans every stored pixel; keep it off hot paths.
    pub fn exact_bounds(&self) -> Option<Rect> {
        self.exact_bounds_local()
            .map(|r| r.translated(self.x, self.y))
    }

    /// Discard everything outside `rect`. Irreversible unless a memento is open.
    pub fn crop(&mut self, rect: Rect) {
        let local = self.to_local(rect);
        self.data.set_extent(local);
    }

    /// Release all pixel storage
    pub fn clear(&mut self) {
        self.data.clear();
        self.extent_is_valid = true;
    }

    /// Color of one pixel in the device color space
    pub fn color_at(&self, x: i32, y: i32) -> Color {
        Color::from_bytes(self.pixel(x, y), self.color_space)
            .unwrap_or_else(|| Color::transparent(self.color_space))
    }

    /// One pixel as 8-bit RGBA
    pub fn pixel_rgba8(&self, x: i32, y: i32) -> [u8; 4] {
        self.color_at(x, y).to_rgba8()
    }

    /// Overwrite one pixel. No compositing and no undo command; the change
    /// still lands in an open memento.
    pub fn set_pixel(&mut self, x: i32, y: i32, color: &Color) -> Result<(), RasterError> {
        let converted = color.convert_to(self.color_space, RenderingIntent::Perceptual);
        self.writable_pixel(x, y)?.copy_from_slice(converted.bytes());
        Ok(())
    }

    /// Overwrite one pixel from 8-bit RGB and opacity
    pub fn set_pixel_rgba8(&mut self, x: i32, y: i32, rgb: [u8; 3], opacity: u8) -> Result<(), RasterError> {
        let rgba = RGBA8.to_rgba(&[rgb[0], rgb[1], rgb[2], opacity]);
        let space = self.color_space;
        space.from_rgba(rgba, self.writable_pixel(x, y)?);
        Ok(())
    }

    pub fn get_memento(&mut self) -> Memento {
        self.data.get_memento()
    }

    pub fn rollback(&mut self, memento: Memento) -> Result<(), RasterError> {
        self.data.rollback(memento)
    }

    pub fn rollforward(&mut self, memento: Memento) -> Result<(), RasterError> {
        self.data.rollforward(memento)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::RGBAF32;
    use impasto_config::EngineConfig;

    fn device() -> PaintDevice {
        PaintDevice::new(&RGBA8, "layer", &EngineConfig::default()).unwrap()
    }

    #[test]
    fn test_exact_bounds_of_red_block() {
        let mut dev = device();
        let red: Vec<u8> = [255, 0, 0, 255].repeat(16);
        dev.write_bytes(&red, Rect::new(10, 10, 4, 4)).unwrap();

        assert_eq!(dev.exact_bounds(), Some(Rect::new(10, 10, 4, 4)));
        let extent = dev.extent().unwrap();
        assert_eq!(extent, Rect::new(0, 0, 64, 64));
        assert!(extent.contains_rect(&Rect::new(10, 10, 4, 4)));
        assert_eq!(extent.x % 64, 0);
    }

    #[test]
    fn test_offset_translates_coordinates() {
        let mut dev = device();
        dev.move_to(100, -50);
        dev.set_pixel_rgba8(105, -45, [1, 2, 3], 255).unwrap();

        assert_eq!(dev.pixel(105, -45), &[1, 2, 3, 255]);
        assert_eq!(dev.data_manager().pixel(5, 5), &[1, 2, 3, 255]);
        assert_eq!(dev.exact_bounds(), Some(Rect::new(105, -45, 1, 1)));
        assert_eq!(dev.extent(), Some(Rect::new(100, -50, 64, 64)));
        assert!(dev.contains(163, 13));
        assert!(!dev.contains(164, 13));
    }

    #[test]
    fn test_invalid_extent_is_recomputed() {
        let mut dev = device();
        dev.write_bytes(&[9; 4], Rect::new(200, 0, 1, 1)).unwrap();
        dev.write_bytes(&[0; 4], Rect::new(200, 0, 1, 1)).unwrap();
        dev.write_bytes(&[9; 4], Rect::new(3, 3, 1, 1)).unwrap();
        assert_eq!(dev.extent(), Some(Rect::new(0, 0, 256, 64)));

        dev.set_extent_is_valid(false);
        assert_eq!(dev.extent(), Some(Rect::new(0, 0, 64, 64)));
    }

    #[test]
    fn test_set_pixel_converts_color() {
        let mut dev = PaintDevice::new(&RGBAF32, "hdr", &EngineConfig::default()).unwrap();
        dev.set_pixel(1, 1, &Color::from_rgba8([255, 0, 0, 255])).unwrap();
        assert_eq!(dev.color_at(1, 1).to_rgba(), [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(dev.pixel_rgba8(1, 1), [255, 0, 0, 255]);
        assert_eq!(dev.pixel_rgba8(2, 2), [0, 0, 0, 0]);
    }

    #[test]
    fn test_set_pixel_rgba8_encodes_into_device_space() {
        let mut dev = PaintDevice::new(&RGBAF32, "hdr", &EngineConfig::default()).unwrap();
        dev.set_pixel_rgba8(4, 4, [255, 0, 51], 128).unwrap();
        assert_eq!(dev.color_at(4, 4).to_rgba(), RGBA8.to_rgba(&[255, 0, 51, 128]));
        assert_eq!(dev.pixel_rgba8(4, 4), [255, 0, 51, 128]);
    }

    #[test]
    fn test_set_pixel_is_captured_by_open_memento() {
        let mut dev = device();
        let m = dev.get_memento();
        dev.set_pixel_rgba8(0, 0, [10, 20, 30], 255).unwrap();
        dev.rollback(m).unwrap();
        assert_eq!(dev.pixel(0, 0), &[0, 0, 0, 0]);
        dev.rollforward(m).unwrap();
        assert_eq!(dev.pixel(0, 0), &[10, 20, 30, 255]);
    }

    #[test]
    fn test_crop_is_irreversible_without_memento() {
        let mut dev = device();
        dev.write_bytes(&[7; 4 * 100], Rect::new(0, 0, 10, 10)).unwrap();
        dev.crop(Rect::new(0, 0, 5, 5));
        assert_eq!(dev.exact_bounds(), Some(Rect::new(0, 0, 5, 5)));
        dev.clear();
        assert_eq!(dev.extent(), None);
        assert_eq!(dev.exact_bounds(), None);
    }
}
