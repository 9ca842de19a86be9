//! Compositing rendered dabs and pixel buffers into a shared paint device

use std::sync::Arc;

use glam::Vec2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::color::{Color, ColorSpace, CompositeOp, RenderingIntent};
use crate::dab::RenderedDab;
use crate::device::{PaintDevice, SharedDevice, read_device, write_device};
use crate::error::RasterError;
use crate::geometry::{MirrorDirection, Rect, flip_pixels};

/// Mirrored-canvas replication
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MirrorSettings {
    /// Mirror across the vertical axis through `center.x`
    pub horizontal: bool,
    /// Mirror across the horizontal axis through `center.y`
    pub vertical: bool,
    pub center: Vec2,
}

impl MirrorSettings {
    pub fn is_active(&self) -> bool {
        self.horizontal || self.vertical
    }

    /// Mirror passes to replay after the original one.
    ///
    /// Each entry flips the previous pass, so with both axes on the sequence
    /// H, V, H visits the H, HV and V images.
    pub fn passes(&self) -> Vec<MirrorDirection> {
        match (self.horizontal, self.vertical) {
            (true, true) => vec![
                MirrorDirection::Horizontal,
                MirrorDirection::Vertical,
                MirrorDirection::Horizontal,
            ],
            (true, false) => vec![MirrorDirection::Horizontal],
            (false, true) => vec![MirrorDirection::Vertical],
            (false, false) => Vec::new(),
        }
    }
}

/// Source pixels for one compositing call
struct PixelSource<'a> {
    rect: Rect,
    bytes: &'a [u8],
    space: &'static dyn ColorSpace,
}

impl PixelSource<'_> {
    #[inline]
    fn rgba(&self, x: i32, y: i32) -> [f32; 4] {
        let ps = self.space.pixel_size();
        let i = ((y - self.rect.y) as usize * self.rect.width as usize + (x - self.rect.x) as usize) * ps;
        self.space.to_rgba(&self.bytes[i..i + ps])
    }
}

/// Paints into one shared device with a paint color, a composite op and
/// optional mirroring. Collects the rectangles it touched.
pub struct Painter {
    device: SharedDevice,
    paint_color: Color,
    composite_op: CompositeOp,
    opacity: f32,
    mirror: MirrorSettings,
    dirty: Vec<Rect>,
    average_opacity: f32,
}

impl Painter {
    pub fn new(device: SharedDevice) -> Self {
        let (paint_color, composite_op) = {
            let dev = read_device(&device);
            (Color::from_rgba([0.0, 0.0, 0.0, 1.0], dev.color_space()), dev.composite_op())
        };
        Self {
            device,
            paint_color,
            composite_op,
            opacity: 1.0,
            mirror: MirrorSettings::default(),
            dirty: Vec::new(),
            average_opacity: 0.0,
        }
    }

    pub fn device(&self) -> &SharedDevice {
        &self.device
    }

    pub fn paint_color(&self) -> &Color {
        &self.paint_color
    }

    pub fn set_paint_color(&mut self, color: Color) {
        self.paint_color = color;
    }

    pub fn composite_op(&self) -> CompositeOp {
        self.composite_op
    }

    pub fn set_composite_op(&mut self, op: CompositeOp) {
        self.composite_op = op;
    }

    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    pub fn set_opacity(&mut self, opacity: f32) {
        self.opacity = opacity.clamp(0.0, 1.0);
    }

    pub fn mirror(&self) -> MirrorSettings {
        self.mirror
    }

    pub fn set_mirror(&mut self, mirror: MirrorSettings) {
        self.mirror = mirror;
    }

    /// Running opacity of the stroke being painted
    pub fn average_opacity(&self) -> f32 {
        self.average_opacity
    }

    pub fn set_average_opacity(&mut self, opacity: f32) {
        self.average_opacity = opacity;
    }

    pub fn add_dirty_rect(&mut self, rect: Rect) {
        if !rect.is_empty() {
            self.dirty.push(rect);
        }
    }

    pub fn add_dirty_rects(&mut self, rects: &[Rect]) {
        self.dirty
            .extend(rects.iter().copied().filter(|r| !r.is_empty()));
    }

    pub fn dirty_rects(&self) -> &[Rect] {
        &self.dirty
    }

    /// Hand over and forget the touched rectangles
    pub fn take_dirty_rects(&mut self) -> Vec<Rect> {
        std::mem::take(&mut self.dirty)
    }

    #[inline]
    fn axis2(&self, direction: MirrorDirection) -> i32 {
        match direction {
            MirrorDirection::Horizontal => (2.0 * self.mirror.center.x).round() as i32,
            MirrorDirection::Vertical => (2.0 * self.mirror.center.y).round() as i32,
        }
    }

    /// Reflect `rect` across the mirror axis. Applying it twice restores `rect`.
    pub fn mirror_rect(&self, rect: Rect, direction: MirrorDirection) -> Rect {
        rect.mirrored(direction, self.axis2(direction))
    }

    /// Reflect a dab's placement and flip its pixels.
    ///
    /// A buffer shared with other dabs is copied before it is flipped.
    pub fn mirror_dab(&self, dab: &mut RenderedDab, direction: MirrorDirection) {
        let rect = self.mirror_rect(dab.rect(), direction);
        dab.offset.x = rect.x;
        dab.offset.y = rect.y;
        Arc::make_mut(&mut dab.dab).mirror(direction);
    }

    /// Composite `dabs` in order into each of the pairwise disjoint `rects`.
    ///
    /// Each rect is composited into its own buffer on the rayon pool and
    /// written back afterwards. Pixels outside every rect are untouched.
    pub fn blt_fixed(&mut self, rects: &[Rect], dabs: &[RenderedDab]) -> Result<(), RasterError> {
        let mut device = write_device(&self.device);
        let op = self.composite_op;
        let opacity = self.opacity;

        let buffers = {
            let dev: &PaintDevice = &device;
            let space = dev.color_space();
            let ps = dev.pixel_size();
            rects
                .par_iter()
                .filter(|rect| !rect.is_empty())
                .map(|&rect| {
                    let mut buffer = vec![0u8; rect.area() as usize * ps];
                    dev.read_bytes(&mut buffer, rect)?;
                    for dab in dabs {
                        let area = dab.rect().intersection(&rect);
                        if area.is_empty() {
                            continue;
                        }
                        let dab_opacity = opacity * dab.opacity * dab.flow;
                        for y in area.y..area.bottom() {
                            for x in area.x..area.right() {
                                let src = dab
                                    .dab
                                    .rgba((x - dab.offset.x) as u32, (y - dab.offset.y) as u32);
                                if src[3] <= 0.0 {
                                    continue;
                                }
                                let coverage = dev.selection_coverage(x, y);
                                if coverage <= 0.0 {
                                    continue;
                                }
                                let i = ((y - rect.y) as usize * rect.width as usize + (x - rect.x) as usize) * ps;
                                space.composite(op, &mut buffer[i..i + ps], src, dab_opacity * coverage);
                            }
                        }
                    }
                    Ok((rect, buffer))
                })
                .collect::<Result<Vec<_>, RasterError>>()?
        };

        for (rect, buffer) in &buffers {
            device.write_bytes(buffer, *rect)?;
        }
        trace!("blt_fixed: {} dabs into {} rects", dabs.len(), buffers.len());
        Ok(())
    }

    /// Composite source pixels covering `dst` into the device
    fn composite_pixels(&mut self, dst: Rect, source: &PixelSource<'_>) -> Result<(), RasterError> {
        if dst.is_empty() {
            return Ok(());
        }
        let mut device = write_device(&self.device);
        let space = device.color_space();
        let ps = device.pixel_size();
        let mut buffer = vec![0u8; dst.area() as usize * ps];
        device.read_bytes(&mut buffer, dst)?;
        for y in dst.y..dst.bottom() {
            for x in dst.x..dst.right() {
                let src = source.rgba(x - dst.x + source.rect.x, y - dst.y + source.rect.y);
                if src[3] <= 0.0 {
                    continue;
                }
                let coverage = device.selection_coverage(x, y);
                if coverage <= 0.0 {
                    continue;
                }
                let i = ((y - dst.y) as usize * dst.width as usize + (x - dst.x) as usize) * ps;
                space.composite(self.composite_op, &mut buffer[i..i + ps], src, self.opacity * coverage);
            }
        }
        device.write_bytes(&buffer, dst)?;
        drop(device);
        self.add_dirty_rect(dst);
        Ok(())
    }

    /// Composite `src_rect` of another device at `(dst_x, dst_y)`
    pub fn bit_blt(
        &mut self,
        dst_x: i32,
        dst_y: i32,
        src: &PaintDevice,
        src_rect: Rect,
    ) -> Result<(), RasterError> {
        if src_rect.is_empty() {
            return Ok(());
        }
        let mut bytes = vec![0u8; src_rect.area() as usize * src.pixel_size()];
        src.read_bytes(&mut bytes, src_rect)?;
        let source = PixelSource {
            rect: src_rect,
            bytes: &bytes,
            space: src.color_space(),
        };
        let dst = Rect::new(dst_x, dst_y, src_rect.width, src_rect.height);
        self.composite_pixels(dst, &source)
    }

    /// Replay `rect` of `src` at every mirrored position
    pub fn render_mirror_mask(&mut self, rect: Rect, src: &PaintDevice) -> Result<(), RasterError> {
        if rect.is_empty() || !self.mirror.is_active() {
            return Ok(());
        }
        let ps = src.pixel_size();
        let mut bytes = vec![0u8; rect.area() as usize * ps];
        src.read_bytes(&mut bytes, rect)?;

        let mut dst = rect;
        for direction in self.mirror.passes() {
            flip_pixels(&mut bytes, rect.width as usize, rect.height as usize, ps, direction);
            dst = self.mirror_rect(dst, direction);
            let source = PixelSource {
                rect: Rect::new(0, 0, rect.width, rect.height),
                bytes: &bytes,
                space: src.color_space(),
            };
            self.composite_pixels(dst, &source)?;
        }
        Ok(())
    }

    /// Draw a one pixel wide line with the paint color, overwriting pixels
    /// directly. Returns the touched rectangle.
    pub fn draw_dda_line(&mut self, start: Vec2, end: Vec2) -> Result<Rect, RasterError> {
        let (x0, y0) = (start.x.round() as i32, start.y.round() as i32);
        let (x1, y1) = (end.x.round() as i32, end.y.round() as i32);
        let (dx, dy) = (x1 - x0, y1 - y0);
        let steps = dx.abs().max(dy.abs());

        let mut device = write_device(&self.device);
        let color = self
            .paint_color
            .convert_to(device.color_space(), RenderingIntent::Perceptual);
        if steps == 0 {
            device.set_pixel(x0, y0, &color)?;
        } else {
            let (step_x, step_y) = (dx as f32 / steps as f32, dy as f32 / steps as f32);
            for i in 0..=steps {
                let x = (x0 as f32 + step_x * i as f32).round() as i32;
                let y = (y0 as f32 + step_y * i as f32).round() as i32;
                device.set_pixel(x, y, &color)?;
            }
        }
        drop(device);

        let rect = Rect::from_edges(x0.min(x1), y0.min(y1), x0.max(x1) + 1, y0.max(y1) + 1);
        self.add_dirty_rect(rect);
        debug!("draw_dda_line: {:?}", rect);
        Ok(rect)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::RGBA8;
    use crate::dab::{DabMask, FixedDab};
    use glam::IVec2;
    use impasto_config::EngineConfig;

    fn shared_device() -> SharedDevice {
        PaintDevice::new(&RGBA8, "canvas", &EngineConfig::default())
            .unwrap()
            .into_shared()
    }

    fn solid_dab(seq: u64, x: i32, y: i32, size: u32, rgba: [f32; 4]) -> RenderedDab {
        let mask = DabMask::new(size, size, vec![1.0; (size * size) as usize]);
        RenderedDab {
            dab: Arc::new(FixedDab::from_mask(&mask, rgba, &RGBA8)),
            offset: IVec2::new(x, y),
            opacity: 1.0,
            flow: 1.0,
            average_opacity: 1.0,
            seq,
        }
    }

    #[test]
    fn test_blt_fixed_composites_in_order() {
        let device = shared_device();
        let mut painter = Painter::new(device.clone());
        let red = solid_dab(0, 0, 0, 4, [1.0, 0.0, 0.0, 1.0]);
        let blue = solid_dab(1, 2, 0, 4, [0.0, 0.0, 1.0, 1.0]);
        let rects = [Rect::new(0, 0, 3, 4), Rect::new(3, 0, 3, 4)];
        painter.blt_fixed(&rects, &[red, blue]).unwrap();

        let dev = read_device(&device);
        assert_eq!(dev.pixel(1, 1), &[255, 0, 0, 255]);
        assert_eq!(dev.pixel(2, 1), &[0, 0, 255, 255]);
        assert_eq!(dev.pixel(5, 3), &[0, 0, 255, 255]);
        assert_eq!(dev.exact_bounds(), Some(Rect::new(0, 0, 6, 4)));
    }

    #[test]
    fn test_blt_fixed_respects_rects_and_selection() {
        let device = shared_device();
        {
            let mut dev = write_device(&device);
            let mut mask = crate::device::Selection::new(64).unwrap();
            mask.select_rect(Rect::new(0, 0, 2, 4), 255).unwrap();
            dev.add_selection(&mask).unwrap();
        }
        let mut painter = Painter::new(device.clone());
        let dab = solid_dab(0, 0, 0, 4, [0.0, 1.0, 0.0, 1.0]);
        painter.blt_fixed(&[Rect::new(0, 0, 4, 3)], &[dab]).unwrap();

        let dev = read_device(&device);
        assert_eq!(dev.pixel(1, 1), &[0, 255, 0, 255]);
        assert_eq!(dev.pixel(3, 1), &[0, 0, 0, 0]);
        assert_eq!(dev.pixel(1, 3), &[0, 0, 0, 0]);
    }

    #[test]
    fn test_mirror_rect_and_dab_are_involutions() {
        let mut painter = Painter::new(shared_device());
        painter.set_mirror(MirrorSettings {
            horizontal: true,
            vertical: true,
            center: Vec2::new(50.5, 20.0),
        });
        let rect = Rect::new(10, 5, 7, 3);
        for direction in [MirrorDirection::Horizontal, MirrorDirection::Vertical] {
            let once = painter.mirror_rect(rect, direction);
            assert_ne!(once, rect);
            assert_eq!(painter.mirror_rect(once, direction), rect);
        }
        assert_eq!(
            painter.mirror_rect(rect, MirrorDirection::Horizontal),
            Rect::new(84, 5, 7, 3)
        );

        let mut dab = solid_dab(0, 10, 5, 3, [1.0, 0.0, 0.0, 1.0]);
        let original_offset = dab.offset;
        let original_bytes = dab.dab.bytes().to_vec();
        painter.mirror_dab(&mut dab, MirrorDirection::Vertical);
        assert_eq!(dab.offset, IVec2::new(10, 32));
        painter.mirror_dab(&mut dab, MirrorDirection::Vertical);
        assert_eq!(dab.offset, original_offset);
        assert_eq!(dab.dab.bytes(), &original_bytes[..]);
    }

    #[test]
    fn test_mirror_dab_copies_shared_buffer() {
        let painter = Painter::new(shared_device());
        let original = solid_dab(0, 0, 0, 2, [1.0, 0.0, 0.0, 1.0]);
        let mut copy = original.clone();
        painter.mirror_dab(&mut copy, MirrorDirection::Horizontal);
        assert!(!Arc::ptr_eq(&original.dab, &copy.dab));
        assert_eq!(original.offset, IVec2::ZERO);
    }

    #[test]
    fn test_passes_cover_every_quadrant() {
        let both = MirrorSettings {
            horizontal: true,
            vertical: true,
            center: Vec2::ZERO,
        };
        assert_eq!(both.passes().len(), 3);
        assert!(MirrorSettings::default().passes().is_empty());
    }

    #[test]
    fn test_dda_line_bit_blt_and_mirror_mask() {
        let cache = shared_device();
        let mut line_painter = Painter::new(cache.clone());
        line_painter.set_paint_color(Color::from_rgba8([255, 255, 255, 255]));
        let rect = line_painter
            .draw_dda_line(Vec2::new(1.0, 1.0), Vec2::new(5.0, 3.0))
            .unwrap();
        assert_eq!(rect, Rect::new(1, 1, 5, 3));
        {
            let cache = read_device(&cache);
            assert_eq!(cache.exact_bounds(), Some(rect));
            assert_eq!(cache.pixel(3, 2), &[255, 255, 255, 255]);
        }

        let canvas = shared_device();
        let mut painter = Painter::new(canvas.clone());
        painter.set_mirror(MirrorSettings {
            horizontal: true,
            vertical: false,
            center: Vec2::new(10.0, 0.0),
        });
        {
            let cache = read_device(&cache);
            painter.bit_blt(rect.x, rect.y, &cache, rect).unwrap();
            painter.render_mirror_mask(rect, &cache).unwrap();
        }
        let dev = read_device(&canvas);
        assert_eq!(dev.pixel(1, 1), &[255, 255, 255, 255]);
        // (1, 1) reflected across x = 10
        assert_eq!(dev.pixel(18, 1), &[255, 255, 255, 255]);
        assert_eq!(dev.pixel(14, 3), &[255, 255, 255, 255]);
        assert_eq!(painter.dirty_rects().len(), 2);
    }
}
