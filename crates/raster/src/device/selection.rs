//! Selection masks and their application to device pixels

use tracing::debug;

use super::PaintDevice;
use crate::error::RasterError;
use crate::geometry::Rect;
use crate::tiles::TiledDataManager;

/// Coverage mask in image coordinates, one byte per pixel. Unwritten
/// pixels are unselected.
#[derive(Debug, Clone)]
pub struct Selection {
    mask: TiledDataManager,
}

impl Selection {
    pub fn new(tile_size: u32) -> Result<Self, RasterError> {
        Ok(Self {
            mask: TiledDataManager::new(1, &[0], tile_size)?,
        })
    }

    /// Coverage of one pixel in `[0, 1]`
    #[inline]
    pub fn coverage(&self, x: i32, y: i32) -> f32 {
        self.mask.pixel(x, y)[0] as f32 / 255.0
    }

    /// Set the coverage of every pixel in `rect`
    pub fn select_rect(&mut self, rect: Rect, coverage: u8) -> Result<(), RasterError> {
        let bytes = vec![coverage; rect.area().max(0) as usize];
        self.mask.write_bytes(&bytes, rect)
    }

    /// Raw coverage bytes of `rect`
    pub fn read_coverage(&self, rect: Rect) -> Result<Vec<u8>, RasterError> {
        let mut bytes = vec![0u8; rect.area().max(0) as usize];
        self.mask.read_bytes(&mut bytes, rect)?;
        Ok(bytes)
    }

    pub fn mask(&self) -> &TiledDataManager {
        &self.mask
    }

    /// Bounds of the stored mask tiles
    pub fn extent(&self) -> Option<Rect> {
        self.mask.extent()
    }

    /// Whether no pixel has any coverage
    pub fn is_empty(&self) -> bool {
        let Some(extent) = self.mask.extent() else {
            return true;
        };
        let mut empty = true;
        self.mask
            .visit_materialized_runs(extent, |_, _, bytes| empty &= bytes.iter().all(|&b| b == 0));
        empty
    }

    fn combine<F>(&mut self, other: &Selection, area: Option<Rect>, op: F) -> Result<(), RasterError>
    where
        F: Fn(u8, u8) -> u8,
    {
        let Some(area) = area else {
            return Ok(());
        };
        let mut mine = self.read_coverage(area)?;
        let theirs = other.read_coverage(area)?;
        for (a, b) in mine.iter_mut().zip(theirs) {
            *a = op(*a, b);
        }
        self.mask.write_bytes(&mine, area)
    }

    /// Union: per-pixel maximum
    pub fn add(&mut self, other: &Selection) -> Result<(), RasterError> {
        let area = match (self.extent(), other.extent()) {
            (Some(a), Some(b)) => Some(a.union(&b)),
            (a, b) => a.or(b),
        };
        self.combine(other, area, |a, b| a.max(b))
    }

    /// Difference: coverage `a × (1 − b)`
    pub fn subtract(&mut self, other: &Selection) -> Result<(), RasterError> {
        let area = self.extent();
        self.combine(other, area, |a, b| ((a as u32 * (255 - b as u32) + 127) / 255) as u8)
    }

    /// Intersection: per-pixel minimum
    pub fn intersect(&mut self, other: &Selection) -> Result<(), RasterError> {
        let area = self.extent();
        self.combine(other, area, |a, b| a.min(b))
    }
}

impl PaintDevice {
    fn new_selection(&self) -> Result<Selection, RasterError> {
        Selection::new(self.data.tile_size())
    }

    /// The active selection, created empty if there is none. Activates it.
    pub fn selection(&mut self) -> Result<&mut Selection, RasterError> {
        let selection = match self.selection.take() {
            Some(selection) => selection,
            None => self.new_selection()?,
        };
        self.has_selection = true;
        Ok(self.selection.insert(selection))
    }

    /// The retained selection mask, active or not
    pub fn retained_selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }

    /// Union `other` into the active selection
    pub fn add_selection(&mut self, other: &Selection) -> Result<(), RasterError> {
        self.selection()?.add(other)
    }

    /// Remove `other` from the active selection
    pub fn subtract_selection(&mut self, other: &Selection) -> Result<(), RasterError> {
        self.selection()?.subtract(other)
    }

    /// Restrict the active selection to `other`
    pub fn intersect_selection(&mut self, other: &Selection) -> Result<(), RasterError> {
        self.selection()?.intersect(other)
    }

    pub fn has_selection(&self) -> bool {
        self.has_selection && self.selection.is_some()
    }

    /// Deactivate the selection, keeping its mask for [`reselect`](Self::reselect)
    pub fn deselect(&mut self) {
        self.has_selection = false;
    }

    pub fn reselect(&mut self) {
        self.has_selection = self.selection.is_some();
    }

    /// Drop the retained mask
    pub fn remove_selection(&mut self) {
        self.selection = None;
        self.has_selection = false;
    }

    /// Coverage applied to painting at `(x, y)`: 1 without an active selection
    #[inline]
    pub fn selection_coverage(&self, x: i32, y: i32) -> f32 {
        match &self.selection {
            Some(selection) if self.has_selection => selection.coverage(x, y),
            _ => 1.0,
        }
    }

    /// Multiply pixel opacity by a per-pixel factor over `area`
    fn scale_opacity<F>(&mut self, area: Rect, factor: F) -> Result<(), RasterError>
    where
        F: Fn(i32, i32) -> f32,
    {
        if area.is_empty() {
            return Ok(());
        }
        let ps = self.pixel_size;
        let mut buffer = vec![0u8; area.area() as usize * ps];
        self.read_bytes(&mut buffer, area)?;
        let width = area.width as usize;
        for (i, pixel) in buffer.chunks_exact_mut(ps).enumerate() {
            let x = area.x + (i % width) as i32;
            let y = area.y + (i / width) as i32;
            let f = factor(x, y);
            if f < 1.0 {
                self.color_space.multiply_opacity(pixel, f);
            }
        }
        self.write_bytes(&buffer, area)
    }

    /// Erase the selected pixels in proportion to their coverage
    pub fn clear_selection(&mut self) -> Result<(), RasterError> {
        if !self.has_selection() {
            return Ok(());
        }
        let Some(selection) = self.selection.take() else {
            return Ok(());
        };
        let area = match (selection.extent(), self.extent()) {
            (Some(s), Some(e)) => s.intersection(&e),
            _ => Rect::default(),
        };
        let result = self.scale_opacity(area, |x, y| 1.0 - selection.coverage(x, y));
        self.selection = Some(selection);
        debug!("PaintDevice '{}': cleared selection over {:?}", self.name, area);
        result
    }

    /// Multiply every stored pixel's opacity by the coverage of `mask`
    pub fn apply_selection_mask(&mut self, mask: &Selection) -> Result<(), RasterError> {
        let Some(area) = self.extent() else {
            return Ok(());
        };
        self.scale_opacity(area, |x, y| mask.coverage(x, y))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::RGBA8;
    use impasto_config::EngineConfig;

    fn device() -> PaintDevice {
        PaintDevice::new(&RGBA8, "layer", &EngineConfig::default()).unwrap()
    }

    fn rect_selection(rect: Rect, coverage: u8) -> Selection {
        let mut s = Selection::new(64).unwrap();
        s.select_rect(rect, coverage).unwrap();
        s
    }

    #[test]
    fn test_add_subtract_intersect() {
        let mut s = rect_selection(Rect::new(0, 0, 10, 10), 255);
        s.add(&rect_selection(Rect::new(20, 0, 5, 5), 128)).unwrap();
        assert_eq!(s.coverage(22, 2), 128.0 / 255.0);
        assert_eq!(s.coverage(5, 5), 1.0);

        s.subtract(&rect_selection(Rect::new(0, 0, 5, 10), 255)).unwrap();
        assert_eq!(s.coverage(2, 2), 0.0);
        assert_eq!(s.coverage(7, 2), 1.0);

        s.intersect(&rect_selection(Rect::new(6, 0, 100, 1), 64)).unwrap();
        assert_eq!(s.coverage(7, 0), 64.0 / 255.0);
        assert_eq!(s.coverage(7, 1), 0.0);
        assert_eq!(s.coverage(22, 0), 64.0 / 255.0);
    }

    #[test]
    fn test_deselect_keeps_mask_for_reselect() {
        let mut dev = device();
        assert!(!dev.has_selection());
        dev.add_selection(&rect_selection(Rect::new(0, 0, 2, 2), 255)).unwrap();
        assert!(dev.has_selection());
        assert_eq!(dev.selection_coverage(5, 5), 0.0);

        dev.deselect();
        assert!(!dev.has_selection());
        assert_eq!(dev.selection_coverage(5, 5), 1.0);
        dev.reselect();
        assert!(dev.has_selection());
        assert_eq!(dev.selection_coverage(1, 1), 1.0);

        dev.remove_selection();
        dev.reselect();
        assert!(!dev.has_selection());
        assert!(dev.retained_selection().is_none());
    }

    #[test]
    fn test_clear_selection_erases_selected_pixels() {
        let mut dev = device();
        dev.write_bytes(&[200; 4 * 16], Rect::new(0, 0, 4, 4)).unwrap();
        dev.add_selection(&rect_selection(Rect::new(0, 0, 2, 4), 255)).unwrap();
        dev.clear_selection().unwrap();

        assert_eq!(dev.pixel(1, 1)[3], 0);
        assert_eq!(dev.pixel(3, 1), &[200, 200, 200, 200]);
        assert!(dev.has_selection());
    }

    #[test]
    fn test_apply_selection_mask_scales_opacity() {
        let mut dev = device();
        dev.write_bytes(&[255; 4 * 4], Rect::new(0, 0, 2, 2)).unwrap();
        let mask = rect_selection(Rect::new(0, 0, 1, 2), 128);
        dev.apply_selection_mask(&mask).unwrap();
        assert_eq!(dev.pixel(0, 0), &[255, 255, 255, 128]);
        assert_eq!(dev.pixel(1, 0)[3], 0);
    }

    #[test]
    fn test_empty_selection() {
        let mut s = Selection::new(64).unwrap();
        assert!(s.is_empty());
        s.select_rect(Rect::new(0, 0, 1, 1), 0).unwrap();
        assert!(s.is_empty());
        s.select_rect(Rect::new(0, 0, 1, 1), 1).unwrap();
        assert!(!s.is_empty());
    }
}
