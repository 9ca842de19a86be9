//! Byte-level region and pixel access

use super::TiledDataManager;
use crate::error::RasterError;
use crate::geometry::Rect;

impl TiledDataManager {
    fn check_region(&self, buffer_len: usize, rect: Rect) -> Result<usize, RasterError> {
        if rect.width < 0 || rect.height < 0 {
            return Err(RasterError::InvalidRect {
                width: rect.width,
                height: rect.height,
            });
        }
        let expected = rect.width as usize * rect.height as usize * self.pixel_size;
        if buffer_len < expected {
            return Err(RasterError::BufferSize {
                expected,
                actual: buffer_len,
            });
        }
        Ok(expected)
    }

    /// Fill `buffer` with the pixels of `rect`, row-major.
    ///
    /// Pixels that were never written read as the default pixel. Never
    /// allocates tiles.
    pub fn read_bytes(&self, buffer: &mut [u8], rect: Rect) -> Result<(), RasterError> {
        self.check_region(buffer.len(), rect)?;
        let ps = self.pixel_size;
        let row_bytes = rect.width.max(0) as usize * ps;
        for run in self.runs(rect) {
            let dst = (run.y - rect.y) as usize * row_bytes + (run.x - rect.x) as usize * ps;
            let bytes = run.len * ps;
            let tile = self.tile_or_default(run.coord).as_bytes();
            buffer[dst..dst + bytes].copy_from_slice(&tile[run.offset..run.offset + bytes]);
        }
        Ok(())
    }

    /// Copy `buffer` into `rect`, materializing tiles as needed.
    ///
    /// Fails with [`RasterError::TileAllocation`] before any byte is copied
    /// if the needed tiles cannot be allocated.
    pub fn write_bytes(&mut self, buffer: &[u8], rect: Rect) -> Result<(), RasterError> {
        self.check_region(buffer.len(), rect)?;
        if rect.is_empty() {
            return Ok(());
        }
        self.materialize(rect)?;

        let ps = self.pixel_size;
        let row_bytes = rect.width as usize * ps;
        let mut current = None;
        for run in self.runs(rect) {
            if current != Some(run.coord) {
                self.note_mutation(run.coord);
                current = Some(run.coord);
            }
            let src = (run.y - rect.y) as usize * row_bytes + (run.x - rect.x) as usize * ps;
            let bytes = run.len * ps;
            if let Some(tile) = self.tile_mut(run.coord) {
                tile[run.offset..run.offset + bytes].copy_from_slice(&buffer[src..src + bytes]);
            }
        }
        Ok(())
    }

    /// Bytes of one pixel. Unwritten pixels return the default pixel.
    pub fn pixel(&self, x: i32, y: i32) -> &[u8] {
        let offset = self.pixel_offset(x, y);
        let tile = self.tile_or_default(self.tile_coord(x, y)).as_bytes();
        &tile[offset..offset + self.pixel_size]
    }

    /// Mutable bytes of one pixel, materializing its tile
    pub fn writable_pixel(&mut self, x: i32, y: i32) -> Result<&mut [u8], RasterError> {
        let coord = self.tile_coord(x, y);
        self.materialize(Rect::new(x, y, 1, 1))?;
        self.note_mutation(coord);
        let offset = self.pixel_offset(x, y);
        let ps = self.pixel_size;
        match self.tile_mut(coord) {
            Some(tile) => Ok(&mut tile[offset..offset + ps]),
            None => Err(RasterError::TileAllocation { tiles: 1 }),
        }
    }

    /// Bytes from pixel `(x, y)` to the end of its tile.
    ///
    /// The first `num_contiguous_columns(x, ..)` pixels of the slice belong
    /// to row `y`; advancing by `row_stride(x, y)` bytes reaches the same
    /// column on the next row, for `num_contiguous_rows(y, ..)` rows.
    pub fn pixel_run(&self, x: i32, y: i32) -> &[u8] {
        let offset = self.pixel_offset(x, y);
        &self.tile_or_default(self.tile_coord(x, y)).as_bytes()[offset..]
    }

    /// Columns starting at `x` that share a tile. Identical for every row in
    /// `[min_y, max_y]`.
    pub fn num_contiguous_columns(&self, x: i32, _min_y: i32, _max_y: i32) -> i32 {
        self.tile_size - (x & (self.tile_size - 1))
    }

    /// Rows starting at `y` that share a tile. Identical for every column in
    /// `[min_x, max_x]`.
    pub fn num_contiguous_rows(&self, y: i32, _min_x: i32, _max_x: i32) -> i32 {
        self.tile_size - (y & (self.tile_size - 1))
    }

    /// Byte distance between vertically adjacent pixels in a [`pixel_run`]
    ///
    /// [`pixel_run`]: Self::pixel_run
    pub fn row_stride(&self, _x: i32, _y: i32) -> usize {
        self.tile_size as usize * self.pixel_size
    }

    /// Walk `rect` as contiguous row runs that stay inside one tile.
    ///
    /// `f` receives the run's starting pixel and its bytes
    /// (`len × pixel_size`). Unmaterialized tiles yield default bytes.
    pub fn visit_runs<F>(&self, rect: Rect, mut f: F)
    where
        F: FnMut(i32, i32, &[u8]),
    {
        for run in self.runs(rect) {
            let tile = self.tile_or_default(run.coord).as_bytes();
            f(run.x, run.y, &tile[run.offset..run.offset + run.len * self.pixel_size]);
        }
    }

    /// Walk only the materialized tiles intersecting `rect`
    pub fn visit_materialized_runs<F>(&self, rect: Rect, mut f: F)
    where
        F: FnMut(i32, i32, &[u8]),
    {
        for run in self.runs(rect) {
            if let Some(&slot) = self.index.get(&run.coord) {
                let tile = self.slots[slot].as_bytes();
                f(run.x, run.y, &tile[run.offset..run.offset + run.len * self.pixel_size]);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> TiledDataManager {
        TiledDataManager::new(4, &[0, 0, 0, 0], 64).unwrap()
    }

    #[test]
    fn test_unwritten_pixels_read_default() {
        let dm = TiledDataManager::new(4, &[1, 2, 3, 4], 64).unwrap();
        for (x, y) in [(0, 0), (-1000, 77), (123_456, -9)] {
            assert_eq!(dm.pixel(x, y), &[1, 2, 3, 4]);
        }
        let mut buf = vec![0u8; 3 * 2 * 4];
        dm.read_bytes(&mut buf, Rect::new(-1, -1, 3, 2)).unwrap();
        assert!(buf.chunks(4).all(|p| p == [1, 2, 3, 4]));
        assert_eq!(dm.tile_count(), 0);
    }

    #[test]
    fn test_write_read_round_trip_across_tiles() {
        let mut dm = manager();
        let rect = Rect::new(-70, 50, 150, 30);
        let data: Vec<u8> = (0..rect.area() as usize * 4).map(|i| (i % 251) as u8).collect();
        dm.write_bytes(&data, rect).unwrap();

        let mut out = vec![0u8; data.len()];
        dm.read_bytes(&mut out, rect).unwrap();
        assert_eq!(out, data);

        // Larger read: the border stays default
        let outer = Rect::new(-71, 49, 152, 32);
        let mut wide = vec![9u8; outer.area() as usize * 4];
        dm.read_bytes(&mut wide, outer).unwrap();
        assert_eq!(&wide[..4], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_buffer_size_is_checked() {
        let mut dm = manager();
        let mut small = vec![0u8; 15];
        assert!(matches!(
            dm.read_bytes(&mut small, Rect::new(0, 0, 2, 2)),
            Err(RasterError::BufferSize { expected: 16, actual: 15 })
        ));
        assert!(dm.write_bytes(&small, Rect::new(0, 0, 2, 2)).is_err());
        assert_eq!(dm.tile_count(), 0);
        assert!(matches!(
            dm.read_bytes(&mut small, Rect::new(0, 0, -1, 2)),
            Err(RasterError::InvalidRect { .. })
        ));
    }

    #[test]
    fn test_writable_pixel_materializes() {
        let mut dm = manager();
        dm.writable_pixel(-3, 5).unwrap().copy_from_slice(&[9, 9, 9, 9]);
        assert_eq!(dm.pixel(-3, 5), &[9, 9, 9, 9]);
        assert_eq!(dm.pixel(-2, 5), &[0, 0, 0, 0]);
        assert_eq!(dm.tile_count(), 1);
    }

    #[test]
    fn test_pixel_run_and_stride() {
        let mut dm = TiledDataManager::new(1, &[0], 8).unwrap();
        let data: Vec<u8> = (0..64).collect();
        dm.write_bytes(&data, Rect::new(0, 0, 8, 8)).unwrap();

        assert_eq!(dm.num_contiguous_columns(5, 0, 7), 3);
        assert_eq!(dm.num_contiguous_rows(-1, 0, 7), 1);
        assert_eq!(dm.num_contiguous_columns(-8, 0, 0), 8);

        let run = dm.pixel_run(2, 3);
        let stride = dm.row_stride(2, 3);
        assert_eq!(stride, 8);
        assert_eq!(run[0], 3 * 8 + 2);
        assert_eq!(run[stride], 4 * 8 + 2);
        assert_eq!(run.len(), 64 - (3 * 8 + 2));
    }

    #[test]
    fn test_visit_runs_covers_rect() {
        let mut dm = TiledDataManager::new(1, &[0], 8).unwrap();
        dm.write_bytes(&[5; 4], Rect::new(6, 0, 4, 1)).unwrap();
        let mut seen = Vec::new();
        dm.visit_runs(Rect::new(4, 0, 8, 1), |x, _, bytes| seen.push((x, bytes.to_vec())));
        assert_eq!(seen, vec![(4, vec![0, 0, 5, 5]), (8, vec![5, 5, 0, 0])]);

        let mut materialized = 0;
        dm.visit_materialized_runs(Rect::new(-8, 0, 32, 1), |_, _, bytes| materialized += bytes.len());
        assert_eq!(materialized, 16);
    }
}
