//! Extent tracking and truncation

use tracing::debug;

use super::{TileCoord, TiledDataManager};
use crate::geometry::Rect;

impl TiledDataManager {
    /// Tile-aligned bounds of all materialized tiles, `None` when empty
    #[inline]
    pub fn extent(&self) -> Option<Rect> {
        self.extent
    }

    /// Drop tiles outside `rect` and reset pixels outside it in the tiles
    /// that straddle its border
    pub fn set_extent(&mut self, rect: Rect) {
        let coords: Vec<TileCoord> = self.index.keys().copied().collect();
        let ps = self.pixel_size;
        let tile_size = self.tile_size as usize;
        let mut dropped = Vec::new();
        for coord in coords {
            let tile_rect = self.tile_rect(coord);
            let keep = tile_rect.intersection(&rect);
            if keep.is_empty() {
                self.note_mutation(coord);
                dropped.push((coord, None));
                continue;
            }
            if keep == tile_rect {
                continue;
            }

            self.note_mutation(coord);
            let default_pixel = self.default_pixel.clone();
            let Some(tile) = self.tile_mut(coord) else {
                continue;
            };
            for (i, pixel) in tile.chunks_exact_mut(ps).enumerate() {
                let x = tile_rect.x + (i % tile_size) as i32;
                let y = tile_rect.y + (i / tile_size) as i32;
                if !keep.contains(x, y) {
                    pixel.copy_from_slice(&default_pixel);
                }
            }
        }
        let count = dropped.len();
        self.put_tiles(dropped);
        debug!(
            "TiledDataManager({}): set_extent {:?}, dropped {} tiles",
            self.id, rect, count
        );
    }

    /// Release every tile. The extent becomes empty.
    pub fn clear(&mut self) {
        let coords: Vec<TileCoord> = self.index.keys().copied().collect();
        for coord in &coords {
            self.note_mutation(*coord);
        }
        self.slots.clear();
        self.index.clear();
        self.extent = None;
        debug!("TiledDataManager({}): cleared {} tiles", self.id, coords.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extent_is_tile_aligned_superset() {
        let mut dm = TiledDataManager::new(4, &[0; 4], 64).unwrap();
        assert_eq!(dm.extent(), None);

        dm.write_bytes(&[255; 4 * 16], Rect::new(10, 10, 4, 4)).unwrap();
        assert_eq!(dm.extent(), Some(Rect::new(0, 0, 64, 64)));

        dm.write_bytes(&[1; 4], Rect::new(-1, 130, 1, 1)).unwrap();
        let extent = dm.extent().unwrap();
        assert_eq!(extent, Rect::new(-64, 0, 128, 192));
        assert!(extent.contains_rect(&Rect::new(10, 10, 4, 4)));
        assert!(extent.contains(-1, 130));
    }

    #[test]
    fn test_set_extent_truncates() {
        let mut dm = TiledDataManager::new(1, &[0], 8).unwrap();
        dm.write_bytes(&[7; 16 * 16], Rect::new(0, 0, 16, 16)).unwrap();
        assert_eq!(dm.tile_count(), 4);

        dm.set_extent(Rect::new(0, 0, 4, 4));
        assert_eq!(dm.tile_count(), 1);
        assert_eq!(dm.extent(), Some(Rect::new(0, 0, 8, 8)));
        assert_eq!(dm.pixel(3, 3), &[7]);
        assert_eq!(dm.pixel(4, 3), &[0]);
        assert_eq!(dm.pixel(3, 4), &[0]);
        assert_eq!(dm.pixel(12, 12), &[0]);
    }

    #[test]
    fn test_truncating_many_tiles_rescans_extent_once() {
        let mut dm = TiledDataManager::new(1, &[0], 8).unwrap();
        dm.write_bytes(&[5; 80 * 80], Rect::new(0, 0, 80, 80)).unwrap();
        assert_eq!(dm.tile_count(), 100);

        dm.set_extent(Rect::new(0, 0, 8, 8));
        assert_eq!(dm.tile_count(), 1);
        assert_eq!(dm.extent(), Some(Rect::new(0, 0, 8, 8)));
        assert_eq!(dm.extent_scans, 1);
    }

    #[test]
    fn test_clear_releases_everything() {
        let mut dm = TiledDataManager::new(1, &[3], 8).unwrap();
        dm.write_bytes(&[7; 4], Rect::new(-20, 40, 2, 2)).unwrap();
        dm.clear();
        assert_eq!(dm.tile_count(), 0);
        assert_eq!(dm.extent(), None);
        assert_eq!(dm.pixel(-20, 40), &[3]);
    }
}
