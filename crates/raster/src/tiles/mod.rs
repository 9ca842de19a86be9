//! Sparse tiled pixel storage with default-value semantics
//!
//! Pixels live in square tiles of `tile_size × tile_size × pixel_size`
//! bytes. Tiles are materialized on first write; everything else reads as
//! the manager's default pixel through one shared read-only tile. Tile
//! buffers are reference counted so undo history can keep old versions
//! alive while the live copy is modified copy-on-write.

mod data_access;
mod extent;
mod memento;
mod store;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use slab::Slab;
use tracing::debug;

use crate::error::RasterError;
use crate::geometry::Rect;
use impasto_config::EngineConfig;

pub use memento::Memento;
pub use store::{DeviceHeader, MemoryTileStore, TileStore};

use memento::History;

/// Largest accepted tile side
const MAX_TILE_SIZE: u32 = 4096;

static NEXT_MANAGER_ID: AtomicU64 = AtomicU64::new(1);

/// Tile index. Negative coordinates address tiles left of / above the origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileCoord {
    pub col: i32,
    pub row: i32,
}

impl TileCoord {
    pub const fn new(col: i32, row: i32) -> Self {
        Self { col, row }
    }
}

/// Raw bytes of one tile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileData {
    bytes: Vec<u8>,
}

impl TileData {
    pub(crate) fn from_vec(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[inline]
    pub(crate) fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}

/// One horizontal run of pixels that stays inside a single tile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TileRun {
    pub x: i32,
    pub y: i32,
    /// Length in pixels
    pub len: usize,
    pub coord: TileCoord,
    /// Byte offset of the first pixel inside the tile
    pub offset: usize,
}

/// Split `rect` into row runs that never cross a tile boundary
pub(crate) fn tile_runs(
    rect: Rect,
    tile_size: i32,
    tile_shift: u32,
    pixel_size: usize,
) -> impl Iterator<Item = TileRun> {
    let mask = tile_size - 1;
    let right = rect.right();
    let rows = if rect.is_empty() { 0..0 } else { rect.y..rect.bottom() };
    rows.flat_map(move |y| {
        let mut x = rect.x;
        std::iter::from_fn(move || {
            if x >= right {
                return None;
            }
            let in_tile_x = x & mask;
            let len = (tile_size - in_tile_x).min(right - x);
            let run = TileRun {
                x,
                y,
                len: len as usize,
                coord: TileCoord::new(x >> tile_shift, y >> tile_shift),
                offset: (((y & mask) * tile_size + in_tile_x) as usize) * pixel_size,
            };
            x += len;
            Some(run)
        })
    })
}

/// Chunked sparse 2D byte storage
pub struct TiledDataManager {
    id: u64,
    pixel_size: usize,
    tile_size: i32,
    tile_shift: u32,
    default_pixel: Vec<u8>,
    default_tile: Arc<TileData>,
    slots: Slab<Arc<TileData>>,
    index: HashMap<TileCoord, usize>,
    /// Tile-aligned bounds of the materialized tiles
    extent: Option<Rect>,
    history: History,
    #[cfg(test)]
    extent_scans: usize,
}

impl TiledDataManager {
    /// Create an empty manager.
    ///
    /// `tile_size` must be a power of two and `default_pixel` must be exactly
    /// `pixel_size` bytes long.
    pub fn new(pixel_size: usize, default_pixel: &[u8], tile_size: u32) -> Result<Self, RasterError> {
        if tile_size == 0 || !tile_size.is_power_of_two() || tile_size > MAX_TILE_SIZE {
            return Err(RasterError::InvalidTileSize(tile_size));
        }
        if pixel_size == 0 || default_pixel.len() != pixel_size {
            return Err(RasterError::DefaultPixelSize {
                expected: pixel_size,
                actual: default_pixel.len(),
            });
        }

        let tile_size = tile_size as i32;
        let id = NEXT_MANAGER_ID.fetch_add(1, Ordering::Relaxed);
        debug!(
            "TiledDataManager::new: id={}, pixel_size={}, tile_size={}",
            id, pixel_size, tile_size
        );

        Ok(Self {
            id,
            pixel_size,
            tile_size,
            tile_shift: tile_size.trailing_zeros(),
            default_pixel: default_pixel.to_vec(),
            default_tile: Arc::new(Self::filled_tile(default_pixel, tile_size)),
            slots: Slab::new(),
            index: HashMap::new(),
            extent: None,
            history: History::default(),
            #[cfg(test)]
            extent_scans: 0,
        })
    }

    /// Create a manager using the configured tile size
    pub fn with_config(
        pixel_size: usize,
        default_pixel: &[u8],
        config: &EngineConfig,
    ) -> Result<Self, RasterError> {
        config.validate()?;
        Self::new(pixel_size, default_pixel, config.tile_size)
    }

    fn filled_tile(pixel: &[u8], tile_size: i32) -> TileData {
        let count = (tile_size * tile_size) as usize;
        TileData::from_vec(pixel.repeat(count))
    }

    /// Identifier distinguishing this manager's mementos from others'
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    pub fn pixel_size(&self) -> usize {
        self.pixel_size
    }

    #[inline]
    pub fn tile_size(&self) -> u32 {
        self.tile_size as u32
    }

    #[inline]
    pub fn default_pixel(&self) -> &[u8] {
        &self.default_pixel
    }

    /// Replace the value unwritten pixels read as. Not recorded in history.
    pub fn set_default_pixel(&mut self, pixel: &[u8]) -> Result<(), RasterError> {
        if pixel.len() != self.pixel_size {
            return Err(RasterError::DefaultPixelSize {
                expected: self.pixel_size,
                actual: pixel.len(),
            });
        }
        self.default_pixel = pixel.to_vec();
        self.default_tile = Arc::new(Self::filled_tile(pixel, self.tile_size));
        Ok(())
    }

    /// Number of materialized tiles
    #[inline]
    pub fn tile_count(&self) -> usize {
        self.index.len()
    }

    #[inline]
    pub(crate) fn tile_bytes(&self) -> usize {
        (self.tile_size * self.tile_size) as usize * self.pixel_size
    }

    /// Tile containing pixel `(x, y)`
    #[inline]
    pub fn tile_coord(&self, x: i32, y: i32) -> TileCoord {
        TileCoord::new(x >> self.tile_shift, y >> self.tile_shift)
    }

    /// Pixel rectangle covered by a tile
    #[inline]
    pub fn tile_rect(&self, coord: TileCoord) -> Rect {
        Rect::new(
            coord.col * self.tile_size,
            coord.row * self.tile_size,
            self.tile_size,
            self.tile_size,
        )
    }

    #[inline]
    pub(crate) fn pixel_offset(&self, x: i32, y: i32) -> usize {
        let mask = self.tile_size - 1;
        (((y & mask) * self.tile_size + (x & mask)) as usize) * self.pixel_size
    }

    pub(crate) fn runs(&self, rect: Rect) -> impl Iterator<Item = TileRun> + use<> {
        tile_runs(rect, self.tile_size, self.tile_shift, self.pixel_size)
    }

    /// Tile at `coord`, or the shared default tile
    #[inline]
    pub(crate) fn tile_or_default(&self, coord: TileCoord) -> &TileData {
        match self.index.get(&coord) {
            Some(&slot) => &self.slots[slot],
            None => &self.default_tile,
        }
    }

    pub(crate) fn shared_tile(&self, coord: TileCoord) -> Option<Arc<TileData>> {
        self.index.get(&coord).map(|&slot| Arc::clone(&self.slots[slot]))
    }

    /// Whether the tile at `coord` has been materialized
    #[inline]
    pub fn is_materialized(&self, coord: TileCoord) -> bool {
        self.index.contains_key(&coord)
    }

    /// Record the pre-mutation state of a tile and invalidate redo
    pub(crate) fn note_mutation(&mut self, coord: TileCoord) {
        let current = self.shared_tile(coord);
        self.history.record_before(coord, current);
    }

    /// Insert, replace or drop a tile without touching history
    pub(crate) fn put_tile(&mut self, coord: TileCoord, tile: Option<Arc<TileData>>) {
        if self.place_tile(coord, tile) {
            self.recompute_extent();
        }
    }

    /// Apply a batch of tile changes, rescanning the extent at most once
    pub(crate) fn put_tiles<I>(&mut self, tiles: I)
    where
        I: IntoIterator<Item = (TileCoord, Option<Arc<TileData>>)>,
    {
        let mut dropped = false;
        for (coord, tile) in tiles {
            dropped |= self.place_tile(coord, tile);
        }
        if dropped {
            self.recompute_extent();
        }
    }

    /// Returns true when a materialized tile was dropped
    fn place_tile(&mut self, coord: TileCoord, tile: Option<Arc<TileData>>) -> bool {
        match (tile, self.index.get(&coord).copied()) {
            (Some(tile), Some(slot)) => {
                self.slots[slot] = tile;
                false
            }
            (Some(tile), None) => {
                let slot = self.slots.insert(tile);
                self.index.insert(coord, slot);
                let rect = self.tile_rect(coord);
                self.extent = Some(self.extent.map_or(rect, |e| e.union(&rect)));
                false
            }
            (None, Some(slot)) => {
                self.slots.remove(slot);
                self.index.remove(&coord);
                true
            }
            (None, None) => false,
        }
    }

    /// Mutable bytes of a materialized tile, copied first if shared
    pub(crate) fn tile_mut(&mut self, coord: TileCoord) -> Option<&mut [u8]> {
        let slot = *self.index.get(&coord)?;
        Some(Arc::make_mut(&mut self.slots[slot]).as_bytes_mut())
    }

    /// Materialize every missing tile intersecting `rect`.
    ///
    /// All buffers are allocated before any tile is inserted, so on failure
    /// the manager is left unchanged.
    pub(crate) fn materialize(&mut self, rect: Rect) -> Result<(), RasterError> {
        if rect.is_empty() {
            return Ok(());
        }
        let first = self.tile_coord(rect.x, rect.y);
        let last = self.tile_coord(rect.right() - 1, rect.bottom() - 1);
        let missing: Vec<TileCoord> = (first.row..=last.row)
            .flat_map(|row| (first.col..=last.col).map(move |col| TileCoord::new(col, row)))
            .filter(|coord| !self.index.contains_key(coord))
            .collect();
        if missing.is_empty() {
            return Ok(());
        }

        let tiles = missing.len();
        let tile_bytes = self.tile_bytes();
        let mut buffers = Vec::new();
        buffers
            .try_reserve_exact(tiles)
            .map_err(|_| RasterError::TileAllocation { tiles })?;
        for _ in 0..tiles {
            let mut bytes = Vec::new();
            bytes
                .try_reserve_exact(tile_bytes)
                .map_err(|_| RasterError::TileAllocation { tiles })?;
            bytes.extend_from_slice(self.default_tile.as_bytes());
            buffers.push(bytes);
        }
        self.index
            .try_reserve(tiles)
            .map_err(|_| RasterError::TileAllocation { tiles })?;
        self.slots.reserve(tiles);

        for (coord, bytes) in missing.into_iter().zip(buffers) {
            self.note_mutation(coord);
            self.put_tile(coord, Some(Arc::new(TileData::from_vec(bytes))));
        }
        debug!("TiledDataManager({}): materialized {} tiles", self.id, tiles);
        Ok(())
    }

    fn recompute_extent(&mut self) {
        #[cfg(test)]
        {
            self.extent_scans += 1;
        }
        let tile_size = self.tile_size;
        self.extent = self
            .index
            .keys()
            .map(|c| Rect::new(c.col * tile_size, c.row * tile_size, tile_size, tile_size))
            .reduce(|a, b| a.union(&b));
    }

    /// Materialized tiles in row-major order, for persistence
    pub fn tiles(&self) -> impl Iterator<Item = (TileCoord, &[u8])> {
        let mut coords: Vec<TileCoord> = self.index.keys().copied().collect();
        coords.sort_by_key(|c| (c.row, c.col));
        coords
            .into_iter()
            .map(move |coord| (coord, self.slots[self.index[&coord]].as_bytes()))
    }

    /// Replace a whole tile. Recorded in history like any other write.
    pub fn set_tile(&mut self, coord: TileCoord, bytes: &[u8]) -> Result<(), RasterError> {
        let expected = self.tile_bytes();
        if bytes.len() != expected {
            return Err(RasterError::BufferSize {
                expected,
                actual: bytes.len(),
            });
        }
        self.note_mutation(coord);
        self.put_tile(coord, Some(Arc::new(TileData::from_vec(bytes.to_vec()))));
        Ok(())
    }
}

impl Clone for TiledDataManager {
    /// Copy of the pixel content under a fresh id and with no history.
    /// Tile buffers are shared until either side writes.
    fn clone(&self) -> Self {
        Self {
            id: NEXT_MANAGER_ID.fetch_add(1, Ordering::Relaxed),
            pixel_size: self.pixel_size,
            tile_size: self.tile_size,
            tile_shift: self.tile_shift,
            default_pixel: self.default_pixel.clone(),
            default_tile: Arc::clone(&self.default_tile),
            slots: self.slots.clone(),
            index: self.index.clone(),
            extent: self.extent,
            history: History::default(),
            #[cfg(test)]
            extent_scans: 0,
        }
    }
}

impl std::fmt::Debug for TiledDataManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TiledDataManager")
            .field("id", &self.id)
            .field("pixel_size", &self.pixel_size)
            .field("tile_size", &self.tile_size)
            .field("tiles", &self.index.len())
            .field("extent", &self.extent)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_bad_construction() {
        assert!(matches!(
            TiledDataManager::new(4, &[0; 4], 48),
            Err(RasterError::InvalidTileSize(48))
        ));
        assert!(matches!(
            TiledDataManager::new(4, &[0; 3], 64),
            Err(RasterError::DefaultPixelSize { expected: 4, actual: 3 })
        ));
    }

    #[test]
    fn test_tile_coord_floors_negative_pixels() {
        let dm = TiledDataManager::new(1, &[0], 64).unwrap();
        assert_eq!(dm.tile_coord(0, 0), TileCoord::new(0, 0));
        assert_eq!(dm.tile_coord(63, 64), TileCoord::new(0, 1));
        assert_eq!(dm.tile_coord(-1, -64), TileCoord::new(-1, -1));
        assert_eq!(dm.tile_coord(-65, 0), TileCoord::new(-2, 0));
    }

    #[test]
    fn test_runs_split_at_tile_boundaries() {
        let runs: Vec<TileRun> = tile_runs(Rect::new(-2, 0, 70, 2), 64, 6, 1).collect();
        // Each row: [-2, 0) in tile -1, [0, 64) in tile 0, [64, 68) in tile 1
        assert_eq!(runs.len(), 6);
        assert_eq!(runs[0].len, 2);
        assert_eq!(runs[0].coord, TileCoord::new(-1, 0));
        assert_eq!(runs[0].offset, 62);
        assert_eq!(runs[1].len, 64);
        assert_eq!(runs[2].len, 4);
        assert_eq!(runs[3].y, 1);
        assert_eq!(runs[3].offset, 64 + 62);
    }

    #[test]
    fn test_clone_shares_content_with_fresh_id() {
        let mut dm = TiledDataManager::new(1, &[0], 8).unwrap();
        dm.write_bytes(&[7], Rect::new(3, 3, 1, 1)).unwrap();
        let mut copy = dm.clone();
        assert_ne!(copy.id(), dm.id());
        assert_eq!(copy.pixel(3, 3), &[7]);

        copy.write_bytes(&[9], Rect::new(3, 3, 1, 1)).unwrap();
        assert_eq!(dm.pixel(3, 3), &[7]);
        assert_eq!(copy.pixel(3, 3), &[9]);
    }

    #[test]
    fn test_set_tile_checks_length() {
        let mut dm = TiledDataManager::new(2, &[0, 0], 4).unwrap();
        assert!(dm.set_tile(TileCoord::new(1, 1), &[1; 31]).is_err());
        dm.set_tile(TileCoord::new(1, 1), &[1; 32]).unwrap();
        assert_eq!(dm.tile_count(), 1);
        assert_eq!(dm.pixel(4, 4), &[1, 1]);
        assert_eq!(dm.tiles().count(), 1);
    }
}
