//! Structured storage handle for whole-device dumps

use serde::{Deserialize, Serialize};

use super::TileCoord;
use crate::color::CompositeOp;
use crate::error::RasterError;

/// Device metadata written ahead of its tiles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceHeader {
    pub name: String,
    pub x: i32,
    pub y: i32,
    pub visible: bool,
    pub composite_op: CompositeOp,
    /// Id of the device color space
    pub color_space: String,
    pub pixel_size: usize,
    pub tile_size: u32,
    pub default_pixel: Vec<u8>,
}

/// Opaque persistence backend. The device delegates header and whole-tile
/// dumps to it and does not define a byte format of its own.
pub trait TileStore {
    fn write_header(&mut self, header: &DeviceHeader) -> Result<(), RasterError>;

    fn write_tile(&mut self, coord: TileCoord, bytes: &[u8]) -> Result<(), RasterError>;

    fn read_header(&mut self) -> Result<DeviceHeader, RasterError>;

    /// All stored tiles, in the order they were written
    fn read_tiles(&mut self) -> Result<Vec<(TileCoord, Vec<u8>)>, RasterError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct StoredTile {
    coord: TileCoord,
    bytes: Vec<u8>,
}

/// In-memory store, serializable to JSON
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryTileStore {
    header: Option<DeviceHeader>,
    tiles: Vec<StoredTile>,
}

impl MemoryTileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    pub fn to_json(&self) -> Result<String, RasterError> {
        serde_json::to_string(self).map_err(|e| RasterError::Store(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, RasterError> {
        serde_json::from_str(json).map_err(|e| RasterError::Store(e.to_string()))
    }
}

impl TileStore for MemoryTileStore {
    fn write_header(&mut self, header: &DeviceHeader) -> Result<(), RasterError> {
        self.header = Some(header.clone());
        self.tiles.clear();
        Ok(())
    }

    fn write_tile(&mut self, coord: TileCoord, bytes: &[u8]) -> Result<(), RasterError> {
        if self.header.is_none() {
            return Err(RasterError::Store("tile written before header".to_string()));
        }
        self.tiles.push(StoredTile {
            coord,
            bytes: bytes.to_vec(),
        });
        Ok(())
    }

    fn read_header(&mut self) -> Result<DeviceHeader, RasterError> {
        self.header
            .clone()
            .ok_or_else(|| RasterError::Store("no device header".to_string()))
    }

    fn read_tiles(&mut self) -> Result<Vec<(TileCoord, Vec<u8>)>, RasterError> {
        Ok(self
            .tiles
            .iter()
            .map(|t| (t.coord, t.bytes.clone()))
            .collect())
    }
}
