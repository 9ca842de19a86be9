//! Whole-device persistence through a [`TileStore`]

use tracing::debug;

use super::PaintDevice;
use super::events::ProgressReporter;
use crate::color::builtin_space;
use crate::error::RasterError;
use crate::tiles::{DeviceHeader, TileStore, TiledDataManager};

impl PaintDevice {
    fn header(&self) -> DeviceHeader {
        DeviceHeader {
            name: self.name.clone(),
            x: self.x,
            y: self.y,
            visible: self.visible,
            composite_op: self.composite_op,
            color_space: self.color_space.id().to_string(),
            pixel_size: self.pixel_size,
            tile_size: self.data.tile_size(),
            default_pixel: self.data.default_pixel().to_vec(),
        }
    }

    /// Dump header and every materialized tile
    pub fn write(&self, store: &mut dyn TileStore) -> Result<(), RasterError> {
        store.write_header(&self.header())?;
        let mut progress = ProgressReporter::new(&self.listeners, self.data.tile_count());
        for (done, (coord, bytes)) in self.data.tiles().enumerate() {
            progress.update(done);
            store.write_tile(coord, bytes)?;
        }
        progress.finish();
        debug!("PaintDevice '{}': wrote {} tiles", self.name, self.data.tile_count());
        Ok(())
    }

    /// Replace this device's pixels and properties with a stored dump.
    ///
    /// The stored color space must match the device's; a mismatch leaves
    /// the device untouched.
    pub fn read(&mut self, store: &mut dyn TileStore) -> Result<(), RasterError> {
        let header = store.read_header()?;
        if header.color_space != self.color_space.id() {
            return Err(RasterError::ColorSpaceMismatch {
                expected: self.color_space.id().to_string(),
                actual: header.color_space,
            });
        }
        let stored_ps = builtin_space(&header.color_space).map_or(header.pixel_size, |cs| cs.pixel_size());
        if header.pixel_size != self.pixel_size || stored_ps != self.pixel_size {
            return Err(RasterError::PixelSizeMismatch {
                expected: self.pixel_size,
                actual: header.pixel_size,
            });
        }

        let mut data = TiledDataManager::new(header.pixel_size, &header.default_pixel, header.tile_size)?;
        let tiles = store.read_tiles()?;
        {
            let mut progress = ProgressReporter::new(&self.listeners, tiles.len());
            for (done, (coord, bytes)) in tiles.iter().enumerate() {
                progress.update(done);
                data.set_tile(*coord, bytes)?;
            }
            progress.finish();
        }

        debug!(
            "PaintDevice '{}': read {} tiles as '{}'",
            self.name,
            data.tile_count(),
            header.name
        );
        self.data = data;
        self.name = header.name;
        self.composite_op = header.composite_op;
        self.extent_is_valid = true;
        self.move_to(header.x, header.y);
        self.set_visible(header.visible);
        Ok(())
    }
}
