//! Paint device: a positioned, color-space-aware view of tiled storage
//!
//! All public pixel coordinates are image coordinates. The device's `(x, y)`
//! offset is subtracted before delegating to its [`TiledDataManager`].

mod access;
mod convert;
mod events;
mod io;
mod selection;
mod transform;

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::color::{ColorSpace, CompositeOp};
use crate::error::RasterError;
use crate::tiles::TiledDataManager;
use impasto_config::EngineConfig;

pub use events::DeviceEvent;
pub use selection::Selection;
pub use transform::{BoxFilter, FilterStrategy, MitchellFilter, TriangleFilter};

use events::Listeners;

/// Non-owning reference to the image that owns a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageId(pub u64);

/// Device shared between the stroke operator and its owner
pub type SharedDevice = Arc<RwLock<PaintDevice>>;

/// Read-lock a shared device, recovering from a poisoned lock
pub fn read_device(device: &SharedDevice) -> RwLockReadGuard<'_, PaintDevice> {
    device.read().unwrap_or_else(|poisoned: PoisonError<_>| {
        warn!("PaintDevice lock poisoned, recovering for read");
        poisoned.into_inner()
    })
}

/// Write-lock a shared device, recovering from a poisoned lock
pub fn write_device(device: &SharedDevice) -> RwLockWriteGuard<'_, PaintDevice> {
    device.write().unwrap_or_else(|poisoned: PoisonError<_>| {
        warn!("PaintDevice lock poisoned, recovering for write");
        poisoned.into_inner()
    })
}

/// Named, positioned pixel storage in one color space
pub struct PaintDevice {
    name: String,
    x: i32,
    y: i32,
    visible: bool,
    composite_op: CompositeOp,
    data: TiledDataManager,
    color_space: &'static dyn ColorSpace,
    pixel_size: usize,
    channel_count: usize,
    image: Option<ImageId>,
    extent_is_valid: bool,
    /// Retained mask, kept across deselect for reselect
    selection: Option<Selection>,
    has_selection: bool,
    listeners: Listeners,
}

impl PaintDevice {
    /// Create an empty, fully transparent device
    pub fn new(
        color_space: &'static dyn ColorSpace,
        name: impl Into<String>,
        config: &EngineConfig,
    ) -> Result<Self, RasterError> {
        let mut default_pixel = vec![0u8; color_space.pixel_size()];
        color_space.from_rgba([0.0; 4], &mut default_pixel);
        let data = TiledDataManager::with_config(color_space.pixel_size(), &default_pixel, config)?;
        let name = name.into();
        debug!(
            "PaintDevice::new: '{}' in {} (tile_size={})",
            name,
            color_space.id(),
            config.tile_size
        );
        Ok(Self {
            name,
            x: 0,
            y: 0,
            visible: true,
            composite_op: CompositeOp::Over,
            data,
            color_space,
            pixel_size: color_space.pixel_size(),
            channel_count: color_space.channel_count(),
            image: None,
            extent_is_valid: true,
            selection: None,
            has_selection: false,
            listeners: Listeners::default(),
        })
    }

    /// Create a device belonging to `image`
    pub fn with_image(
        image: ImageId,
        color_space: &'static dyn ColorSpace,
        name: impl Into<String>,
        config: &EngineConfig,
    ) -> Result<Self, RasterError> {
        let mut device = Self::new(color_space, name, config)?;
        device.image = Some(image);
        Ok(device)
    }

    /// Deep copy of pixels, selection and properties. Listeners and undo
    /// history are not copied.
    pub fn duplicate(&self) -> Self {
        Self {
            name: self.name.clone(),
            x: self.x,
            y: self.y,
            visible: self.visible,
            composite_op: self.composite_op,
            data: self.data.clone(),
            color_space: self.color_space,
            pixel_size: self.pixel_size,
            channel_count: self.channel_count,
            image: self.image,
            extent_is_valid: self.extent_is_valid,
            selection: self.selection.clone(),
            has_selection: self.has_selection,
            listeners: Listeners::default(),
        }
    }

    /// Wrap this device for sharing with a stroke operator
    pub fn into_shared(self) -> SharedDevice {
        Arc::new(RwLock::new(self))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    #[inline]
    pub fn x(&self) -> i32 {
        self.x
    }

    #[inline]
    pub fn y(&self) -> i32 {
        self.y
    }

    pub fn set_x(&mut self, x: i32) {
        self.move_to(x, self.y);
    }

    pub fn set_y(&mut self, y: i32) {
        self.move_to(self.x, y);
    }

    /// Move the device origin. Emits `PositionChanged` if it moved.
    pub fn move_to(&mut self, x: i32, y: i32) {
        if (x, y) == (self.x, self.y) {
            return;
        }
        self.x = x;
        self.y = y;
        self.listeners.emit(DeviceEvent::PositionChanged { x, y });
    }

    pub fn visible(&self) -> bool {
        self.visible
    }

    /// Emits `VisibilityChanged` if the flag changed
    pub fn set_visible(&mut self, visible: bool) {
        if self.visible == visible {
            return;
        }
        self.visible = visible;
        self.listeners.emit(DeviceEvent::VisibilityChanged { visible });
    }

    pub fn composite_op(&self) -> CompositeOp {
        self.composite_op
    }

    pub fn set_composite_op(&mut self, op: CompositeOp) {
        self.composite_op = op;
    }

    pub fn image(&self) -> Option<ImageId> {
        self.image
    }

    pub fn set_image(&mut self, image: Option<ImageId>) {
        self.image = image;
    }

    #[inline]
    pub fn pixel_size(&self) -> usize {
        self.pixel_size
    }

    #[inline]
    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    pub fn has_alpha(&self) -> bool {
        self.color_space.has_alpha()
    }

    #[inline]
    pub fn color_space(&self) -> &'static dyn ColorSpace {
        self.color_space
    }

    pub fn data_manager(&self) -> &TiledDataManager {
        &self.data
    }

    /// Replace pixel data and color space together
    pub fn set_data(
        &mut self,
        data: TiledDataManager,
        color_space: &'static dyn ColorSpace,
    ) -> Result<(), RasterError> {
        if data.pixel_size() != color_space.pixel_size() {
            return Err(RasterError::PixelSizeMismatch {
                expected: color_space.pixel_size(),
                actual: data.pixel_size(),
            });
        }
        let profile_changed = color_space.id() != self.color_space.id();
        self.data = data;
        self.color_space = color_space;
        self.pixel_size = color_space.pixel_size();
        self.channel_count = color_space.channel_count();
        self.extent_is_valid = true;
        if profile_changed {
            self.listeners.emit(DeviceEvent::ProfileChanged {
                color_space: color_space.id(),
            });
        }
        Ok(())
    }

    /// Register a callback invoked after every state change notification
    pub fn add_listener<F>(&mut self, listener: F)
    where
        F: Fn(&DeviceEvent) + Send + Sync + 'static,
    {
        self.listeners.add(listener);
    }

    /// Receive this device's events over a channel
    pub fn subscribe(&mut self) -> crossbeam_channel::Receiver<DeviceEvent> {
        self.listeners.subscribe()
    }

    pub(crate) fn emit(&self, event: DeviceEvent) {
        self.listeners.emit(event);
    }
}

impl std::fmt::Debug for PaintDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaintDevice")
            .field("name", &self.name)
            .field("x", &self.x)
            .field("y", &self.y)
            .field("visible", &self.visible)
            .field("color_space", &self.color_space.id())
            .field("data", &self.data)
            .field("has_selection", &self.has_selection)
            .field("listener_count", &self.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::{ALPHA8, RGBA8, RGBAF32};

    fn device() -> PaintDevice {
        PaintDevice::new(&RGBA8, "layer", &EngineConfig::default()).unwrap()
    }

    #[test]
    fn test_cached_sizes_follow_color_space() {
        let dev = device();
        assert_eq!(dev.pixel_size(), 4);
        assert_eq!(dev.channel_count(), 4);
        assert_eq!(dev.data_manager().default_pixel(), &[0, 0, 0, 0]);

        let hdr = PaintDevice::new(&RGBAF32, "hdr", &EngineConfig::default()).unwrap();
        assert_eq!(hdr.pixel_size(), 16);
    }

    #[test]
    fn test_position_and_visibility_notify_on_change() {
        let mut dev = device();
        let events = dev.subscribe();

        dev.move_to(0, 0);
        dev.set_x(5);
        dev.set_y(-3);
        dev.set_visible(true);
        dev.set_visible(false);

        let received: Vec<DeviceEvent> = events.try_iter().collect();
        assert_eq!(
            received,
            vec![
                DeviceEvent::PositionChanged { x: 5, y: 0 },
                DeviceEvent::PositionChanged { x: 5, y: -3 },
                DeviceEvent::VisibilityChanged { visible: false },
            ]
        );
    }

    #[test]
    fn test_set_data_checks_pixel_size() {
        let mut dev = device();
        let alpha = TiledDataManager::new(1, &[0], 64).unwrap();
        assert!(matches!(
            dev.set_data(alpha.clone(), &RGBA8),
            Err(RasterError::PixelSizeMismatch { expected: 4, actual: 1 })
        ));

        let events = dev.subscribe();
        dev.set_data(alpha, &ALPHA8).unwrap();
        assert_eq!(dev.pixel_size(), 1);
        assert_eq!(dev.channel_count(), 1);
        assert_eq!(
            events.try_recv().unwrap(),
            DeviceEvent::ProfileChanged { color_space: "ALPHA8" }
        );
    }

    #[test]
    fn test_duplicate_copies_content_not_listeners() {
        let mut dev = PaintDevice::with_image(ImageId(7), &RGBA8, "a", &EngineConfig::default()).unwrap();
        dev.add_listener(|_| {});
        dev.write_bytes(&[1, 2, 3, 4], crate::geometry::Rect::new(2, 2, 1, 1)).unwrap();

        let copy = dev.duplicate();
        assert_eq!(copy.image(), Some(ImageId(7)));
        assert_eq!(copy.pixel(2, 2), &[1, 2, 3, 4]);
        assert_eq!(copy.listeners.len(), 0);
    }

    #[test]
    fn test_shared_device_lock_helpers() {
        let shared = device().into_shared();
        write_device(&shared).set_name("renamed");
        assert_eq!(read_device(&shared).name(), "renamed");
    }
}
