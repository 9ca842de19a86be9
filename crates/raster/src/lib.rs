//! Impasto raster engine - tiled paint devices and the brush dab pipeline
//!
//! This crate provides:
//! - [`tiles`] - Sparse tile storage with copy-on-write undo history
//! - [`device`] - Paint devices: pixel access, selections, transforms and I/O
//! - [`color`] - Color spaces, color values and compositing
//! - [`paint_info`] / [`sensors`] - Pointer samples and dynamic brush options
//! - [`dab`] - Dab rendering on a worker pool with in-order delivery
//! - [`painter`] - Dab compositing, mirroring and dirty tracking
//! - [`brush_op`] - The stroke operator tying it together

pub mod brush_op;
pub mod color;
pub mod constants;
pub mod dab;
pub mod device;
pub mod error;
pub mod geometry;
pub mod paint_info;
pub mod painter;
pub mod sensors;
pub mod stats;
pub mod tiles;

pub use brush_op::{BrushOp, BrushOpSettings};
pub use color::{Color, ColorSpace, CompositeOp};
pub use dab::{AutoBrush, Brush, DabRenderingExecutor};
pub use device::{PaintDevice, SharedDevice, read_device, write_device};
pub use error::RasterError;
pub use geometry::Rect;
pub use paint_info::{DistanceInfo, PaintInfo, Spacing, Timing};
pub use painter::{MirrorSettings, Painter};
pub use tiles::{Memento, TiledDataManager};
