//! Dab requests, rendered dab buffers and the asynchronous rendering pool
//!
//! A [`DabRequest`] describes one brush stamp. Workers of the
//! [`DabRenderingExecutor`] turn requests into [`RenderedDab`]s: a small
//! [`FixedDab`] pixel buffer in the composition source space plus its integer
//! placement and compositing parameters.

mod brush;
mod executor;
mod resources;

use std::sync::Arc;

use glam::{IVec2, Vec2};
use serde::{Deserialize, Serialize};

use crate::color::{Color, ColorSpace};
use crate::geometry::{MirrorDirection, Rect, flip_pixels};
use crate::paint_info::PaintInfo;

pub use brush::{AutoBrush, Brush, DabMask, calculate_hardness_falloff};
pub use executor::DabRenderingExecutor;
pub use resources::{DabRenderingResources, ResourceFactory};

/// Errors from rendering a single dab. These never leave the executor;
/// failed dabs are logged and dropped.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RenderError {
    #[error("Brush cannot paint this sample")]
    CannotPaint,

    #[error("Dab mask has no coverage")]
    EmptyDab,

    #[error("Dab worker panicked: {0}")]
    WorkerPanic(String),
}

/// Per-dab transform of the brush footprint
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DabShape {
    /// Multiplier of the brush diameter
    pub scale: f32,
    /// Height to width ratio
    pub ratio: f32,
    /// Rotation in radians
    pub rotation: f32,
}

impl Default for DabShape {
    fn default() -> Self {
        Self {
            scale: 1.0,
            ratio: 1.0,
            rotation: 0.0,
        }
    }
}

/// Everything a worker needs to render one dab
#[derive(Debug, Clone)]
pub struct DabRequest {
    pub color: Color,
    /// Center of the dab in image coordinates
    pub position: Vec2,
    pub shape: DabShape,
    pub info: PaintInfo,
    /// 1.0 leaves the brush hardness unchanged
    pub softness: f32,
}

/// Top-left pixel of a `width`×`height` buffer centered on `position`
#[inline]
pub fn dab_origin(position: Vec2, width: u32, height: u32) -> IVec2 {
    (position - Vec2::new(width as f32, height as f32) * 0.5)
        .floor()
        .as_ivec2()
}

/// Small pixel buffer holding one colored dab
#[derive(Debug, Clone)]
pub struct FixedDab {
    width: u32,
    height: u32,
    color_space: &'static dyn ColorSpace,
    data: Vec<u8>,
}

impl FixedDab {
    /// Color a coverage mask with straight-alpha `rgba`
    pub fn from_mask(mask: &DabMask, rgba: [f32; 4], color_space: &'static dyn ColorSpace) -> Self {
        let ps = color_space.pixel_size();
        let mut data = vec![0u8; mask.len() * ps];
        for (coverage, pixel) in mask.coverage().iter().zip(data.chunks_exact_mut(ps)) {
            color_space.from_rgba([rgba[0], rgba[1], rgba[2], rgba[3] * coverage], pixel);
        }
        Self {
            width: mask.width(),
            height: mask.height(),
            color_space,
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn color_space(&self) -> &'static dyn ColorSpace {
        self.color_space
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let ps = self.color_space.pixel_size();
        let start = (y as usize * self.width as usize + x as usize) * ps;
        &self.data[start..start + ps]
    }

    #[inline]
    pub fn rgba(&self, x: u32, y: u32) -> [f32; 4] {
        self.color_space.to_rgba(self.pixel(x, y))
    }

    /// Flip the buffer in place
    pub fn mirror(&mut self, direction: MirrorDirection) {
        let ps = self.color_space.pixel_size();
        flip_pixels(&mut self.data, self.width as usize, self.height as usize, ps, direction);
    }
}

/// A rendered dab ready for compositing. Delivered once, in submission order.
#[derive(Debug, Clone)]
pub struct RenderedDab {
    /// Buffer, shared with later dabs when the dab cache hits
    pub dab: Arc<FixedDab>,
    /// Image position of the buffer's top-left pixel
    pub offset: IVec2,
    pub opacity: f32,
    pub flow: f32,
    /// Running stroke opacity at the time this dab was submitted
    pub average_opacity: f32,
    /// Submission sequence number
    pub seq: u64,
}

impl RenderedDab {
    /// Image-space footprint
    pub fn rect(&self) -> Rect {
        Rect::new(
            self.offset.x,
            self.offset.y,
            self.dab.width() as i32,
            self.dab.height() as i32,
        )
    }
}
