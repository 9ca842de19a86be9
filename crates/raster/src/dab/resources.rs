//! Per-worker rendering state

use std::sync::Arc;

use glam::IVec2;
use tracing::trace;

use super::{Brush, DabRequest, FixedDab, RenderError, dab_origin};
use crate::color::{ColorSpace, RenderingIntent};

/// State owned by exactly one rendering worker
pub struct DabRenderingResources {
    brush: Box<dyn Brush>,
}

impl DabRenderingResources {
    pub fn new(brush: Box<dyn Brush>) -> Self {
        Self { brush }
    }

    pub fn brush(&self) -> &dyn Brush {
        self.brush.as_ref()
    }

    /// Render `request` for compositing into `destination`.
    ///
    /// The buffer is colored in the destination's composition source
    /// space. Returns the buffer and the image position of its top-left
    /// pixel.
    pub fn render(
        &mut self,
        request: &DabRequest,
        destination: &'static dyn ColorSpace,
    ) -> Result<(Arc<FixedDab>, IVec2), RenderError> {
        if !self.brush.can_paint_for(&request.info) {
            return Err(RenderError::CannotPaint);
        }
        let width = self.brush.mask_width(&request.shape);
        let height = self.brush.mask_height(&request.shape);
        if width == 0 || height == 0 {
            return Err(RenderError::EmptyDab);
        }

        let origin = dab_origin(request.position, width, height);
        let center = request.position - origin.as_vec2();
        let mask = self.brush.generate_mask(&request.shape, center, request.softness)?;

        let source = destination.composition_source();
        let rgba = request
            .color
            .convert_to(source, RenderingIntent::Perceptual)
            .to_rgba();
        trace!(
            "Rendered {}x{} dab at ({}, {})",
            mask.width(),
            mask.height(),
            origin.x,
            origin.y
        );
        Ok((Arc::new(FixedDab::from_mask(&mask, rgba, source)), origin))
    }
}

/// Builds the rendering state for one worker. Called once per worker at
/// startup and again after a worker panic.
pub trait ResourceFactory: Send + Sync {
    fn create(&self) -> DabRenderingResources;
}

impl<F> ResourceFactory for F
where
    F: Fn() -> DabRenderingResources + Send + Sync,
{
    fn create(&self) -> DabRenderingResources {
        self()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::{Color, RGBA8, RGBAF32};
    use crate::dab::{AutoBrush, DabShape};
    use crate::paint_info::PaintInfo;
    use glam::Vec2;

    fn request(position: Vec2) -> DabRequest {
        DabRequest {
            color: Color::from_rgba8([0, 0, 255, 255]),
            position,
            shape: DabShape::default(),
            info: PaintInfo::new(position, 1.0),
            softness: 1.0,
        }
    }

    #[test]
    fn test_render_places_and_colors_dab() {
        let mut resources = DabRenderingResources::new(Box::new(AutoBrush::new(10.0, 1.0)));
        let (dab, origin) = resources.render(&request(Vec2::new(20.0, 30.0)), &RGBA8).unwrap();
        assert_eq!(origin, IVec2::new(14, 24));
        assert_eq!((dab.width(), dab.height()), (12, 12));
        assert_eq!(dab.pixel(6, 6), &[0, 0, 255, 255]);
        assert_eq!(dab.color_space().id(), "RGBA8");
    }

    #[test]
    fn test_render_uses_composition_source() {
        let mut resources = DabRenderingResources::new(Box::new(AutoBrush::new(4.0, 1.0)));
        let (dab, _) = resources.render(&request(Vec2::new(5.0, 5.0)), &RGBAF32).unwrap();
        assert_eq!(dab.color_space().id(), RGBAF32.composition_source().id());
    }

    #[test]
    fn test_closure_factory() {
        let factory = || DabRenderingResources::new(Box::new(AutoBrush::new(3.0, 1.0)));
        let resources = factory.create();
        assert_eq!(resources.brush().width(), 3);
    }
}
