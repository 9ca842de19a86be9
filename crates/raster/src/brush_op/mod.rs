//! Brush stroke operator
//!
//! Turns pointer samples into dabs and keeps the canvas up to date:
//!
//! 1. [`BrushOp::paint_at`] applies the sensor options to one sample, queues
//!    a dab on the [`DabRenderingExecutor`] and returns the spacing to the
//!    next dab.
//! 2. [`BrushOp::do_asynchronous_update`] runs on a timer, composites the
//!    dabs rendered so far and returns the delay until it should run again.
//! 3. [`BrushOp::paint_line`] walks a stroke segment, calling `paint_at` at
//!    every spacing or timing interval. One pixel brushes with sharpness
//!    draw a DDA line instead.

mod line;
mod settings;
mod update;

use std::f32::consts::TAU;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, trace};

use crate::constants::{MIN_DAB_EXTENT, OPACITY_OPAQUE_U8};
use crate::dab::{Brush, DabRenderingExecutor, DabRenderingResources, DabRequest, DabShape};
use crate::device::read_device;
use crate::error::RasterError;
use crate::geometry::Rect;
use crate::paint_info::{DistanceInfo, PaintInfo, Spacing, Timing};
use crate::painter::Painter;
use crate::stats::RollingMean;
use impasto_config::EngineConfig;

pub use settings::{AirbrushOption, BrushOpSettings, ScatterOption};
pub use update::{UpdateStats, adapt_update_period, split_dabs_into_rects};

/// Quantize a unit value to the 8-bit steps the compositor works in
#[inline]
fn quantize_opacity(value: f32) -> f32 {
    let steps = OPACITY_OPAQUE_U8 as f32;
    (value.clamp(0.0, 1.0) * steps).round() / steps
}

/// Stroke operator painting one brush into one painter's device
pub struct BrushOp {
    settings: BrushOpSettings,
    brush: Box<dyn Brush>,
    executor: DabRenderingExecutor,
    painter: Painter,
    line_cache: Option<Painter>,
    config: EngineConfig,
    rng: StdRng,
    spacing_mean: RollingMean,
    update_period: Duration,
    last_update: UpdateStats,
}

impl BrushOp {
    /// Start a rendering pool for `brush` targeting `painter`'s device
    pub fn new(
        settings: BrushOpSettings,
        brush: Box<dyn Brush>,
        painter: Painter,
        config: &EngineConfig,
    ) -> Result<Self, RasterError> {
        config.validate()?;
        let color_space = read_device(painter.device()).color_space();
        let prototype = brush.clone_brush();
        let executor = DabRenderingExecutor::new(
            color_space,
            move || DabRenderingResources::new(prototype.clone_brush()),
            config,
            settings.dab_cache,
        );
        debug!(
            "BrushOp created: {}x{} brush, spacing {}, {} workers",
            brush.width(),
            brush.height(),
            settings.spacing,
            executor.worker_count()
        );
        Ok(Self {
            rng: StdRng::seed_from_u64(settings.seed),
            settings,
            brush,
            executor,
            painter,
            line_cache: None,
            spacing_mean: RollingMean::new(config.spacing_window),
            update_period: Duration::from_millis(config.min_update_period_ms),
            last_update: UpdateStats::default(),
            config: config.clone(),
        })
    }

    pub fn settings(&self) -> &BrushOpSettings {
        &self.settings
    }

    pub fn brush(&self) -> &dyn Brush {
        self.brush.as_ref()
    }

    pub fn painter(&self) -> &Painter {
        &self.painter
    }

    pub fn painter_mut(&mut self) -> &mut Painter {
        &mut self.painter
    }

    pub fn executor(&self) -> &DabRenderingExecutor {
        &self.executor
    }

    /// Statistics of the most recent compositing pass
    pub fn last_update(&self) -> &UpdateStats {
        &self.last_update
    }

    /// Current polling period of [`do_asynchronous_update`](Self::do_asynchronous_update)
    pub fn update_period(&self) -> Duration {
        self.update_period
    }

    /// Mean spacing of the dabs placed recently, in pixels
    pub fn average_spacing(&self) -> f64 {
        self.spacing_mean.mean()
    }

    /// Reset per-stroke state. Returns the distance tracker for the new stroke.
    pub fn begin_stroke(&mut self) -> DistanceInfo {
        self.rng = StdRng::seed_from_u64(self.settings.seed);
        self.executor.reset_average_opacity();
        self.painter.set_average_opacity(0.0);
        self.painter.take_dirty_rects();
        DistanceInfo::new()
    }

    /// Composite every outstanding dab and hand over the touched rectangles
    pub fn end_stroke(&mut self) -> Result<Vec<Rect>, RasterError> {
        self.do_asynchronous_update(true)?;
        debug!(
            "Stroke ended: {} dirty rects, average spacing {:.2}",
            self.painter.dirty_rects().len(),
            self.spacing_mean.mean()
        );
        Ok(self.painter.take_dirty_rects())
    }

    fn scale_for(&mut self, info: &PaintInfo) -> f32 {
        self.settings.size.apply(info, &mut self.rng)
    }

    /// Whether a dab of `scale` has any extent
    fn is_paintable_scale(&self, scale: f32) -> bool {
        let width = self.brush.width() as f32 * scale;
        let height = self.brush.height() as f32 * scale;
        scale.is_finite() && width >= MIN_DAB_EXTENT && height >= MIN_DAB_EXTENT
    }

    /// Queue one dab for `info` and return the distance to the next one.
    ///
    /// Samples the brush cannot paint, or that scale the dab to nothing,
    /// queue nothing and return the default spacing.
    pub fn paint_at(&mut self, info: &PaintInfo) -> Spacing {
        if !self.brush.can_paint_for(info) {
            return Spacing::default();
        }
        let scale = self.scale_for(info);
        if !self.is_paintable_scale(scale) {
            trace!("Skipping dab at {:?}: scale {} too small", info.pos, scale);
            return Spacing::default();
        }

        let rotation = self.settings.rotation.apply_or(info, &mut self.rng, 0.0) * TAU;
        let ratio = self.settings.ratio.apply(info, &mut self.rng);
        let shape = DabShape {
            scale,
            ratio,
            rotation,
        };

        let mut position = info.pos;
        let scatter = &self.settings.scatter;
        if scatter.curve.enabled {
            let strength = scatter.curve.apply(info, &mut self.rng) * scatter.amount;
            if scatter.axis_x {
                let jitter = self.rng.r#gen::<f32>() * 2.0 - 1.0;
                position.x += jitter * strength * self.brush.mask_width(&shape) as f32;
            }
            if scatter.axis_y {
                let jitter = self.rng.r#gen::<f32>() * 2.0 - 1.0;
                position.y += jitter * strength * self.brush.mask_height(&shape) as f32;
            }
        }

        let opacity = quantize_opacity(
            self.settings.opacity * self.settings.opacity_curve.apply(info, &mut self.rng),
        );
        let flow = quantize_opacity(self.settings.flow * self.settings.flow_curve.apply(info, &mut self.rng));
        let softness = self.settings.softness.apply(info, &mut self.rng);

        let request = DabRequest {
            color: self.painter.paint_color().clone(),
            position,
            shape,
            info: *info,
            softness,
        };
        self.executor.add_dab(request, opacity, flow);

        let spacing = self.effective_spacing(scale, info);
        if !spacing.is_infinite() {
            self.spacing_mean.push(spacing.distance() as f64);
        }
        spacing
    }

    fn effective_spacing(&mut self, scale: f32, info: &PaintInfo) -> Spacing {
        let airbrush = &self.settings.airbrush;
        if airbrush.enabled && airbrush.ignore_spacing {
            return Spacing::infinite();
        }
        let extent = self.brush.width().max(self.brush.height()) as f32 * scale;
        let factor = self.settings.spacing_curve.apply(info, &mut self.rng);
        let distance = if self.settings.auto_spacing {
            let base = if extent < 1.0 { extent } else { extent.sqrt() };
            self.settings.auto_spacing_coeff * base * factor
        } else {
            extent * self.settings.spacing * factor
        };
        Spacing::new(distance)
    }

    /// Spacing a dab at `info` would use, without painting
    pub fn update_spacing(&mut self, info: &PaintInfo) -> Spacing {
        let scale = self.scale_for(info);
        if !self.is_paintable_scale(scale) {
            return Spacing::default();
        }
        self.effective_spacing(scale, info)
    }

    /// Airbrush timing at `info`
    pub fn update_timing(&mut self, info: &PaintInfo) -> Timing {
        let airbrush = &self.settings.airbrush;
        if !airbrush.enabled {
            return Timing::disabled();
        }
        let rate = airbrush.rate * self.settings.rate_curve.apply(info, &mut self.rng);
        if rate <= 0.0 {
            return Timing::disabled();
        }
        Timing::every(1000.0 / rate)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::color::{Color, RGBA8};
    use crate::dab::AutoBrush;
    use crate::device::{PaintDevice, SharedDevice};
    use crate::sensors::{CurveOption, Sensor};
    use glam::Vec2;

    pub(crate) fn canvas() -> SharedDevice {
        PaintDevice::new(&RGBA8, "canvas", &EngineConfig::default())
            .unwrap()
            .into_shared()
    }

    pub(crate) fn brush_op(settings: BrushOpSettings, diameter: f32, device: SharedDevice) -> BrushOp {
        let mut painter = Painter::new(device);
        painter.set_paint_color(Color::from_rgba8([255, 0, 0, 255]));
        let config = EngineConfig {
            worker_threads: Some(3),
            ..Default::default()
        };
        BrushOp::new(settings, Box::new(AutoBrush::new(diameter, 1.0)), painter, &config).unwrap()
    }

    #[test]
    fn test_spacing_from_diameter() {
        let mut op = brush_op(BrushOpSettings::default(), 20.0, canvas());
        let spacing = op.paint_at(&PaintInfo::new(Vec2::new(50.0, 50.0), 1.0));
        assert!((spacing.distance() - 2.0).abs() < 1e-5);
        assert_eq!(op.executor().pending_count(), 1);
        assert!((op.average_spacing() - 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_spacing_never_below_half_pixel() {
        let mut op = brush_op(BrushOpSettings::default(), 2.0, canvas());
        let spacing = op.paint_at(&PaintInfo::new(Vec2::new(5.0, 5.0), 1.0));
        assert_eq!(spacing.distance(), 0.5);
    }

    #[test]
    fn test_auto_spacing() {
        let settings = BrushOpSettings {
            auto_spacing: true,
            auto_spacing_coeff: 2.0,
            ..Default::default()
        };
        let mut op = brush_op(settings, 16.0, canvas());
        let spacing = op.update_spacing(&PaintInfo::new(Vec2::ZERO, 1.0));
        assert!((spacing.distance() - 8.0).abs() < 1e-5);
    }

    #[test]
    fn test_zero_pressure_size_is_noop() {
        let settings = BrushOpSettings {
            size: CurveOption::with_sensor(Sensor::Pressure),
            ..Default::default()
        };
        let mut op = brush_op(settings, 20.0, canvas());
        let spacing = op.paint_at(&PaintInfo::new(Vec2::new(10.0, 10.0), 0.0));
        assert_eq!(spacing, Spacing::default());
        assert_eq!(op.executor().pending_count(), 0);
    }

    #[test]
    fn test_airbrush_ignores_spacing() {
        let settings = BrushOpSettings {
            airbrush: AirbrushOption {
                enabled: true,
                rate: 50.0,
                ignore_spacing: true,
            },
            ..Default::default()
        };
        let mut op = brush_op(settings, 10.0, canvas());
        let info = PaintInfo::new(Vec2::ZERO, 1.0);
        assert!(op.paint_at(&info).is_infinite());
        assert_eq!(op.update_timing(&info).interval_ms(), Some(20.0));
        assert_eq!(op.average_spacing(), 0.0);
    }

    #[test]
    fn test_opacity_is_quantized() {
        assert_eq!(quantize_opacity(0.5), 128.0 / 255.0);
        assert_eq!(quantize_opacity(1.5), 1.0);
        assert_eq!(quantize_opacity(-1.0), 0.0);
    }

    #[test]
    fn test_scatter_is_deterministic_per_seed() {
        let settings = BrushOpSettings {
            scatter: ScatterOption {
                curve: CurveOption::with_sensor(Sensor::Pressure),
                amount: 2.0,
                ..Default::default()
            },
            seed: 9,
            ..Default::default()
        };
        let stroke = |settings: BrushOpSettings| {
            let device = canvas();
            let mut op = brush_op(settings, 6.0, device.clone());
            op.begin_stroke();
            for i in 0..5 {
                op.paint_at(&PaintInfo::new(Vec2::new(40.0 + i as f32 * 10.0, 40.0), 1.0));
            }
            op.end_stroke().unwrap();
            let dev = read_device(&device);
            dev.exact_bounds()
        };
        let first = stroke(settings.clone());
        assert!(first.is_some());
        assert_eq!(first, stroke(settings));
    }
}
