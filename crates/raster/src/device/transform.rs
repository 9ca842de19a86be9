//! Geometric transforms driven by injectable resampling filters
//!
//! The device maps every destination pixel back into source space through
//! the inverse transform and asks a [`FilterStrategy`] for the weights of
//! the surrounding source pixels. Colors are accumulated premultiplied by
//! alpha. The filter support widens with the downscale factor so shrinking
//! averages instead of skipping pixels.

use glam::{Affine2, Mat2, Vec2};
use tracing::debug;

use super::PaintDevice;
use super::events::ProgressReporter;
use crate::error::RasterError;
use crate::geometry::{MirrorDirection, Rect, flip_pixels};

/// Separable resampling kernel
pub trait FilterStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Kernel radius at unit scale, in source pixels
    fn support(&self) -> f32;

    /// Weight at signed distance `t` from the sample point
    fn weight(&self, t: f32) -> f32;
}

/// Nearest-neighbour box kernel
#[derive(Debug, Clone, Copy, Default)]
pub struct BoxFilter;

/// Bilinear (tent) kernel
#[derive(Debug, Clone, Copy, Default)]
pub struct TriangleFilter;

/// Mitchell–Netravali cubic with B = C = 1/3
#[derive(Debug, Clone, Copy, Default)]
pub struct MitchellFilter;

impl FilterStrategy for BoxFilter {
    fn name(&self) -> &'static str {
        "box"
    }

    fn support(&self) -> f32 {
        0.5
    }

    fn weight(&self, t: f32) -> f32 {
        if t > -0.5 && t <= 0.5 { 1.0 } else { 0.0 }
    }
}

impl FilterStrategy for TriangleFilter {
    fn name(&self) -> &'static str {
        "triangle"
    }

    fn support(&self) -> f32 {
        1.0
    }

    fn weight(&self, t: f32) -> f32 {
        (1.0 - t.abs()).max(0.0)
    }
}

impl FilterStrategy for MitchellFilter {
    fn name(&self) -> &'static str {
        "mitchell"
    }

    fn support(&self) -> f32 {
        2.0
    }

    fn weight(&self, t: f32) -> f32 {
        const B: f32 = 1.0 / 3.0;
        const C: f32 = 1.0 / 3.0;
        let t = t.abs();
        let t2 = t * t;
        let t3 = t2 * t;
        if t < 1.0 {
            ((12.0 - 9.0 * B - 6.0 * C) * t3 + (-18.0 + 12.0 * B + 6.0 * C) * t2 + (6.0 - 2.0 * B)) / 6.0
        } else if t < 2.0 {
            ((-B - 6.0 * C) * t3 + (6.0 * B + 30.0 * C) * t2 + (-12.0 * B - 48.0 * C) * t + (8.0 * B + 24.0 * C))
                / 6.0
        } else {
            0.0
        }
    }
}

/// Kernel taps along one axis for one destination pixel
fn taps(center: f32, radius: f32, widen: f32, filter: &dyn FilterStrategy, out: &mut Vec<(i32, f32)>) {
    out.clear();
    let first = (center - radius - 0.5).ceil() as i32;
    let last = (center + radius - 0.5).floor() as i32;
    for i in first..=last {
        let w = filter.weight((i as f32 + 0.5 - center) / widen);
        if w != 0.0 {
            out.push((i, w));
        }
    }
}

impl PaintDevice {
    fn bounds_center(&self) -> Option<Vec2> {
        self.exact_bounds().map(|b| {
            Vec2::new(
                b.x as f32 + b.width as f32 / 2.0,
                b.y as f32 + b.height as f32 / 2.0,
            )
        })
    }

    /// Scale about the image origin
    pub fn scale(&mut self, sx: f32, sy: f32, filter: &dyn FilterStrategy) -> Result<(), RasterError> {
        self.transform(Affine2::from_scale(Vec2::new(sx, sy)), filter)
    }

    /// Rotate by `angle` radians about `pivot`, or about the center of the
    /// exact bounds
    pub fn rotate(
        &mut self,
        angle: f32,
        pivot: Option<Vec2>,
        filter: &dyn FilterStrategy,
    ) -> Result<(), RasterError> {
        let Some(pivot) = pivot.or_else(|| self.bounds_center()) else {
            return Ok(());
        };
        let affine = Affine2::from_translation(pivot)
            * Affine2::from_angle(angle)
            * Affine2::from_translation(-pivot);
        self.transform(affine, filter)
    }

    /// Shear about the center of the exact bounds. `x' = x + tan(angle_x)·y`,
    /// `y' = y + tan(angle_y)·x`.
    pub fn shear(&mut self, angle_x: f32, angle_y: f32, filter: &dyn FilterStrategy) -> Result<(), RasterError> {
        let Some(center) = self.bounds_center() else {
            return Ok(());
        };
        let shear = Mat2::from_cols(Vec2::new(1.0, angle_y.tan()), Vec2::new(angle_x.tan(), 1.0));
        let affine = Affine2::from_translation(center)
            * Affine2::from_mat2(shear)
            * Affine2::from_translation(-center);
        self.transform(affine, filter)
    }

    /// Resample the content through `affine` (image coordinates).
    ///
    /// Only non-default output pixels are stored, so the extent follows the
    /// transformed content.
    pub fn transform(&mut self, affine: Affine2, filter: &dyn FilterStrategy) -> Result<(), RasterError> {
        let determinant = affine.matrix2.determinant();
        if !determinant.is_finite() || determinant.abs() < 1e-6 {
            return Err(RasterError::DegenerateTransform { determinant });
        }
        let Some(src) = self.exact_bounds() else {
            return Ok(());
        };

        let corners = [
            Vec2::new(src.x as f32, src.y as f32),
            Vec2::new(src.right() as f32, src.y as f32),
            Vec2::new(src.x as f32, src.bottom() as f32),
            Vec2::new(src.right() as f32, src.bottom() as f32),
        ]
        .map(|c| affine.transform_point2(c));
        let min = corners.iter().fold(Vec2::splat(f32::MAX), |m, c| m.min(*c));
        let max = corners.iter().fold(Vec2::splat(f32::MIN), |m, c| m.max(*c));
        let dst = Rect::from_edges(
            min.x.floor() as i32,
            min.y.floor() as i32,
            max.x.ceil() as i32,
            max.y.ceil() as i32,
        );

        let widen = Vec2::new(
            (1.0 / affine.matrix2.x_axis.length()).max(1.0),
            (1.0 / affine.matrix2.y_axis.length()).max(1.0),
        );
        let radius = widen * filter.support();
        let margin = radius.max_element().ceil() as i32 + 1;
        let area = Rect::new(
            src.x - margin,
            src.y - margin,
            src.width + 2 * margin,
            src.height + 2 * margin,
        );

        let ps = self.pixel_size;
        let space = self.color_space;
        let mut raw = vec![0u8; area.area() as usize * ps];
        self.read_bytes(&mut raw, area)?;
        let source: Vec<[f32; 4]> = raw.chunks_exact(ps).map(|p| space.to_rgba(p)).collect();

        debug!(
            "PaintDevice '{}': {} transform {:?} -> {:?}",
            self.name,
            filter.name(),
            src,
            dst
        );

        let default = self.data.default_pixel().to_vec();
        let inverse = affine.inverse();
        let mut output = default.repeat(dst.area() as usize);
        let row_bytes = dst.width as usize * ps;
        let (mut xs, mut ys) = (Vec::new(), Vec::new());
        {
            let mut progress = ProgressReporter::new(&self.listeners, dst.height as usize);
            for (row, y) in (dst.y..dst.bottom()).enumerate() {
                progress.update(row);
                for (col, x) in (dst.x..dst.right()).enumerate() {
                    let p = inverse.transform_point2(Vec2::new(x as f32 + 0.5, y as f32 + 0.5));
                    taps(p.x, radius.x, widen.x, filter, &mut xs);
                    taps(p.y, radius.y, widen.y, filter, &mut ys);

                    let mut sum_w = 0.0f32;
                    let mut sum_a = 0.0f32;
                    let mut sum_rgb = [0.0f32; 3];
                    for &(j, wy) in &ys {
                        for &(i, wx) in &xs {
                            let w = wx * wy;
                            sum_w += w;
                            if !area.contains(i, j) {
                                continue;
                            }
                            let s = source[((j - area.y) * area.width + (i - area.x)) as usize];
                            let wa = w * s[3];
                            sum_a += wa;
                            sum_rgb[0] += wa * s[0];
                            sum_rgb[1] += wa * s[1];
                            sum_rgb[2] += wa * s[2];
                        }
                    }
                    if sum_w <= 0.0 || sum_a <= 0.0 {
                        continue;
                    }
                    let alpha = (sum_a / sum_w).clamp(0.0, 1.0);
                    let rgba = [sum_rgb[0] / sum_a, sum_rgb[1] / sum_a, sum_rgb[2] / sum_a, alpha];
                    let offset = row * row_bytes + col * ps;
                    let pixel = &mut output[offset..offset + ps];
                    space.from_rgba(rgba, pixel);
                    if space.opacity(pixel) <= 0.0 {
                        pixel.copy_from_slice(&default);
                    }
                }
            }
            progress.finish();
        }

        self.data.clear();
        self.store_non_default(&output, dst)
    }

    /// Write only the runs of `buffer` that differ from the default pixel
    fn store_non_default(&mut self, buffer: &[u8], rect: Rect) -> Result<(), RasterError> {
        let ps = self.pixel_size;
        let default = self.data.default_pixel().to_vec();
        let row_bytes = rect.width as usize * ps;
        for (row, y) in (rect.y..rect.bottom()).enumerate() {
            let line = &buffer[row * row_bytes..(row + 1) * row_bytes];
            let mut start: Option<usize> = None;
            for col in 0..=rect.width as usize {
                let differs = col < rect.width as usize && line[col * ps..(col + 1) * ps] != default[..];
                match (differs, start) {
                    (true, None) => start = Some(col),
                    (false, Some(s)) => {
                        let run = Rect::new(rect.x + s as i32, y, (col - s) as i32, 1);
                        self.write_bytes(&line[s * ps..col * ps], run)?;
                        start = None;
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }

    /// Flip the content left to right within its exact bounds
    pub fn mirror_x(&mut self) -> Result<(), RasterError> {
        self.flip_in_bounds(MirrorDirection::Horizontal)
    }

    /// Flip the content top to bottom within its exact bounds
    pub fn mirror_y(&mut self) -> Result<(), RasterError> {
        self.flip_in_bounds(MirrorDirection::Vertical)
    }

    fn flip_in_bounds(&mut self, direction: MirrorDirection) -> Result<(), RasterError> {
        let Some(bounds) = self.exact_bounds() else {
            return Ok(());
        };
        let ps = self.pixel_size;
        let mut buffer = vec![0u8; bounds.area() as usize * ps];
        self.read_bytes(&mut buffer, bounds)?;
        flip_pixels(&mut buffer, bounds.width as usize, bounds.height as usize, ps, direction);
        self.write_bytes(&buffer, bounds)
    }
}
