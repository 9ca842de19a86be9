//! Brush tips: coverage mask generation for one dab

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::{DabShape, RenderError};
use crate::paint_info::PaintInfo;

/// Per-pixel coverage in `[0, 1]`, row-major
#[derive(Debug, Clone, PartialEq)]
pub struct DabMask {
    width: u32,
    height: u32,
    coverage: Vec<f32>,
}

impl DabMask {
    pub fn new(width: u32, height: u32, coverage: Vec<f32>) -> Self {
        debug_assert_eq!(coverage.len(), (width * height) as usize);
        Self {
            width,
            height,
            coverage,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn len(&self) -> usize {
        self.coverage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coverage.iter().all(|&c| c <= 0.0)
    }

    pub fn coverage(&self) -> &[f32] {
        &self.coverage
    }

    #[inline]
    pub fn at(&self, x: u32, y: u32) -> f32 {
        self.coverage[(y * self.width + x) as usize]
    }
}

/// A brush tip. Each rendering worker owns its own clone.
pub trait Brush: Send + Sync {
    /// Footprint width at scale 1
    fn width(&self) -> u32;

    /// Footprint height at scale 1
    fn height(&self) -> u32;

    fn can_paint_for(&self, _info: &PaintInfo) -> bool {
        true
    }

    /// Width of the buffer [`generate_mask`](Self::generate_mask) fills for `shape`
    fn mask_width(&self, shape: &DabShape) -> u32;

    fn mask_height(&self, shape: &DabShape) -> u32;

    /// Render the coverage of one dab centered at `center`, given in pixels
    /// from the buffer's top-left corner
    fn generate_mask(&self, shape: &DabShape, center: Vec2, softness: f32) -> Result<DabMask, RenderError>;

    fn clone_brush(&self) -> Box<dyn Brush>;
}

/// Calculate falloff based on hardness
/// distance_normalized is 0 at center, 1 at edge
/// hardness is 0.0 (soft) to 1.0 (hard)
#[inline]
pub fn calculate_hardness_falloff(distance_normalized: f32, hardness: f32) -> f32 {
    if hardness >= 1.0 {
        if distance_normalized <= 1.0 { 1.0 } else { 0.0 }
    } else {
        let t = distance_normalized.clamp(0.0, 1.0);
        let soft = 1.0 - t;
        let hard = if distance_normalized <= 1.0 { 1.0 } else { 0.0 };
        soft * (1.0 - hardness) + hard * hardness
    }
}

/// Parametric elliptical tip with a hardness falloff and a one pixel
/// anti-aliased rim
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoBrush {
    /// Diameter in pixels
    pub diameter: f32,
    /// Height to width ratio
    pub ratio: f32,
    /// 0.0 = soft, 1.0 = hard
    pub hardness: f32,
    /// Base rotation in radians
    pub angle: f32,
}

impl Default for AutoBrush {
    fn default() -> Self {
        Self {
            diameter: 20.0,
            ratio: 1.0,
            hardness: 1.0,
            angle: 0.0,
        }
    }
}

impl AutoBrush {
    pub fn new(diameter: f32, hardness: f32) -> Self {
        Self {
            diameter: diameter.max(0.0),
            hardness: hardness.clamp(0.0, 1.0),
            ..Default::default()
        }
    }

    /// Semi-axes and rotation of the ellipse for `shape`
    fn ellipse(&self, shape: &DabShape) -> (f32, f32, f32) {
        let a = self.diameter * shape.scale * 0.5;
        let b = a * self.ratio * shape.ratio;
        (a, b, self.angle + shape.rotation)
    }

    /// Half extents of the rotated ellipse's bounding box
    fn half_extents(&self, shape: &DabShape) -> (f32, f32) {
        let (a, b, angle) = self.ellipse(shape);
        let (sin, cos) = angle.sin_cos();
        let hw = ((a * cos).powi(2) + (b * sin).powi(2)).sqrt();
        let hh = ((a * sin).powi(2) + (b * cos).powi(2)).sqrt();
        (hw, hh)
    }
}

/// Slack for rounding noise in the rotated extents
const EXTENT_EPSILON: f32 = 1e-4;

/// Buffer side holding `half` on both sides of any sub-pixel center, plus
/// the anti-aliased rim
#[inline]
fn buffer_side(half: f32) -> u32 {
    if half <= 0.0 {
        return 0;
    }
    (2.0 * half + 1.0 - EXTENT_EPSILON).ceil() as u32 + 1
}

impl Brush for AutoBrush {
    fn width(&self) -> u32 {
        self.diameter.ceil().max(1.0) as u32
    }

    fn height(&self) -> u32 {
        (self.diameter * self.ratio).ceil().max(1.0) as u32
    }

    fn mask_width(&self, shape: &DabShape) -> u32 {
        buffer_side(self.half_extents(shape).0)
    }

    fn mask_height(&self, shape: &DabShape) -> u32 {
        buffer_side(self.half_extents(shape).1)
    }

    fn generate_mask(&self, shape: &DabShape, center: Vec2, softness: f32) -> Result<DabMask, RenderError> {
        let (a, b, angle) = self.ellipse(shape);
        let (width, height) = (self.mask_width(shape), self.mask_height(shape));
        if a <= 0.0 || b <= 0.0 || width == 0 || height == 0 {
            return Err(RenderError::EmptyDab);
        }
        let hardness = (self.hardness * softness.clamp(0.0, 1.0)).clamp(0.0, 1.0);
        let (sin, cos) = angle.sin_cos();

        let mut coverage = vec![0.0f32; (width * height) as usize];
        for y in 0..height {
            for x in 0..width {
                let d = Vec2::new(x as f32 + 0.5, y as f32 + 0.5) - center;
                // Into the ellipse's own frame
                let rx = d.x * cos + d.y * sin;
                let ry = -d.x * sin + d.y * cos;
                let dn = ((rx / a).powi(2) + (ry / b).powi(2)).sqrt();

                // Pixel distance from the rim along the ray through this pixel
                let rim = if dn > 0.0 {
                    let radius = d.length() / dn;
                    ((1.0 - dn) * radius + 0.5).clamp(0.0, 1.0)
                } else {
                    1.0
                };
                if rim <= 0.0 {
                    continue;
                }
                let falloff = calculate_hardness_falloff(dn.min(1.0), hardness);
                coverage[(y * width + x) as usize] = falloff * rim;
            }
        }

        let mask = DabMask::new(width, height, coverage);
        if mask.is_empty() {
            return Err(RenderError::EmptyDab);
        }
        Ok(mask)
    }

    fn clone_brush(&self) -> Box<dyn Brush> {
        Box::new(self.clone())
    }
}
