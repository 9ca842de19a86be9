//! Pointer samples and the spacing/timing state carried along a stroke

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_SPACING, MIN_SPACING};

/// Shortest airbrush interval in milliseconds
pub const MIN_TIMING_INTERVAL_MS: f32 = 1.0;

/// One pointer sample of a stroke
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PaintInfo {
    /// Position in image coordinates
    pub pos: Vec2,
    /// Pen pressure 0.0-1.0
    pub pressure: f32,
    /// Tilt in degrees, -60 to 60
    pub x_tilt: f32,
    pub y_tilt: f32,
    /// Barrel rotation in degrees
    pub rotation: f32,
    /// Pointer speed in pixels per millisecond
    pub speed: f32,
    /// Milliseconds since the stroke began
    pub time: f32,
    /// Direction of travel in radians
    pub drawing_angle: f32,
    /// Distance travelled along the stroke so far
    pub total_distance: f32,
}

impl Default for PaintInfo {
    fn default() -> Self {
        Self {
            pos: Vec2::ZERO,
            pressure: 1.0,
            x_tilt: 0.0,
            y_tilt: 0.0,
            rotation: 0.0,
            speed: 0.0,
            time: 0.0,
            drawing_angle: 0.0,
            total_distance: 0.0,
        }
    }
}

impl PaintInfo {
    pub fn new(pos: Vec2, pressure: f32) -> Self {
        Self {
            pos,
            pressure,
            ..Default::default()
        }
    }

    pub fn with_time(mut self, time: f32) -> Self {
        self.time = time;
        self
    }

    /// Interpolate two samples; `t = 0` gives `a`.
    ///
    /// The drawing angle is the direction from `a` to `b`, or `b`'s own
    /// angle when both positions coincide.
    pub fn mix(t: f32, a: &PaintInfo, b: &PaintInfo) -> PaintInfo {
        let lerp = |x: f32, y: f32| x + (y - x) * t;
        let delta = b.pos - a.pos;
        let drawing_angle = if delta.length_squared() > 0.0 {
            delta.y.atan2(delta.x)
        } else {
            b.drawing_angle
        };
        PaintInfo {
            pos: a.pos.lerp(b.pos, t),
            pressure: lerp(a.pressure, b.pressure),
            x_tilt: lerp(a.x_tilt, b.x_tilt),
            y_tilt: lerp(a.y_tilt, b.y_tilt),
            rotation: lerp(a.rotation, b.rotation),
            speed: lerp(a.speed, b.speed),
            time: lerp(a.time, b.time),
            drawing_angle,
            total_distance: lerp(a.total_distance, b.total_distance),
        }
    }
}

/// Distance to travel before the next dab fires.
///
/// Finite distances never fall below [`MIN_SPACING`]. An infinite distance
/// means only timing places dabs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Spacing {
    distance: f32,
}

impl Default for Spacing {
    fn default() -> Self {
        Self {
            distance: DEFAULT_SPACING,
        }
    }
}

impl Spacing {
    pub fn new(distance: f32) -> Self {
        if distance.is_infinite() {
            return Self::infinite();
        }
        let distance = if distance.is_nan() { DEFAULT_SPACING } else { distance };
        Self {
            distance: distance.max(MIN_SPACING),
        }
    }

    pub fn infinite() -> Self {
        Self {
            distance: f32::INFINITY,
        }
    }

    #[inline]
    pub fn distance(&self) -> f32 {
        self.distance
    }

    #[inline]
    pub fn is_infinite(&self) -> bool {
        self.distance.is_infinite()
    }
}

/// Time-based dab placement (airbrush)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Timing {
    interval_ms: Option<f32>,
}

impl Timing {
    pub fn disabled() -> Self {
        Self { interval_ms: None }
    }

    /// Fire a dab every `interval_ms`, at least [`MIN_TIMING_INTERVAL_MS`]
    pub fn every(interval_ms: f32) -> Self {
        if !interval_ms.is_finite() {
            return Self::disabled();
        }
        Self {
            interval_ms: Some(interval_ms.max(MIN_TIMING_INTERVAL_MS)),
        }
    }

    pub fn interval_ms(&self) -> Option<f32> {
        self.interval_ms
    }

    pub fn is_enabled(&self) -> bool {
        self.interval_ms.is_some()
    }
}

/// Progress towards the next dab, carried between `paint_line` calls
#[derive(Debug, Clone, Default)]
pub struct DistanceInfo {
    last_dab: Option<PaintInfo>,
    distance_since_dab: f32,
    time_since_dab: f32,
    spacing: Spacing,
    timing: Timing,
    dab_count: usize,
}

impl DistanceInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a dab has been placed on this stroke yet
    pub fn has_last_dab(&self) -> bool {
        self.last_dab.is_some()
    }

    pub fn last_dab(&self) -> Option<&PaintInfo> {
        self.last_dab.as_ref()
    }

    pub fn spacing(&self) -> Spacing {
        self.spacing
    }

    pub fn timing(&self) -> Timing {
        self.timing
    }

    pub fn dab_count(&self) -> usize {
        self.dab_count
    }

    pub fn distance_since_dab(&self) -> f32 {
        self.distance_since_dab
    }

    pub fn time_since_dab(&self) -> f32 {
        self.time_since_dab
    }

    /// Distance still to travel before spacing fires
    pub fn distance_to_next_dab(&self) -> f32 {
        (self.spacing.distance() - self.distance_since_dab).max(0.0)
    }

    /// Time still to wait before timing fires
    pub fn time_to_next_dab(&self) -> Option<f32> {
        self.timing
            .interval_ms()
            .map(|interval| (interval - self.time_since_dab).max(0.0))
    }

    /// A dab was placed at `info`; reset progress and adopt its spacing
    pub fn register_dab(&mut self, info: PaintInfo, spacing: Spacing, timing: Timing) {
        self.last_dab = Some(info);
        self.distance_since_dab = 0.0;
        self.time_since_dab = 0.0;
        self.spacing = spacing;
        self.timing = timing;
        self.dab_count += 1;
    }

    /// Travel without placing a dab
    pub fn advance(&mut self, distance: f32, time: f32) {
        self.distance_since_dab += distance.max(0.0);
        self.time_since_dab += time.max(0.0);
    }
}
