//! Dynamic sensors and response curves
//!
//! A sensor reads one property of a [`PaintInfo`] and normalizes it to
//! `[0, 1]`. A [`CurveOption`] feeds that through a [`Curve`] and maps the
//! result into a `[min, max]` range which the brush operator applies to one
//! dab parameter (size, opacity, ...).

use std::f32::consts::{PI, TAU};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::paint_info::PaintInfo;

/// Largest tilt reported by a tablet, in degrees
pub const MAX_TILT: f32 = 60.0;

/// Piecewise linear response curve over `[0, 1]²`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Curve {
    points: Vec<(f32, f32)>,
}

impl Default for Curve {
    fn default() -> Self {
        Self::linear()
    }
}

impl Curve {
    /// Identity curve
    pub fn linear() -> Self {
        Self {
            points: vec![(0.0, 0.0), (1.0, 1.0)],
        }
    }

    /// Build from control points. Points are clamped to the unit square
    /// and sorted by x; an empty list gives the identity curve.
    pub fn new(points: impl IntoIterator<Item = (f32, f32)>) -> Self {
        let mut points: Vec<(f32, f32)> = points
            .into_iter()
            .filter(|(x, y)| x.is_finite() && y.is_finite())
            .map(|(x, y)| (x.clamp(0.0, 1.0), y.clamp(0.0, 1.0)))
            .collect();
        if points.is_empty() {
            return Self::linear();
        }
        points.sort_by(|a, b| a.0.total_cmp(&b.0));
        Self { points }
    }

    pub fn points(&self) -> &[(f32, f32)] {
        &self.points
    }

    /// Evaluate at `x`, holding the end values outside the control points
    pub fn value(&self, x: f32) -> f32 {
        let x = x.clamp(0.0, 1.0);
        let Some(&(first_x, first_y)) = self.points.first() else {
            return x;
        };
        if x <= first_x {
            return first_y;
        }
        for pair in self.points.windows(2) {
            let ((x0, y0), (x1, y1)) = (pair[0], pair[1]);
            if x <= x1 {
                if x1 - x0 <= f32::EPSILON {
                    return y1;
                }
                return y0 + (y1 - y0) * (x - x0) / (x1 - x0);
            }
        }
        self.points.last().map_or(x, |p| p.1)
    }
}

/// Input property read by a [`CurveOption`]
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Sensor {
    #[default]
    Pressure,
    XTilt,
    YTilt,
    /// 1 when the pen is upright
    TiltElevation,
    TiltDirection,
    /// Barrel rotation
    Rotation,
    /// Speed relative to `max` pixels per millisecond
    Speed { max: f32 },
    /// Stroke length relative to `length` pixels
    Distance { length: f32, periodic: bool },
    /// Stroke time relative to `length` milliseconds
    Time { length: f32, periodic: bool },
    DrawingAngle,
    /// Uniform random value
    Fuzzy,
}

fn ratio(value: f32, length: f32, periodic: bool) -> f32 {
    if length <= 0.0 {
        return 1.0;
    }
    let r = value / length;
    if periodic { r.rem_euclid(1.0) } else { r.min(1.0) }
}

fn normalize_angle(radians: f32) -> f32 {
    ((radians + PI).rem_euclid(TAU)) / TAU
}

impl Sensor {
    /// Normalized reading in `[0, 1]`
    pub fn value<R: Rng>(&self, info: &PaintInfo, rng: &mut R) -> f32 {
        let v = match *self {
            Sensor::Pressure => info.pressure,
            Sensor::XTilt => 1.0 - info.x_tilt.abs() / MAX_TILT,
            Sensor::YTilt => 1.0 - info.y_tilt.abs() / MAX_TILT,
            Sensor::TiltElevation => 1.0 - info.x_tilt.abs().max(info.y_tilt.abs()) / MAX_TILT,
            Sensor::TiltDirection => normalize_angle((-info.y_tilt).atan2(info.x_tilt)),
            Sensor::Rotation => info.rotation.rem_euclid(360.0) / 360.0,
            Sensor::Speed { max } => ratio(info.speed, max, false),
            Sensor::Distance { length, periodic } => ratio(info.total_distance, length, periodic),
            Sensor::Time { length, periodic } => ratio(info.time, length, periodic),
            Sensor::DrawingAngle => normalize_angle(info.drawing_angle),
            Sensor::Fuzzy => rng.r#gen::<f32>(),
        };
        if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) }
    }
}

/// Sensor, curve and output range driving one dab parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CurveOption {
    pub enabled: bool,
    pub sensor: Sensor,
    pub curve: Curve,
    pub min: f32,
    pub max: f32,
}

impl Default for CurveOption {
    fn default() -> Self {
        Self {
            enabled: false,
            sensor: Sensor::Pressure,
            curve: Curve::linear(),
            min: 0.0,
            max: 1.0,
        }
    }
}

impl CurveOption {
    /// Enabled option with the identity curve over `[0, 1]`
    pub fn with_sensor(sensor: Sensor) -> Self {
        Self {
            enabled: true,
            sensor,
            ..Default::default()
        }
    }

    pub fn range(mut self, min: f32, max: f32) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    /// Multiplier for the sample; 1 when disabled
    pub fn apply<R: Rng>(&self, info: &PaintInfo, rng: &mut R) -> f32 {
        self.apply_or(info, rng, 1.0)
    }

    /// Value for the sample, or `disabled` when the option is off
    pub fn apply_or<R: Rng>(&self, info: &PaintInfo, rng: &mut R, disabled: f32) -> f32 {
        if !self.enabled {
            return disabled;
        }
        let reading = self.curve.value(self.sensor.value(info, rng));
        self.min + (self.max - self.min) * reading
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_curve_interpolates() {
        let curve = Curve::new([(0.0, 1.0), (0.5, 0.0), (1.0, 1.0)]);
        assert_eq!(curve.value(0.0), 1.0);
        assert!((curve.value(0.25) - 0.5).abs() < 1e-6);
        assert_eq!(curve.value(0.5), 0.0);
        assert_eq!(curve.value(2.0), 1.0);
        assert_eq!(Curve::new([]).value(0.3), 0.3);
    }

    #[test]
    fn test_curve_holds_end_values() {
        let curve = Curve::new([(0.8, 0.2), (0.2, 0.6)]);
        assert_eq!(curve.points()[0], (0.2, 0.6));
        assert_eq!(curve.value(0.0), 0.6);
        assert_eq!(curve.value(1.0), 0.2);
    }

    #[test]
    fn test_sensor_normalization() {
        let mut rng = StdRng::seed_from_u64(7);
        let info = PaintInfo {
            pressure: 0.4,
            x_tilt: 30.0,
            rotation: 450.0,
            total_distance: 150.0,
            ..Default::default()
        };
        assert_eq!(Sensor::Pressure.value(&info, &mut rng), 0.4);
        assert_eq!(Sensor::XTilt.value(&info, &mut rng), 0.5);
        assert_eq!(Sensor::TiltElevation.value(&info, &mut rng), 0.5);
        assert_eq!(Sensor::Rotation.value(&info, &mut rng), 0.25);
        let periodic = Sensor::Distance {
            length: 100.0,
            periodic: true,
        };
        assert!((periodic.value(&info, &mut rng) - 0.5).abs() < 1e-6);
        let clamped = Sensor::Distance {
            length: 100.0,
            periodic: false,
        };
        assert_eq!(clamped.value(&info, &mut rng), 1.0);
        assert!((Sensor::DrawingAngle.value(&info, &mut rng) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_fuzzy_is_seeded() {
        let info = PaintInfo::default();
        let mut a = StdRng::seed_from_u64(42);
        let mut b = StdRng::seed_from_u64(42);
        for _ in 0..8 {
            let va = Sensor::Fuzzy.value(&info, &mut a);
            assert_eq!(va, Sensor::Fuzzy.value(&info, &mut b));
            assert!((0.0..=1.0).contains(&va));
        }
    }

    #[test]
    fn test_curve_option_range() {
        let mut rng = StdRng::seed_from_u64(0);
        let info = PaintInfo {
            pressure: 0.5,
            ..Default::default()
        };
        let option = CurveOption::with_sensor(Sensor::Pressure).range(0.2, 1.0);
        assert!((option.apply(&info, &mut rng) - 0.6).abs() < 1e-6);
        assert_eq!(CurveOption::default().apply(&info, &mut rng), 1.0);
        assert_eq!(CurveOption::default().apply_or(&info, &mut rng, 0.0), 0.0);
    }

    #[test]
    fn test_option_serde() {
        let option = CurveOption::with_sensor(Sensor::Time {
            length: 500.0,
            periodic: true,
        });
        let json = serde_json::to_string(&option).unwrap();
        let back: CurveOption = serde_json::from_str(&json).unwrap();
        assert_eq!(back, option);
    }
}
