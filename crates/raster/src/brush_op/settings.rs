//! Serializable brush operator presets

use serde::{Deserialize, Serialize};

use crate::error::RasterError;
use crate::sensors::CurveOption;

/// Random dab displacement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScatterOption {
    pub curve: CurveOption,
    /// Displacement in dab widths at full strength
    pub amount: f32,
    pub axis_x: bool,
    pub axis_y: bool,
}

impl Default for ScatterOption {
    fn default() -> Self {
        Self {
            curve: CurveOption::default(),
            amount: 1.0,
            axis_x: true,
            axis_y: true,
        }
    }
}

/// Time-based dab placement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AirbrushOption {
    pub enabled: bool,
    /// Dabs per second
    pub rate: f32,
    /// Place dabs only by timing, never by distance
    pub ignore_spacing: bool,
}

impl Default for AirbrushOption {
    fn default() -> Self {
        Self {
            enabled: false,
            rate: 20.0,
            ignore_spacing: false,
        }
    }
}

/// Brush operator preset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrushOpSettings {
    /// Base opacity 0.0-1.0
    pub opacity: f32,
    /// Base flow 0.0-1.0
    pub flow: f32,
    /// Spacing as fraction of the dab extent (e.g., 0.1 = 10% of diameter)
    pub spacing: f32,
    pub auto_spacing: bool,
    pub auto_spacing_coeff: f32,
    pub size: CurveOption,
    /// Rotation in turns when enabled
    pub rotation: CurveOption,
    pub ratio: CurveOption,
    pub scatter: ScatterOption,
    pub opacity_curve: CurveOption,
    pub flow_curve: CurveOption,
    pub softness: CurveOption,
    pub spacing_curve: CurveOption,
    pub rate_curve: CurveOption,
    pub airbrush: AirbrushOption,
    /// Draw crisp DDA lines with one pixel brushes
    pub sharpness: bool,
    /// Reuse the previous dab buffer for identical requests
    pub dab_cache: bool,
    /// Seed of the fuzzy and scatter randomness
    pub seed: u64,
}

impl Default for BrushOpSettings {
    fn default() -> Self {
        Self {
            opacity: 1.0,
            flow: 1.0,
            spacing: 0.1,
            auto_spacing: false,
            auto_spacing_coeff: 1.0,
            size: CurveOption::default(),
            rotation: CurveOption::default(),
            ratio: CurveOption::default(),
            scatter: ScatterOption::default(),
            opacity_curve: CurveOption::default(),
            flow_curve: CurveOption::default(),
            softness: CurveOption::default(),
            spacing_curve: CurveOption::default(),
            rate_curve: CurveOption::default(),
            airbrush: AirbrushOption::default(),
            sharpness: false,
            dab_cache: false,
            seed: 0,
        }
    }
}

impl BrushOpSettings {
    pub fn from_json_str(json: &str) -> Result<Self, RasterError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json_string(&self) -> Result<String, RasterError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::Sensor;

    #[test]
    fn test_partial_preset_uses_defaults() {
        let settings = BrushOpSettings::from_json_str(
            r#"{ "spacing": 0.25, "size": { "enabled": true, "sensor": { "kind": "pressure" } } }"#,
        )
        .unwrap();
        assert_eq!(settings.spacing, 0.25);
        assert!(settings.size.enabled);
        assert_eq!(settings.size.sensor, Sensor::Pressure);
        assert_eq!(settings.size.max, 1.0);
        assert_eq!(settings.opacity, 1.0);
        assert!(!settings.airbrush.enabled);
    }

    #[test]
    fn test_preset_json_round_trip() {
        let settings = BrushOpSettings {
            sharpness: true,
            airbrush: AirbrushOption {
                enabled: true,
                rate: 40.0,
                ignore_spacing: true,
            },
            ..Default::default()
        };
        let json = settings.to_json_string().unwrap();
        assert_eq!(BrushOpSettings::from_json_str(&json).unwrap(), settings);
    }

    #[test]
    fn test_malformed_preset_is_an_error() {
        assert!(matches!(
            BrushOpSettings::from_json_str("{ not json"),
            Err(RasterError::Preset(_))
        ));
    }
}
