//! Shared configuration for Impasto
//!
//! This crate provides the single source of truth for the raster engine's
//! tuning knobs: tile geometry, the dab rendering worker pool, and the
//! bounds of the adaptive stroke update cadence.

use serde::{Deserialize, Serialize};

/// Default tile side length in pixels
pub const DEFAULT_TILE_SIZE: u32 = 64;

/// Lower bound of the asynchronous update period in milliseconds
pub const DEFAULT_MIN_UPDATE_PERIOD_MS: u64 = 20;

/// Upper bound of the asynchronous update period in milliseconds
pub const DEFAULT_MAX_UPDATE_PERIOD_MS: u64 = 100;

/// Number of samples kept by the rolling statistics
pub const DEFAULT_STATISTICS_WINDOW: usize = 50;

/// Errors produced while loading or validating a configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Tile size must be a non-zero power of two, got {0}")]
    TileSize(u32),

    #[error("Invalid update period bounds: min={min}ms, max={max}ms")]
    UpdatePeriod { min: u64, max: u64 },

    #[error("Worker thread count must be at least 1")]
    WorkerThreads,

    #[error("Statistics window must be at least 1")]
    StatisticsWindow,
}

/// Engine configuration shared by paint devices and brush operators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Tile side length in pixels (power of two)
    pub tile_size: u32,
    /// Dab rendering workers; `None` uses the hardware concurrency
    pub worker_threads: Option<usize>,
    /// Fastest allowed compositing cadence
    pub min_update_period_ms: u64,
    /// Slowest allowed compositing cadence
    pub max_update_period_ms: u64,
    /// Samples in the rolling mean of dab spacing
    pub spacing_window: usize,
    /// Samples in the rolling mean of rendered dab size
    pub dab_size_window: usize,
    /// Samples in the rolling mean of dab rendering time
    pub render_time_window: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tile_size: DEFAULT_TILE_SIZE,
            worker_threads: None,
            min_update_period_ms: DEFAULT_MIN_UPDATE_PERIOD_MS,
            max_update_period_ms: DEFAULT_MAX_UPDATE_PERIOD_MS,
            spacing_window: DEFAULT_STATISTICS_WINDOW,
            dab_size_window: DEFAULT_STATISTICS_WINDOW,
            render_time_window: DEFAULT_STATISTICS_WINDOW,
        }
    }
}

impl EngineConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the configuration to pretty JSON
    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check the invariants the engine relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tile_size == 0 || !self.tile_size.is_power_of_two() {
            return Err(ConfigError::TileSize(self.tile_size));
        }
        if self.min_update_period_ms == 0 || self.min_update_period_ms > self.max_update_period_ms {
            return Err(ConfigError::UpdatePeriod {
                min: self.min_update_period_ms,
                max: self.max_update_period_ms,
            });
        }
        if self.worker_threads == Some(0) {
            return Err(ConfigError::WorkerThreads);
        }
        if self.spacing_window == 0 || self.dab_size_window == 0 || self.render_time_window == 0 {
            return Err(ConfigError::StatisticsWindow);
        }
        Ok(())
    }

    /// Resolve the number of dab rendering workers
    pub fn resolved_worker_threads(&self) -> usize {
        self.worker_threads.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.tile_size, DEFAULT_TILE_SIZE);
        assert_eq!(config.min_update_period_ms, 20);
        assert_eq!(config.max_update_period_ms, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = EngineConfig::from_json_str(r#"{ "tile_size": 128, "worker_threads": 2 }"#).unwrap();
        assert_eq!(config.tile_size, 128);
        assert_eq!(config.resolved_worker_threads(), 2);
        assert_eq!(config.spacing_window, DEFAULT_STATISTICS_WINDOW);
    }

    #[test]
    fn test_rejects_non_power_of_two_tiles() {
        let result = EngineConfig::from_json_str(r#"{ "tile_size": 100 }"#);
        assert!(matches!(result, Err(ConfigError::TileSize(100))));
    }

    #[test]
    fn test_rejects_inverted_period_bounds() {
        let config = EngineConfig {
            min_update_period_ms: 200,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UpdatePeriod { min: 200, max: 100 })
        ));
    }

    #[test]
    fn test_json_round_trip() {
        let config = EngineConfig {
            worker_threads: Some(3),
            ..Default::default()
        };
        let json = config.to_json_string().unwrap();
        assert_eq!(EngineConfig::from_json_str(&json).unwrap(), config);
    }

    #[test]
    fn test_auto_worker_threads_is_positive() {
        assert!(EngineConfig::default().resolved_worker_threads() >= 1);
    }
}
