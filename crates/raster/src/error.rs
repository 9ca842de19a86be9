//! Error types for raster storage and paint devices.

use impasto_config::ConfigError;

/// Errors raised by tiled storage, paint devices and compositing.
#[derive(Debug, thiserror::Error)]
pub enum RasterError {
    #[error("Buffer holds {actual} bytes but the region needs {expected}")]
    BufferSize { expected: usize, actual: usize },

    #[error("Invalid rectangle size {width}x{height}")]
    InvalidRect { width: i32, height: i32 },

    #[error("Tile size must be a non-zero power of two, got {0}")]
    InvalidTileSize(u32),

    #[error("Default pixel has {actual} bytes but the pixel size is {expected}")]
    DefaultPixelSize { expected: usize, actual: usize },

    #[error("Failed to allocate storage for {tiles} tiles")]
    TileAllocation { tiles: usize },

    #[error("Memento {memento} belongs to a different data manager")]
    ForeignMemento { memento: u64 },

    #[error("Memento {memento} is out of sequence")]
    MementoOutOfSequence { memento: u64 },

    #[error("Memento {memento} can no longer be rolled forward: history was edited after rollback")]
    RedoInvalidated { memento: u64 },

    #[error("Pixel size mismatch: expected {expected} bytes, got {actual}")]
    PixelSizeMismatch { expected: usize, actual: usize },

    #[error("Color space mismatch: device is {expected}, data is {actual}")]
    ColorSpaceMismatch { expected: String, actual: String },

    #[error("Transform is not invertible (determinant {determinant})")]
    DegenerateTransform { determinant: f32 },

    #[error("Tile store error: {0}")]
    Store(String),

    #[error("Invalid brush preset: {0}")]
    Preset(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}
