/// Smallest spacing ever returned by a paint operation, in pixels.
pub const MIN_SPACING: f32 = 0.5;

/// Spacing returned when a sample could not be painted.
pub const DEFAULT_SPACING: f32 = 1.0;

/// Dab dimensions below this (in pixels) are treated as "too small to paint".
pub const MIN_DAB_EXTENT: f32 = 0.01;

/// Opacity and flow are quantized to 8 bits before they reach the executor.
pub const OPACITY_OPAQUE_U8: u8 = 255;

/// Weight of a new sample in the running average opacity of a stroke.
pub const AVERAGE_OPACITY_EXPONENT: f32 = 0.1;

/// Smallest compositing patch side, in pixels.
pub const MIN_PATCH_SIZE: i32 = 64;

/// Largest compositing patch side, in pixels.
pub const MAX_PATCH_SIZE: i32 = 512;

/// Compositing patch sides are multiples of this.
pub const PATCH_STEP: i32 = 64;
