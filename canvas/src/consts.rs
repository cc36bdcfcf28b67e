//! Shared constants for the canvas crate.

// ── Raster ──────────────────────────────────────────────────────

/// Background fill for a fresh or cleared raster (opaque black).
pub const BACKGROUND: [u8; 4] = [0, 0, 0, 255];

/// Stroke colour (opaque white).
pub const STROKE_COLOR: [u8; 4] = [255, 255, 255, 255];

/// Stroke width in pixels.
pub const LINE_WIDTH: f64 = 3.0;

// ── Snapshot ────────────────────────────────────────────────────

/// Media type of the encoded snapshot payload.
pub const PNG_MIME: &str = "image/png";
