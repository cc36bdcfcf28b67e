//! Coordinate mapping from absolute client positions to canvas-local points.
//!
//! The host passes the surface's bounding rectangle with every event. Nothing
//! here caches an offset, so a scrolled or resized surface maps correctly on
//! the very next event.

#[cfg(test)]
#[path = "coords_test.rs"]
mod coords_test;

use serde::{Deserialize, Serialize};

/// A point in canvas-local pixels, origin at the surface's top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StrokePoint {
    pub x: f64,
    pub y: f64,
}

impl StrokePoint {
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Both coordinates are finite numbers.
    #[must_use]
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// An absolute pointer or touch position as reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ClientPoint {
    pub client_x: f64,
    pub client_y: f64,
}

impl ClientPoint {
    #[must_use]
    pub fn new(client_x: f64, client_y: f64) -> Self {
        Self { client_x, client_y }
    }
}

/// The surface's bounding rectangle in client coordinates, queried fresh
/// for each event.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingRect {
    pub left: f64,
    pub top: f64,
    #[serde(default)]
    pub width: f64,
    #[serde(default)]
    pub height: f64,
}

impl BoundingRect {
    #[must_use]
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self { left, top, width, height }
    }

    /// Convert a client position into canvas-local coordinates.
    #[must_use]
    pub fn to_local(&self, client: ClientPoint) -> StrokePoint {
        StrokePoint { x: client.client_x - self.left, y: client.client_y - self.top }
    }
}
