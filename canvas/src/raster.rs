//! The pixel buffer behind the drawing surface.
//!
//! Strokes are stamped as filled discs along each segment, so every segment
//! ends in a round cap and consecutive segments meet in a round join with no
//! gap regardless of their angle.

#[cfg(test)]
#[path = "raster_test.rs"]
mod raster_test;

use image::{Rgba, RgbaImage};

use crate::consts::BACKGROUND;
use crate::coords::StrokePoint;

/// A persistent RGBA raster sized to the viewport.
#[derive(Debug, Clone)]
pub struct Raster {
    pixels: RgbaImage,
}

impl Raster {
    /// Allocate a raster of the given size, filled with the background colour.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self { pixels: RgbaImage::from_pixel(width, height, Rgba(BACKGROUND)) }
    }

    /// Wrap an existing image (e.g. a decoded PNG).
    #[must_use]
    pub fn from_image(pixels: RgbaImage) -> Self {
        Self { pixels }
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Zero-area rasters exist before the first viewport report.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    #[must_use]
    pub fn as_image(&self) -> &RgbaImage {
        &self.pixels
    }

    /// Read one pixel; `None` outside the raster.
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        self.pixels.get_pixel_checked(x, y).map(|p| p.0)
    }

    /// Paint every pixel with `color`.
    pub fn fill(&mut self, color: [u8; 4]) {
        for p in self.pixels.pixels_mut() {
            *p = Rgba(color);
        }
    }

    /// Whether every pixel equals `color`.
    #[must_use]
    pub fn is_uniform(&self, color: [u8; 4]) -> bool {
        self.pixels.pixels().all(|p| p.0 == color)
    }

    /// Draw a straight segment of the given width with round caps.
    ///
    /// Non-finite endpoints are ignored. The segment is clipped to the
    /// raster (padded by the pen radius) before stamping, so far off-canvas
    /// endpoints cost nothing and leave no gaps in the visible part.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn stroke_segment(&mut self, from: StrokePoint, to: StrokePoint, color: [u8; 4], width: f64) {
        if self.is_empty() || !from.is_finite() || !to.is_finite() {
            return;
        }
        let radius = (width / 2.0).max(0.5);
        let pad = radius + 1.0;
        let bounds = (-pad, -pad, f64::from(self.width()) + pad, f64::from(self.height()) + pad);
        let Some((from, to)) = clip_segment(from, to, bounds) else {
            return;
        };
        let dx = to.x - from.x;
        let dy = to.y - from.y;
        let steps = dx.abs().max(dy.abs()).ceil().max(1.0);
        for i in 0..=(steps as u32) {
            let t = f64::from(i) / steps;
            self.stamp_disc(from.x + dx * t, from.y + dy * t, radius, color);
        }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn stamp_disc(&mut self, cx: f64, cy: f64, radius: f64, color: [u8; 4]) {
        let max_x = f64::from(self.width() - 1);
        let max_y = f64::from(self.height() - 1);
        let x0 = (cx - radius).floor().max(0.0);
        let x1 = (cx + radius).ceil().min(max_x);
        let y0 = (cy - radius).floor().max(0.0);
        let y1 = (cy + radius).ceil().min(max_y);
        if x0 > x1 || y0 > y1 {
            return;
        }
        let r2 = radius * radius;
        for y in (y0 as u32)..=(y1 as u32) {
            let py = f64::from(y) + 0.5 - cy;
            for x in (x0 as u32)..=(x1 as u32) {
                let px = f64::from(x) + 0.5 - cx;
                if px * px + py * py <= r2 {
                    self.pixels.put_pixel(x, y, Rgba(color));
                }
            }
        }
    }
}

/// Clip a segment to `(min_x, min_y, max_x, max_y)` (Liang-Barsky).
/// `None` when the segment misses the box entirely.
fn clip_segment(from: StrokePoint, to: StrokePoint, bounds: (f64, f64, f64, f64)) -> Option<(StrokePoint, StrokePoint)> {
    let (min_x, min_y, max_x, max_y) = bounds;
    let dx = to.x - from.x;
    let dy = to.y - from.y;
    let mut t0: f64 = 0.0;
    let mut t1: f64 = 1.0;

    for (p, q) in [(-dx, from.x - min_x), (dx, max_x - from.x), (-dy, from.y - min_y), (dy, max_y - from.y)] {
        if p.abs() < f64::EPSILON {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            t0 = t0.max(r);
        } else {
            t1 = t1.min(r);
        }
        if t0 > t1 {
            return None;
        }
    }

    let at = |t: f64| StrokePoint::new(from.x + dx * t, from.y + dy * t);
    Some((at(t0), at(t1)))
}
