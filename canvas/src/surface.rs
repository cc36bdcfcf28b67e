//! The drawing surface: raster plus stroke state machine.
//!
//! `DrawSurface` is the only owner of the raster. Event handlers run
//! synchronously and never block; the host forwards each device event with
//! the surface's bounding rectangle as of that event and gets back a
//! [`SurfaceAction`] describing what changed, which is all a renderer needs
//! to mirror the raster.
//!
//! States: **Idle** → down/touch-start → **Drawing** → up/leave/touch-end →
//! **Idle**. Each move while drawing stamps exactly one segment from the
//! last recorded point to the new one.

#[cfg(test)]
#[path = "surface_test.rs"]
mod surface_test;

use crate::consts::{BACKGROUND, LINE_WIDTH, STROKE_COLOR};
use crate::coords::{BoundingRect, StrokePoint};
use crate::input::{DrawingState, InputEvent, Phase};
use crate::raster::Raster;
use crate::snapshot::{Snapshot, SnapshotError};

/// What an input event did to the surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SurfaceAction {
    /// Nothing changed.
    None,
    /// A stroke began at this point. No pixels were drawn yet.
    StrokeStarted(StrokePoint),
    /// One segment was drawn onto the raster.
    Segment { from: StrokePoint, to: StrokePoint },
    /// The active stroke ended.
    StrokeEnded,
}

/// Raster-backed freehand drawing surface.
#[derive(Debug, Clone)]
pub struct DrawSurface {
    raster: Raster,
    drawing: DrawingState,
}

impl Default for DrawSurface {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

impl DrawSurface {
    /// A surface with a background-filled raster of the given size.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self::from_raster(Raster::new(width, height))
    }

    /// A surface over existing pixels, idle.
    #[must_use]
    pub fn from_raster(raster: Raster) -> Self {
        Self { raster, drawing: DrawingState::default() }
    }

    // --- Input events ---

    /// Apply one device event. `rect` is the surface's bounding rectangle at
    /// the time of the event.
    pub fn handle_event(&mut self, event: &InputEvent, rect: BoundingRect) -> SurfaceAction {
        match event.phase() {
            Phase::Begin => {
                let Some(client) = event.client_point() else {
                    return SurfaceAction::None;
                };
                let point = rect.to_local(client);
                self.drawing.begin(point);
                SurfaceAction::StrokeStarted(point)
            }
            Phase::Move => {
                if !self.drawing.is_drawing {
                    return SurfaceAction::None;
                }
                let Some(client) = event.client_point() else {
                    return SurfaceAction::None;
                };
                let Some((from, to)) = self.drawing.advance(rect.to_local(client)) else {
                    return SurfaceAction::None;
                };
                self.raster.stroke_segment(from, to, STROKE_COLOR, LINE_WIDTH);
                SurfaceAction::Segment { from, to }
            }
            Phase::End => {
                if self.drawing.end() {
                    SurfaceAction::StrokeEnded
                } else {
                    SurfaceAction::None
                }
            }
        }
    }

    // --- Viewport ---

    /// Reallocate the raster at the new viewport size. Prior content is lost,
    /// even when the size is unchanged.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.raster = Raster::new(width, height);
    }

    // --- Commands ---

    /// Erase the raster to background. The stroke state is left as is.
    pub fn clear(&mut self) {
        self.raster.fill(BACKGROUND);
    }

    /// Encode the current raster as an inline PNG payload.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::EmptyRaster`] before the first non-empty
    /// resize, or [`SnapshotError::Encode`] if encoding fails.
    pub fn snapshot(&self) -> Result<Snapshot, SnapshotError> {
        Snapshot::encode(&self.raster)
    }

    // --- Queries ---

    #[must_use]
    pub fn raster(&self) -> &Raster {
        &self.raster
    }

    #[must_use]
    pub fn drawing_state(&self) -> DrawingState {
        self.drawing
    }

    #[must_use]
    pub fn is_drawing(&self) -> bool {
        self.drawing.is_drawing
    }

    #[must_use]
    pub fn size(&self) -> (u32, u32) {
        (self.raster.width(), self.raster.height())
    }
}
