//! Input model: pointer and touch events, and the drawing state machine.
//!
//! `InputEvent` mirrors the device events the surface listens to. Mouse
//! events carry their client position; touch events carry the active touch
//! list, of which only the first point is used. `DrawingState` is the
//! two-field machine that turns a run of move events into connected
//! segments between pointer-down and pointer-up.

#[cfg(test)]
#[path = "input_test.rs"]
mod input_test;

use crate::coords::{ClientPoint, StrokePoint};

/// A raw device event delivered to the surface.
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    MouseDown(ClientPoint),
    MouseMove(ClientPoint),
    MouseUp(ClientPoint),
    /// The pointer left the surface bounds.
    MouseLeave(ClientPoint),
    TouchStart(Vec<ClientPoint>),
    TouchMove(Vec<ClientPoint>),
    /// Remaining active touches after the lift; usually empty.
    TouchEnd(Vec<ClientPoint>),
}

/// Where an event sits in the stroke lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Begin,
    Move,
    End,
}

impl InputEvent {
    #[must_use]
    pub fn phase(&self) -> Phase {
        match self {
            Self::MouseDown(_) | Self::TouchStart(_) => Phase::Begin,
            Self::MouseMove(_) | Self::TouchMove(_) => Phase::Move,
            Self::MouseUp(_) | Self::MouseLeave(_) | Self::TouchEnd(_) => Phase::End,
        }
    }

    /// The client position that drives this event: the mouse position, or
    /// the first active touch point.
    #[must_use]
    pub fn client_point(&self) -> Option<ClientPoint> {
        match self {
            Self::MouseDown(p) | Self::MouseMove(p) | Self::MouseUp(p) | Self::MouseLeave(p) => Some(*p),
            Self::TouchStart(touches) | Self::TouchMove(touches) | Self::TouchEnd(touches) => {
                touches.first().copied()
            }
        }
    }
}

/// Stroke state. `last_point` is only meaningful while `is_drawing` holds.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DrawingState {
    pub is_drawing: bool,
    pub last_point: StrokePoint,
}

impl DrawingState {
    /// Enter the drawing state anchored at `point`. A second begin while
    /// already drawing re-anchors the stroke.
    pub fn begin(&mut self, point: StrokePoint) {
        self.is_drawing = true;
        self.last_point = point;
    }

    /// Advance to `point`, returning the segment to draw. Returns `None`
    /// while idle.
    pub fn advance(&mut self, point: StrokePoint) -> Option<(StrokePoint, StrokePoint)> {
        if !self.is_drawing {
            return None;
        }
        let from = self.last_point;
        self.last_point = point;
        Some((from, point))
    }

    /// Return to idle. Returns whether a stroke was actually in progress.
    pub fn end(&mut self) -> bool {
        std::mem::replace(&mut self.is_drawing, false)
    }
}
