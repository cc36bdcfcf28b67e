//! Freehand drawing surface for sketch analysis.
//!
//! This crate owns the raster behind the full-window drawing area. It turns
//! raw pointer and touch events into connected stroke segments on a
//! persistent pixel buffer, reallocates that buffer when the viewport
//! changes, and produces a self-contained PNG payload of the current pixels
//! on demand. The host layer is responsible only for forwarding events
//! together with the surface's current bounding rectangle.
//!
//! ## Module layout
//!
//! | Module | Role |
//! |--------|------|
//! | [`surface`] | [`surface::DrawSurface`]: stroke state machine, resize, clear, snapshot |
//! | [`input`] | Input event types and the [`input::DrawingState`] machine |
//! | [`coords`] | Client-to-canvas coordinate mapping |
//! | [`raster`] | RGBA pixel buffer and round-capped segment stamping |
//! | [`snapshot`] | PNG + base64 inline image payload |
//! | [`consts`] | Shared constants (colours, line width, MIME type) |

pub mod consts;
pub mod coords;
pub mod input;
pub mod raster;
pub mod snapshot;
pub mod surface;

pub use coords::{BoundingRect, ClientPoint, StrokePoint};
pub use input::{DrawingState, InputEvent};
pub use raster::Raster;
pub use snapshot::{Snapshot, SnapshotError};
pub use surface::{DrawSurface, SurfaceAction};
