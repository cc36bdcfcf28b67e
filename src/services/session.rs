//! Session: one drawing surface and its analysis state.
//!
//! DESIGN
//! ======
//! A session is driven from a single logical thread: input events, resize,
//! clear, and analysis start/finish are all `&mut self` calls. The model
//! call itself happens between [`Session::begin_analysis`] and
//! [`Session::finish_analysis`], so the caller may await it elsewhere while
//! events keep arriving. The busy flag is set in `begin_analysis` and
//! cleared in `finish_analysis` on every outcome; a second begin while busy
//! is refused with [`AnalysisError::Busy`] and changes nothing.

use canvas::{BoundingRect, DrawSurface, InputEvent, Snapshot, SurfaceAction};
use tracing::info;

use super::analysis::{AnalysisError, AnalysisOutcome, AnalysisPipeline};
use super::redirect::Navigator;

/// Process-local UI state for analysis. Not persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalysisRequestState {
    pub is_analyzing: bool,
    pub result_text: String,
}

pub struct Session {
    surface: DrawSurface,
    pub analysis: AnalysisRequestState,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(DrawSurface::default())
    }
}

impl Session {
    #[must_use]
    pub fn new(surface: DrawSurface) -> Self {
        Self { surface, analysis: AnalysisRequestState::default() }
    }

    #[must_use]
    pub fn surface(&self) -> &DrawSurface {
        &self.surface
    }

    // --- Surface operations ---

    pub fn handle_input(&mut self, event: &InputEvent, rect: BoundingRect) -> SurfaceAction {
        self.surface.handle_event(event, rect)
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.surface.resize(width, height);
    }

    /// Erase the raster and the displayed result. The busy flag and stroke
    /// state are untouched.
    pub fn clear(&mut self) {
        self.surface.clear();
        self.analysis.result_text.clear();
    }

    // --- Analysis ---

    /// Start an analysis: check preconditions, raise the busy flag, and take
    /// the snapshot to send.
    ///
    /// # Errors
    ///
    /// - [`AnalysisError::Busy`] if an analysis is already in flight; no
    ///   state changes.
    /// - A precondition error if the raster is empty or no credential is
    ///   configured; the result text is set and the flag stays down.
    /// - [`AnalysisError::Snapshot`] if encoding fails; the result text is
    ///   set and the flag is lowered again.
    pub fn begin_analysis(&mut self, pipeline: &AnalysisPipeline) -> Result<Snapshot, AnalysisError> {
        if self.analysis.is_analyzing {
            return Err(AnalysisError::Busy);
        }

        let precondition = if self.surface.raster().is_empty() {
            Err(AnalysisError::MissingRaster)
        } else {
            pipeline.check_configured()
        };
        if let Err(e) = precondition {
            self.analysis.result_text = e.display_text();
            return Err(e);
        }

        self.analysis.is_analyzing = true;
        self.analysis.result_text.clear();

        match self.surface.snapshot() {
            Ok(snapshot) => Ok(snapshot),
            Err(e) => {
                let err = AnalysisError::from(e);
                self.analysis.result_text = err.display_text();
                self.analysis.is_analyzing = false;
                Err(err)
            }
        }
    }

    /// Apply a terminal result: set the result text, perform the redirect
    /// side effect, and lower the busy flag. Returns the text now displayed.
    pub fn finish_analysis(
        &mut self,
        result: &Result<AnalysisOutcome, AnalysisError>,
        navigator: &mut dyn Navigator,
    ) -> &str {
        match result {
            Ok(outcome) => {
                if let AnalysisOutcome::Redirect(url) = outcome {
                    navigator.open(url);
                }
                self.analysis.result_text = outcome.display_text().to_string();
            }
            Err(e) => {
                self.analysis.result_text = e.display_text();
            }
        }
        self.analysis.is_analyzing = false;
        &self.analysis.result_text
    }

    /// Begin, await, and finish one analysis in place.
    ///
    /// # Errors
    ///
    /// Returns the failure after it has already been rendered into the
    /// result text.
    pub async fn analyze(
        &mut self,
        pipeline: &AnalysisPipeline,
        navigator: &mut dyn Navigator,
    ) -> Result<AnalysisOutcome, AnalysisError> {
        let snapshot = self.begin_analysis(pipeline)?;
        let result = pipeline.analyze(&snapshot).await;
        self.finish_analysis(&result, navigator);
        info!(ok = result.is_ok(), "session: analysis finished");
        result
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
