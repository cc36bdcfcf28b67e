//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor. It
//! holds only the analysis pipeline; each websocket connection owns its own
//! [`crate::services::session::Session`], so no surface state is shared
//! between connections.

use std::sync::Arc;

use crate::services::analysis::AnalysisPipeline;

/// Shared application state, injected into Axum handlers via State extractor.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<AnalysisPipeline>,
}

impl AppState {
    #[must_use]
    pub fn new(pipeline: AnalysisPipeline) -> Self {
        Self { pipeline: Arc::new(pipeline) }
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================
