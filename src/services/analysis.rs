//! Analysis service: raster snapshot → model request → classified outcome.
//!
//! DESIGN
//! ======
//! One user turn carries a fixed instruction and the snapshot as an inline
//! PNG. Decoding and safety parameters are process constants. The reply is
//! classified in two steps: try to parse it as JSON, then test the redirect
//! shape `{"type": "redirect", "value": "<url>"}`. Anything else, including
//! text that is not JSON at all, is shown verbatim. A parse failure is the
//! common path for conversational replies and is never an error.
//!
//! Failures before a reply exists (missing credential, transport fault,
//! timeout) surface as [`AnalysisError`], which callers render as display
//! text. Nothing here panics the caller.

use std::sync::Arc;
use std::time::Duration;

use canvas::Snapshot;
use serde_json::Value;
use tracing::{info, warn};

use crate::llm::VisionModel;
use crate::llm::types::{
    Blob, Content, GenerateRequest, GenerationConfig, HarmBlockThreshold, HarmCategory, LlmError, Part,
    SafetySetting,
};

pub const DEFAULT_ANALYSIS_TIMEOUT_SECS: u64 = 150;

/// Display text while a redirect is being opened.
pub const REDIRECT_PLACEHOLDER: &str = "Redirecting...";

/// Display text when the surface or credential is unavailable.
pub const PRECONDITION_MESSAGE: &str = "Canvas or API key missing.";

const FAILURE_PREFIX: &str = "Analysis failed";

const REDIRECT_TYPE: &str = "redirect";

pub const INSTRUCTION: &str = "\
Transcribe the handwritten text or interpret the drawing in this image. Respond conversationally \
to the content as if it were a user message in a chat. For example, if the text is \"hi,\" respond \
with something like \"hi...\" or a friendly reply. If it's a question, answer it naturally. If it's \
a command or request, fulfill it appropriately.

Decide independently if the response requires providing a URL (e.g., for searches like \"search: \
cats\", playlists like \"playlist: song name\", videos like \"video: topic\", or any other content \
that logically needs a web link). If you decide a URL is needed, respond in JSON format: \
{\"type\": \"redirect\", \"value\": \"the_url_here\"}. Otherwise, return just the conversational \
text response, no JSON.

If the content is a drawing, respond creatively based on what it resembles. Write clearly for best \
results.";

pub const GENERATION: GenerationConfig =
    GenerationConfig { temperature: 0.9, top_k: 32, top_p: 0.95, max_output_tokens: 1024 };

const SAFETY_CATEGORIES: [HarmCategory; 4] = [
    HarmCategory::Harassment,
    HarmCategory::HateSpeech,
    HarmCategory::SexuallyExplicit,
    HarmCategory::DangerousContent,
];

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("no raster available")]
    MissingRaster,
    #[error("model credential not configured")]
    MissingCredential,
    #[error("an analysis is already in progress")]
    Busy,
    #[error("snapshot failed: {0}")]
    Snapshot(canvas::SnapshotError),
    #[error("{0}")]
    Transport(#[from] LlmError),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("analysis task aborted: {0}")]
    Aborted(String),
}

impl crate::frame::ErrorCode for AnalysisError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::MissingRaster => "E_MISSING_RASTER",
            Self::MissingCredential => "E_MISSING_CREDENTIAL",
            Self::Busy => "E_BUSY",
            Self::Snapshot(_) => "E_SNAPSHOT",
            Self::Transport(_) => "E_TRANSPORT",
            Self::Timeout(_) => "E_TIMEOUT",
            Self::Aborted(_) => "E_ABORTED",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Transport(e) if e.retryable()) || matches!(self, Self::Timeout(_) | Self::Busy)
    }
}

impl From<canvas::SnapshotError> for AnalysisError {
    fn from(e: canvas::SnapshotError) -> Self {
        match e {
            canvas::SnapshotError::EmptyRaster { .. } => Self::MissingRaster,
            other => Self::Snapshot(other),
        }
    }
}

impl AnalysisError {
    /// Refused before any request was attempted.
    #[must_use]
    pub fn is_precondition(&self) -> bool {
        matches!(self, Self::MissingRaster | Self::MissingCredential)
    }

    /// The text shown to the user for this failure.
    #[must_use]
    pub fn display_text(&self) -> String {
        if self.is_precondition() {
            return PRECONDITION_MESSAGE.to_string();
        }
        match self {
            Self::Busy => self.to_string(),
            _ => format!("{FAILURE_PREFIX}: {self}"),
        }
    }
}

/// The classified reply. Exactly one per successful analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisOutcome {
    DisplayText(String),
    Redirect(String),
}

impl AnalysisOutcome {
    /// The text shown to the user for this outcome.
    #[must_use]
    pub fn display_text(&self) -> &str {
        match self {
            Self::DisplayText(text) => text,
            Self::Redirect(_) => REDIRECT_PLACEHOLDER,
        }
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DisplayText(_) => "text",
            Self::Redirect(_) => "redirect",
        }
    }
}

// =============================================================================
// REQUEST CONSTRUCTION
// =============================================================================

#[must_use]
pub fn safety_settings() -> Vec<SafetySetting> {
    SAFETY_CATEGORIES
        .iter()
        .map(|&category| SafetySetting { category, threshold: HarmBlockThreshold::BlockMediumAndAbove })
        .collect()
}

/// Build the single-turn request for a snapshot.
#[must_use]
pub fn build_request(snapshot: &Snapshot) -> GenerateRequest {
    let parts = vec![
        Part::Text { text: INSTRUCTION.to_string() },
        Part::InlineData {
            inline_data: Blob { mime_type: snapshot.mime_type.to_string(), data: snapshot.data.clone() },
        },
    ];
    GenerateRequest {
        contents: vec![Content { role: "user".into(), parts }],
        generation_config: GENERATION,
        safety_settings: safety_settings(),
    }
}

// =============================================================================
// REPLY CLASSIFICATION
// =============================================================================

/// Parse `text` as JSON, or `None` if it is not JSON.
#[must_use]
pub fn try_parse(text: &str) -> Option<Value> {
    serde_json::from_str(text).ok()
}

/// The redirect target if `value` has the redirect shape: `type` equal to
/// `"redirect"` and a truthy `value`.
///
/// Truthiness and the string form follow browser script semantics, so
/// `42` redirects to `"42"` and `{}` to `"[object Object]"`.
#[must_use]
pub fn redirect_target(value: &Value) -> Option<String> {
    if value.get("type").and_then(Value::as_str) != Some(REDIRECT_TYPE) {
        return None;
    }
    value.get("value").filter(|v| is_truthy(v)).map(script_string)
}

/// `null`, `false`, `0` and `""` are falsy; arrays and objects are truthy
/// even when empty.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f.abs() > 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn script_string(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => script_number(n),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(|item| if item.is_null() { String::new() } else { script_string(item) })
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => "[object Object]".to_string(),
    }
}

/// Whole floats print without a fraction (`3.0` → `"3"`).
#[allow(clippy::cast_possible_truncation)]
fn script_number(n: &serde_json::Number) -> String {
    if n.is_i64() || n.is_u64() {
        return n.to_string();
    }
    match n.as_f64() {
        Some(f) if f.fract().abs() < f64::EPSILON && f.abs() < 1e15 => (f as i64).to_string(),
        Some(f) => f.to_string(),
        None => n.to_string(),
    }
}

/// Classify a raw model reply.
#[must_use]
pub fn classify_reply(reply: &str) -> AnalysisOutcome {
    let trimmed = reply.trim();
    match try_parse(trimmed).and_then(|v| redirect_target(&v)) {
        Some(url) => AnalysisOutcome::Redirect(url),
        None => AnalysisOutcome::DisplayText(trimmed.to_string()),
    }
}

// =============================================================================
// PIPELINE
// =============================================================================

/// Sends snapshots to the model and classifies replies.
pub struct AnalysisPipeline {
    model: Option<Arc<dyn VisionModel>>,
    timeout: Duration,
}

impl AnalysisPipeline {
    /// `model` is `None` when no credential is configured; every analysis
    /// then fails its precondition.
    #[must_use]
    pub fn new(model: Option<Arc<dyn VisionModel>>, timeout: Duration) -> Self {
        Self { model, timeout }
    }

    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.model.is_some()
    }

    /// Check the credential precondition.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError::MissingCredential`] if no model is configured.
    pub fn check_configured(&self) -> Result<(), AnalysisError> {
        if self.model.is_none() {
            return Err(AnalysisError::MissingCredential);
        }
        Ok(())
    }

    /// Run one analysis.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError::MissingCredential`] without sending anything if
    /// no model is configured, [`AnalysisError::Transport`] if the model call
    /// fails, and [`AnalysisError::Timeout`] if it does not finish in time.
    pub async fn analyze(&self, snapshot: &Snapshot) -> Result<AnalysisOutcome, AnalysisError> {
        let Some(model) = &self.model else {
            return Err(AnalysisError::MissingCredential);
        };

        let request = build_request(snapshot);
        info!(width = snapshot.width, height = snapshot.height, image_bytes = snapshot.byte_len(), "analysis: request");

        let reply = match tokio::time::timeout(self.timeout, model.generate(&request)).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                warn!(error = %e, "analysis: model call failed");
                return Err(e.into());
            }
            Err(_) => {
                warn!(timeout = ?self.timeout, "analysis: timed out");
                return Err(AnalysisError::Timeout(self.timeout));
            }
        };

        let outcome = classify_reply(&reply.text);
        info!(
            reply_len = reply.text.len(),
            finish_reason = reply.finish_reason.as_deref().unwrap_or("-"),
            outcome = outcome.kind(),
            input_tokens = reply.input_tokens,
            output_tokens = reply.output_tokens,
            "analysis: reply classified"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
#[path = "analysis_test.rs"]
mod tests;
