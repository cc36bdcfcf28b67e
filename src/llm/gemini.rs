//! Gemini `generateContent` client.
//!
//! Thin HTTP wrapper for `POST {base}/models/{model}:generateContent`.
//! Pure parsing in `parse_response` for testability.

use std::time::Duration;

use serde::Deserialize;

use super::config::ModelConfig;
use super::types::{GenerateRequest, LlmError, ModelReply, VisionModel};

const API_KEY_HEADER: &str = "x-goog-api-key";

// =============================================================================
// CLIENT
// =============================================================================

pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    endpoint: String,
    model: String,
}

impl GeminiClient {
    /// Build a client from parsed config.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client fails to build.
    pub fn from_config(config: ModelConfig) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeouts.request_secs))
            .connect_timeout(Duration::from_secs(config.timeouts.connect_secs))
            .build()
            .map_err(|e| LlmError::HttpClientBuild(e.to_string()))?;
        let endpoint = format!("{}/models/{}:generateContent", config.base_url, config.model);
        Ok(Self { http, api_key: config.api_key, endpoint, model: config.model })
    }

    /// Build a client from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the API key is missing or the HTTP client fails.
    pub fn from_env() -> Result<Self, LlmError> {
        Self::from_config(ModelConfig::from_env()?)
    }

    /// The configured model name (e.g. `"gemini-2.5-pro"`).
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait::async_trait]
impl VisionModel for GeminiClient {
    async fn generate(&self, request: &GenerateRequest) -> Result<ModelReply, LlmError> {
        let response = self
            .http
            .post(&self.endpoint)
            .header(API_KEY_HEADER, &self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| LlmError::ApiRequest(e.to_string()))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| LlmError::ApiRequest(e.to_string()))?;

        if status != 200 {
            return Err(LlmError::ApiResponse { status, body: text });
        }

        parse_response(&text)
    }
}

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
    #[serde(default)]
    thought: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
}

// =============================================================================
// PARSING
// =============================================================================

/// Reduce a `generateContent` response to the first candidate's text.
fn parse_response(json: &str) -> Result<ModelReply, LlmError> {
    let api: ApiResponse = serde_json::from_str(json).map_err(|e| LlmError::ApiParse(e.to_string()))?;

    if let Some(reason) = api.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(LlmError::Blocked(reason));
    }

    let candidate = api.candidates.into_iter().next().ok_or(LlmError::EmptyResponse)?;

    // Thought summaries are not part of the answer.
    let text: String = candidate
        .content
        .map(|c| c.parts)
        .unwrap_or_default()
        .into_iter()
        .filter(|p| !p.thought)
        .filter_map(|p| p.text)
        .collect();

    // An empty answer that finished normally is still an answer.
    if text.is_empty() {
        if let Some(reason) = candidate.finish_reason.as_deref().filter(|r| *r != "STOP") {
            return Err(LlmError::Blocked(reason.to_string()));
        }
    }

    let usage = api.usage_metadata;
    Ok(ModelReply {
        text,
        finish_reason: candidate.finish_reason,
        input_tokens: usage.as_ref().map_or(0, |u| u.prompt_token_count),
        output_tokens: usage.as_ref().map_or(0, |u| u.candidates_token_count),
    })
}

#[cfg(test)]
#[path = "gemini_test.rs"]
mod tests;
