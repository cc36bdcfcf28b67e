//! LLM: multimodal model adapter for sketch analysis.
//!
//! DESIGN
//! ======
//! Configured from environment variables. [`gemini::GeminiClient`] speaks the
//! `generateContent` REST API and implements [`VisionModel`], the trait the
//! analysis pipeline depends on.

pub mod config;
pub mod gemini;
pub mod types;

pub use gemini::GeminiClient;
pub use types::VisionModel;
