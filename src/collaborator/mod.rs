//! Access to the external text-generation service.
//!
//! Only pipeline nodes talk to the collaborator. They hold an
//! `Arc<dyn TextGenerator>` so tests can swap in [`MockGenerator`].

mod client;
mod dependencies;
mod language;
mod mock;
mod openrouter;

pub use client::{GenerationRequest, TextGenerator};
pub use dependencies::DependencyExtractionAgent;
pub use language::LanguageDetectionAgent;
pub use mock::MockGenerator;
pub use openrouter::{
    ConnectionReport, DEFAULT_BASE_URL, DEFAULT_MAX_TOKENS, DEFAULT_MODEL, DEFAULT_TEMPERATURE,
    DEFAULT_TIMEOUT_SECS, OpenRouterClient, OpenRouterConfig, TokenUsage,
};
