use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::errors::CollaboratorError;
use crate::util::{extract_json_object, preview};

/// A single prompt sent to the text-generation service.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub system_prompt: Option<String>,
    pub prompt: String,
    /// Overrides the client's configured temperature.
    pub temperature: Option<f32>,
    /// Overrides the client's configured token limit.
    pub max_tokens: Option<u32>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: None,
            prompt: prompt.into(),
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Request/response contract with the external text-generation service.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, request: GenerationRequest) -> Result<String, CollaboratorError>;

    fn model_name(&self) -> &str;
}

/// Parse the outermost JSON object in `response` as `T`.
pub(crate) fn parse_structured<T: DeserializeOwned>(
    schema: &str,
    response: &str,
) -> Result<T, CollaboratorError> {
    let json = extract_json_object(response).ok_or_else(|| {
        CollaboratorError::InvalidResponse(format!(
            "no JSON object in response: {}",
            preview(response, 120)
        ))
    })?;
    serde_json::from_str(json).map_err(|e| CollaboratorError::SchemaMismatch {
        schema: schema.to_string(),
        message: e.to_string(),
    })
}
