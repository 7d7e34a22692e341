//! OpenRouter chat-completions client.
//!
//! OpenRouter speaks the OpenAI-compatible `/chat/completions` protocol. The
//! client is built from an explicit [`OpenRouterConfig`]; it never reads the
//! environment itself.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::client::{GenerationRequest, TextGenerator};
use crate::errors::CollaboratorError;

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_MODEL: &str = "mistralai/devstral-small:free";
pub const DEFAULT_TEMPERATURE: f32 = 0.1;
pub const DEFAULT_MAX_TOKENS: u32 = 4000;
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Connection settings for [`OpenRouterClient`].
#[derive(Clone, PartialEq)]
pub struct OpenRouterConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    /// Sampling temperature in `[0.0, 2.0]`
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl OpenRouterConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    pub fn validate(&self) -> Result<(), CollaboratorError> {
        if self.api_key.trim().is_empty() {
            return Err(CollaboratorError::Configuration(
                "API key must not be empty".to_string(),
            ));
        }
        if self.base_url.trim().is_empty() {
            return Err(CollaboratorError::Configuration(
                "base_url must not be empty".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(CollaboratorError::Configuration(format!(
                "temperature must be between 0.0 and 2.0, got {}",
                self.temperature
            )));
        }
        if self.max_tokens == 0 {
            return Err(CollaboratorError::Configuration(
                "max_tokens must be greater than 0".to_string(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(CollaboratorError::Configuration(
                "timeout_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for OpenRouterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenRouterConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<TokenUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Token accounting reported by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

/// Outcome of [`OpenRouterClient::test_connection`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionReport {
    pub success: bool,
    pub model: String,
    pub response: Option<String>,
    pub usage: Option<TokenUsage>,
    pub error: Option<String>,
}

pub struct OpenRouterClient {
    config: OpenRouterConfig,
    http_client: Client,
}

impl OpenRouterClient {
    pub fn new(config: OpenRouterConfig) -> Result<Self, CollaboratorError> {
        config.validate()?;
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                CollaboratorError::Configuration(format!("failed to build HTTP client: {e}"))
            })?;
        Ok(Self {
            config,
            http_client,
        })
    }

    pub fn config(&self) -> &OpenRouterConfig {
        &self.config
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }

    async fn complete(
        &self,
        request: &GenerationRequest,
    ) -> Result<(String, Option<TokenUsage>), CollaboratorError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system_prompt {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &request.prompt,
        });

        let body = ChatRequest {
            model: &self.config.model,
            messages,
            temperature: request.temperature.unwrap_or(self.config.temperature),
            max_tokens: request.max_tokens.unwrap_or(self.config.max_tokens),
        };

        debug!(model = %self.config.model, prompt_chars = request.prompt.len(), "Sending completion request");

        let response = self
            .http_client
            .post(self.completions_url())
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            warn!(status = status.as_u16(), "Completion request rejected");
            return Err(CollaboratorError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| CollaboratorError::InvalidResponse(e.to_string()))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| {
                CollaboratorError::InvalidResponse("response contained no choices".to_string())
            })?;
        Ok((content, parsed.usage))
    }

    fn transport_error(&self, e: reqwest::Error) -> CollaboratorError {
        if e.is_timeout() {
            CollaboratorError::Timeout {
                seconds: self.config.timeout_secs,
            }
        } else {
            CollaboratorError::Transport(e.to_string())
        }
    }

    /// Send a minimal prompt and report whether the service answered.
    pub async fn test_connection(&self) -> ConnectionReport {
        let request = GenerationRequest::new("Hello").with_max_tokens(10);
        match self.complete(&request).await {
            Ok((response, usage)) => ConnectionReport {
                success: true,
                model: self.config.model.clone(),
                response: Some(response),
                usage,
                error: None,
            },
            Err(e) => ConnectionReport {
                success: false,
                model: self.config.model.clone(),
                response: None,
                usage: None,
                error: Some(e.to_string()),
            },
        }
    }
}

#[async_trait]
impl TextGenerator for OpenRouterClient {
    async fn generate(&self, request: GenerationRequest) -> Result<String, CollaboratorError> {
        self.complete(&request).await.map(|(content, _)| content)
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

impl fmt::Debug for OpenRouterClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenRouterClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
