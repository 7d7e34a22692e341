use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::client::{GenerationRequest, TextGenerator};
use crate::errors::CollaboratorError;

/// Generator that replays queued responses in order.
///
/// Every request is recorded so tests can inspect the prompts that were sent.
pub struct MockGenerator {
    responses: Mutex<VecDeque<Result<String, CollaboratorError>>>,
    requests: Mutex<Vec<GenerationRequest>>,
    model: String,
}

impl MockGenerator {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            model: "mock-model".to_string(),
        }
    }

    pub fn add_response(&self, content: impl Into<String>) {
        self.queue().push_back(Ok(content.into()));
    }

    pub fn add_error(&self, error: CollaboratorError) {
        self.queue().push_back(Err(error));
    }

    pub fn remaining_responses(&self) -> usize {
        self.queue().len()
    }

    /// Requests received so far, oldest first.
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn queue(&self) -> std::sync::MutexGuard<'_, VecDeque<Result<String, CollaboratorError>>> {
        self.responses.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for MockGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TextGenerator for MockGenerator {
    async fn generate(&self, request: GenerationRequest) -> Result<String, CollaboratorError> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request);
        self.queue().pop_front().unwrap_or_else(|| {
            Err(CollaboratorError::InvalidResponse(
                "MockGenerator: no more responses in queue".to_string(),
            ))
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

impl std::fmt::Debug for MockGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockGenerator")
            .field("model", &self.model)
            .field("remaining_responses", &self.remaining_responses())
            .finish()
    }
}
