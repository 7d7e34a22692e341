//! Nodes of the conversion pipeline.

use async_trait::async_trait;
use tracing::warn;

use super::FailurePolicy;
use crate::collaborator::{DependencyExtractionAgent, LanguageDetectionAgent};
use crate::errors::{CollaboratorError, NodeError};
use crate::graph::{GraphState, PhaseNode};

/// Marks the session as started.
#[derive(Debug, Default)]
pub struct InitializationNode;

impl InitializationNode {
    pub const NAME: &'static str = "initialization";
    pub const PHASE: &'static str = "initialized";
}

#[async_trait]
impl PhaseNode for InitializationNode {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn phase(&self) -> &str {
        Self::PHASE
    }

    async fn execute(&self, mut state: GraphState) -> Result<GraphState, NodeError> {
        state.add_message("System started");
        state.advance(Self::PHASE);
        Ok(state)
    }
}

/// Structural checks on the session before any analysis runs.
///
/// Problems are recorded on the session rather than failing the node.
#[derive(Debug, Default)]
pub struct ValidationNode;

impl ValidationNode {
    pub const NAME: &'static str = "validation";
    pub const PHASE: &'static str = "validated";
}

#[async_trait]
impl PhaseNode for ValidationNode {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn phase(&self) -> &str {
        Self::PHASE
    }

    async fn execute(&self, mut state: GraphState) -> Result<GraphState, NodeError> {
        state.add_message("Basic validation executed");

        if let Some(source) = state.session.original_source()
            && source.content.trim().is_empty()
        {
            let message = format!("Source code in {} is empty", source.display_name());
            state.record_error(message);
        }

        state.advance(Self::PHASE);
        Ok(state)
    }
}

/// Apply `policy` to a collaborator failure: either fail the node or record
/// the error on the session and carry on without the payload.
fn handle_failure(
    policy: FailurePolicy,
    state: &mut GraphState,
    what: &str,
    error: CollaboratorError,
) -> Result<(), NodeError> {
    match policy {
        FailurePolicy::Abort => Err(NodeError::Collaborator(error)),
        FailurePolicy::Record => {
            warn!(error = %error, "{what} failed; continuing without result");
            state.record_error(format!("{what} failed: {error}"));
            Ok(())
        }
    }
}

/// Detects the source language through the collaborator.
pub struct LanguageDetectionNode {
    agent: LanguageDetectionAgent,
    policy: FailurePolicy,
}

impl LanguageDetectionNode {
    pub const NAME: &'static str = "language_detection";
    pub const PHASE: &'static str = "language_detected";

    pub fn new(agent: LanguageDetectionAgent, policy: FailurePolicy) -> Self {
        Self { agent, policy }
    }
}

#[async_trait]
impl PhaseNode for LanguageDetectionNode {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn phase(&self) -> &str {
        Self::PHASE
    }

    async fn execute(&self, mut state: GraphState) -> Result<GraphState, NodeError> {
        let source = state
            .session
            .original_source()
            .cloned()
            .ok_or_else(|| NodeError::MissingInput("original_source".to_string()))?;

        match self.agent.detect(&source.content).await {
            Ok(detection) => {
                state.add_message(format!(
                    "Language detected: {} (confidence {:.2})",
                    detection.detected_language, detection.confidence
                ));
                if detection.detected_language != source.language {
                    state.add_message(format!(
                        "Detected language {} differs from declared {}",
                        detection.detected_language, source.language
                    ));
                }
                state.session = state.session.with_language_detection(detection);
            }
            Err(e) => handle_failure(self.policy, &mut state, "Language detection", e)?,
        }

        state.advance(Self::PHASE);
        Ok(state)
    }
}

/// Extracts imports and libraries through the collaborator.
pub struct DependencyExtractionNode {
    agent: DependencyExtractionAgent,
    policy: FailurePolicy,
}

impl DependencyExtractionNode {
    pub const NAME: &'static str = "dependency_extraction";
    pub const PHASE: &'static str = "dependencies_extracted";

    pub fn new(agent: DependencyExtractionAgent, policy: FailurePolicy) -> Self {
        Self { agent, policy }
    }
}

#[async_trait]
impl PhaseNode for DependencyExtractionNode {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn phase(&self) -> &str {
        Self::PHASE
    }

    async fn execute(&self, mut state: GraphState) -> Result<GraphState, NodeError> {
        let source = state
            .session
            .original_source()
            .cloned()
            .ok_or_else(|| NodeError::MissingInput("original_source".to_string()))?;

        match self.agent.extract(&source).await {
            Ok(dependencies) => {
                state.add_message(format!(
                    "Dependencies extracted: {} imports, {} external libraries",
                    dependencies.imports.len(),
                    dependencies.external_libraries.len()
                ));
                state.session = state.session.with_dependencies(dependencies);
            }
            Err(e) => handle_failure(self.policy, &mut state, "Dependency extraction", e)?,
        }

        state.advance(Self::PHASE);
        Ok(state)
    }
}
