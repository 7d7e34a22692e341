//! The conversion pipeline: concrete nodes and the graphs built from them.
//!
//! | Graph | Nodes |
//! |-------|-------|
//! | `base` | initialization → validation |
//! | `analysis` | initialization → validation → language_detection → dependency_extraction |

pub mod nodes;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use conduit_common::{ModelError, SessionState, SourceCode};
use serde::{Deserialize, Serialize};

use crate::collaborator::{DependencyExtractionAgent, LanguageDetectionAgent, TextGenerator};
use crate::errors::GraphError;
use crate::graph::{CompiledGraph, END, GraphBuilder, GraphState, START};

pub use nodes::{DependencyExtractionNode, InitializationNode, LanguageDetectionNode, ValidationNode};

/// What a collaborator-backed node does when the collaborator fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Fail the node; the run stops at the previous checkpoint.
    #[default]
    Abort,
    /// Record the error on the session and complete the phase without a result.
    Record,
}

/// Graphs shipped with conduit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum GraphKind {
    Base,
    #[default]
    Analysis,
}

impl GraphKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GraphKind::Base => "base",
            GraphKind::Analysis => "analysis",
        }
    }

    /// Whether the graph's nodes call the collaborator.
    pub fn needs_collaborator(&self) -> bool {
        matches!(self, GraphKind::Analysis)
    }
}

impl fmt::Display for GraphKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GraphKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "base" => Ok(GraphKind::Base),
            "analysis" => Ok(GraphKind::Analysis),
            other => Err(format!(
                "unknown graph '{other}'. Valid values: base, analysis"
            )),
        }
    }
}

/// Fresh graph state with a random session id and the creation log line.
pub fn create_initial_state(source: Option<SourceCode>) -> GraphState {
    initial_state_for(SessionState::generate(), source)
}

/// Like [`create_initial_state`] with a caller-chosen session id.
pub fn create_initial_state_with_id(
    session_id: &str,
    source: Option<SourceCode>,
) -> Result<GraphState, ModelError> {
    Ok(initial_state_for(SessionState::create(session_id)?, source))
}

fn initial_state_for(session: SessionState, source: Option<SourceCode>) -> GraphState {
    let session = match source {
        Some(source) => session.with_original_source(source),
        None => session,
    };
    let mut state = GraphState::new(session);
    state.add_message("Initial state created");
    state
}

/// `initialization → validation`.
pub fn base_graph() -> Result<CompiledGraph, GraphError> {
    let mut builder = GraphBuilder::new(GraphKind::Base.as_str());
    builder.add_node(InitializationNode)?;
    builder.add_node(ValidationNode)?;
    builder.add_edge(START, InitializationNode::NAME)?;
    builder.add_edge(InitializationNode::NAME, ValidationNode::NAME)?;
    builder.add_edge(ValidationNode::NAME, END)?;
    builder.compile()
}

/// The base graph followed by language detection and dependency extraction.
pub fn analysis_graph(
    generator: Arc<dyn TextGenerator>,
    policy: FailurePolicy,
) -> Result<CompiledGraph, GraphError> {
    let mut builder = GraphBuilder::new(GraphKind::Analysis.as_str());
    builder.add_node(InitializationNode)?;
    builder.add_node(ValidationNode)?;
    builder.add_node(LanguageDetectionNode::new(
        LanguageDetectionAgent::new(generator.clone()),
        policy,
    ))?;
    builder.add_node(DependencyExtractionNode::new(
        DependencyExtractionAgent::new(generator),
        policy,
    ))?;

    let chain = [
        START,
        InitializationNode::NAME,
        ValidationNode::NAME,
        LanguageDetectionNode::NAME,
        DependencyExtractionNode::NAME,
        END,
    ];
    for pair in chain.windows(2) {
        builder.add_edge(pair[0], pair[1])?;
    }
    builder.compile()
}
