//! Executable units of a phase graph.

use async_trait::async_trait;
use conduit_common::SessionState;
use serde::{Deserialize, Serialize};

use crate::audit::ExecutionLog;
use crate::errors::NodeError;

/// What flows between nodes: the session plus its execution log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphState {
    pub session: SessionState,
    pub log: ExecutionLog,
}

impl GraphState {
    pub fn new(session: SessionState) -> Self {
        Self {
            session,
            log: ExecutionLog::new(),
        }
    }

    pub fn with_log(session: SessionState, log: ExecutionLog) -> Self {
        Self { session, log }
    }

    pub fn add_message(&mut self, message: impl Into<String>) {
        self.log.append(message);
    }

    /// Move the session to `phase`.
    pub fn advance(&mut self, phase: &str) {
        self.session = self.session.with_phase(phase);
    }

    /// Append `message` to the session's error list and mirror it in the log.
    pub fn record_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        self.log.append(format!("Error: {message}"));
        self.session = self.session.append_error(message);
    }
}

/// One phase transition.
///
/// A node receives an owned copy of the state and must return a state whose
/// `current_phase` equals [`PhaseNode::phase`]. The runner rejects anything
/// else, so a node that fails halfway leaves no trace in the committed state.
#[async_trait]
pub trait PhaseNode: Send + Sync {
    /// Unique name within a graph.
    fn name(&self) -> &str;

    /// Phase this node leaves the session in.
    fn phase(&self) -> &str {
        self.name()
    }

    async fn execute(&self, state: GraphState) -> Result<GraphState, NodeError>;
}

type NodeFn = dyn Fn(GraphState) -> Result<GraphState, NodeError> + Send + Sync;

/// A node backed by a synchronous closure.
pub struct FnNode {
    name: String,
    phase: String,
    func: Box<NodeFn>,
}

impl FnNode {
    pub fn new<F>(name: impl Into<String>, phase: impl Into<String>, func: F) -> Self
    where
        F: Fn(GraphState) -> Result<GraphState, NodeError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            phase: phase.into(),
            func: Box::new(func),
        }
    }

    /// A node that logs `message` and advances to `phase`.
    pub fn transition(
        name: impl Into<String>,
        phase: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let phase = phase.into();
        let message = message.into();
        let target = phase.clone();
        Self::new(name, phase, move |mut state| {
            state.add_message(message.clone());
            state.advance(&target);
            Ok(state)
        })
    }
}

impl std::fmt::Debug for FnNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnNode")
            .field("name", &self.name)
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl PhaseNode for FnNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn phase(&self) -> &str {
        &self.phase
    }

    async fn execute(&self, state: GraphState) -> Result<GraphState, NodeError> {
        (self.func)(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> GraphState {
        GraphState::new(SessionState::create("abc").unwrap())
    }

    #[tokio::test]
    async fn test_transition_node_advances_and_logs() {
        let node = FnNode::transition("validation", "validated", "Basic validation executed");
        assert_eq!(node.name(), "validation");
        assert_eq!(node.phase(), "validated");

        let out = node.execute(state()).await.unwrap();
        assert_eq!(out.session.current_phase(), "validated");
        assert_eq!(
            out.log.last().map(|e| e.message.as_str()),
            Some("Basic validation executed")
        );
    }

    #[tokio::test]
    async fn test_fn_node_propagates_error() {
        let node = FnNode::new("broken", "broken", |_| {
            Err(NodeError::Failed("nope".to_string()))
        });
        let err = node.execute(state()).await.unwrap_err();
        assert!(matches!(err, NodeError::Failed(_)));
    }

    #[test]
    fn test_record_error_updates_session_and_log() {
        let mut state = state();
        state.record_error("source is empty");
        assert_eq!(state.session.error_messages(), ["source is empty"]);
        assert_eq!(
            state.log.last().map(|e| e.message.as_str()),
            Some("Error: source is empty")
        );
    }

    #[test]
    fn test_default_phase_is_name() {
        struct Named;

        #[async_trait]
        impl PhaseNode for Named {
            fn name(&self) -> &str {
                "named"
            }

            async fn execute(&self, state: GraphState) -> Result<GraphState, NodeError> {
                Ok(state)
            }
        }

        assert_eq!(Named.phase(), "named");
    }
}
