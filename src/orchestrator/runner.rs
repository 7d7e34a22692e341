//! Sequential execution of a compiled phase graph.

use std::sync::Arc;
use std::time::Duration;

use conduit_common::SessionState;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, info_span, instrument, warn};

use crate::checkpoint::{Checkpoint, CheckpointKey, Checkpointer};
use crate::errors::RunError;
use crate::graph::{CompiledGraph, END, GraphState, PhaseNode, START};

/// Default wall-clock budget for one node invocation.
pub const DEFAULT_NODE_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// `None` disables the timeout.
    pub node_timeout: Option<Duration>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            node_timeout: Some(DEFAULT_NODE_TIMEOUT),
        }
    }
}

/// Result of a successful `run` or `resume`.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub thread_id: String,
    pub state: GraphState,
    /// Last node that completed on this thread, across resumes.
    pub last_node: Option<String>,
    /// Nodes executed by this call only.
    pub steps_executed: usize,
}

/// Drives sessions through a [`CompiledGraph`], checkpointing after each node.
///
/// One runner can serve many threads at once; each call to `run` or `resume`
/// executes its own session strictly in order.
pub struct GraphRunner {
    graph: Arc<CompiledGraph>,
    checkpointer: Arc<dyn Checkpointer>,
    config: RunnerConfig,
    cancel: CancellationToken,
}

/// Where a run picks up and what it has already committed.
struct Position {
    after: String,
    step: u64,
    last_checkpoint: Option<CheckpointKey>,
}

impl GraphRunner {
    pub fn new(graph: Arc<CompiledGraph>, checkpointer: Arc<dyn Checkpointer>) -> Self {
        Self {
            graph,
            checkpointer,
            config: RunnerConfig::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn graph(&self) -> &CompiledGraph {
        &self.graph
    }

    /// Token that stops every run on this runner before its next node.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run `initial` to completion on `thread_id`.
    ///
    /// A session still in the initial phase starts at the first node; any
    /// other session continues after the node that produced its phase.
    ///
    /// A thread holds one session. An existing checkpoint of the same session
    /// is replaced by this run and named as the last good checkpoint until the
    /// first node commits; a checkpoint of another session is
    /// [`RunError::ThreadInUse`].
    #[instrument(
        name = "graph_run",
        skip(self, initial),
        fields(
            graph = %self.graph.name(),
            session_id = %initial.session.session_id(),
        )
    )]
    pub async fn run(&self, initial: GraphState, thread_id: &str) -> Result<RunOutput, RunError> {
        let after = self.position_for(&initial.session)?;

        let last_checkpoint = match self.checkpointer.get(thread_id).await {
            Ok(Some(existing)) => {
                if existing.key.session_id != initial.session.session_id() {
                    return Err(RunError::ThreadInUse {
                        thread_id: thread_id.to_string(),
                        existing_session: existing.key.session_id,
                        session: initial.session.session_id().to_string(),
                    });
                }
                warn!(
                    previous_node = %existing.node,
                    previous_step = existing.step,
                    "Thread already has a checkpoint of this session; it will be replaced"
                );
                Some(existing.key)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "Existing checkpoint is unreadable; it will be replaced");
                None
            }
        };

        info!(start_after = %after, "Run started");
        self.drive(
            thread_id,
            initial,
            Position {
                after,
                step: 0,
                last_checkpoint,
            },
        )
        .await
    }

    /// Continue the run stored under `thread_id` from its latest checkpoint.
    ///
    /// Resuming a finished run executes nothing and returns the stored state.
    #[instrument(name = "graph_resume", skip(self), fields(graph = %self.graph.name()))]
    pub async fn resume(&self, thread_id: &str) -> Result<RunOutput, RunError> {
        let checkpoint =
            self.checkpoint(thread_id)
                .await?
                .ok_or_else(|| RunError::CheckpointNotFound {
                    thread_id: thread_id.to_string(),
                })?;

        self.check_compatible(&checkpoint)?;

        info!(
            session_id = %checkpoint.key.session_id,
            node = %checkpoint.node,
            step = checkpoint.step,
            "Resuming from checkpoint"
        );
        let state = checkpoint.to_state();
        self.drive(
            thread_id,
            state,
            Position {
                after: checkpoint.node,
                step: checkpoint.step,
                last_checkpoint: Some(checkpoint.key),
            },
        )
        .await
    }

    /// Latest checkpoint stored for `thread_id`.
    pub async fn checkpoint(&self, thread_id: &str) -> Result<Option<Checkpoint>, RunError> {
        self.checkpointer
            .get(thread_id)
            .await
            .map_err(|source| RunError::Store {
                thread_id: thread_id.to_string(),
                source,
            })
    }

    fn position_for(&self, session: &SessionState) -> Result<String, RunError> {
        if session.is_initial() {
            return Ok(START.to_string());
        }
        self.graph
            .node_for_phase(session.current_phase())
            .map(str::to_string)
            .ok_or_else(|| RunError::UnknownPhase {
                graph: self.graph.name().to_string(),
                phase: session.current_phase().to_string(),
            })
    }

    fn check_compatible(&self, checkpoint: &Checkpoint) -> Result<(), RunError> {
        let mismatch = |message: String| RunError::GraphMismatch {
            thread_id: checkpoint.key.thread_id.clone(),
            graph: self.graph.name().to_string(),
            message,
        };

        if checkpoint.graph != self.graph.name() {
            return Err(mismatch(format!(
                "written by graph '{}'",
                checkpoint.graph
            )));
        }
        let node = self
            .graph
            .get(&checkpoint.node)
            .ok_or_else(|| mismatch(format!("unknown node '{}'", checkpoint.node)))?;
        if node.phase() != checkpoint.session.current_phase() {
            return Err(mismatch(format!(
                "node '{}' produces phase '{}' but the session is in '{}'",
                checkpoint.node,
                node.phase(),
                checkpoint.session.current_phase()
            )));
        }
        Ok(())
    }

    async fn drive(
        &self,
        thread_id: &str,
        mut state: GraphState,
        position: Position,
    ) -> Result<RunOutput, RunError> {
        let Position {
            after,
            mut step,
            mut last_checkpoint,
        } = position;
        let session_id = state.session.session_id().to_string();
        let mut last_node = (after != START).then(|| after.clone());
        let mut current = after;
        let mut executed = 0;

        loop {
            let next = self
                .graph
                .successor(&current)
                .ok_or_else(|| RunError::GraphMismatch {
                    thread_id: thread_id.to_string(),
                    graph: self.graph.name().to_string(),
                    message: format!("unknown node '{current}'"),
                })?;

            if next == END {
                info!(
                    thread_id,
                    session_id = %session_id,
                    steps = executed,
                    phase = %state.session.current_phase(),
                    "Run complete"
                );
                return Ok(RunOutput {
                    thread_id: thread_id.to_string(),
                    state,
                    last_node,
                    steps_executed: executed,
                });
            }

            let node = self
                .graph
                .get(next)
                .ok_or_else(|| RunError::GraphMismatch {
                    thread_id: thread_id.to_string(),
                    graph: self.graph.name().to_string(),
                    message: format!("unknown node '{next}'"),
                })?;

            if self.cancel.is_cancelled() {
                warn!(thread_id, session_id = %session_id, node = next, "Run cancelled");
                return Err(RunError::Cancelled {
                    node: next.to_string(),
                    last_checkpoint,
                });
            }

            let span = info_span!("node", thread_id, session_id = %session_id, node = next);
            let output = self
                .execute_node(node.as_ref(), state.clone(), &last_checkpoint)
                .instrument(span.clone())
                .await;
            let mut output = match output {
                Ok(output) => output,
                Err(e) => {
                    span.in_scope(|| error!(error = %e, "Node failed"));
                    return Err(e);
                }
            };

            let phase = node.phase().to_string();
            output.add_message(format!("Phase updated to: {phase}"));

            step += 1;
            let checkpoint = Checkpoint::new(thread_id, step, self.graph.name(), next, &output);
            if let Err(source) = self.checkpointer.put(&checkpoint).await {
                span.in_scope(|| error!(error = %source, "Checkpoint write failed"));
                return Err(RunError::Checkpoint {
                    node: next.to_string(),
                    last_checkpoint,
                    source,
                });
            }
            span.in_scope(|| info!(phase = %phase, step, "Phase updated"));

            last_checkpoint = Some(checkpoint.key);
            last_node = Some(next.to_string());
            current = next.to_string();
            state = output;
            executed += 1;
        }
    }

    /// Invoke one node on a copy of the state and enforce its contract.
    async fn execute_node(
        &self,
        node: &dyn PhaseNode,
        input: GraphState,
        last_checkpoint: &Option<CheckpointKey>,
    ) -> Result<GraphState, RunError> {
        let name = node.name().to_string();
        let session_id = input.session.session_id().to_string();

        let result = match self.config.node_timeout {
            Some(timeout) => tokio::time::timeout(timeout, node.execute(input))
                .await
                .map_err(|_| RunError::Timeout {
                    node: name.clone(),
                    timeout,
                    last_checkpoint: last_checkpoint.clone(),
                })?,
            None => node.execute(input).await,
        };

        let output = result.map_err(|source| RunError::NodeFailed {
            node: name.clone(),
            last_checkpoint: last_checkpoint.clone(),
            source,
        })?;

        if output.session.session_id() != session_id {
            return Err(RunError::SessionMismatch {
                node: name,
                expected: session_id,
                actual: output.session.session_id().to_string(),
                last_checkpoint: last_checkpoint.clone(),
            });
        }
        if output.session.current_phase() != node.phase() {
            return Err(RunError::PhaseContractViolation {
                node: name,
                expected: node.phase().to_string(),
                actual: output.session.current_phase().to_string(),
                last_checkpoint: last_checkpoint.clone(),
            });
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::MemoryCheckpointer;
    use crate::errors::NodeError;
    use crate::graph::{FnNode, GraphBuilder};

    fn graph_of(nodes: Vec<FnNode>) -> Arc<CompiledGraph> {
        let mut builder = GraphBuilder::new("test");
        let names: Vec<String> = nodes.iter().map(|n| n.name().to_string()).collect();
        for node in nodes {
            builder.add_node(node).unwrap();
        }
        let mut prev = START.to_string();
        for name in &names {
            builder.add_edge(&prev, name).unwrap();
            prev = name.clone();
        }
        builder.add_edge(&prev, END).unwrap();
        Arc::new(builder.compile().unwrap())
    }

    fn initial() -> GraphState {
        GraphState::new(SessionState::create("abc").unwrap())
    }

    #[tokio::test]
    async fn test_run_executes_nodes_in_order() {
        let graph = graph_of(vec![
            FnNode::transition("first", "one", "first ran"),
            FnNode::transition("second", "two", "second ran"),
        ]);
        let store = Arc::new(MemoryCheckpointer::new());
        let runner = GraphRunner::new(graph, store.clone());

        let out = runner.run(initial(), "t-1").await.unwrap();

        assert_eq!(out.steps_executed, 2);
        assert_eq!(out.last_node.as_deref(), Some("second"));
        assert_eq!(out.state.session.current_phase(), "two");
        let messages: Vec<&str> = out.state.log.messages().collect();
        assert_eq!(
            messages,
            [
                "first ran",
                "Phase updated to: one",
                "second ran",
                "Phase updated to: two"
            ]
        );

        let stored = store.get("t-1").await.unwrap().unwrap();
        assert_eq!(stored.step, 2);
        assert_eq!(stored.node, "second");
    }

    #[tokio::test]
    async fn test_run_continues_from_session_phase() {
        let graph = graph_of(vec![
            FnNode::transition("first", "one", "first ran"),
            FnNode::transition("second", "two", "second ran"),
        ]);
        let runner = GraphRunner::new(graph, Arc::new(MemoryCheckpointer::new()));
        let mut state = initial();
        state.advance("one");

        let out = runner.run(state, "t-1").await.unwrap();
        assert_eq!(out.steps_executed, 1);
        assert_eq!(out.state.session.current_phase(), "two");
    }

    #[tokio::test]
    async fn test_unknown_phase_rejected_before_execution() {
        let graph = graph_of(vec![FnNode::transition("first", "one", "first ran")]);
        let store = Arc::new(MemoryCheckpointer::new());
        let runner = GraphRunner::new(graph, store.clone());
        let mut state = initial();
        state.advance("nowhere");

        let err = runner.run(state, "t-1").await.unwrap_err();
        assert!(matches!(err, RunError::UnknownPhase { .. }));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_node_error_keeps_previous_checkpoint() {
        let graph = graph_of(vec![
            FnNode::transition("first", "one", "first ran"),
            FnNode::new("broken", "two", |_| Err(NodeError::Failed("boom".into()))),
        ]);
        let store = Arc::new(MemoryCheckpointer::new());
        let runner = GraphRunner::new(graph, store.clone());

        let err = runner.run(initial(), "t-1").await.unwrap_err();
        assert_eq!(err.node(), Some("broken"));
        assert_eq!(
            err.last_checkpoint().map(|k| k.thread_id.as_str()),
            Some("t-1")
        );

        let stored = store.get("t-1").await.unwrap().unwrap();
        assert_eq!(stored.node, "first");
        assert_eq!(stored.session.current_phase(), "one");
    }

    #[tokio::test]
    async fn test_session_swap_rejected() {
        let graph = graph_of(vec![FnNode::new("swap", "swapped", |_| {
            let mut other = GraphState::new(SessionState::create("other").unwrap());
            other.advance("swapped");
            Ok(other)
        })]);
        let runner = GraphRunner::new(graph, Arc::new(MemoryCheckpointer::new()));

        let err = runner.run(initial(), "t-1").await.unwrap_err();
        assert!(matches!(err, RunError::SessionMismatch { .. }));
    }

    #[tokio::test]
    async fn test_resume_of_finished_run_is_idempotent() {
        let graph = graph_of(vec![FnNode::transition("only", "done", "ran")]);
        let runner = GraphRunner::new(graph, Arc::new(MemoryCheckpointer::new()));
        let first = runner.run(initial(), "t-1").await.unwrap();

        let again = runner.resume("t-1").await.unwrap();
        assert_eq!(again.steps_executed, 0);
        assert_eq!(again.state, first.state);
        assert_eq!(again.last_node.as_deref(), Some("only"));
    }

    #[tokio::test]
    async fn test_resume_rejects_other_graph() {
        let store: Arc<dyn Checkpointer> = Arc::new(MemoryCheckpointer::new());
        let graph = graph_of(vec![FnNode::transition("only", "done", "ran")]);
        GraphRunner::new(graph, store.clone())
            .run(initial(), "t-1")
            .await
            .unwrap();

        let mut builder = GraphBuilder::new("different");
        builder
            .add_node(FnNode::transition("only", "done", "ran"))
            .unwrap();
        builder.add_edge(START, "only").unwrap();
        builder.add_edge("only", END).unwrap();
        let other = GraphRunner::new(Arc::new(builder.compile().unwrap()), store);

        let err = other.resume("t-1").await.unwrap_err();
        assert!(matches!(err, RunError::GraphMismatch { .. }));
    }

    #[tokio::test]
    async fn test_cancelled_before_first_node() {
        let graph = graph_of(vec![FnNode::transition("only", "done", "ran")]);
        let store = Arc::new(MemoryCheckpointer::new());
        let runner = GraphRunner::new(graph, store.clone());
        runner.cancellation_token().cancel();

        let err = runner.run(initial(), "t-1").await.unwrap_err();
        assert!(matches!(err, RunError::Cancelled { ref node, .. } if node == "only"));
        assert!(store.is_empty());
    }
}
