//! Durable snapshots of a run.
//!
//! The runner writes a [`Checkpoint`] after every node. Stores keep only the
//! latest checkpoint per thread id; a new `put` replaces the previous one.
//!
//! - [`MemoryCheckpointer`] - process-local, for tests and one-shot runs
//! - [`FileCheckpointer`] - one JSON file per thread under a directory

mod file;
mod memory;

pub use file::FileCheckpointer;
pub use memory::MemoryCheckpointer;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use conduit_common::SessionState;
use serde::{Deserialize, Serialize};

use crate::audit::ExecutionLog;
use crate::errors::CheckpointError;
use crate::graph::GraphState;

/// Identifies the checkpoint of one session on one thread.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CheckpointKey {
    pub session_id: String,
    pub thread_id: String,
}

impl std::fmt::Display for CheckpointKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.thread_id, self.session_id)
    }
}

/// Snapshot of a session after a completed node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub key: CheckpointKey,
    /// Number of nodes completed on this thread, starting at 1.
    pub step: u64,
    /// Name of the compiled graph that wrote this checkpoint.
    pub graph: String,
    /// Last node that completed.
    pub node: String,
    pub session: SessionState,
    pub log: ExecutionLog,
    pub created_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(thread_id: &str, step: u64, graph: &str, node: &str, state: &GraphState) -> Self {
        Self {
            key: CheckpointKey {
                session_id: state.session.session_id().to_string(),
                thread_id: thread_id.to_string(),
            },
            step,
            graph: graph.to_string(),
            node: node.to_string(),
            session: state.session.clone(),
            log: state.log.clone(),
            created_at: Utc::now(),
        }
    }

    pub fn thread_id(&self) -> &str {
        &self.key.thread_id
    }

    /// Rebuild the graph state this checkpoint captured.
    pub fn to_state(&self) -> GraphState {
        GraphState::with_log(self.session.clone(), self.log.clone())
    }

    pub(crate) fn to_json(&self) -> Result<Vec<u8>, CheckpointError> {
        serde_json::to_vec_pretty(self).map_err(|source| CheckpointError::Serialization {
            thread_id: self.key.thread_id.clone(),
            source,
        })
    }

    /// Decode a stored snapshot. A payload that fails to parse, belongs to a
    /// different thread, or carries an invalid session is reported as corrupt.
    pub(crate) fn from_json(thread_id: &str, bytes: &[u8]) -> Result<Self, CheckpointError> {
        let checkpoint: Checkpoint =
            serde_json::from_slice(bytes).map_err(|e| CheckpointError::Corrupt {
                thread_id: thread_id.to_string(),
                message: e.to_string(),
            })?;
        if checkpoint.key.thread_id != thread_id {
            return Err(CheckpointError::Corrupt {
                thread_id: thread_id.to_string(),
                message: format!("stored under thread '{}'", checkpoint.key.thread_id),
            });
        }
        checkpoint
            .session
            .validate()
            .map_err(|e| CheckpointError::Corrupt {
                thread_id: thread_id.to_string(),
                message: e.to_string(),
            })?;
        Ok(checkpoint)
    }
}

/// Storage backend for checkpoints, addressed by thread id.
///
/// Operations on the same thread id are serialized by the implementation;
/// different thread ids never block each other.
#[async_trait]
pub trait Checkpointer: Send + Sync {
    /// Store `checkpoint`, replacing any previous one for its thread.
    async fn put(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError>;

    /// Latest checkpoint for `thread_id`, or `None` if there is none.
    async fn get(&self, thread_id: &str) -> Result<Option<Checkpoint>, CheckpointError>;

    /// Remove the checkpoint for `thread_id`. Returns whether one existed.
    async fn delete(&self, thread_id: &str) -> Result<bool, CheckpointError>;

    /// Thread ids with a stored checkpoint, sorted.
    async fn list(&self) -> Result<Vec<String>, CheckpointError>;
}

pub(crate) fn check_thread_id(thread_id: &str) -> Result<(), CheckpointError> {
    if thread_id.is_empty() {
        return Err(CheckpointError::EmptyThreadId);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn sample(thread_id: &str, step: u64) -> Checkpoint {
        let mut state = GraphState::new(SessionState::create("abc").unwrap());
        state.add_message("Initial state created");
        state.advance("initialized");
        Checkpoint::new(thread_id, step, "base", "initialization", &state)
    }

    #[test]
    fn test_checkpoint_json_roundtrip() {
        let checkpoint = sample("t-1", 1);
        let bytes = checkpoint.to_json().unwrap();
        let back = Checkpoint::from_json("t-1", &bytes).unwrap();
        assert_eq!(back, checkpoint);
        assert_eq!(back.to_state().session.current_phase(), "initialized");
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        let err = Checkpoint::from_json("t-1", b"{not json").unwrap_err();
        assert!(matches!(err, CheckpointError::Corrupt { .. }));
    }

    #[test]
    fn test_from_json_rejects_foreign_thread() {
        let bytes = sample("t-1", 1).to_json().unwrap();
        let err = Checkpoint::from_json("t-2", &bytes).unwrap_err();
        assert!(err.to_string().contains("t-2"));
    }

    #[test]
    fn test_key_display() {
        let checkpoint = sample("t-1", 1);
        assert_eq!(checkpoint.key.to_string(), "t-1/abc");
    }
}
