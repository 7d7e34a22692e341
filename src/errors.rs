//! Typed error hierarchy for the conduit orchestrator.
//!
//! One enum per subsystem:
//! - `GraphError`: building and compiling phase graphs
//! - `NodeError`: raised by a node while executing its phase
//! - `RunError`: graph runner failures
//! - `CheckpointError`: checkpoint store failures
//! - `CollaboratorError`: failures talking to the text-generation service

use std::time::Duration;

use conduit_common::ModelError;
use thiserror::Error;

use crate::checkpoint::CheckpointKey;

/// Reasons a graph fails `compile()`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationReason {
    #[error("graph has no nodes")]
    Empty,

    #[error("no edge leaves the start marker")]
    MissingEntry,

    #[error("cycle detected between nodes {0:?}")]
    Cycle(Vec<String>),

    #[error("node '{0}' is not reachable from the start marker")]
    Unreachable(String),

    #[error("node '{0}' has no path to the end marker")]
    DeadEnd(String),

    #[error("'{node}' has {count} outgoing edges; strict graphs must form a single chain")]
    Branching { node: String, count: usize },

    #[error("edge {from} -> {to} is not allowed")]
    MarkerMisuse { from: String, to: String },

    #[error("edge {from} -> {to} is registered twice")]
    DuplicateEdge { from: String, to: String },

    #[error("nodes '{first}' and '{second}' both declare output phase '{phase}'")]
    DuplicatePhase {
        phase: String,
        first: String,
        second: String,
    },

    #[error("node '{0}' declares the initial phase as its output")]
    InitialPhaseOutput(String),
}

/// Errors from building or compiling a phase graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("Node '{0}' is already registered")]
    DuplicateNode(String),

    #[error("Edge {from} -> {to} references unknown node '{missing}'")]
    UnknownNode {
        from: String,
        to: String,
        missing: String,
    },

    #[error("'{0}' is reserved for graph markers")]
    ReservedName(String),

    #[error("Graph '{graph}' failed validation: {reason}")]
    Validation {
        graph: String,
        reason: ValidationReason,
    },
}

/// Errors a node reports from `execute`.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("Missing input: {0}")]
    MissingInput(String),

    #[error("Collaborator call failed: {0}")]
    Collaborator(#[from] CollaboratorError),

    #[error("Invalid model value: {0}")]
    Model(#[from] ModelError),

    #[error("{0}")]
    Failed(String),
}

/// Errors from the graph runner.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("Phase '{phase}' does not belong to any node of graph '{graph}'")]
    UnknownPhase { graph: String, phase: String },

    #[error("Node '{node}' failed: {source}")]
    NodeFailed {
        node: String,
        last_checkpoint: Option<CheckpointKey>,
        #[source]
        source: NodeError,
    },

    #[error("Node '{node}' left the session in phase '{actual}' instead of '{expected}'")]
    PhaseContractViolation {
        node: String,
        expected: String,
        actual: String,
        last_checkpoint: Option<CheckpointKey>,
    },

    #[error("Node '{node}' replaced session '{expected}' with '{actual}'")]
    SessionMismatch {
        node: String,
        expected: String,
        actual: String,
        last_checkpoint: Option<CheckpointKey>,
    },

    #[error("Node '{node}' timed out after {timeout:?}")]
    Timeout {
        node: String,
        timeout: Duration,
        last_checkpoint: Option<CheckpointKey>,
    },

    #[error("Run cancelled before node '{node}'")]
    Cancelled {
        node: String,
        last_checkpoint: Option<CheckpointKey>,
    },

    #[error("No checkpoint found for thread '{thread_id}'")]
    CheckpointNotFound { thread_id: String },

    #[error("Checkpoint for thread '{thread_id}' does not match graph '{graph}': {message}")]
    GraphMismatch {
        thread_id: String,
        graph: String,
        message: String,
    },

    #[error(
        "Thread '{thread_id}' already holds a checkpoint of session '{existing_session}'; reset it or pick another thread for session '{session}'"
    )]
    ThreadInUse {
        thread_id: String,
        existing_session: String,
        session: String,
    },

    #[error("Checkpoint store failed for thread '{thread_id}': {source}")]
    Store {
        thread_id: String,
        #[source]
        source: CheckpointError,
    },

    #[error("Failed to checkpoint after node '{node}': {source}")]
    Checkpoint {
        node: String,
        last_checkpoint: Option<CheckpointKey>,
        #[source]
        source: CheckpointError,
    },
}

impl RunError {
    /// Node the error occurred in, when the failure happened inside a run.
    pub fn node(&self) -> Option<&str> {
        match self {
            RunError::NodeFailed { node, .. }
            | RunError::PhaseContractViolation { node, .. }
            | RunError::SessionMismatch { node, .. }
            | RunError::Timeout { node, .. }
            | RunError::Cancelled { node, .. }
            | RunError::Checkpoint { node, .. } => Some(node),
            RunError::UnknownPhase { .. }
            | RunError::CheckpointNotFound { .. }
            | RunError::GraphMismatch { .. }
            | RunError::ThreadInUse { .. }
            | RunError::Store { .. } => None,
        }
    }

    /// Key of the last checkpoint that was committed before the failure.
    pub fn last_checkpoint(&self) -> Option<&CheckpointKey> {
        match self {
            RunError::NodeFailed {
                last_checkpoint, ..
            }
            | RunError::PhaseContractViolation {
                last_checkpoint, ..
            }
            | RunError::SessionMismatch {
                last_checkpoint, ..
            }
            | RunError::Timeout {
                last_checkpoint, ..
            }
            | RunError::Cancelled {
                last_checkpoint, ..
            }
            | RunError::Checkpoint {
                last_checkpoint, ..
            } => last_checkpoint.as_ref(),
            RunError::UnknownPhase { .. }
            | RunError::CheckpointNotFound { .. }
            | RunError::GraphMismatch { .. }
            | RunError::ThreadInUse { .. }
            | RunError::Store { .. } => None,
        }
    }
}

/// Errors from checkpoint stores.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("Checkpoint I/O failed at {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize checkpoint for thread '{thread_id}': {source}")]
    Serialization {
        thread_id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Checkpoint for thread '{thread_id}' is corrupt: {message}")]
    Corrupt { thread_id: String, message: String },

    #[error("Thread id must not be empty")]
    EmptyThreadId,
}

/// Errors from the external text-generation collaborator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CollaboratorError {
    #[error("Request failed: {0}")]
    Transport(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Request timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Response does not match the {schema} schema: {message}")]
    SchemaMismatch { schema: String, message: String },

    #[error("Configuration error: {0}")]
    Configuration(String),
}
