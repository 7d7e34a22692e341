//! Shared domain types for the conduit pipeline.
//!
//! This crate holds the data that flows through a conversion session:
//! - [`SessionState`], the versioned record of one job's progress
//! - the payloads that phases attach to it (source, analysis, generated code, audit)
//! - [`ModelError`] for construction and range-check failures
//!
//! Nothing here performs I/O; the orchestrator crate owns execution and persistence.

mod error;
mod models;
mod session;

pub use error::ModelError;
pub use models::{
    AuditFinding, AuditSeverity, AuditState, CodeAnalysisResult, CppCodeFiles, Dependencies,
    EnrichedAst, LanguageDetection, LanguageType, SourceCode,
};
pub use session::{INITIAL_PHASE, SessionState};
