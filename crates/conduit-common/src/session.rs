//! Versioned record of one conversion job.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::models::{
    AuditState, CodeAnalysisResult, CppCodeFiles, Dependencies, LanguageDetection, SourceCode,
};

/// Phase every new session starts in.
pub const INITIAL_PHASE: &str = "initialization";

/// Progress of a single session.
///
/// Transitions never mutate the receiver: [`SessionState::with_phase`] and
/// [`SessionState::append_error`] return a new value, so a runner can keep the
/// last committed state around while a node works on a copy. The session id
/// has no setter and is fixed at creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    session_id: String,
    current_phase: String,
    #[serde(default)]
    error_messages: Vec<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    original_source: Option<SourceCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    language_detection: Option<LanguageDetection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    dependencies: Option<Dependencies>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    analysis_result: Option<CodeAnalysisResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cpp_code: Option<CppCodeFiles>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    audit_state: Option<AuditState>,
}

impl SessionState {
    /// Create a fresh session in the [`INITIAL_PHASE`].
    pub fn create(session_id: impl Into<String>) -> Result<Self, ModelError> {
        let session_id = session_id.into();
        if session_id.trim().is_empty() {
            return Err(ModelError::invalid_argument(
                "session_id",
                "session id must not be empty",
            ));
        }

        let now = Utc::now();
        Ok(Self {
            session_id,
            current_phase: INITIAL_PHASE.to_string(),
            error_messages: Vec::new(),
            created_at: now,
            updated_at: now,
            original_source: None,
            language_detection: None,
            dependencies: None,
            analysis_result: None,
            cpp_code: None,
            audit_state: None,
        })
    }

    /// Create a session with a random UUID v4 id.
    pub fn generate() -> Self {
        let now = Utc::now();
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            current_phase: INITIAL_PHASE.to_string(),
            error_messages: Vec::new(),
            created_at: now,
            updated_at: now,
            original_source: None,
            language_detection: None,
            dependencies: None,
            analysis_result: None,
            cpp_code: None,
            audit_state: None,
        }
    }

    /// Check invariants that deserialization cannot enforce on its own.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.session_id.trim().is_empty() {
            return Err(ModelError::invalid_argument(
                "session_id",
                "session id must not be empty",
            ));
        }
        if self.updated_at < self.created_at {
            return Err(ModelError::invalid_argument(
                "updated_at",
                "updated_at precedes created_at",
            ));
        }
        if let Some(detection) = &self.language_detection {
            detection.validate()?;
        }
        if let Some(audit) = &self.audit_state {
            audit.validate()?;
        }
        Ok(())
    }

    /// Return a copy advanced to `phase`, with `updated_at` refreshed.
    ///
    /// `updated_at` never moves backwards even if the wall clock does.
    pub fn with_phase(&self, phase: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.current_phase = phase.into();
        next.updated_at = Utc::now().max(self.updated_at);
        next
    }

    /// Return a copy with `message` appended to the error list.
    pub fn append_error(&self, message: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.error_messages.push(message.into());
        next
    }

    pub fn with_original_source(mut self, source: SourceCode) -> Self {
        self.original_source = Some(source);
        self
    }

    pub fn with_language_detection(mut self, detection: LanguageDetection) -> Self {
        self.language_detection = Some(detection);
        self
    }

    pub fn with_dependencies(mut self, dependencies: Dependencies) -> Self {
        self.dependencies = Some(dependencies);
        self
    }

    pub fn with_analysis_result(mut self, result: CodeAnalysisResult) -> Self {
        self.analysis_result = Some(result);
        self
    }

    pub fn with_cpp_code(mut self, code: CppCodeFiles) -> Self {
        self.cpp_code = Some(code);
        self
    }

    pub fn with_audit_state(mut self, audit: AuditState) -> Self {
        self.audit_state = Some(audit);
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn current_phase(&self) -> &str {
        &self.current_phase
    }

    /// True while no phase has completed yet.
    pub fn is_initial(&self) -> bool {
        self.current_phase == INITIAL_PHASE
    }

    pub fn error_messages(&self) -> &[String] {
        &self.error_messages
    }

    pub fn has_errors(&self) -> bool {
        !self.error_messages.is_empty()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn original_source(&self) -> Option<&SourceCode> {
        self.original_source.as_ref()
    }

    pub fn language_detection(&self) -> Option<&LanguageDetection> {
        self.language_detection.as_ref()
    }

    pub fn dependencies(&self) -> Option<&Dependencies> {
        self.dependencies.as_ref()
    }

    pub fn analysis_result(&self) -> Option<&CodeAnalysisResult> {
        self.analysis_result.as_ref()
    }

    pub fn cpp_code(&self) -> Option<&CppCodeFiles> {
        self.cpp_code.as_ref()
    }

    pub fn audit_state(&self) -> Option<&AuditState> {
        self.audit_state.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LanguageType;

    #[test]
    fn test_create_sets_initial_phase() {
        let state = SessionState::create("abc").unwrap();
        assert_eq!(state.session_id(), "abc");
        assert_eq!(state.current_phase(), INITIAL_PHASE);
        assert!(state.is_initial());
        assert!(state.error_messages().is_empty());
        assert_eq!(state.created_at(), state.updated_at());
    }

    #[test]
    fn test_create_rejects_empty_id() {
        assert!(matches!(
            SessionState::create(""),
            Err(ModelError::InvalidArgument { .. })
        ));
        assert!(SessionState::create("   ").is_err());
    }

    #[test]
    fn test_generate_uses_uuid() {
        let a = SessionState::generate();
        let b = SessionState::generate();
        assert_ne!(a.session_id(), b.session_id());
        assert!(uuid::Uuid::parse_str(a.session_id()).is_ok());
    }

    #[test]
    fn test_with_phase_leaves_receiver_untouched() {
        let state = SessionState::create("abc").unwrap();
        let snapshot = state.clone();

        let next = state.with_phase("initialized");

        assert_eq!(state, snapshot);
        assert_eq!(next.current_phase(), "initialized");
        assert!(next.updated_at() >= state.updated_at());
        assert_eq!(next.session_id(), state.session_id());
        assert_eq!(next.created_at(), state.created_at());
    }

    #[test]
    fn test_append_error_is_ordered_and_pure() {
        let state = SessionState::create("abc").unwrap();
        let next = state.append_error("first").append_error("second");
        assert!(state.error_messages().is_empty());
        assert_eq!(next.error_messages(), ["first", "second"]);
        assert!(next.has_errors());
    }

    #[test]
    fn test_with_original_source() {
        let source = SourceCode::new("console.log('hello');", LanguageType::Javascript);
        let state = SessionState::create("abc")
            .unwrap()
            .with_original_source(source);
        assert_eq!(
            state.original_source().map(|s| s.language),
            Some(LanguageType::Javascript)
        );
    }

    #[test]
    fn test_serde_roundtrip_preserves_everything() {
        let state = SessionState::create("abc")
            .unwrap()
            .with_original_source(SourceCode::new("x = 1", LanguageType::Python))
            .with_phase("initialized")
            .append_error("warn");
        let json = serde_json::to_string(&state).unwrap();
        let back: SessionState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
        assert!(back.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_blank_id_from_json() {
        let json = r#"{
            "session_id": "",
            "current_phase": "initialization",
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        }"#;
        let state: SessionState = serde_json::from_str(json).unwrap();
        assert!(state.validate().is_err());
    }
}
