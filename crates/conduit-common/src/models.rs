//! Payloads attached to a session as it moves through the pipeline.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Source languages the pipeline accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LanguageType {
    Python,
    Javascript,
    Typescript,
}

impl LanguageType {
    pub const ALL: [LanguageType; 3] = [Self::Python, Self::Javascript, Self::Typescript];

    pub fn as_str(&self) -> &'static str {
        match self {
            LanguageType::Python => "python",
            LanguageType::Javascript => "javascript",
            LanguageType::Typescript => "typescript",
        }
    }

    /// Guess the language from a file extension. Returns `None` for anything
    /// outside the supported set.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "py" | "pyw" => Some(LanguageType::Python),
            "js" | "mjs" | "cjs" | "jsx" => Some(LanguageType::Javascript),
            "ts" | "tsx" | "mts" | "cts" => Some(LanguageType::Typescript),
            _ => None,
        }
    }
}

impl fmt::Display for LanguageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LanguageType {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "python" | "py" => Ok(LanguageType::Python),
            "javascript" | "js" => Ok(LanguageType::Javascript),
            "typescript" | "ts" => Ok(LanguageType::Typescript),
            other => Err(ModelError::invalid_argument(
                "language",
                format!(
                    "unsupported language '{}'. Valid values: python, javascript, typescript",
                    other
                ),
            )),
        }
    }
}

/// Severity attached to an audit finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// Source code submitted for conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceCode {
    pub content: String,
    pub language: LanguageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl SourceCode {
    pub fn new(content: impl Into<String>, language: LanguageType) -> Self {
        Self {
            content: content.into(),
            language,
            filename: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// Filename for prompts and logs, `"unknown"` when absent.
    pub fn display_name(&self) -> &str {
        self.filename.as_deref().unwrap_or("unknown")
    }
}

/// Result of the language-detection collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageDetection {
    pub detected_language: LanguageType,
    /// Confidence in `[0.0, 1.0]`
    pub confidence: f64,
    #[serde(default)]
    pub features_detected: Vec<String>,
}

impl LanguageDetection {
    pub fn new(
        detected_language: LanguageType,
        confidence: f64,
        features_detected: Vec<String>,
    ) -> Result<Self, ModelError> {
        let detection = Self {
            detected_language,
            confidence,
            features_detected,
        };
        detection.validate()?;
        Ok(detection)
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        ModelError::check_range("confidence", self.confidence, 0.0, 1.0)
    }
}

/// Result of the dependency-extraction collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dependencies {
    #[serde(default)]
    pub imports: Vec<String>,
    #[serde(default)]
    pub external_libraries: Vec<String>,
    #[serde(default)]
    pub standard_libraries: Vec<String>,
    #[serde(default)]
    pub documentation_urls: BTreeMap<String, String>,
}

impl Dependencies {
    pub fn is_empty(&self) -> bool {
        self.imports.is_empty()
            && self.external_libraries.is_empty()
            && self.standard_libraries.is_empty()
    }
}

/// AST annotated with natural-language descriptions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnrichedAst {
    pub ast_nodes: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub function_descriptions: BTreeMap<String, String>,
    #[serde(default)]
    pub variable_roles: BTreeMap<String, String>,
    #[serde(default)]
    pub control_flow_logic: Vec<String>,
    #[serde(default)]
    pub complexity_metrics: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeAnalysisResult {
    pub source_code: SourceCode,
    pub language_detection: LanguageDetection,
    pub dependencies: Dependencies,
    pub enriched_ast: EnrichedAst,
    pub analysis_timestamp: DateTime<Utc>,
}

/// Generated C++ sources.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CppCodeFiles {
    #[serde(default)]
    pub header_files: BTreeMap<String, String>,
    #[serde(default)]
    pub source_files: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cmake_config: Option<String>,
    #[serde(default)]
    pub compilation_flags: Vec<String>,
    #[serde(default)]
    pub dependencies_info: BTreeMap<String, String>,
}

impl CppCodeFiles {
    pub fn file_count(&self) -> usize {
        self.header_files.len() + self.source_files.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditFinding {
    pub finding_id: String,
    pub severity: AuditSeverity,
    pub category: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_fix: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

/// State of the audit loop over generated code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditState {
    pub code_files: CppCodeFiles,
    #[serde(default)]
    pub findings: Vec<AuditFinding>,
    #[serde(default)]
    pub iteration_count: u32,
    #[serde(default)]
    pub is_complete: bool,
    /// Quality score in `[0.0, 1.0]` once computed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_score: Option<f64>,
}

impl AuditState {
    pub fn new(code_files: CppCodeFiles) -> Self {
        Self {
            code_files,
            findings: Vec::new(),
            iteration_count: 0,
            is_complete: false,
            quality_score: None,
        }
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        match self.quality_score {
            Some(score) => ModelError::check_range("quality_score", score, 0.0, 1.0),
            None => Ok(()),
        }
    }

    /// Highest severity among the findings, if any.
    pub fn max_severity(&self) -> Option<AuditSeverity> {
        self.findings.iter().map(|f| f.severity).max()
    }
}
