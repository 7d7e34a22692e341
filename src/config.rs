//! Configuration loaded from `.conduit/conduit.toml`.
//!
//! Every field has a default, so a missing file or a partial one is fine.
//!
//! ```toml
//! [collaborator]
//! base_url = "https://openrouter.ai/api/v1"
//! model = "mistralai/devstral-small:free"
//! temperature = 0.1
//! max_tokens = 4000
//! timeout_secs = 60
//!
//! [runner]
//! node_timeout_secs = 300
//! checkpoint_backend = "file"
//!
//! [pipeline]
//! graph = "analysis"
//! on_collaborator_error = "abort"
//!
//! [logging]
//! level = "info"
//! json = false
//! ```
//!
//! The API key is not part of this file. The CLI reads it from the
//! environment and passes it to [`Config::openrouter_config`].

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::collaborator::{
    DEFAULT_BASE_URL, DEFAULT_MAX_TOKENS, DEFAULT_MODEL, DEFAULT_TEMPERATURE,
    DEFAULT_TIMEOUT_SECS, OpenRouterConfig,
};
use crate::logging::{LoggingConfig, parse_level};
use crate::orchestrator::RunnerConfig;
use crate::pipeline::{FailurePolicy, GraphKind};

pub const CONDUIT_DIR: &str = ".conduit";
pub const CONFIG_FILE: &str = "conduit.toml";

/// `[collaborator]`: the text-generation service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollaboratorSection {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_temperature() -> f32 {
    DEFAULT_TEMPERATURE
}

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl Default for CollaboratorSection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Where checkpoints are kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointBackend {
    /// One JSON file per thread under `.conduit/checkpoints/`
    #[default]
    File,
    /// Process memory; nothing survives the command
    Memory,
}

impl std::fmt::Display for CheckpointBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckpointBackend::File => write!(f, "file"),
            CheckpointBackend::Memory => write!(f, "memory"),
        }
    }
}

/// `[runner]`: graph execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerSection {
    /// Per-node timeout; 0 disables it
    #[serde(default = "default_node_timeout_secs")]
    pub node_timeout_secs: u64,
    #[serde(default)]
    pub checkpoint_backend: CheckpointBackend,
}

fn default_node_timeout_secs() -> u64 {
    300
}

impl Default for RunnerSection {
    fn default() -> Self {
        Self {
            node_timeout_secs: default_node_timeout_secs(),
            checkpoint_backend: CheckpointBackend::default(),
        }
    }
}

impl RunnerSection {
    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            node_timeout: (self.node_timeout_secs > 0)
                .then(|| Duration::from_secs(self.node_timeout_secs)),
        }
    }
}

/// `[pipeline]`: which graph runs and how collaborator failures are handled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineSection {
    #[serde(default)]
    pub graph: GraphKind,
    #[serde(default)]
    pub on_collaborator_error: FailurePolicy,
}

/// Contents of `conduit.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConduitToml {
    #[serde(default)]
    pub collaborator: CollaboratorSection,
    #[serde(default)]
    pub runner: RunnerSection,
    #[serde(default)]
    pub pipeline: PipelineSection,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ConduitToml {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse conduit.toml")
    }

    /// Load `conduit.toml` from `conduit_dir`, or defaults if it does not exist.
    pub fn load_or_default(conduit_dir: &Path) -> Result<Self> {
        let config_path = conduit_dir.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize conduit.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Problems that would make a run fail or behave unexpectedly.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        let c = &self.collaborator;

        if c.base_url.trim().is_empty() {
            warnings.push("collaborator.base_url must not be empty".to_string());
        } else if !c.base_url.starts_with("http://") && !c.base_url.starts_with("https://") {
            warnings.push(format!(
                "collaborator.base_url '{}' should start with http:// or https://",
                c.base_url
            ));
        }
        if c.model.trim().is_empty() {
            warnings.push("collaborator.model must not be empty".to_string());
        }
        if !(0.0..=2.0).contains(&c.temperature) {
            warnings.push(format!(
                "collaborator.temperature {} is outside [0.0, 2.0]",
                c.temperature
            ));
        }
        if c.max_tokens == 0 {
            warnings.push("collaborator.max_tokens must be greater than 0".to_string());
        }
        if c.timeout_secs == 0 {
            warnings.push("collaborator.timeout_secs must be greater than 0".to_string());
        }
        if parse_level(&self.logging.level).is_none() {
            warnings.push(format!(
                "logging.level '{}' is not one of trace, debug, info, warn, error",
                self.logging.level
            ));
        }

        warnings
    }
}

/// Resolved project paths plus the parsed `conduit.toml`.
#[derive(Debug, Clone)]
pub struct Config {
    pub project_dir: PathBuf,
    pub conduit_dir: PathBuf,
    pub toml: ConduitToml,
}

impl Config {
    pub fn new(project_dir: &Path) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .with_context(|| format!("Failed to resolve project directory {}", project_dir.display()))?;
        let conduit_dir = project_dir.join(CONDUIT_DIR);
        let toml = ConduitToml::load_or_default(&conduit_dir)?;
        Ok(Self {
            project_dir,
            conduit_dir,
            toml,
        })
    }

    pub fn config_file(&self) -> PathBuf {
        self.conduit_dir.join(CONFIG_FILE)
    }

    pub fn checkpoint_dir(&self) -> PathBuf {
        self.conduit_dir.join("checkpoints")
    }

    pub fn audit_dir(&self) -> PathBuf {
        self.conduit_dir.join("audit")
    }

    pub fn is_initialized(&self) -> bool {
        self.conduit_dir.is_dir()
    }

    pub fn runner_config(&self) -> RunnerConfig {
        self.toml.runner.runner_config()
    }

    /// Client settings from `[collaborator]` with the given API key.
    pub fn openrouter_config(&self, api_key: impl Into<String>) -> OpenRouterConfig {
        let c = &self.toml.collaborator;
        OpenRouterConfig {
            api_key: api_key.into(),
            base_url: c.base_url.clone(),
            model: c.model.clone(),
            temperature: c.temperature,
            max_tokens: c.max_tokens,
            timeout_secs: c.timeout_secs,
        }
    }
}
