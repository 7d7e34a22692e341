//! Structured logging setup.
//!
//! Events go to stderr so command output on stdout stays machine-readable.
//! `RUST_LOG`, when set, replaces the configured filter entirely.

use std::sync::Once;

use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// `[logging]` section of `conduit.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// One of trace, debug, info, warn, error
    #[serde(default = "default_level")]
    pub level: String,
    /// Emit one JSON object per event instead of human-readable lines
    #[serde(default)]
    pub json: bool,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
        }
    }
}

impl LoggingConfig {
    pub fn with_level(level: Level) -> Self {
        Self {
            level: level.to_string().to_lowercase(),
            ..Default::default()
        }
    }

    /// Configured level, `None` if the string is not a valid level.
    pub fn parsed_level(&self) -> Option<Level> {
        parse_level(&self.level)
    }

    fn filter(&self) -> EnvFilter {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return filter;
        }
        let level = self.parsed_level().unwrap_or(Level::INFO);
        let level = level.to_string().to_lowercase();
        EnvFilter::new(format!(
            "warn,conduit={level},conduit_common={level},reqwest=warn,hyper=warn"
        ))
    }
}

pub fn parse_level(level: &str) -> Option<Level> {
    match level.trim().to_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" | "warning" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

/// Install the global subscriber. Later calls are no-ops.
pub fn init(config: &LoggingConfig) {
    INIT.call_once(|| {
        let filter = config.filter();
        let registry = tracing_subscriber::registry().with(filter);
        let result = if config.json {
            registry
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .try_init()
        } else {
            registry
                .with(
                    fmt::layer()
                        .with_target(false)
                        .with_writer(std::io::stderr),
                )
                .try_init()
        };
        if let Err(e) = result {
            eprintln!("Failed to initialize logging: {e}");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("trace"), Some(Level::TRACE));
        assert_eq!(parse_level("DEBUG"), Some(Level::DEBUG));
        assert_eq!(parse_level(" Warn "), Some(Level::WARN));
        assert_eq!(parse_level("loud"), None);
    }

    #[test]
    fn test_default_config() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "info");
        assert!(!config.json);
        assert_eq!(config.parsed_level(), Some(Level::INFO));
    }

    #[test]
    fn test_with_level() {
        let config = LoggingConfig::with_level(Level::DEBUG);
        assert_eq!(config.level, "debug");
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: LoggingConfig = toml::from_str("json = true").unwrap();
        assert!(config.json);
        assert_eq!(config.level, "info");
    }
}
