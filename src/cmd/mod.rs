//! CLI command implementations.
//!
//! | Module    | Commands handled                         |
//! |-----------|------------------------------------------|
//! | `run`     | `Run`, `Resume`                          |
//! | `session` | `Status`, `List`, `Reset`, `Audit`       |
//! | `config`  | `Init`, `Config`, `Check`                |

pub mod config;
pub mod run;
pub mod session;

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;

use conduit::checkpoint::{Checkpointer, FileCheckpointer, MemoryCheckpointer};
use conduit::config::{CheckpointBackend, Config};

pub use config::{cmd_check, cmd_config, cmd_init};
pub use run::{RunArgs, cmd_resume, cmd_run};
pub use session::{cmd_audit, cmd_list, cmd_reset, cmd_status};

pub const API_KEY_ENV: &str = "OPENROUTER_API_KEY";

/// Load the project configuration, failing if `conduit init` has not run.
pub fn load_initialized(project_dir: &Path) -> Result<Config> {
    let config = Config::new(project_dir)?;
    if !config.is_initialized() {
        anyhow::bail!("Project not initialized. Run 'conduit init' first.");
    }
    Ok(config)
}

pub fn open_checkpointer(config: &Config) -> Arc<dyn Checkpointer> {
    match config.toml.runner.checkpoint_backend {
        CheckpointBackend::File => Arc::new(FileCheckpointer::new(config.checkpoint_dir())),
        CheckpointBackend::Memory => Arc::new(MemoryCheckpointer::new()),
    }
}

/// Print a note when checkpoints do not outlive the process.
pub fn warn_if_ephemeral(config: &Config) {
    if config.toml.runner.checkpoint_backend == CheckpointBackend::Memory {
        println!(
            "{}",
            console::style("Checkpoint backend is 'memory'; nothing is stored between commands.")
                .yellow()
        );
    }
}

pub fn api_key_from_env() -> Result<String> {
    match std::env::var(API_KEY_ENV) {
        Ok(key) if !key.trim().is_empty() => Ok(key),
        _ => anyhow::bail!(
            "{API_KEY_ENV} is not set. Export it or add it to .env (the 'base' graph needs no key)."
        ),
    }
}
