//! `conduit init`: create the `.conduit/` directory of a project.
//!
//! ```text
//! .conduit/
//! ├── conduit.toml     # Configuration, written with defaults
//! ├── checkpoints/     # One JSON snapshot per thread
//! └── audit/
//!     └── runs/        # Finished run records
//! ```

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config::{CONDUIT_DIR, CONFIG_FILE, ConduitToml};

#[derive(Debug)]
pub struct InitResult {
    pub conduit_dir: PathBuf,
    /// False if `.conduit/` already existed
    pub created: bool,
    /// False if an existing `conduit.toml` was left alone
    pub wrote_config: bool,
}

/// Create or complete the `.conduit/` structure under `project_dir`.
///
/// Existing files are never overwritten.
pub fn init_project(project_dir: &Path) -> Result<InitResult> {
    let conduit_dir = get_conduit_dir(project_dir);
    let created = !conduit_dir.exists();

    for dir in [
        conduit_dir.clone(),
        conduit_dir.join("checkpoints"),
        conduit_dir.join("audit").join("runs"),
    ] {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
    }

    let config_file = conduit_dir.join(CONFIG_FILE);
    let wrote_config = !config_file.exists();
    if wrote_config {
        ConduitToml::default().save(&config_file)?;
    }

    Ok(InitResult {
        conduit_dir,
        created,
        wrote_config,
    })
}

pub fn is_initialized(project_dir: &Path) -> bool {
    get_conduit_dir(project_dir).is_dir()
}

pub fn get_conduit_dir(project_dir: &Path) -> PathBuf {
    project_dir.join(CONDUIT_DIR)
}
