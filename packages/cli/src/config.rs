use anyhow::{Context, Result};
use pagebuilder_selection::{EngineConfig, DEFAULT_CONFIG_NAME};
use std::path::{Path, PathBuf};

/// Resolve the engine config for a command
///
/// An explicit `--config` path must exist; otherwise `selection.config.json`
/// in the working directory is used when present, and defaults when not.
pub fn load_config(cwd: &str, explicit: Option<&Path>) -> Result<EngineConfig> {
    match explicit {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!("Config file does not exist: {}", path.display());
            }
            EngineConfig::load(path)
                .with_context(|| format!("Failed to load config {}", path.display()))
        }
        None => {
            let path = PathBuf::from(cwd).join(DEFAULT_CONFIG_NAME);
            EngineConfig::load(&path)
                .with_context(|| format!("Failed to load config {}", path.display()))
        }
    }
}
