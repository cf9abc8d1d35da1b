pub mod config;
pub mod replay;
pub mod state;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

/// `--config` when given, otherwise `~/.syncd/config.yaml`.
pub fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path.to_path_buf()),
        None => {
            let home = dirs::home_dir().context("could not determine home directory")?;
            Ok(syncd_core::config::config_path_at(&home))
        }
    }
}

/// The serde name of a unit enum value (`BuildStatus::Failed` -> `failed`).
pub fn label<T: Serialize>(value: &T) -> String {
    serde_json::to_value(value)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}
