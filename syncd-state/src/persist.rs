//! State persistence: JSON document holding the current state and its
//! snapshot history.
//!
//! Writes use the atomic `.tmp` + rename pattern so a crash mid-write never
//! leaves a truncated state file behind.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use syncd_core::ProjectState;

use crate::error::{io_err, StateError};
use crate::snapshot::StateSnapshot;

/// On-disk state payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedState {
    pub saved_at: DateTime<Utc>,
    pub state: ProjectState,
    #[serde(default)]
    pub history: Vec<StateSnapshot>,
}

/// Load the persisted state at `path`.
///
/// Returns `None` if the file does not yet exist.
pub fn load_at(path: &Path) -> Result<Option<PersistedState>, StateError> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    let persisted: PersistedState = serde_json::from_str(&contents)?;
    Ok(Some(persisted))
}

/// Save `persisted` to `path` atomically.
///
/// Writes to `<path>.tmp` then renames to `<path>`.
pub fn save_at(path: &Path, persisted: &PersistedState) -> Result<(), StateError> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
        }
    }

    let json = serde_json::to_string_pretty(persisted)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, &json).map_err(|e| io_err(&tmp, e))?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(path, e));
    }
    Ok(())
}
