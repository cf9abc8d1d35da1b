//! SHA-256 checksum over the observable parts of a project state.

use serde::Serialize;
use sha2::{Digest, Sha256};
use syncd_core::{BuildState, DependencyState, FileState, GitState, ProjectState, ServerState};

use std::collections::BTreeMap;

use crate::error::StateError;

/// Bookkeeping (`version`, `last_update`, `targets`, `checksum`) is excluded,
/// so two states with the same content hash equal.
#[derive(Serialize)]
struct Canonical<'a> {
    files: &'a BTreeMap<String, FileState>,
    dependencies: &'a BTreeMap<String, DependencyState>,
    git: &'a GitState,
    build: &'a BuildState,
    server: &'a ServerState,
}

pub fn compute(state: &ProjectState) -> Result<String, StateError> {
    let canonical = Canonical {
        files: &state.files,
        dependencies: &state.dependencies,
        git: &state.git,
        build: &state.build,
        server: &state.server,
    };
    let bytes = serde_json::to_vec(&canonical)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_ignores_version_bookkeeping() {
        let a = ProjectState::empty();
        let mut b = ProjectState::empty();
        b.version = 42;
        assert_eq!(compute(&a).unwrap(), compute(&b).unwrap());
    }

    #[test]
    fn checksum_tracks_content() {
        let a = ProjectState::empty();
        let mut b = ProjectState::empty();
        b.git.branch = "main".to_string();
        let digest = compute(&b).unwrap();
        assert_ne!(compute(&a).unwrap(), digest);
        assert_eq!(digest.len(), 64);
    }
}
