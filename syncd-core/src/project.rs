//! The canonical project-state snapshot.
//!
//! Maps use `BTreeMap` so that serialization (and therefore the state
//! checksum) is deterministic.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{BuildAsset, BuildPerformance, ChangeType, DependencyKind, FileKind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileState {
    pub path: String,
    pub size: u64,
    pub modified: DateTime<Utc>,
    pub file_type: FileKind,
    pub hash: String,
    pub is_tracked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    pub last_scanned: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyState {
    pub name: String,
    pub version: String,
    pub kind: DependencyKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,
    pub installed: bool,
    pub vulnerabilities: usize,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum GitStatus {
    #[default]
    Clean,
    Dirty,
    Conflict,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct GitState {
    pub branch: String,
    pub head: String,
    pub status: GitStatus,
    pub staged: Vec<String>,
    pub unstaged: Vec<String>,
    pub untracked: Vec<String>,
    pub remote_changes: bool,
    pub ahead: u32,
    pub behind: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_checked: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BuildStatus {
    #[default]
    Idle,
    Building,
    Success,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BuildState {
    pub status: BuildStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_build: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    #[serde(default)]
    pub assets: Vec<BuildAsset>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub performance: Option<BuildPerformance>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    #[default]
    Stopped,
    Starting,
    Running,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ServerState {
    pub status: ServerStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uptime_ms: Option<u64>,
    pub requests: u64,
    pub errors: u64,
}

/// When a target was last changed locally, and at which state version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetStamp {
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

/// Canonical in-memory snapshot of the project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectState {
    pub files: BTreeMap<String, FileState>,
    pub dependencies: BTreeMap<String, DependencyState>,
    pub git: GitState,
    pub build: BuildState,
    pub server: ServerState,
    /// Keyed by [`ProjectState::target_key`].
    #[serde(default)]
    pub targets: BTreeMap<String, TargetStamp>,
    pub version: u64,
    pub last_update: DateTime<Utc>,
    #[serde(default)]
    pub checksum: String,
}

impl ProjectState {
    /// Fresh state at version 1.
    pub fn empty() -> Self {
        Self {
            files: BTreeMap::new(),
            dependencies: BTreeMap::new(),
            git: GitState::default(),
            build: BuildState::default(),
            server: ServerState::default(),
            targets: BTreeMap::new(),
            version: 1,
            last_update: Utc::now(),
            checksum: String::new(),
        }
    }

    pub fn target_key(change_type: ChangeType, target: &str) -> String {
        format!("{change_type}:{target}")
    }

    pub fn target_stamp(&self, change_type: ChangeType, target: &str) -> Option<&TargetStamp> {
        self.targets.get(&Self::target_key(change_type, target))
    }
}

impl Default for ProjectState {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_state_starts_at_version_one() {
        let state = ProjectState::empty();
        assert_eq!(state.version, 1);
        assert!(state.files.is_empty());
        assert_eq!(state.git.status, GitStatus::Clean);
        assert_eq!(state.server.status, ServerStatus::Stopped);
    }

    #[test]
    fn target_key_is_namespaced_by_type() {
        assert_eq!(
            ProjectState::target_key(ChangeType::File, "src/a.rs"),
            "file:src/a.rs"
        );
        assert_ne!(
            ProjectState::target_key(ChangeType::Git, "main"),
            ProjectState::target_key(ChangeType::Dependency, "main")
        );
    }
}
