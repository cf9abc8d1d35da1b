//! Domain types for change events.
//!
//! Every producer emits the same [`ChangeEvent`] shape. The producer-specific
//! payload is the tagged union [`ChangePayload`]; it serializes as
//! `"type": "<kind>", "metadata": {...}` next to the other event fields.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::priority;

/// `source` value marking an event received from a remote peer.
pub const REMOTE_SOURCE: &str = "remote";

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Opaque unique identifier of a change event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub String);

impl EventId {
    pub fn generate() -> Self {
        Self(format!("evt_{}", Uuid::new_v4().simple()))
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for EventId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for EventId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Identifier of a processing batch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchId(pub String);

impl BatchId {
    pub fn generate() -> Self {
        Self(format!("batch_{}", Uuid::new_v4().simple()))
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for BatchId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Priority tier. `Ord` follows dispatch order: `Critical` sorts first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Critical,
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    /// All tiers in dispatch order.
    pub const ALL: [Priority; 4] = [
        Priority::Critical,
        Priority::High,
        Priority::Medium,
        Priority::Low,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }

    /// `Critical` or `High`.
    pub fn is_urgent(self) -> bool {
        matches!(self, Priority::Critical | Priority::High)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which subsystem a change belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    File,
    Git,
    Dependency,
    Build,
    Server,
}

impl ChangeType {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeType::File => "file",
            ChangeType::Git => "git",
            ChangeType::Dependency => "dependency",
            ChangeType::Build => "build",
            ChangeType::Server => "server",
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of a watched file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Config,
    Source,
    Test,
    Asset,
    Documentation,
    #[default]
    Other,
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FileKind::Config => "config",
            FileKind::Source => "source",
            FileKind::Test => "test",
            FileKind::Asset => "asset",
            FileKind::Documentation => "documentation",
            FileKind::Other => "other",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SemverType {
    Major,
    Minor,
    Patch,
    Prerelease,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum DependencyKind {
    #[default]
    Dependency,
    DevDependency,
    PeerDependency,
    OptionalDependency,
}

/// Vulnerability severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Moderate,
    High,
    Critical,
}

// ---------------------------------------------------------------------------
// Metadata payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FileMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<FileKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    /// Previous path for `moved` operations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct GitMetadata {
    #[serde(default, alias = "hash", skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staged: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unstaged: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub untracked: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ahead: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub behind: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_changes: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vulnerability {
    pub id: String,
    pub severity: Severity,
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DependencyMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semver_type: Option<SemverType>,
    #[serde(default)]
    pub dependency_type: DependencyKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vulnerabilities: Vec<Vulnerability>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
}

impl DependencyMetadata {
    /// Explicit `severity` wins; otherwise the worst listed vulnerability.
    pub fn effective_severity(&self) -> Option<Severity> {
        self.severity
            .or_else(|| self.vulnerabilities.iter().map(|v| v.severity).max())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildAsset {
    pub name: String,
    pub size: u64,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gzipped: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BuildPerformance {
    pub bundle_size: u64,
    pub load_time_ms: u64,
    pub memory_usage: u64,
    pub compilation_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BuildMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assets: Vec<BuildAsset>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub performance: Option<BuildPerformance>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ServerMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Type-tagged change payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "metadata", rename_all = "lowercase")]
pub enum ChangePayload {
    File(FileMetadata),
    Git(GitMetadata),
    Dependency(DependencyMetadata),
    Build(BuildMetadata),
    Server(ServerMetadata),
}

impl ChangePayload {
    pub fn change_type(&self) -> ChangeType {
        match self {
            ChangePayload::File(_) => ChangeType::File,
            ChangePayload::Git(_) => ChangeType::Git,
            ChangePayload::Dependency(_) => ChangeType::Dependency,
            ChangePayload::Build(_) => ChangeType::Build,
            ChangePayload::Server(_) => ChangeType::Server,
        }
    }
}

// ---------------------------------------------------------------------------
// ChangeEvent
// ---------------------------------------------------------------------------

/// The atomic unit of change emitted by a producer.
///
/// `processing_*`, `attempts`, `batch_id` and `last_error` are bookkeeping
/// owned by the processor; producers leave them empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub id: EventId,
    #[serde(flatten)]
    pub payload: ChangePayload,
    pub operation: String,
    pub target: String,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub priority: Priority,
    /// Local state version a remote peer computed this change against.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_version: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<BatchId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_started: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_completed: Option<DateTime<Utc>>,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl ChangeEvent {
    /// Build a fresh event stamped now, with a generated id and the
    /// producer-side priority heuristic applied.
    pub fn new(
        payload: ChangePayload,
        operation: impl Into<String>,
        target: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        let operation = operation.into();
        let target = target.into();
        let priority = priority::suggest(&payload, &operation, &target);
        Self {
            id: EventId::generate(),
            payload,
            operation,
            target,
            timestamp: Utc::now(),
            source: source.into(),
            priority,
            base_version: None,
            batch_id: None,
            processing_started: None,
            processing_completed: None,
            attempts: 0,
            last_error: None,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_id(mut self, id: impl Into<EventId>) -> Self {
        self.id = id.into();
        self
    }

    /// Mark the event as coming from a remote peer computed against `base_version`.
    pub fn remote(mut self, base_version: Option<u64>) -> Self {
        self.source = REMOTE_SOURCE.to_string();
        self.base_version = base_version;
        self
    }

    pub fn change_type(&self) -> ChangeType {
        self.payload.change_type()
    }

    pub fn is_remote(&self) -> bool {
        self.source == REMOTE_SOURCE
    }

    pub fn is_completed(&self) -> bool {
        self.processing_completed.is_some()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
