//! syncd core library: change-event domain types, project state model,
//! configuration and errors.
//!
//! - [`types`]: newtypes, priorities, the typed metadata union and [`ChangeEvent`]
//! - [`project`]: the canonical [`ProjectState`] snapshot shape
//! - [`priority`]: producer-side priority heuristics
//! - [`config`]: [`EngineConfig`] load / save
//! - [`error`]: [`ConfigError`]

pub mod config;
pub mod error;
pub mod priority;
pub mod project;
pub mod types;

pub use config::{
    DedupConfig, DedupStrategy, EngineConfig, PriorityThresholds, ProcessorConfig, RateLimits,
    RetryPolicy, StateConfig, ThrottleDelays,
};
pub use error::ConfigError;
pub use project::{
    BuildState, BuildStatus, DependencyState, FileState, GitState, GitStatus, ProjectState,
    ServerState, ServerStatus, TargetStamp,
};
pub use types::{
    BatchId, BuildAsset, BuildMetadata, BuildPerformance, ChangeEvent, ChangePayload, ChangeType,
    DependencyKind, DependencyMetadata, EventId, FileKind, FileMetadata, GitMetadata, Priority,
    SemverType, ServerMetadata, Severity, Vulnerability, REMOTE_SOURCE,
};
