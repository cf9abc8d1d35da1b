//! # syncd-state
//!
//! Sole writer of the canonical [`ProjectState`](syncd_core::ProjectState).
//!
//! [`StateManager`] applies change events one at a time, guards remote
//! changes with [`conflict::check`], keeps a bounded snapshot history for
//! rollback, and optionally persists everything with an atomic JSON write.

pub mod applier;
pub mod checksum;
pub mod conflict;
pub mod error;
pub mod manager;
pub mod mutate;
pub mod persist;
pub mod snapshot;

pub use applier::{ApplyOutcome, ChangeApplier};
pub use conflict::{ConflictCheck, ConflictReason};
pub use error::{ApplyError, ErrorCode, StateError};
pub use manager::{StateManager, StateMetrics};
pub use snapshot::StateSnapshot;
