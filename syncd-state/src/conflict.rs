//! Conflict detection for remotely sourced changes.
//!
//! Signal precedence:
//! 1. `PendingLocal` (a local change to the same target is admitted but unfinished)
//! 2. `Diverged` (the target changed locally after the remote `base_version`)
//! 3. `NewerLocal` (no `base_version`: the target changed locally after the
//!    remote event's timestamp)
//! 4. `Clear`

use std::fmt;

use chrono::{DateTime, Utc};
use syncd_core::{ChangeEvent, ProjectState};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictReason {
    PendingLocal {
        pending: usize,
    },
    Diverged {
        base_version: u64,
        local_version: u64,
    },
    NewerLocal {
        local_updated_at: DateTime<Utc>,
        remote_timestamp: DateTime<Utc>,
    },
}

impl fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictReason::PendingLocal { pending } => {
                write!(f, "{pending} local change(s) to the same target are still pending")
            }
            ConflictReason::Diverged {
                base_version,
                local_version,
            } => write!(
                f,
                "target changed locally at version {local_version}, after remote base version {base_version}"
            ),
            ConflictReason::NewerLocal {
                local_updated_at,
                remote_timestamp,
            } => write!(
                f,
                "target updated locally at {local_updated_at}, after remote change at {remote_timestamp}"
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictCheck {
    Clear,
    Conflict(ConflictReason),
}

/// Check a remote `event` against the current local `state`.
///
/// `pending_local` is the number of unfinished local changes for the event's
/// target. Local events never conflict.
pub fn check(event: &ChangeEvent, state: &ProjectState, pending_local: usize) -> ConflictCheck {
    if !event.is_remote() {
        return ConflictCheck::Clear;
    }

    if pending_local > 0 {
        return ConflictCheck::Conflict(ConflictReason::PendingLocal {
            pending: pending_local,
        });
    }

    let Some(stamp) = state.target_stamp(event.change_type(), &event.target) else {
        return ConflictCheck::Clear;
    };

    match event.base_version {
        Some(base_version) if stamp.version > base_version => {
            ConflictCheck::Conflict(ConflictReason::Diverged {
                base_version,
                local_version: stamp.version,
            })
        }
        Some(_) => ConflictCheck::Clear,
        None if stamp.updated_at > event.timestamp => {
            ConflictCheck::Conflict(ConflictReason::NewerLocal {
                local_updated_at: stamp.updated_at,
                remote_timestamp: event.timestamp,
            })
        }
        None => ConflictCheck::Clear,
    }
}
