//! The seam between the change processor and whatever owns project state.

use std::sync::Arc;

use async_trait::async_trait;
use syncd_core::{ChangeEvent, ProjectState};

use crate::conflict::ConflictReason;
use crate::error::ApplyError;

/// Result of one successful application attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    /// The change was written; `version` is the new state version.
    Applied { version: u64 },
    /// A remote change was refused; `state` is the local snapshot it clashed with.
    Conflict {
        reason: ConflictReason,
        state: Arc<ProjectState>,
    },
}

/// Applies change events to project state.
///
/// `mark_pending` / `clear_pending` bracket the lifetime of a *local* event
/// inside the processor (admission to terminal outcome), so that remote
/// changes to the same target can be refused while it is in flight.
#[async_trait]
pub trait ChangeApplier: Send + Sync {
    async fn apply(&self, event: &ChangeEvent) -> Result<ApplyOutcome, ApplyError>;

    fn mark_pending(&self, _event: &ChangeEvent) {}

    fn clear_pending(&self, _event: &ChangeEvent) {}
}
