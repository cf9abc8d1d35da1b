//! Typed lifecycle notifications published on the processor's broadcast
//! channel. Subscribe with [`ChangeProcessor::subscribe`](crate::ChangeProcessor::subscribe).

use std::sync::Arc;

use syncd_core::{BatchId, ChangeEvent, ProjectState};
use syncd_state::{ApplyError, ConflictReason};

use crate::impact::ChangeImpact;
use crate::metrics::ProcessingMetrics;

#[derive(Debug, Clone)]
pub enum ProcessorEvent {
    Started,
    Stopped,
    /// Work on `event` is about to begin.
    Processing {
        event: ChangeEvent,
        impact: ChangeImpact,
    },
    Processed {
        event: ChangeEvent,
        impact: ChangeImpact,
    },
    /// Fatal failure: non-retryable, or retries exhausted.
    ProcessingError {
        event: ChangeEvent,
        error: ApplyError,
    },
    BatchProcessed {
        batch_id: BatchId,
        events: Vec<ChangeEvent>,
    },
    Metrics(ProcessingMetrics),
    /// A remote change was refused; reconciliation is up to the subscriber.
    Conflict {
        event: ChangeEvent,
        reason: ConflictReason,
        state: Arc<ProjectState>,
    },
}

impl ProcessorEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ProcessorEvent::Started => "started",
            ProcessorEvent::Stopped => "stopped",
            ProcessorEvent::Processing { .. } => "processing",
            ProcessorEvent::Processed { .. } => "processed",
            ProcessorEvent::ProcessingError { .. } => "processing_error",
            ProcessorEvent::BatchProcessed { .. } => "batch_processed",
            ProcessorEvent::Metrics(_) => "metrics",
            ProcessorEvent::Conflict { .. } => "conflict",
        }
    }
}
