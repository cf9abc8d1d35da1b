//! Change-processing engine: admission, batching, concurrency-controlled
//! application and lifecycle events.
//!
//! [`ChangeProcessor`] is the pipeline; [`SyncEngine`] pairs it with a
//! [`syncd_state::StateManager`].

pub mod batch;
pub mod dedup;
mod engine;
mod error;
pub mod events;
pub mod executor;
pub mod impact;
pub mod metrics;
mod processor;
pub mod queue;
pub mod rate_limit;
pub mod tuning;

pub use batch::ProcessingBatch;
pub use engine::SyncEngine;
pub use error::ProcessorError;
pub use events::ProcessorEvent;
pub use impact::{ChangeImpact, ImpactCategory, RecoveryComplexity};
pub use metrics::{PriorityCounts, ProcessingMetrics};
pub use processor::{Admission, ChangeProcessor};
pub use queue::QueueStatus;

/// Install the global subscriber, writing to stderr. `RUST_LOG` overrides
/// the default `info` filter. A second call is a no-op.
pub fn init_tracing(json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
