use thiserror::Error;

use syncd_core::ConfigError;
use syncd_state::StateError;

/// Error surface for the change processor and the engine wrapper.
#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("state error: {0}")]
    State(#[from] StateError),

    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),

    #[error("change processor is not running")]
    NotRunning,

    #[error("change processor is already running")]
    AlreadyRunning,

    #[error("{task} task join failure: {message}")]
    TaskFailed { task: &'static str, message: String },
}
