//! Error types for syncd-state.

use std::fmt;
use std::io::ErrorKind;
use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from state operations.
#[derive(Debug, Error)]
pub enum StateError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error (persistence, checksum, export).
    #[error("state JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Post-application validation failed; the new state was discarded.
    #[error("invalid state: {0}")]
    Validation(String),

    /// No snapshot with this version is retained.
    #[error("no snapshot retained for version {0}")]
    UnknownVersion(u64),

    /// The blocking persistence task died before finishing its write.
    #[error("persistence task failed: {0}")]
    Task(String),
}

/// Convenience constructor for [`StateError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> StateError {
    StateError::Io {
        path: path.into(),
        source,
    }
}

/// Failure class of a change application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    NotFound,
    ConnectionRefused,
    Timeout,
    Network,
    Validation,
    Io,
    Other,
}

impl ErrorCode {
    /// Transient failures worth another attempt.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorCode::NotFound
                | ErrorCode::ConnectionRefused
                | ErrorCode::Timeout
                | ErrorCode::Network
        )
    }

    fn as_str(self) -> &'static str {
        match self {
            ErrorCode::NotFound => "ENOENT",
            ErrorCode::ConnectionRefused => "ECONNREFUSED",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::Network => "NETWORK_ERROR",
            ErrorCode::Validation => "VALIDATION",
            ErrorCode::Io => "IO",
            ErrorCode::Other => "ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Markers that make an otherwise unclassified message retryable.
const RETRYABLE_MARKERS: [&str; 4] = ["ENOENT", "ECONNREFUSED", "TIMEOUT", "NETWORK_ERROR"];

/// The error a [`ChangeApplier`](crate::ChangeApplier) reports for one attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct ApplyError {
    pub code: ErrorCode,
    pub message: String,
}

impl ApplyError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Timeout, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Other, message)
    }

    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
            || RETRYABLE_MARKERS
                .iter()
                .any(|marker| self.message.contains(marker))
    }
}

impl From<StateError> for ApplyError {
    fn from(err: StateError) -> Self {
        let code = match &err {
            StateError::Io { source, .. } => match source.kind() {
                ErrorKind::NotFound => ErrorCode::NotFound,
                ErrorKind::ConnectionRefused => ErrorCode::ConnectionRefused,
                ErrorKind::TimedOut => ErrorCode::Timeout,
                _ => ErrorCode::Io,
            },
            StateError::Validation(_) => ErrorCode::Validation,
            StateError::Json(_) | StateError::UnknownVersion(_) | StateError::Task(_) => {
                ErrorCode::Other
            }
        };
        ApplyError::new(code, err.to_string())
    }
}
