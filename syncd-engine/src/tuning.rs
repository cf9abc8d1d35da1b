use std::time::Duration;

/// Completions newer than this count towards `throughput`.
pub const THROUGHPUT_WINDOW: Duration = Duration::from_secs(60);

/// `history(None)` returns at most this many events.
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

pub const COMMAND_BUFFER: usize = 256;
pub const LIFECYCLE_BUFFER: usize = 1024;
