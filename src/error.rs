use std::io;

use thiserror::Error;

/// Errors surfaced at the RVM API boundary.
///
/// Internal helpers assume their preconditions hold; only the top-level
/// operations in [`crate::Rvm`] translate a failure into one of these
/// variants.
#[derive(Debug, Error)]
pub enum RvmError {
    /// A directory or segment name exceeded the configured length limit,
    /// or referred to a segment that isn't loaded.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A filesystem operation on a backing file or the redo log failed.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// The redo log could not be parsed. The library only ever writes
    /// well-formed logs itself; this variant exists for embedders that
    /// want to detect a hand-edited or truncated-mid-write log rather
    /// than panic.
    #[error("corrupt log: {0}")]
    CorruptLog(String),
}

pub type Result<T> = std::result::Result<T, RvmError>;
