use std::fmt;

/// Errors surfaced by the shared-file index.
///
/// Read paths never construct [`ShareError`] on query failure — they log
/// and return an empty sequence instead. Write paths and lifecycle
/// transitions propagate these.
#[derive(Debug, thiserror::Error)]
pub enum ShareError {
    /// A scan was requested while one was already running.
    #[error("a scan is already in progress")]
    ScanInProgress,

    /// Neither the primary nor the backup repository could be brought to a
    /// valid, ready state during `Initialize`.
    #[error("share initialization failed: {0}")]
    ShareInitialization(String),

    /// A masked name did not resolve to a known file, or the file it
    /// resolved to is missing on disk.
    #[error("not found: {0}")]
    NotFound(String),

    /// The repository's live schema does not match what this build
    /// expects; callers should drop-and-recreate.
    #[error("repository schema is invalid: {}", .0.join("; "))]
    SchemaInvalid(Vec<String>),

    /// A `Waiter` wait expired before it was completed.
    #[error("wait timed out")]
    Timeout,

    /// An operation was cancelled cooperatively.
    #[error("operation cancelled")]
    Cancelled,

    /// The in-memory repository's keepalive probe detected data loss; the
    /// process must restart.
    #[error("storage is fatally lost: {0}")]
    StorageFatal(String),

    /// Per-directory or per-file enumeration failed; the scan keeps going.
    #[error("filesystem error: {0}")]
    FilesystemTransient(#[from] std::io::Error),

    /// Failure from the repository backend (sqlx), wrapped so callers of
    /// write paths see one error type.
    #[error("repository error: {0}")]
    Repository(String),
}

impl ShareError {
    pub fn schema_invalid(problems: impl IntoIterator<Item = impl fmt::Display>) -> Self {
        Self::SchemaInvalid(problems.into_iter().map(|p| p.to_string()).collect())
    }
}

pub type Result<T> = std::result::Result<T, ShareError>;
