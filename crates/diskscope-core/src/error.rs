/// Error taxonomy for the diskscope core.
///
/// Per-entry I/O failures during a scan (permission denied, races with
/// concurrent deletes) never appear here — the walker logs them at debug
/// level and skips the entry. Only structural and configuration failures
/// cross the crate boundary.
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The target path cannot be canonicalized or does not exist.
    /// Fatal at startup.
    #[error("invalid target path {path:?}: {source}")]
    InvalidTarget {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The scan was cancelled cooperatively via its [`CancelFlag`].
    ///
    /// [`CancelFlag`]: crate::scanner::CancelFlag
    #[error("scan cancelled")]
    Canceled,

    /// The platform change-notification backend could not be created or
    /// attached. The controller keeps running without live updates.
    #[error("filesystem watcher unavailable: {0}")]
    WatcherUnavailable(#[source] notify::Error),

    /// The statistics file could not be written. In-memory state is kept
    /// and the write is retried on the next flush.
    #[error("statistics persistence failed: {0}")]
    StatsIo(#[source] std::io::Error),

    /// A tree mutation was attempted that would corrupt parent/child
    /// linkage. Always a bug in the caller.
    #[error("tree invariant violated: {0}")]
    InvariantViolation(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;
