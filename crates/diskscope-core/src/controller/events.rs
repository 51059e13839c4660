/// Typed events emitted on the controller's streams.
///
/// Scan events arrive on the receiver returned by `start_scan`; change
/// events on the one from `start_watching`. Both streams close when their
/// producer finishes.
use super::state::ScanPhase;
use super::SharedTree;
use crate::error::Error;
use std::path::PathBuf;

#[derive(Debug)]
pub enum ControllerEvent {
    ScanStarted {
        path: PathBuf,
    },
    ScanProgress {
        files_scanned: u64,
        dirs_scanned: u64,
        bytes_found: u64,
    },
    ScanPhaseChanged {
        phase: ScanPhase,
    },
    /// Terminal scan event; the stream closes after it.
    ScanCompleted {
        result: Result<SharedTree, Error>,
    },
    /// A watched file or directory was deleted. Carries the running freed
    /// totals and the volume's current free space.
    DeletionDetected {
        path: PathBuf,
        size: u64,
        session_freed: u64,
        lifetime_freed: u64,
        disk_free: u64,
    },
    /// One debounced batch of creations under `path` has been folded into
    /// the tree.
    CreationDetected {
        path: PathBuf,
        disk_free: u64,
    },
    /// Non-fatal failure, e.g. the platform watcher could not start.
    Error {
        error: Error,
    },
}
