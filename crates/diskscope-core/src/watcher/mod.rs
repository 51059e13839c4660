/// Filesystem change watching.
///
/// Wraps the platform notification backend (`notify`: FSEvents on macOS,
/// inotify on Linux, ReadDirectoryChangesW on Windows) behind a small
/// typed stream the controller consumes. The stream is advisory:
/// duplicates are possible, order across siblings is not guaranteed, and
/// events may be dropped when the channel is full — the controller never
/// assumes completeness.
use crate::error::{Error, Result};
use crossbeam_channel::{bounded, Receiver};
use notify::event::{ModifyKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher as _};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Capacity of the normalized event channel. Overflow drops events.
pub const EVENT_CHANNEL_CAPACITY: usize = 1_024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsEventKind {
    Created,
    Deleted,
    Modified,
}

/// A normalized filesystem change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsEvent {
    pub kind: FsEventKind,
    pub path: PathBuf,
}

/// Handle to a platform change-notification stream.
///
/// Lifecycle: [`new`](Self::new) → [`add_recursive`](Self::add_recursive)
/// → [`start`](Self::start) → consume [`events`](Self::events) →
/// [`stop`](Self::stop). The event channel closes soon after `stop`.
pub struct FsWatcher {
    backend: Option<RecommendedWatcher>,
    pending: Vec<PathBuf>,
    watched: Vec<PathBuf>,
    events_rx: Receiver<FsEvent>,
}

impl FsWatcher {
    pub fn new() -> Result<Self> {
        let (tx, rx) = bounded::<FsEvent>(EVENT_CHANNEL_CAPACITY);
        let backend = notify::recommended_watcher(move |result: notify::Result<notify::Event>| {
            match result {
                Ok(event) => {
                    for normalized in translate(&event) {
                        // Non-blocking: a full channel drops the event.
                        let _ = tx.try_send(normalized);
                    }
                }
                Err(err) => warn!("watch backend error: {err}"),
            }
        })
        .map_err(Error::WatcherUnavailable)?;

        Ok(Self {
            backend: Some(backend),
            pending: Vec::new(),
            watched: Vec::new(),
            events_rx: rx,
        })
    }

    /// Register a path for recursive watching. Subscriptions are applied
    /// by [`start`](Self::start).
    pub fn add_recursive(&mut self, path: &Path) -> Result<()> {
        self.pending.push(path.to_path_buf());
        Ok(())
    }

    /// Subscribe all registered paths.
    pub fn start(&mut self) -> Result<()> {
        let Some(backend) = self.backend.as_mut() else {
            return Ok(());
        };
        for path in self.pending.drain(..) {
            backend
                .watch(&path, RecursiveMode::Recursive)
                .map_err(Error::WatcherUnavailable)?;
            debug!("watching {} recursively", path.display());
            self.watched.push(path);
        }
        Ok(())
    }

    /// The normalized event stream. Closes after [`stop`](Self::stop).
    pub fn events(&self) -> Receiver<FsEvent> {
        self.events_rx.clone()
    }

    /// Tear down the backend. Idempotent; dropping the backend releases
    /// the sender, which closes the event channel once in-flight callbacks
    /// finish.
    pub fn stop(&mut self) {
        if let Some(mut backend) = self.backend.take() {
            for path in self.watched.drain(..) {
                let _ = backend.unwatch(&path);
            }
            debug!("watcher stopped");
        }
    }
}

impl Drop for FsWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Map a raw backend event onto zero or more normalized events.
///
/// Renames are the awkward case: a pair with explicit from/to splits into
/// a deletion and a creation, while an ambiguous rename is resolved the
/// way the path currently looks — gone means deleted, present means
/// created (covers both move-in and in-place rename).
fn translate(event: &notify::Event) -> Vec<FsEvent> {
    match event.kind {
        EventKind::Create(_) => emit_all(event, FsEventKind::Created),
        EventKind::Remove(_) => emit_all(event, FsEventKind::Deleted),
        EventKind::Modify(ModifyKind::Name(mode)) => match mode {
            RenameMode::From => emit_all(event, FsEventKind::Deleted),
            RenameMode::To => emit_all(event, FsEventKind::Created),
            RenameMode::Both => {
                let mut out = Vec::with_capacity(2);
                if let Some(from) = event.paths.first() {
                    out.push(FsEvent {
                        kind: FsEventKind::Deleted,
                        path: from.clone(),
                    });
                }
                if let Some(to) = event.paths.get(1) {
                    out.push(FsEvent {
                        kind: FsEventKind::Created,
                        path: to.clone(),
                    });
                }
                out
            }
            _ => event
                .paths
                .iter()
                .map(|p| FsEvent {
                    kind: if p.exists() {
                        FsEventKind::Created
                    } else {
                        FsEventKind::Deleted
                    },
                    path: p.clone(),
                })
                .collect(),
        },
        EventKind::Modify(_) => emit_all(event, FsEventKind::Modified),
        _ => Vec::new(),
    }
}

fn emit_all(event: &notify::Event, kind: FsEventKind) -> Vec<FsEvent> {
    event
        .paths
        .iter()
        .map(|p| FsEvent {
            kind,
            path: p.clone(),
        })
        .collect()
}
