/// The controller: scan state machine and live-change event engine.
///
/// Owns the published tree, the scan/freed state, the stats manager, and
/// the watcher handle. Scans run on a dedicated thread and stream
/// [`ControllerEvent`]s; after a scan completes, the watch loop is the
/// single dispatcher for every mutation of the published tree —
/// deletions are accounted immediately and at most once, creations are
/// coalesced per directory behind a debounce timer and folded in as
/// freshly-scanned subtrees.
///
/// Publication of a new root is an `Arc` swap inside the controller;
/// readers holding the previous `Arc` keep a consistent stale tree until
/// they drop it.
pub mod events;
pub mod state;

pub use events::ControllerEvent;
pub use state::{FreedState, ScanPhase, ScanState};

use crate::error::{Error, Result};
use crate::model::{FsTree, Node};
use crate::platform::{self, Volume};
use crate::scanner::{meta, CancelFlag, SizeMode, Walker, DEFAULT_WORKERS};
use crate::stats::StatsManager;
use crate::watcher::{FsEvent, FsEventKind, FsWatcher};
use compact_str::CompactString;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// The published scan result, shared between the controller, the watch
/// loop, and any readers (layout, accessors).
pub type SharedTree = Arc<RwLock<FsTree>>;

/// Capacity of each controller event stream.
pub const EVENT_CHANNEL_CAPACITY: usize = 128;

/// Quiet period before a burst of creation events is folded in.
const CREATION_DEBOUNCE: Duration = Duration::from_millis(1_500);

/// Worker count for the short-lived walkers that scan created subtrees.
const RESCAN_WORKERS: usize = 4;

/// Wake-up interval of the watch loop when no debounce timer is armed.
const IDLE_POLL: Duration = Duration::from_secs(60);

struct Inner {
    volumes: Vec<Volume>,
    selected: Option<usize>,
    custom_path: Option<PathBuf>,
    root: Option<SharedTree>,
    scan: ScanState,
    freed: FreedState,
    size_mode: SizeMode,
    scan_workers: usize,
}

pub struct Controller {
    inner: RwLock<Inner>,
    // The platform watcher is Send but not Sync; it gets its own lock.
    watcher: Mutex<Option<FsWatcher>>,
    stats: StatsManager,
}

impl Controller {
    /// Build a controller with volumes enumerated and stats loaded from
    /// the default location. A `custom_path` overrides volume selection.
    pub fn new(custom_path: Option<PathBuf>) -> Self {
        Self::with_stats(custom_path, StatsManager::load_default())
    }

    /// Like [`new`](Self::new) but with an explicit stats store.
    pub fn with_stats(custom_path: Option<PathBuf>, stats: StatsManager) -> Self {
        let volumes = platform::enumerate_volumes();
        let mut selected = if volumes.is_empty() { None } else { Some(0) };

        // Prefer the persisted default target when no explicit path is
        // given and it still maps to a mounted volume.
        if custom_path.is_none() {
            if let Some(saved) = stats.default_target() {
                if let Some(idx) = volumes.iter().position(|v| v.root_path == saved) {
                    selected = Some(idx);
                }
            }
        }

        let freed = FreedState {
            session: 0,
            lifetime: stats.freed_lifetime(),
        };

        Self {
            inner: RwLock::new(Inner {
                volumes,
                selected,
                custom_path,
                root: None,
                scan: ScanState::default(),
                freed,
                size_mode: SizeMode::default(),
                scan_workers: DEFAULT_WORKERS,
            }),
            watcher: Mutex::new(None),
            stats,
        }
    }

    // ── Read accessors ─────────────────────────────────────────────

    pub fn volumes(&self) -> Vec<Volume> {
        self.inner.read().volumes.clone()
    }

    pub fn selected_volume(&self) -> Option<Volume> {
        let inner = self.inner.read();
        inner.selected.and_then(|i| inner.volumes.get(i).cloned())
    }

    pub fn custom_path(&self) -> Option<PathBuf> {
        self.inner.read().custom_path.clone()
    }

    pub fn scan_state(&self) -> ScanState {
        self.inner.read().scan
    }

    pub fn freed_state(&self) -> FreedState {
        self.inner.read().freed
    }

    /// The currently published tree, if a scan has completed.
    pub fn root(&self) -> Option<SharedTree> {
        self.inner.read().root.clone()
    }

    /// `true` when a custom path was given or the persisted default
    /// target matches a mounted volume.
    pub fn has_saved_target(&self) -> bool {
        let inner = self.inner.read();
        if inner.custom_path.is_some() {
            return true;
        }
        match self.stats.default_target() {
            Some(saved) => inner.volumes.iter().any(|v| v.root_path == saved),
            None => false,
        }
    }

    // ── Configuration ──────────────────────────────────────────────

    /// Choose a volume by index and persist it as the default target.
    /// Clears the previous scan result and session counter.
    pub fn select_volume(&self, index: usize) {
        let path = {
            let mut inner = self.inner.write();
            if index >= inner.volumes.len() {
                return;
            }
            inner.selected = Some(index);
            inner.freed.session = 0;
            inner.root = None;
            inner.scan = ScanState::default();
            inner.volumes[index].root_path.clone()
        };
        self.stats.set_default_target(&path);
    }

    /// Size semantics for subsequent scans (apparent by default).
    pub fn set_size_mode(&self, mode: SizeMode) {
        self.inner.write().size_mode = mode;
    }

    /// Worker-pool size for subsequent scans; 0 restores the default.
    pub fn set_scan_workers(&self, workers: usize) {
        self.inner.write().scan_workers = if workers == 0 {
            DEFAULT_WORKERS
        } else {
            workers
        };
    }

    fn scan_target(inner: &Inner) -> Option<PathBuf> {
        if let Some(path) = &inner.custom_path {
            return Some(path.clone());
        }
        inner
            .selected
            .and_then(|i| inner.volumes.get(i))
            .map(|v| v.root_path.clone())
    }

    // ── Scanning ───────────────────────────────────────────────────

    /// Kick off a scan of the selected target on a background thread.
    ///
    /// The returned stream carries `ScanStarted`, periodic `ScanProgress`,
    /// `ScanPhaseChanged`, and a terminal `ScanCompleted`, then closes.
    pub fn start_scan(self: &Arc<Self>, cancel: CancelFlag) -> Result<Receiver<ControllerEvent>> {
        let path = {
            let mut inner = self.inner.write();
            let Some(path) = Self::scan_target(&inner) else {
                return Err(no_target_error("no scan target selected"));
            };
            inner.scan = ScanState {
                phase: ScanPhase::Scanning,
                started_at: Some(Instant::now()),
                ..ScanState::default()
            };
            inner.freed.session = 0;
            inner.root = None;
            path
        };

        let (tx, rx) = bounded(EVENT_CHANNEL_CAPACITY);
        let controller = Arc::clone(self);
        thread::Builder::new()
            .name("diskscope-scan".into())
            .spawn(move || controller.run_scan(path, cancel, tx))
            .expect("failed to spawn scan thread");
        Ok(rx)
    }

    fn run_scan(self: Arc<Self>, path: PathBuf, cancel: CancelFlag, tx: Sender<ControllerEvent>) {
        info!("starting scan of {}", path.display());
        let _ = tx.send(ControllerEvent::ScanStarted { path: path.clone() });

        let (workers, mode) = {
            let inner = self.inner.read();
            (inner.scan_workers, inner.size_mode)
        };
        let walker = Walker::new(workers).with_mode(mode);
        let progress_rx = walker.progress();

        // Forward walker snapshots as progress events while mirroring the
        // counters into the controller state for the read accessors.
        let forwarder = {
            let controller = Arc::clone(&self);
            let tx = tx.clone();
            thread::Builder::new()
                .name("diskscope-scan-progress".into())
                .spawn(move || {
                    for snapshot in progress_rx.iter() {
                        {
                            let mut inner = controller.inner.write();
                            inner.scan.files_scanned = snapshot.files_scanned;
                            inner.scan.dirs_scanned = snapshot.dirs_scanned;
                            inner.scan.bytes_found = snapshot.bytes_found;
                        }
                        let _ = tx.send(ControllerEvent::ScanProgress {
                            files_scanned: snapshot.files_scanned,
                            dirs_scanned: snapshot.dirs_scanned,
                            bytes_found: snapshot.bytes_found,
                        });
                    }
                })
                .expect("failed to spawn progress thread")
        };

        let result = walker.scan(&cancel, &path);
        // The walker is gone, so the progress channel is closed; joining
        // keeps the event stream strictly ordered.
        let _ = forwarder.join();

        match result {
            Err(err) => {
                self.inner.write().scan.phase = ScanPhase::Idle;
                warn!("scan of {} failed: {err}", path.display());
                let _ = tx.send(ControllerEvent::ScanCompleted { result: Err(err) });
            }
            Ok(mut tree) => {
                self.inner.write().scan.phase = ScanPhase::ComputingSizes;
                let _ = tx.send(ControllerEvent::ScanPhaseChanged {
                    phase: ScanPhase::ComputingSizes,
                });

                tree.compute_sizes();
                tree.canonicalize_order();
                let shared: SharedTree = Arc::new(RwLock::new(tree));

                {
                    let mut inner = self.inner.write();
                    inner.scan.phase = ScanPhase::Complete;
                    inner.root = Some(Arc::clone(&shared));
                }
                let _ = tx.send(ControllerEvent::ScanPhaseChanged {
                    phase: ScanPhase::Complete,
                });
                let _ = tx.send(ControllerEvent::ScanCompleted { result: Ok(shared) });
                info!("scan of {} complete", path.display());
            }
        }
    }

    /// Observer acknowledgement that the terminal scan frame was shown;
    /// returns the phase to `Idle`.
    pub fn finalize_scan(&self) {
        self.inner.write().scan.phase = ScanPhase::Idle;
    }

    // ── Watching ───────────────────────────────────────────────────

    /// Install the platform watcher on the scanned root and stream change
    /// events. If the backend cannot be created the stream carries one
    /// `Error` event and closes — the scanned tree stays usable.
    pub fn start_watching(self: &Arc<Self>) -> Result<Receiver<ControllerEvent>> {
        // Peek at the watch root first so a missing scan fails loudly.
        let watch_path = {
            let inner = self.inner.read();
            let root = inner
                .root
                .as_ref()
                .ok_or_else(|| no_target_error("no completed scan to watch"))?;
            let path = root.read().root_path().to_path_buf();
            path
        };

        // Replace any previous watcher.
        if let Some(mut old) = self.watcher.lock().take() {
            old.stop();
        }

        let mut watcher = match FsWatcher::new() {
            Ok(w) => w,
            Err(err) => return Ok(one_shot_error(err)),
        };
        watcher.add_recursive(&watch_path)?;
        if let Err(err) = watcher.start() {
            warn!("cannot watch {}: {err}", watch_path.display());
            return Ok(one_shot_error(err));
        }

        let events = watcher.events();
        *self.watcher.lock() = Some(watcher);
        info!("watching {} for changes", watch_path.display());
        self.spawn_watch_loop(events)
    }

    /// Run the watch loop against an externally supplied event stream.
    ///
    /// This is the seam the platform watcher plugs into; tests drive it
    /// with a plain channel to get deterministic event delivery.
    pub fn start_watching_with(
        self: &Arc<Self>,
        events: Receiver<FsEvent>,
    ) -> Result<Receiver<ControllerEvent>> {
        self.spawn_watch_loop(events)
    }

    fn spawn_watch_loop(
        self: &Arc<Self>,
        events: Receiver<FsEvent>,
    ) -> Result<Receiver<ControllerEvent>> {
        let (tree, watch_path) = {
            let inner = self.inner.read();
            let root = inner
                .root
                .clone()
                .ok_or_else(|| no_target_error("no completed scan to watch"))?;
            let path = root.read().root_path().to_path_buf();
            (root, path)
        };

        let (tx, rx) = bounded(EVENT_CHANNEL_CAPACITY);
        let controller = Arc::clone(self);
        thread::Builder::new()
            .name("diskscope-watch".into())
            .spawn(move || controller.run_watch_loop(events, tree, watch_path, tx))
            .expect("failed to spawn watch thread");
        Ok(rx)
    }

    /// Single dispatcher for all tree mutations after a scan.
    ///
    /// Deletions are applied immediately; creations accumulate in a
    /// pending set until [`CREATION_DEBOUNCE`] of quiet, then only the
    /// topmost pending directories are re-enumerated. The pending batch
    /// is flushed one final time when the event stream closes.
    fn run_watch_loop(
        self: Arc<Self>,
        events: Receiver<FsEvent>,
        tree: SharedTree,
        watch_path: PathBuf,
        tx: Sender<ControllerEvent>,
    ) {
        debug!("watch loop started for {}", watch_path.display());
        let mut pending: HashSet<PathBuf> = HashSet::new();
        let mut deadline: Option<Instant> = None;

        loop {
            let timeout = match deadline {
                Some(d) => d.saturating_duration_since(Instant::now()),
                None => IDLE_POLL,
            };
            match events.recv_timeout(timeout) {
                Ok(event) => match event.kind {
                    FsEventKind::Deleted => {
                        self.handle_deletion(&tree, &event.path, &watch_path, &tx);
                    }
                    FsEventKind::Created => {
                        if let Some(dir) = event.path.parent() {
                            if tree.read().find_by_path(dir).is_some() {
                                pending.insert(dir.to_path_buf());
                                deadline = Some(Instant::now() + CREATION_DEBOUNCE);
                            }
                        }
                    }
                    // Modification-only events never trigger a rescan.
                    FsEventKind::Modified => {}
                },
                Err(RecvTimeoutError::Timeout) => {
                    if deadline.is_some_and(|d| Instant::now() >= d) {
                        deadline = None;
                        self.flush_pending(&tree, &mut pending, &watch_path, &tx);
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    self.flush_pending(&tree, &mut pending, &watch_path, &tx);
                    break;
                }
            }
        }
        debug!("watch loop stopped for {}", watch_path.display());
    }

    fn handle_deletion(
        &self,
        tree: &SharedTree,
        path: &Path,
        watch_path: &Path,
        tx: &Sender<ControllerEvent>,
    ) {
        let marked = {
            let mut t = tree.write();
            let Some(id) = t.find_by_path(path) else {
                debug!("deletion outside tree: {}", path.display());
                return;
            };
            // Covers repeated events for the same path and children of an
            // already-deleted directory, keeping the count at-most-once.
            if t.in_deleted_subtree(id) {
                return;
            }
            t.mark_deleted(id)
        };
        let Some(size) = marked else { return };

        let (session, lifetime) = {
            let mut inner = self.inner.write();
            inner.freed.session += size;
            inner.freed.lifetime += size;
            (inner.freed.session, inner.freed.lifetime)
        };
        self.stats.add_freed(size);
        let disk_free = platform::disk_free(watch_path);
        debug!(
            "deleted {} ({size} bytes, session {session})",
            path.display()
        );

        let _ = tx.send(ControllerEvent::DeletionDetected {
            path: path.to_path_buf(),
            size,
            session_freed: session,
            lifetime_freed: lifetime,
            disk_free,
        });
    }

    fn flush_pending(
        &self,
        tree: &SharedTree,
        pending: &mut HashSet<PathBuf>,
        watch_path: &Path,
        tx: &Sender<ControllerEvent>,
    ) {
        if pending.is_empty() {
            return;
        }
        let dirs = topmost_dirs(pending);
        pending.clear();
        for dir in dirs {
            self.rescan_directory(tree, &dir, watch_path, tx);
        }
    }

    /// Re-enumerate one directory and attach entries the tree does not
    /// know yet. New files become leaves; new directories are scanned by
    /// a short-lived walker and grafted whole.
    fn rescan_directory(
        &self,
        tree: &SharedTree,
        dir: &Path,
        watch_path: &Path,
        tx: &Sender<ControllerEvent>,
    ) {
        let (parent_id, existing) = {
            let t = tree.read();
            let Some(id) = t.find_by_path(dir) else {
                debug!("rescan target no longer in tree: {}", dir.display());
                return;
            };
            let existing: HashSet<CompactString> = t
                .children(id)
                .into_iter()
                .map(|c| t.node(c).name.clone())
                .collect();
            (id, existing)
        };

        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) => {
                debug!("cannot re-enumerate {}: {err}", dir.display());
                return;
            }
        };
        let mode = self.inner.read().size_mode;

        for entry in entries.flatten() {
            let name = CompactString::new(entry.file_name().to_string_lossy());
            if existing.contains(&name) {
                continue;
            }
            let path = entry.path();
            let Ok(file_type) = entry.file_type() else {
                continue;
            };

            if file_type.is_dir() {
                let walker = Walker::new(RESCAN_WORKERS).with_mode(mode);
                match walker.scan(&CancelFlag::new(), &path) {
                    Ok(mut sub) => {
                        sub.compute_sizes();
                        sub.canonicalize_order();
                        let mut t = tree.write();
                        if let Err(err) = t.graft(parent_id, sub) {
                            warn!("cannot graft {}: {err}", path.display());
                        }
                    }
                    Err(err) => {
                        debug!("cannot scan created directory {}: {err}", path.display());
                    }
                }
            } else {
                let Ok(entry_meta) = fs::symlink_metadata(&path) else {
                    continue;
                };
                let mut node = Node::file(name, meta::size_for_mode(&entry_meta, mode));
                node.is_new = true;
                let mut t = tree.write();
                if let Err(err) = t.add_child(parent_id, node) {
                    warn!("cannot attach {}: {err}", path.display());
                }
            }
        }

        let disk_free = platform::disk_free(watch_path);
        let _ = tx.send(ControllerEvent::CreationDetected {
            path: dir.to_path_buf(),
            disk_free,
        });
    }

    /// Idempotent teardown of the watcher and the stats store.
    pub fn stop(&self) {
        if let Some(mut w) = self.watcher.lock().take() {
            w.stop();
        }
        if let Err(err) = self.stats.close() {
            warn!("stats flush on stop failed: {err}");
        }
    }
}

/// Directories from `dirs` whose ancestors are all outside the set.
/// Rescanning only these bounds the batched work: a child rescans as part
/// of its pending parent anyway.
fn topmost_dirs(dirs: &HashSet<PathBuf>) -> Vec<PathBuf> {
    let mut out: Vec<PathBuf> = dirs
        .iter()
        .filter(|dir| !dir.ancestors().skip(1).any(|a| dirs.contains(a)))
        .cloned()
        .collect();
    out.sort();
    out
}

fn no_target_error(message: &'static str) -> Error {
    Error::InvalidTarget {
        path: PathBuf::new(),
        source: std::io::Error::new(std::io::ErrorKind::NotFound, message),
    }
}

/// A stream that delivers one error and closes.
fn one_shot_error(error: Error) -> Receiver<ControllerEvent> {
    let (tx, rx) = bounded(1);
    let _ = tx.send(ControllerEvent::Error { error });
    rx
}
