/// Parallel filesystem walker.
///
/// Traverses a subtree with a rayon-backed `jwalk` pool and builds an
/// [`FsTree`] with file sizes populated and directory sizes left at zero
/// (the controller runs `compute_sizes` as its own phase). Directory reads
/// happen concurrently in the pool; entries are consumed and inserted into
/// the private arena on the calling thread, so no locking is needed.
///
/// Mount boundaries and already-seen directory inodes are pruned inside
/// the pool via `process_read_dir`, before any recursion into them starts.
/// Per-entry I/O errors are logged at debug level and the entry is
/// skipped; only an invalid root or cancellation fails the walk.
use crate::error::{Error, Result};
use crate::model::{FsTree, Node, NodeId};
use crate::scanner::meta::{self, SizeMode};
use crate::scanner::progress::{ScanSnapshot, PROGRESS_CHANNEL_CAPACITY, PROGRESS_INTERVAL};
use compact_str::CompactString;
use crossbeam_channel::{bounded, Receiver, Sender};
use dashmap::DashSet;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Worker count used when the caller passes 0.
pub const DEFAULT_WORKERS: usize = 8;

/// Cooperative cancellation token shared between the walk and its owner.
///
/// The walker checks it once per consumed entry and inside the directory
/// readers, so cancellation takes effect promptly even on slow
/// filesystems.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// One-shot parallel walker. Create, grab the progress receiver, then
/// consume it with [`Walker::scan`]; the progress channel closes when the
/// walk finishes or is cancelled.
pub struct Walker {
    workers: usize,
    mode: SizeMode,
    progress_tx: Sender<ScanSnapshot>,
    progress_rx: Receiver<ScanSnapshot>,
}

impl Walker {
    /// `workers == 0` selects [`DEFAULT_WORKERS`].
    pub fn new(workers: usize) -> Self {
        let (progress_tx, progress_rx) = bounded(PROGRESS_CHANNEL_CAPACITY);
        Self {
            workers: if workers == 0 { DEFAULT_WORKERS } else { workers },
            mode: SizeMode::default(),
            progress_tx,
            progress_rx,
        }
    }

    pub fn with_mode(mut self, mode: SizeMode) -> Self {
        self.mode = mode;
        self
    }

    /// Receiver for progress snapshots. Clone-cheap; call before `scan`.
    pub fn progress(&self) -> Receiver<ScanSnapshot> {
        self.progress_rx.clone()
    }

    /// Walk `root` and return the populated tree.
    ///
    /// Fails with [`Error::InvalidTarget`] if the root cannot be
    /// canonicalized and with [`Error::Canceled`] if the flag trips; a
    /// final snapshot is emitted in every outcome.
    pub fn scan(self, cancel: &CancelFlag, root: &Path) -> Result<FsTree> {
        let start = Instant::now();
        let root = root.canonicalize().map_err(|source| Error::InvalidTarget {
            path: root.to_path_buf(),
            source,
        })?;
        let root_meta = fs::symlink_metadata(&root).map_err(|source| Error::InvalidTarget {
            path: root.clone(),
            source,
        })?;

        if !root_meta.is_dir() {
            let mut tree = FsTree::new(root, false);
            let size = meta::size_for_mode(&root_meta, self.mode);
            let root_id = tree.root();
            tree.node_mut(root_id).size = size;
            let _ = self.progress_tx.try_send(ScanSnapshot {
                files_scanned: 1,
                dirs_scanned: 0,
                bytes_found: size,
            });
            return Ok(tree);
        }

        let root_dev = meta::device(&root_meta);
        let seen_dirs: Arc<DashSet<u64>> = Arc::new(DashSet::new());
        seen_dirs.insert(meta::inode(&root_meta));
        let seen_inodes: DashSet<u64> = DashSet::new();

        let mut tree = FsTree::new(root.clone(), true);
        let mut dir_map: HashMap<PathBuf, NodeId> = HashMap::with_capacity(4_096);
        dir_map.insert(root.clone(), tree.root());

        let mut snapshot = ScanSnapshot {
            dirs_scanned: 1, // the root
            ..Default::default()
        };
        let mut last_emit = Instant::now();

        // Bound the pool to the machine even if the caller asks for more.
        let pool_size = self.workers.min(num_cpus::get().max(1) * 2).max(1);
        let walker = jwalk::WalkDir::new(&root)
            .skip_hidden(false)
            .follow_links(false)
            .parallelism(jwalk::Parallelism::RayonNewPool(pool_size))
            .process_read_dir({
                let cancel = cancel.clone();
                let seen_dirs = Arc::clone(&seen_dirs);
                move |_depth, _dir_path, _state, children| {
                    if cancel.is_cancelled() {
                        children.clear();
                        return;
                    }
                    for child in children.iter_mut().flatten() {
                        if !child.file_type.is_dir() {
                            continue;
                        }
                        match fs::symlink_metadata(child.path()) {
                            Ok(m) => {
                                if meta::should_skip_dir(&m, root_dev, &seen_dirs) {
                                    // Keep the entry as an empty node but
                                    // never descend into it.
                                    child.read_children_path = None;
                                }
                            }
                            Err(_) => {
                                // Unreadable metadata; the read would fail
                                // anyway, let the error path handle it.
                            }
                        }
                    }
                }
            });

        for entry_result in walker {
            if cancel.is_cancelled() {
                let _ = self.progress_tx.try_send(snapshot);
                debug!("scan of {} cancelled after {:?}", root.display(), start.elapsed());
                return Err(Error::Canceled);
            }

            let entry = match entry_result {
                Ok(e) => e,
                Err(err) => {
                    debug!("skipping unreadable entry: {err}");
                    continue;
                }
            };
            if entry.depth == 0 {
                continue;
            }

            let path = entry.path();
            let parent_id = match path.parent() {
                Some(parent_path) => match dir_map.get(parent_path) {
                    Some(&id) => id,
                    None => ensure_ancestors(&mut tree, &mut dir_map, parent_path, &root)?,
                },
                None => continue,
            };

            let name = CompactString::new(entry.file_name.to_string_lossy());
            if entry.file_type.is_dir() {
                // Already materialized by ensure_ancestors.
                if dir_map.contains_key(&path) {
                    continue;
                }
                let id = tree.add_node(Node::dir(name));
                tree.link_child(parent_id, id)?;
                dir_map.insert(path, id);
                snapshot.dirs_scanned += 1;
            } else {
                let entry_meta = match fs::symlink_metadata(&path) {
                    Ok(m) => m,
                    Err(err) => {
                        debug!("skipping {}: {err}", path.display());
                        continue;
                    }
                };
                // Symlinks are never followed; they contribute their own
                // metadata size. Hardlinked inodes past the first visit
                // stay visible but contribute zero bytes.
                let size = if entry.file_type.is_symlink() {
                    entry_meta.len()
                } else {
                    meta::file_size(&entry_meta, self.mode, &seen_inodes).unwrap_or(0)
                };
                let id = tree.add_node(Node::file(name, size));
                tree.link_child(parent_id, id)?;
                snapshot.files_scanned += 1;
                snapshot.bytes_found += size;
            }

            if last_emit.elapsed() >= PROGRESS_INTERVAL {
                let _ = self.progress_tx.try_send(snapshot);
                last_emit = Instant::now();
            }
        }

        let _ = self.progress_tx.try_send(snapshot);
        debug!(
            "scan of {} complete: {} files, {} dirs in {:?}",
            root.display(),
            snapshot.files_scanned,
            snapshot.dirs_scanned,
            start.elapsed()
        );
        Ok(tree)
    }
}

/// Create any ancestor directories missing from `dir_map`.
///
/// Rare: only hit when jwalk yields an entry before its parent directory
/// entry on very wide trees. Recreates the chain from the nearest known
/// ancestor so linkage stays correct.
fn ensure_ancestors(
    tree: &mut FsTree,
    dir_map: &mut HashMap<PathBuf, NodeId>,
    target: &Path,
    root: &Path,
) -> Result<NodeId> {
    let mut missing: Vec<PathBuf> = Vec::new();
    let mut current = target.to_path_buf();

    while !dir_map.contains_key(&current) && current != *root {
        missing.push(current.clone());
        match current.parent() {
            Some(p) => current = p.to_path_buf(),
            None => break,
        }
    }

    let mut parent = dir_map.get(&current).copied().unwrap_or_else(|| tree.root());

    for ancestor in missing.into_iter().rev() {
        let name = ancestor
            .file_name()
            .map(|n| CompactString::new(n.to_string_lossy()))
            .unwrap_or_default();
        let id = tree.add_node(Node::dir(name));
        tree.link_child(parent, id)?;
        dir_map.insert(ancestor, id);
        parent = id;
    }

    Ok(parent)
}
