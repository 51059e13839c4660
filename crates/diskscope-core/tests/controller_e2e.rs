//! Controller integration tests: scan event sequence, deletion
//! accounting, and debounced creation batching.
//!
//! Change events are injected through `start_watching_with`, the same
//! seam the platform watcher plugs into, so delivery is deterministic.
//! Dropping the injected sender closes the stream, which flushes any
//! pending creation batch and ends the controller's event stream —
//! most tests need no sleeps at all.

use diskscope_core::controller::{Controller, ControllerEvent, ScanPhase, SharedTree};
use diskscope_core::scanner::{CancelFlag, SizeMode};
use diskscope_core::stats::StatsManager;
use diskscope_core::watcher::{FsEvent, FsEventKind};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

// ── Helpers ──────────────────────────────────────────────────────────

fn write_bytes(path: &Path, n: usize) {
    let mut f = fs::File::create(path).unwrap();
    f.write_all(&vec![0u8; n]).unwrap();
}

/// Scenario tree: `a.txt` (100), `b.txt` (200), `sub/c.txt` (50).
fn build_scenario_tree(root: &Path) {
    write_bytes(&root.join("a.txt"), 100);
    write_bytes(&root.join("b.txt"), 200);
    fs::create_dir(root.join("sub")).unwrap();
    write_bytes(&root.join("sub").join("c.txt"), 50);
}

struct Fixture {
    controller: Arc<Controller>,
    tree: SharedTree,
    /// Canonical scan root for building event paths.
    root: PathBuf,
    stats_path: PathBuf,
    _scan_dir: TempDir,
    _stats_dir: TempDir,
}

/// Scan a scenario tree with logical sizes and a throwaway stats file.
fn scanned_fixture() -> Fixture {
    let scan_dir = TempDir::new().unwrap();
    build_scenario_tree(scan_dir.path());

    let stats_dir = TempDir::new().unwrap();
    let stats_path = stats_dir.path().join("stats.json");

    let controller = Arc::new(Controller::with_stats(
        Some(scan_dir.path().to_path_buf()),
        StatsManager::load_from(stats_path.clone()),
    ));
    controller.set_size_mode(SizeMode::Logical);

    let events = controller.start_scan(CancelFlag::new()).unwrap();
    let mut tree = None;
    for event in events.iter() {
        if let ControllerEvent::ScanCompleted { result } = event {
            tree = Some(result.expect("scan must succeed"));
        }
    }
    controller.finalize_scan();

    let tree = tree.expect("scan must complete");
    let root = scan_dir.path().canonicalize().unwrap();
    Fixture {
        controller,
        tree,
        root,
        stats_path,
        _scan_dir: scan_dir,
        _stats_dir: stats_dir,
    }
}

fn deletions(events: &[ControllerEvent]) -> Vec<(PathBuf, u64, u64)> {
    events
        .iter()
        .filter_map(|e| match e {
            ControllerEvent::DeletionDetected {
                path,
                size,
                session_freed,
                ..
            } => Some((path.clone(), *size, *session_freed)),
            _ => None,
        })
        .collect()
}

fn creations(events: &[ControllerEvent]) -> Vec<PathBuf> {
    events
        .iter()
        .filter_map(|e| match e {
            ControllerEvent::CreationDetected { path, .. } => Some(path.clone()),
            _ => None,
        })
        .collect()
}

// ── Scan lifecycle ───────────────────────────────────────────────────

#[test]
fn scan_streams_ordered_events_and_publishes_sizes() {
    let scan_dir = TempDir::new().unwrap();
    build_scenario_tree(scan_dir.path());
    let stats_dir = TempDir::new().unwrap();

    let controller = Arc::new(Controller::with_stats(
        Some(scan_dir.path().to_path_buf()),
        StatsManager::load_from(stats_dir.path().join("stats.json")),
    ));
    controller.set_size_mode(SizeMode::Logical);

    let events = controller.start_scan(CancelFlag::new()).unwrap();
    let collected: Vec<ControllerEvent> = events.iter().collect();

    assert!(
        matches!(collected.first(), Some(ControllerEvent::ScanStarted { .. })),
        "stream must open with ScanStarted"
    );
    let phases: Vec<ScanPhase> = collected
        .iter()
        .filter_map(|e| match e {
            ControllerEvent::ScanPhaseChanged { phase } => Some(*phase),
            _ => None,
        })
        .collect();
    assert_eq!(phases, vec![ScanPhase::ComputingSizes, ScanPhase::Complete]);
    assert!(
        matches!(collected.last(), Some(ControllerEvent::ScanCompleted { .. })),
        "stream must end with ScanCompleted"
    );

    assert_eq!(controller.scan_state().phase, ScanPhase::Complete);
    controller.finalize_scan();
    assert_eq!(controller.scan_state().phase, ScanPhase::Idle);

    let tree = controller.root().expect("root must be published");
    let tree = tree.read();
    assert_eq!(tree.total_size(), 350);

    // Canonical order: size descending, name ascending.
    let names: Vec<String> = tree
        .sorted_children(tree.root())
        .into_iter()
        .map(|c| tree.node(c).name.to_string())
        .collect();
    assert_eq!(names, vec!["b.txt", "a.txt", "sub"]);

    let sub = tree.find_by_path(&scan_dir.path().canonicalize().unwrap().join("sub"));
    assert_eq!(tree.node(sub.unwrap()).size, 50);
}

#[test]
fn scan_without_any_target_fails_fast() {
    // A custom path that does not exist: the scan starts and completes
    // with an InvalidTarget error, leaving the controller idle.
    let stats_dir = TempDir::new().unwrap();
    let controller = Arc::new(Controller::with_stats(
        Some(PathBuf::from("/definitely/not/here")),
        StatsManager::load_from(stats_dir.path().join("stats.json")),
    ));

    let events = controller.start_scan(CancelFlag::new()).unwrap();
    let collected: Vec<ControllerEvent> = events.iter().collect();
    let completed = collected
        .iter()
        .find_map(|e| match e {
            ControllerEvent::ScanCompleted { result } => Some(result),
            _ => None,
        })
        .expect("terminal event");
    assert!(completed.is_err());
    assert_eq!(controller.scan_state().phase, ScanPhase::Idle);
    assert!(controller.root().is_none());
}

#[test]
fn cancelled_scan_reports_canceled() {
    let scan_dir = TempDir::new().unwrap();
    build_scenario_tree(scan_dir.path());
    let stats_dir = TempDir::new().unwrap();

    let controller = Arc::new(Controller::with_stats(
        Some(scan_dir.path().to_path_buf()),
        StatsManager::load_from(stats_dir.path().join("stats.json")),
    ));

    let cancel = CancelFlag::new();
    cancel.cancel();
    let events = controller.start_scan(cancel).unwrap();
    let collected: Vec<ControllerEvent> = events.iter().collect();

    let completed = collected
        .iter()
        .find_map(|e| match e {
            ControllerEvent::ScanCompleted { result } => Some(result),
            _ => None,
        })
        .expect("terminal event");
    assert!(matches!(
        completed,
        Err(diskscope_core::Error::Canceled)
    ));
}

// ── Deletion accounting ──────────────────────────────────────────────

#[test]
fn deletion_is_counted_once_and_persisted() {
    let fx = scanned_fixture();
    let (tx, rx) = crossbeam_channel::bounded::<FsEvent>(16);
    let events = fx.controller.start_watching_with(rx).unwrap();

    let target = fx.root.join("a.txt");
    // An unknown path first: it must be ignored outright.
    tx.send(FsEvent {
        kind: FsEventKind::Deleted,
        path: fx.root.join("ghost.txt"),
    })
    .unwrap();
    // Then the same real deletion twice.
    for _ in 0..2 {
        tx.send(FsEvent {
            kind: FsEventKind::Deleted,
            path: target.clone(),
        })
        .unwrap();
    }
    drop(tx);

    let collected: Vec<ControllerEvent> = events.iter().collect();
    let dels = deletions(&collected);
    assert_eq!(dels.len(), 1, "exactly one DeletionDetected: {dels:?}");
    assert_eq!(dels[0].0, target);
    assert_eq!(dels[0].1, 100);
    assert_eq!(dels[0].2, 100);

    let freed = fx.controller.freed_state();
    assert_eq!(freed.session, 100);
    assert_eq!(freed.lifetime, 100);

    {
        let tree = fx.tree.read();
        let node = tree.find_by_path(&target).unwrap();
        assert!(tree.node(node).is_deleted);
        assert_eq!(tree.node(tree.root()).deleted_size, 100);
        // The node stays visible with its size intact.
        assert_eq!(tree.total_size(), 350);
    }

    // stop() flushes the debounced stats write synchronously.
    fx.controller.stop();
    let reloaded = StatsManager::load_from(fx.stats_path.clone());
    assert_eq!(reloaded.freed_lifetime(), 100);
}

#[test]
fn deleting_a_directory_absorbs_child_events() {
    let fx = scanned_fixture();
    let (tx, rx) = crossbeam_channel::bounded::<FsEvent>(16);
    let events = fx.controller.start_watching_with(rx).unwrap();

    tx.send(FsEvent {
        kind: FsEventKind::Deleted,
        path: fx.root.join("sub"),
    })
    .unwrap();
    // The OS often reports the children too; they are already covered.
    tx.send(FsEvent {
        kind: FsEventKind::Deleted,
        path: fx.root.join("sub").join("c.txt"),
    })
    .unwrap();
    drop(tx);

    let collected: Vec<ControllerEvent> = events.iter().collect();
    let dels = deletions(&collected);
    assert_eq!(dels.len(), 1);
    assert_eq!(dels[0].1, 50, "directory counts its cumulative size");
    assert_eq!(fx.controller.freed_state().session, 50);
}

#[test]
fn modification_events_change_nothing() {
    let fx = scanned_fixture();
    let (tx, rx) = crossbeam_channel::bounded::<FsEvent>(16);
    let events = fx.controller.start_watching_with(rx).unwrap();

    tx.send(FsEvent {
        kind: FsEventKind::Modified,
        path: fx.root.join("a.txt"),
    })
    .unwrap();
    drop(tx);

    let collected: Vec<ControllerEvent> = events.iter().collect();
    assert!(collected.is_empty());
    assert_eq!(fx.tree.read().total_size(), 350);
}

// ── Creation batching ────────────────────────────────────────────────

#[test]
fn creations_coalesce_into_one_batch_per_directory() {
    let fx = scanned_fixture();
    let sub = fx.root.join("sub");

    // Put the new entries on disk first; the batch rescan stats them.
    write_bytes(&sub.join("x.bin"), 10);
    write_bytes(&sub.join("y.bin"), 20);
    let new_dir = sub.join("fresh");
    fs::create_dir(&new_dir).unwrap();
    write_bytes(&new_dir.join("z.bin"), 40);

    let (tx, rx) = crossbeam_channel::bounded::<FsEvent>(16);
    let events = fx.controller.start_watching_with(rx).unwrap();

    for path in [
        sub.join("x.bin"),
        sub.join("y.bin"),
        new_dir.clone(),
        // Parent not in the tree yet — contributes nothing on its own.
        new_dir.join("z.bin"),
    ] {
        tx.send(FsEvent {
            kind: FsEventKind::Created,
            path,
        })
        .unwrap();
    }
    // Closing the stream flushes the pending batch immediately.
    drop(tx);

    let collected: Vec<ControllerEvent> = events.iter().collect();
    let created = creations(&collected);
    assert_eq!(created, vec![sub.clone()], "one batch for the directory");

    let tree = fx.tree.read();
    assert_eq!(tree.total_size(), 350 + 10 + 20 + 40);
    let sub_id = tree.find_by_path(&sub).unwrap();
    assert_eq!(tree.node(sub_id).size, 120);

    let x = tree.find_by_path(&sub.join("x.bin")).unwrap();
    assert!(tree.node(x).is_new);
    let fresh = tree.find_by_path(&new_dir).unwrap();
    assert!(tree.node(fresh).is_new && tree.node(fresh).is_dir);
    let z = tree.find_by_path(&new_dir.join("z.bin")).unwrap();
    assert_eq!(tree.node(z).size, 40);
}

#[test]
fn debounce_timer_fires_one_creation_event() {
    let fx = scanned_fixture();
    let sub = fx.root.join("sub");
    write_bytes(&sub.join("n1.bin"), 11);
    write_bytes(&sub.join("n2.bin"), 22);
    write_bytes(&sub.join("n3.bin"), 33);

    let (tx, rx) = crossbeam_channel::bounded::<FsEvent>(16);
    let events = fx.controller.start_watching_with(rx).unwrap();

    for name in ["n1.bin", "n2.bin", "n3.bin"] {
        tx.send(FsEvent {
            kind: FsEventKind::Created,
            path: sub.join(name),
        })
        .unwrap();
    }

    // The sender stays open: only the debounce timer can flush here.
    let first = events
        .recv_timeout(Duration::from_secs(5))
        .expect("batch must flush after the quiet period");
    assert!(matches!(first, ControllerEvent::CreationDetected { .. }));
    assert!(
        events.recv_timeout(Duration::from_millis(700)).is_err(),
        "a single batch must produce a single event"
    );
    drop(tx);

    assert_eq!(fx.tree.read().total_size(), 350 + 66);
}

#[test]
fn creation_batches_rescan_only_topmost_directories() {
    let fx = scanned_fixture();
    let sub = fx.root.join("sub");
    let nested = sub.join("inner");
    fs::create_dir(&nested).unwrap();
    write_bytes(&nested.join("deep.bin"), 80);

    let (tx, rx) = crossbeam_channel::bounded::<FsEvent>(16);
    let events = fx.controller.start_watching_with(rx).unwrap();

    // Both the directory creation and a creation inside it arrive, and
    // `sub` ends up pending via both paths. One batch must result.
    tx.send(FsEvent {
        kind: FsEventKind::Created,
        path: nested.clone(),
    })
    .unwrap();
    tx.send(FsEvent {
        kind: FsEventKind::Created,
        path: sub.join("side.bin"),
    })
    .unwrap();
    write_bytes(&sub.join("side.bin"), 5);
    drop(tx);

    let collected: Vec<ControllerEvent> = events.iter().collect();
    assert_eq!(creations(&collected), vec![sub]);

    let tree = fx.tree.read();
    assert_eq!(tree.total_size(), 350 + 80 + 5);
    assert!(tree.find_by_path(&nested.join("deep.bin")).is_some());
}

// ── Teardown ─────────────────────────────────────────────────────────

#[test]
fn stop_is_idempotent() {
    let fx = scanned_fixture();
    fx.controller.stop();
    fx.controller.stop();
}
