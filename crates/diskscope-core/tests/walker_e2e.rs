//! End-to-end walker tests against a real temporary filesystem.
//!
//! The walker spawns a rayon pool and stats real directory entries, so
//! these run as integration tests with `tempfile` rather than mocking the
//! OS. All size assertions use `SizeMode::Logical` — apparent sizes are
//! block-granular and vary by filesystem.

use diskscope_core::error::Error;
use diskscope_core::scanner::{CancelFlag, ScanSnapshot, SizeMode, Walker};
use std::fs;
use std::io::Write;
use std::path::Path;

// ── Helpers ──────────────────────────────────────────────────────────

/// Reproducible tree:
///
/// ```text
/// root/
///   alpha/
///     a.txt   (100 bytes)
///     b.rs    (200 bytes)
///   beta/
///     c.png   (300 bytes)
///   d.zip     (400 bytes)
/// ```
///
/// Total file bytes: 1 000.
fn build_test_tree(root: &Path) {
    let alpha = root.join("alpha");
    let beta = root.join("beta");
    fs::create_dir_all(&alpha).unwrap();
    fs::create_dir_all(&beta).unwrap();

    write_bytes(&alpha.join("a.txt"), 100);
    write_bytes(&alpha.join("b.rs"), 200);
    write_bytes(&beta.join("c.png"), 300);
    write_bytes(&root.join("d.zip"), 400);
}

fn write_bytes(path: &Path, n: usize) {
    let mut f = fs::File::create(path).unwrap();
    f.write_all(&vec![0u8; n]).unwrap();
}

fn logical_walker() -> Walker {
    Walker::new(4).with_mode(SizeMode::Logical)
}

// ── Tests ────────────────────────────────────────────────────────────

#[test]
fn scan_discovers_all_files_and_sizes() {
    let tmp = tempfile::TempDir::new().unwrap();
    build_test_tree(tmp.path());

    let walker = logical_walker();
    let mut tree = walker.scan(&CancelFlag::new(), tmp.path()).unwrap();
    tree.compute_sizes();

    // 1 root + 2 dirs + 4 files.
    assert_eq!(tree.len(), 7);
    assert_eq!(tree.total_size(), 1_000);

    let canonical = tmp.path().canonicalize().unwrap();
    let alpha = tree.find_by_path(&canonical.join("alpha")).unwrap();
    assert_eq!(tree.node(alpha).size, 300);
    assert!(tree.node(alpha).is_dir);

    let d = tree.find_by_path(&canonical.join("d.zip")).unwrap();
    assert_eq!(tree.node(d).size, 400);
    assert!(!tree.node(d).is_dir);
}

#[test]
fn scan_empty_directory_has_only_the_root() {
    let tmp = tempfile::TempDir::new().unwrap();

    let walker = logical_walker();
    let mut tree = walker.scan(&CancelFlag::new(), tmp.path()).unwrap();
    tree.compute_sizes();

    assert_eq!(tree.len(), 1);
    assert_eq!(tree.total_size(), 0);
    assert!(tree.node(tree.root()).is_dir);
}

#[test]
fn scan_single_file_target() {
    let tmp = tempfile::TempDir::new().unwrap();
    let file = tmp.path().join("lonely.bin");
    write_bytes(&file, 512);

    let walker = logical_walker();
    let tree = walker.scan(&CancelFlag::new(), &file).unwrap();

    assert_eq!(tree.len(), 1);
    assert!(!tree.node(tree.root()).is_dir);
    assert_eq!(tree.total_size(), 512);
}

#[test]
fn scan_missing_target_is_an_invalid_target() {
    let tmp = tempfile::TempDir::new().unwrap();
    let missing = tmp.path().join("does-not-exist");

    let err = logical_walker()
        .scan(&CancelFlag::new(), &missing)
        .unwrap_err();
    assert!(matches!(err, Error::InvalidTarget { .. }), "got {err:?}");
}

#[test]
fn cancelled_scan_returns_canceled_with_a_final_snapshot() {
    let tmp = tempfile::TempDir::new().unwrap();
    build_test_tree(tmp.path());

    let walker = logical_walker();
    let progress = walker.progress();
    let cancel = CancelFlag::new();
    cancel.cancel();

    let err = walker.scan(&cancel, tmp.path()).unwrap_err();
    assert!(matches!(err, Error::Canceled), "got {err:?}");

    // The channel closed with at least the final snapshot in it.
    let snapshots: Vec<ScanSnapshot> = progress.iter().collect();
    assert!(!snapshots.is_empty());
}

#[test]
fn progress_counters_are_monotonic_and_final() {
    let tmp = tempfile::TempDir::new().unwrap();
    for i in 0..200 {
        write_bytes(&tmp.path().join(format!("file{i:03}.bin")), 1_024);
    }

    let walker = logical_walker();
    let progress = walker.progress();
    let tree = walker.scan(&CancelFlag::new(), tmp.path()).unwrap();

    let snapshots: Vec<ScanSnapshot> = progress.iter().collect();
    assert!(!snapshots.is_empty(), "at least the final snapshot");
    for pair in snapshots.windows(2) {
        assert!(pair[1].files_scanned >= pair[0].files_scanned);
        assert!(pair[1].dirs_scanned >= pair[0].dirs_scanned);
        assert!(pair[1].bytes_found >= pair[0].bytes_found);
    }

    let last = snapshots.last().unwrap();
    assert_eq!(last.files_scanned, 200);
    assert_eq!(last.bytes_found, 200 * 1_024);
    assert_eq!(tree.len(), 201);
}

#[cfg(unix)]
#[test]
fn hardlinked_bytes_count_once() {
    let tmp = tempfile::TempDir::new().unwrap();
    let original = tmp.path().join("original.dat");
    write_bytes(&original, 1_000);
    fs::hard_link(&original, tmp.path().join("mirror.dat")).unwrap();

    let walker = logical_walker();
    let progress = walker.progress();
    let mut tree = walker.scan(&CancelFlag::new(), tmp.path()).unwrap();
    tree.compute_sizes();

    // Both names are in the tree, but the inode's bytes appear once.
    assert_eq!(tree.len(), 3);
    assert_eq!(tree.total_size(), 1_000);

    let last = progress.iter().last().unwrap();
    assert_eq!(last.files_scanned, 2);
    assert_eq!(last.bytes_found, 1_000);
}

#[cfg(unix)]
#[test]
fn symlinks_are_recorded_but_never_followed() {
    let tmp = tempfile::TempDir::new().unwrap();
    let data = tmp.path().join("data");
    fs::create_dir(&data).unwrap();
    write_bytes(&data.join("payload.bin"), 700);
    // Link back to the parent: following it would loop forever.
    std::os::unix::fs::symlink(tmp.path(), data.join("loop")).unwrap();

    let walker = logical_walker();
    let mut tree = walker.scan(&CancelFlag::new(), tmp.path()).unwrap();
    tree.compute_sizes();

    let canonical = tmp.path().canonicalize().unwrap();
    let link = tree.find_by_path(&canonical.join("data").join("loop")).unwrap();
    assert!(!tree.node(link).is_dir, "symlink must be recorded as a file");

    // root + data + payload + loop; the cycle was not expanded.
    assert_eq!(tree.len(), 4);
    let link_meta_len = fs::symlink_metadata(data.join("loop")).unwrap().len();
    assert_eq!(tree.total_size(), 700 + link_meta_len);
}

#[test]
fn apparent_mode_is_block_granular() {
    let tmp = tempfile::TempDir::new().unwrap();
    write_bytes(&tmp.path().join("tiny.txt"), 10);

    let walker = Walker::new(2).with_mode(SizeMode::Apparent);
    let mut tree = walker.scan(&CancelFlag::new(), tmp.path()).unwrap();
    tree.compute_sizes();

    #[cfg(unix)]
    assert_eq!(tree.total_size() % 512, 0);
    #[cfg(not(unix))]
    assert_eq!(tree.total_size(), 10);
}
