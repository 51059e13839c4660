/// Per-entry size and identity semantics.
///
/// On Unix the walker prefers apparent disk usage (`st_blocks * 512`),
/// which handles sparse and compressed files, and uses device/inode
/// numbers to stay inside the root's mount and to count hardlinked inodes
/// at most once. Elsewhere logical sizes are used and the guards are
/// no-ops, because drives are already separate roots there.
use dashmap::DashSet;
use std::fs::Metadata;

/// Which notion of "file size" a scan reports.
///
/// The two must never be mixed within one tree — cross-checking totals
/// against each other only works when every node used the same mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SizeMode {
    /// Bytes allocated on disk (`st_blocks * 512` where available).
    #[default]
    Apparent,
    /// The logical file length. Deterministic across filesystems, which
    /// is what the test suites want.
    Logical,
}

/// Size of a single entry under the given mode, with no hardlink
/// accounting. Used for nodes created from watch events.
#[cfg(unix)]
pub fn size_for_mode(meta: &Metadata, mode: SizeMode) -> u64 {
    use std::os::unix::fs::MetadataExt;
    match mode {
        SizeMode::Apparent => meta.blocks() * 512,
        SizeMode::Logical => meta.len(),
    }
}

#[cfg(not(unix))]
pub fn size_for_mode(meta: &Metadata, _mode: SizeMode) -> u64 {
    meta.len()
}

/// Size contribution of a regular file, or `None` when the file is a
/// hardlink to an inode that has already been counted this scan.
#[cfg(unix)]
pub fn file_size(meta: &Metadata, mode: SizeMode, seen_inodes: &DashSet<u64>) -> Option<u64> {
    use std::os::unix::fs::MetadataExt;
    if meta.nlink() > 1 && !seen_inodes.insert(meta.ino()) {
        return None;
    }
    Some(size_for_mode(meta, mode))
}

#[cfg(not(unix))]
pub fn file_size(meta: &Metadata, mode: SizeMode, _seen_inodes: &DashSet<u64>) -> Option<u64> {
    Some(size_for_mode(meta, mode))
}

/// Device identifier of the scan root, captured once per scan.
#[cfg(unix)]
pub fn device(meta: &Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    meta.dev()
}

#[cfg(not(unix))]
pub fn device(_meta: &Metadata) -> u64 {
    0
}

/// Inode number, used to register directories against cycles.
#[cfg(unix)]
pub fn inode(meta: &Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    meta.ino()
}

#[cfg(not(unix))]
pub fn inode(_meta: &Metadata) -> u64 {
    0
}

/// Whether a directory must not be descended into: it sits on a different
/// device than the scan root (mount boundary), or its inode was already
/// registered (bind mounts, firmlinks, traversal cycles).
#[cfg(unix)]
pub fn should_skip_dir(meta: &Metadata, root_device: u64, seen_dirs: &DashSet<u64>) -> bool {
    if device(meta) != root_device {
        return true;
    }
    !seen_dirs.insert(inode(meta))
}

#[cfg(not(unix))]
pub fn should_skip_dir(_meta: &Metadata, _root_device: u64, _seen_dirs: &DashSet<u64>) -> bool {
    false
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn logical_mode_reports_exact_lengths() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("f.bin");
        fs::File::create(&path)
            .unwrap()
            .write_all(&[0u8; 1234])
            .unwrap();
        let meta = fs::symlink_metadata(&path).unwrap();
        assert_eq!(size_for_mode(&meta, SizeMode::Logical), 1234);
        // Apparent size is block-granular and never smaller than a block
        // for a non-sparse, non-empty file.
        assert!(size_for_mode(&meta, SizeMode::Apparent) % 512 == 0);
    }

    #[test]
    fn hardlinked_inode_counts_once() {
        let tmp = TempDir::new().unwrap();
        let first = tmp.path().join("first");
        let second = tmp.path().join("second");
        fs::write(&first, vec![7u8; 1000]).unwrap();
        fs::hard_link(&first, &second).unwrap();

        let seen = DashSet::new();
        let m1 = fs::symlink_metadata(&first).unwrap();
        let m2 = fs::symlink_metadata(&second).unwrap();
        assert_eq!(file_size(&m1, SizeMode::Logical, &seen), Some(1000));
        assert_eq!(file_size(&m2, SizeMode::Logical, &seen), None);
    }

    #[test]
    fn directory_inode_registered_once() {
        let tmp = TempDir::new().unwrap();
        let meta = fs::symlink_metadata(tmp.path()).unwrap();
        let seen = DashSet::new();
        let dev = device(&meta);
        assert!(!should_skip_dir(&meta, dev, &seen));
        assert!(should_skip_dir(&meta, dev, &seen));
        assert!(should_skip_dir(&meta, dev + 1, &DashSet::new()));
    }
}
