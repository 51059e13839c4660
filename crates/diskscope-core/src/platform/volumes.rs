/// Mounted-volume enumeration.
///
/// Lists user-visible volumes with capacity and free space, filtering out
/// network and pseudo filesystems. On systems where no real volume survives
/// the filter (unusual container setups), falls back to a single entry for
/// the user's home hierarchy so there is always something to scan.
use crate::model::size;
use std::path::{Path, PathBuf};
use sysinfo::Disks;
use tracing::debug;

/// Filesystem-type tokens that never represent scannable local storage:
/// network mounts and pseudo filesystems.
const FILTERED_FILESYSTEMS: [&str; 9] = [
    "smbfs", "nfs", "afpfs", "webdav", "cifs", "devfs", "autofs", "mtmfs", "nullfs",
];

/// A mounted volume eligible for scanning.
#[derive(Debug, Clone)]
pub struct Volume {
    /// Short name shown in pickers, e.g. "Macintosh HD" or "/".
    pub display_name: String,
    /// Mount point to scan from.
    pub root_path: PathBuf,
    /// Volume label as reported by the OS; may be empty.
    pub label: String,
    pub total_bytes: u64,
    pub free_bytes: u64,
}

impl Volume {
    pub fn used_bytes(&self) -> u64 {
        self.total_bytes.saturating_sub(self.free_bytes)
    }

    /// Used fraction in 0.0..=1.0, 0.0 for zero-capacity volumes.
    pub fn used_fraction(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        self.used_bytes() as f64 / self.total_bytes as f64
    }

    /// One-line summary for logs and the CLI volume table.
    pub fn summary(&self) -> String {
        format!(
            "{} — {} used of {} ({} free)",
            self.display_name,
            size::format_size(self.used_bytes()),
            size::format_size(self.total_bytes),
            size::format_size(self.free_bytes),
        )
    }
}

fn is_filtered_filesystem(fs_type: &str) -> bool {
    FILTERED_FILESYSTEMS
        .iter()
        .any(|t| fs_type.eq_ignore_ascii_case(t))
}

/// Enumerate mounted volumes, network and pseudo filesystems excluded.
pub fn enumerate_volumes() -> Vec<Volume> {
    let disks = Disks::new_with_refreshed_list();
    let mut volumes = Vec::new();

    for disk in disks.list() {
        let fs_type = disk.file_system().to_string_lossy();
        if is_filtered_filesystem(&fs_type) {
            debug!("skipping volume {:?}: filtered fs {fs_type}", disk.mount_point());
            continue;
        }
        if disk.total_space() == 0 {
            continue;
        }
        let mount = disk.mount_point().to_path_buf();
        let label = disk.name().to_string_lossy().into_owned();
        let display_name = if label.is_empty() {
            mount.to_string_lossy().into_owned()
        } else {
            label.clone()
        };
        volumes.push(Volume {
            display_name,
            root_path: mount,
            label,
            total_bytes: disk.total_space(),
            free_bytes: disk.available_space(),
        });
    }

    // Mount points can repeat (e.g. overlay setups); keep the first.
    volumes.sort_by(|a, b| a.root_path.cmp(&b.root_path));
    volumes.dedup_by(|a, b| a.root_path == b.root_path);

    if volumes.is_empty() {
        if let Some(home) = home_volume() {
            volumes.push(home);
        }
    }
    volumes
}

/// Fallback single entry covering the user's home hierarchy.
fn home_volume() -> Option<Volume> {
    let home = dirs::home_dir()?;
    let free = disk_free(&home);
    Some(Volume {
        display_name: home.to_string_lossy().into_owned(),
        root_path: home,
        label: String::new(),
        total_bytes: 0,
        free_bytes: free,
    })
}

/// Free space on the volume backing `path`, resolved by the longest
/// mount-point prefix. Returns 0 when nothing matches.
pub fn disk_free(path: &Path) -> u64 {
    let disks = Disks::new_with_refreshed_list();
    disks
        .list()
        .iter()
        .filter(|d| path.starts_with(d.mount_point()))
        .max_by_key(|d| d.mount_point().as_os_str().len())
        .map(|d| d.available_space())
        .unwrap_or(0)
}
