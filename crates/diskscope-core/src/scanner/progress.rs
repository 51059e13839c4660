/// Progress reporting for a running scan.
///
/// Snapshots are cheap value types sent over a bounded crossbeam channel;
/// the tree itself never travels through the channel. Counters in
/// consecutive snapshots are monotonically non-decreasing.
use std::time::Duration;

/// Running totals for a scan in flight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSnapshot {
    pub files_scanned: u64,
    pub dirs_scanned: u64,
    pub bytes_found: u64,
}

/// Capacity of the progress channel.
///
/// Sends are non-blocking: when the consumer falls behind, intermediate
/// snapshots are dropped rather than stalling the walk. The final snapshot
/// is always sent after the last drain opportunity.
pub const PROGRESS_CHANNEL_CAPACITY: usize = 256;

/// Minimum interval between two progress snapshots.
pub const PROGRESS_INTERVAL: Duration = Duration::from_millis(200);
