/// Filesystem scanning.
///
/// [`Walker`] does the parallel traversal and returns a private
/// [`FsTree`](crate::model::FsTree); size semantics and mount/hardlink
/// guards live in [`meta`]; [`progress`] defines the snapshot stream the
/// controller forwards to observers.
pub mod meta;
pub mod progress;
pub mod walker;

pub use meta::SizeMode;
pub use progress::{ScanSnapshot, PROGRESS_CHANNEL_CAPACITY, PROGRESS_INTERVAL};
pub use walker::{CancelFlag, Walker, DEFAULT_WORKERS};
