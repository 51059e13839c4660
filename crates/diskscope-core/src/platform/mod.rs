/// Platform-facing helpers — mounted-volume enumeration and free-space
/// queries.

pub mod volumes;

pub use volumes::{disk_free, enumerate_volumes, Volume};
