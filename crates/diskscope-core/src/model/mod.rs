/// Data model for the scanned size tree.
///
/// Re-exports the arena-allocated tree structure and supporting types.
pub mod node;
pub mod size;
pub mod tree;

pub use node::{Node, NodeId};
pub use tree::FsTree;
