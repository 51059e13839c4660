/// A single node in the arena-allocated size tree.
///
/// Nodes live in a flat `Vec<Node>` and refer to each other through
/// [`NodeId`] indices instead of pointers, so the parent link is a plain
/// non-owning index and the borrow checker never sees a cycle.
use compact_str::CompactString;

/// Index into the arena `Vec<Node>`.
///
/// `u32` keeps the node small; four billion entries is far beyond any
/// real filesystem subtree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    #[inline]
    pub fn new(index: usize) -> Self {
        debug_assert!(index <= u32::MAX as usize, "NodeId overflow");
        Self(index as u32)
    }

    /// The index as a `usize` for Vec indexing.
    #[inline]
    pub fn idx(self) -> usize {
        self.0 as usize
    }
}

/// A file or directory in the tree.
///
/// Children form a singly-linked sibling list via `first_child` /
/// `next_sibling`, so no per-node child Vec is allocated.
#[derive(Debug, Clone)]
pub struct Node {
    /// File or directory name only; full paths are reconstructed by
    /// walking `parent` links up to the tree's root path.
    pub name: CompactString,

    /// For files: bytes at scan time (apparent or logical, depending on
    /// the walker's size mode). For directories: cumulative total of the
    /// subtree, filled in by `FsTree::compute_sizes` or kept current by
    /// the propagating mutators.
    pub size: u64,

    pub is_dir: bool,

    /// `None` only at the root.
    pub parent: Option<NodeId>,

    pub first_child: Option<NodeId>,
    pub next_sibling: Option<NodeId>,

    // Change tracking for the live-watch phase. Not persisted.
    /// Set on the root of every subtree attached after the initial scan.
    pub is_new: bool,
    /// Once set within a scan generation this never reverts.
    pub is_deleted: bool,
    /// Sum of size-at-deletion-time over marked-deleted nodes in this
    /// subtree (including this node itself).
    pub deleted_size: u64,
}

impl Node {
    pub fn file(name: CompactString, size: u64) -> Self {
        Self {
            name,
            size,
            is_dir: false,
            parent: None,
            first_child: None,
            next_sibling: None,
            is_new: false,
            is_deleted: false,
            deleted_size: 0,
        }
    }

    pub fn dir(name: CompactString) -> Self {
        Self {
            name,
            size: 0,
            is_dir: true,
            parent: None,
            first_child: None,
            next_sibling: None,
            is_new: false,
            is_deleted: false,
            deleted_size: 0,
        }
    }
}
