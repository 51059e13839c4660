/// Arena-backed size tree with bottom-up aggregation and live change
/// tracking.
///
/// All nodes live in one flat `Vec<Node>`. Construction (the walker) links
/// nodes without touching sizes and runs [`FsTree::compute_sizes`] once;
/// the watch phase instead uses the propagating mutators
/// ([`FsTree::add_child`], [`FsTree::graft`], [`FsTree::mark_deleted`])
/// which keep directory totals consistent per operation.
///
/// Arena order invariant: every node is appended after its parent, so a
/// reverse index scan always visits children before parents.
use super::node::{Node, NodeId};
use crate::error::{Error, Result};
use compact_str::CompactString;
use std::path::{Component, Path, PathBuf};

/// Nodes visited between cooperative yields in the long aggregation pass.
const AGGREGATE_YIELD_INTERVAL: usize = 512;

/// Nodes copied between cooperative yields when grafting a subtree.
const GRAFT_YIELD_INTERVAL: usize = 200;

/// The size tree produced by a scan, rooted at a single canonical path.
#[derive(Debug, Clone)]
pub struct FsTree {
    nodes: Vec<Node>,
    root: NodeId,
    root_path: PathBuf,
}

impl FsTree {
    /// Create a tree containing only the root node.
    ///
    /// `root_path` must already be canonical — the walker canonicalizes
    /// before construction, and [`find_by_path`](Self::find_by_path)
    /// resolves event paths against it by prefix.
    pub fn new(root_path: PathBuf, is_dir: bool) -> Self {
        let name = root_display_name(&root_path);
        let root_node = if is_dir {
            Node::dir(name)
        } else {
            Node::file(name, 0)
        };
        Self {
            nodes: vec![root_node],
            root: NodeId(0),
            root_path,
        }
    }

    #[inline]
    pub fn root(&self) -> NodeId {
        self.root
    }

    #[inline]
    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    #[inline]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.idx()]
    }

    #[inline]
    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.idx()]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Cumulative size of the whole tree. Meaningful after
    /// [`compute_sizes`](Self::compute_sizes) or once all mutations have
    /// gone through the propagating operations.
    #[inline]
    pub fn total_size(&self) -> u64 {
        self.nodes[self.root.idx()].size
    }

    /// Allocate a node in the arena without linking it anywhere.
    pub fn add_node(&mut self, node: Node) -> NodeId {
        let id = NodeId::new(self.nodes.len());
        self.nodes.push(node);
        id
    }

    /// Link `child` under `parent`, prepending to the sibling list.
    ///
    /// O(1); sizes are untouched — scan construction runs
    /// [`compute_sizes`](Self::compute_sizes) once at the end instead of
    /// propagating per insert.
    pub fn link_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        if self.nodes[child.idx()].parent.is_some() {
            return Err(Error::InvariantViolation("child is already linked"));
        }
        if !self.nodes[parent.idx()].is_dir {
            return Err(Error::InvariantViolation("parent is not a directory"));
        }
        let old_first = self.nodes[parent.idx()].first_child;
        self.nodes[child.idx()].next_sibling = old_first;
        self.nodes[child.idx()].parent = Some(parent);
        self.nodes[parent.idx()].first_child = Some(child);
        Ok(())
    }

    /// Insert `node` under `parent` and add its size to every ancestor.
    ///
    /// This is the watch-phase insert: totals stay consistent without a
    /// full aggregation pass.
    pub fn add_child(&mut self, parent: NodeId, node: Node) -> Result<NodeId> {
        let size = node.size;
        let id = self.add_node(node);
        self.link_child(parent, id)?;
        self.propagate_size(parent, size);
        Ok(id)
    }

    /// Splice a separately-scanned subtree under `parent`.
    ///
    /// The subtree's arena is appended with all indices rebased, its root
    /// is flagged `is_new`, and its total is added to every ancestor.
    /// Returns the rebased id of the subtree root.
    pub fn graft(&mut self, parent: NodeId, sub: FsTree) -> Result<NodeId> {
        if !self.nodes[parent.idx()].is_dir {
            return Err(Error::InvariantViolation("graft target is not a directory"));
        }

        let base = self.nodes.len() as u32;
        let rebase = |id: Option<NodeId>| id.map(|n| NodeId(n.0 + base));

        self.nodes.reserve(sub.nodes.len());
        for (i, mut node) in sub.nodes.into_iter().enumerate() {
            node.parent = rebase(node.parent);
            node.first_child = rebase(node.first_child);
            node.next_sibling = rebase(node.next_sibling);
            self.nodes.push(node);
            if i % GRAFT_YIELD_INTERVAL == GRAFT_YIELD_INTERVAL - 1 {
                std::thread::yield_now();
            }
        }

        let sub_root = NodeId(sub.root.0 + base);
        self.nodes[sub_root.idx()].is_new = true;
        let size = self.nodes[sub_root.idx()].size;
        self.link_child(parent, sub_root)?;
        self.propagate_size(parent, size);
        Ok(sub_root)
    }

    /// Flag a node as deleted and record its size in `deleted_size` of the
    /// node and every ancestor. The subtree stays in the tree so it can
    /// still be displayed.
    ///
    /// Idempotent: returns `None` if the node was already marked, otherwise
    /// the size snapshotted at deletion time.
    pub fn mark_deleted(&mut self, id: NodeId) -> Option<u64> {
        if self.nodes[id.idx()].is_deleted {
            return None;
        }
        let size = self.nodes[id.idx()].size;
        self.nodes[id.idx()].is_deleted = true;

        let mut cursor = Some(id);
        while let Some(cur) = cursor {
            self.nodes[cur.idx()].deleted_size += size;
            cursor = self.nodes[cur.idx()].parent;
        }
        Some(size)
    }

    /// `true` if the node or any of its ancestors is marked deleted.
    ///
    /// The watch loop uses this to drop redundant events when the OS
    /// reports both a directory and its contents as removed.
    pub fn in_deleted_subtree(&self, id: NodeId) -> bool {
        let mut cursor = Some(id);
        while let Some(cur) = cursor {
            if self.nodes[cur.idx()].is_deleted {
                return true;
            }
            cursor = self.nodes[cur.idx()].parent;
        }
        false
    }

    /// Fill in directory sizes in one bottom-up pass.
    ///
    /// Iterating the arena in reverse visits children before parents (see
    /// the arena order invariant above), giving O(n) aggregation with no
    /// recursion. Directory sizes are reset first so repeated calls do not
    /// accumulate. Yields to the scheduler every few hundred nodes so a
    /// multi-million-node pass does not starve other threads.
    pub fn compute_sizes(&mut self) {
        for node in self.nodes.iter_mut() {
            if node.is_dir {
                node.size = 0;
            }
        }

        for i in (0..self.nodes.len()).rev() {
            let size = self.nodes[i].size;
            if let Some(parent) = self.nodes[i].parent {
                self.nodes[parent.idx()].size += size;
            }
            if i % AGGREGATE_YIELD_INTERVAL == 0 {
                std::thread::yield_now();
            }
        }
    }

    /// Direct children of `id`, in current sibling-list order.
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut child = self.nodes[id.idx()].first_child;
        while let Some(c) = child {
            out.push(c);
            child = self.nodes[c.idx()].next_sibling;
        }
        out
    }

    /// Direct children in canonical order: size descending, ties broken by
    /// name ascending. This is the order the layout engine consumes.
    pub fn sorted_children(&self, id: NodeId) -> Vec<NodeId> {
        let mut children = self.children(id);
        children.sort_unstable_by(|a, b| {
            let an = &self.nodes[a.idx()];
            let bn = &self.nodes[b.idx()];
            bn.size
                .cmp(&an.size)
                .then_with(|| an.name.cmp(&bn.name))
        });
        children
    }

    /// Rewrite the sibling list of `id` into canonical order.
    pub fn sort_children_by_size(&mut self, id: NodeId) {
        let sorted = self.sorted_children(id);
        let mut next: Option<NodeId> = None;
        for &child in sorted.iter().rev() {
            self.nodes[child.idx()].next_sibling = next;
            next = Some(child);
        }
        self.nodes[id.idx()].first_child = next;
    }

    /// Sort every directory's children into canonical order, making
    /// iteration deterministic for navigation and layout.
    pub fn canonicalize_order(&mut self) {
        for i in 0..self.nodes.len() {
            if self.nodes[i].is_dir {
                self.sort_children_by_size(NodeId::new(i));
            }
        }
    }

    /// Resolve an absolute path to a node by descending name components
    /// from the root. Returns `None` for paths outside the tree.
    pub fn find_by_path(&self, path: &Path) -> Option<NodeId> {
        let relative = path.strip_prefix(&self.root_path).ok()?;
        let mut cursor = self.root;
        for component in relative.components() {
            let Component::Normal(name) = component else {
                continue;
            };
            let name = name.to_string_lossy();
            let mut child = self.nodes[cursor.idx()].first_child;
            let mut found = None;
            while let Some(c) = child {
                if self.nodes[c.idx()].name.as_str() == name {
                    found = Some(c);
                    break;
                }
                child = self.nodes[c.idx()].next_sibling;
            }
            cursor = found?;
        }
        Some(cursor)
    }

    /// Reconstruct the absolute path of a node from its name chain.
    pub fn full_path(&self, id: NodeId) -> PathBuf {
        let mut segments: Vec<&str> = Vec::new();
        let mut cursor = id;
        while cursor != self.root {
            segments.push(self.nodes[cursor.idx()].name.as_str());
            match self.nodes[cursor.idx()].parent {
                Some(p) => cursor = p,
                None => break,
            }
        }
        let mut path = self.root_path.clone();
        for segment in segments.into_iter().rev() {
            path.push(segment);
        }
        path
    }

    fn propagate_size(&mut self, from: NodeId, delta: u64) {
        let mut cursor = Some(from);
        while let Some(cur) = cursor {
            self.nodes[cur.idx()].size += delta;
            cursor = self.nodes[cur.idx()].parent;
        }
    }
}

/// Display name for a scan root: the basename, or the path itself for
/// filesystem roots like `/`.
fn root_display_name(path: &Path) -> CompactString {
    match path.file_name() {
        Some(name) => CompactString::new(name.to_string_lossy()),
        None => CompactString::new(path.to_string_lossy()),
    }
}
