//! Container data structures for the threading forest
//!
//! The forest is an arena of [`ThreadNode`]s addressed by index. Parent, first
//! child and sibling links are stored as indices, so the whole forest is
//! dropped at once when it is rebuilt. Callers hold [`NodeId`] handles, which
//! carry the generation of the forest they came from; a handle from an older
//! build is rejected instead of silently pointing at an unrelated node.

use crate::error::{Result, ThreadError};
use crate::index::RecordId;

use super::tree_glyphs::TreeGlyph;

/// Generation-tagged handle to a node of the current forest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    index: usize,
    generation: u32,
}

impl NodeId {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

/// What a node stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A message present in the index
    Message(RecordId),
    /// A message referenced by others but not present locally
    Dummy,
    /// Synthetic parent grouping root threads with the same subject
    Group,
}

/// A node in the thread forest.
///
/// Dummy nodes are created for ids that show up in References but have no
/// record; they are pruned at the end of a build unless they hold at least
/// two children together.
#[derive(Debug, Clone)]
pub struct ThreadNode {
    pub(crate) kind: NodeKind,

    /// Normalized Message-ID this node is keyed by (None for anonymous
    /// messages and groups)
    pub(crate) message_id: Option<String>,

    pub(crate) parent: Option<usize>,
    pub(crate) child: Option<usize>,
    pub(crate) last_child: Option<usize>,
    pub(crate) next: Option<usize>,
    pub(crate) prev: Option<usize>,

    pub(crate) collapsed: bool,

    /// No ancestor is collapsed
    pub(crate) display_visible: bool,

    pub(crate) virtual_index: Option<usize>,

    /// Parent was found through the subject fallback, not through headers
    pub(crate) subject_linked: bool,

    /// Slot is no longer part of the forest
    pub(crate) pruned: bool,

    pub(crate) tree: Vec<TreeGlyph>,
}

impl ThreadNode {
    fn new(kind: NodeKind, message_id: Option<String>) -> Self {
        ThreadNode {
            kind,
            message_id,
            parent: None,
            child: None,
            last_child: None,
            next: None,
            prev: None,
            collapsed: false,
            display_visible: true,
            virtual_index: None,
            subject_linked: false,
            pruned: false,
            tree: Vec::new(),
        }
    }

    pub fn record(&self) -> Option<RecordId> {
        match self.kind {
            NodeKind::Message(id) => Some(id),
            NodeKind::Dummy | NodeKind::Group => None,
        }
    }

    pub fn is_dummy(&self) -> bool {
        self.kind == NodeKind::Dummy
    }
}

/// Arena holding one generation of the thread forest.
#[derive(Debug, Clone, Default)]
pub struct Forest {
    generation: u32,
    pub(crate) nodes: Vec<ThreadNode>,
    first_root: Option<usize>,
    last_root: Option<usize>,
    by_record: Vec<Option<usize>>,
    pub(crate) virtual_order: Vec<usize>,
}

impl Forest {
    pub fn new(generation: u32, record_count: usize) -> Self {
        Forest {
            generation,
            nodes: Vec::with_capacity(record_count),
            first_root: None,
            last_root: None,
            by_record: vec![None; record_count],
            virtual_order: Vec::new(),
        }
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Number of live nodes (pruned slots excluded).
    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|n| !n.pruned).count()
    }

    pub fn is_empty(&self) -> bool {
        self.first_root.is_none()
    }

    /// Create a node and append it to the root list.
    pub(crate) fn add_node(&mut self, kind: NodeKind, message_id: Option<String>) -> usize {
        let idx = self.nodes.len();
        self.nodes.push(ThreadNode::new(kind, message_id));
        if let NodeKind::Message(record) = kind {
            if record.0 >= self.by_record.len() {
                self.by_record.resize(record.0 + 1, None);
            }
            self.by_record[record.0] = Some(idx);
        }
        self.append(None, idx);
        idx
    }

    pub(crate) fn node(&self, idx: usize) -> &ThreadNode {
        &self.nodes[idx]
    }

    pub(crate) fn node_mut(&mut self, idx: usize) -> &mut ThreadNode {
        &mut self.nodes[idx]
    }

    pub(crate) fn handle(&self, idx: usize) -> NodeId {
        NodeId {
            index: idx,
            generation: self.generation,
        }
    }

    /// Check a handle against this forest and return its arena slot.
    pub fn resolve(&self, id: NodeId) -> Result<usize> {
        if id.generation != self.generation {
            return Err(ThreadError::StaleHandle {
                current: self.generation,
                found: id.generation,
            });
        }
        match self.nodes.get(id.index) {
            Some(node) if !node.pruned => Ok(id.index),
            _ => Err(ThreadError::UnknownNode(id.index)),
        }
    }

    pub(crate) fn node_for_record(&self, record: RecordId) -> Option<usize> {
        self.by_record.get(record.0).copied().flatten()
    }

    pub(crate) fn record(&self, idx: usize) -> Option<RecordId> {
        self.nodes[idx].record()
    }

    pub(crate) fn roots(&self) -> Vec<usize> {
        self.siblings_from(self.first_root).collect()
    }

    pub(crate) fn children(&self, idx: usize) -> Vec<usize> {
        self.siblings_from(self.nodes[idx].child).collect()
    }

    pub(crate) fn child_count(&self, idx: usize) -> usize {
        self.siblings_from(self.nodes[idx].child).count()
    }

    pub(crate) fn siblings_from(&self, first: Option<usize>) -> SiblingIter<'_> {
        SiblingIter {
            forest: self,
            current: first,
        }
    }

    /// Walk from the parent of `idx` up to its thread root.
    pub(crate) fn ancestors(&self, idx: usize) -> AncestorIter<'_> {
        AncestorIter {
            forest: self,
            current: self.nodes[idx].parent,
        }
    }

    pub(crate) fn thread_root(&self, idx: usize) -> usize {
        self.ancestors(idx).last().unwrap_or(idx)
    }

    /// Pre-order walk of the subtree rooted at `top`, including `top`.
    pub(crate) fn subtree(&self, top: usize) -> Vec<usize> {
        let mut out = vec![top];
        let Some(mut cur) = self.nodes[top].child else {
            return out;
        };

        loop {
            out.push(cur);
            if let Some(child) = self.nodes[cur].child {
                cur = child;
                continue;
            }
            loop {
                if let Some(next) = self.nodes[cur].next {
                    cur = next;
                    break;
                }
                match self.nodes[cur].parent {
                    Some(parent) if parent != top => cur = parent,
                    _ => return out,
                }
            }
        }
    }

    /// Pre-order walk of the whole forest in display order.
    pub(crate) fn preorder(&self) -> Vec<usize> {
        let mut out = Vec::with_capacity(self.nodes.len());
        for root in self.siblings_from(self.first_root) {
            out.extend(self.subtree(root));
        }
        out
    }

    /// Detach a node from its sibling list. Its own children stay attached.
    pub(crate) fn unlink(&mut self, idx: usize) {
        let (parent, prev, next) = {
            let node = &self.nodes[idx];
            (node.parent, node.prev, node.next)
        };

        match prev {
            Some(p) => self.nodes[p].next = next,
            None => match parent {
                Some(p) => self.nodes[p].child = next,
                None => {
                    if self.first_root == Some(idx) {
                        self.first_root = next;
                    }
                }
            },
        }
        match next {
            Some(n) => self.nodes[n].prev = prev,
            None => match parent {
                Some(p) => self.nodes[p].last_child = prev,
                None => {
                    if self.last_root == Some(idx) {
                        self.last_root = prev;
                    }
                }
            },
        }

        let node = &mut self.nodes[idx];
        node.parent = None;
        node.prev = None;
        node.next = None;
    }

    /// Append a detached node at the end of `parent`'s children, or of the
    /// root list when `parent` is `None`.
    pub(crate) fn append(&mut self, parent: Option<usize>, idx: usize) {
        let tail = match parent {
            Some(p) => self.nodes[p].last_child,
            None => self.last_root,
        };

        {
            let node = &mut self.nodes[idx];
            node.parent = parent;
            node.prev = tail;
            node.next = None;
        }

        match tail {
            Some(t) => self.nodes[t].next = Some(idx),
            None => match parent {
                Some(p) => self.nodes[p].child = Some(idx),
                None => self.first_root = Some(idx),
            },
        }
        match parent {
            Some(p) => self.nodes[p].last_child = Some(idx),
            None => self.last_root = Some(idx),
        }
    }

    /// Place a node (with its subtree) right before `anchor` in `anchor`'s list.
    pub(crate) fn insert_before(&mut self, anchor: usize, idx: usize) {
        self.unlink(idx);

        let (parent, prev) = {
            let node = &self.nodes[anchor];
            (node.parent, node.prev)
        };
        {
            let node = &mut self.nodes[idx];
            node.parent = parent;
            node.prev = prev;
            node.next = Some(anchor);
        }
        self.nodes[anchor].prev = Some(idx);

        match prev {
            Some(p) => self.nodes[p].next = Some(idx),
            None => match parent {
                Some(p) => self.nodes[p].child = Some(idx),
                None => self.first_root = Some(idx),
            },
        }
    }

    /// Move `idx` (with its subtree) under `parent`, at the end of its children.
    pub(crate) fn attach(&mut self, idx: usize, parent: Option<usize>) {
        self.unlink(idx);
        self.append(parent, idx);
    }

    /// Put `replacement` in the exact sibling position of `old` and retire `old`.
    pub(crate) fn replace(&mut self, old: usize, replacement: usize) {
        self.unlink(replacement);

        let (parent, prev, next) = {
            let node = &self.nodes[old];
            (node.parent, node.prev, node.next)
        };
        {
            let node = &mut self.nodes[replacement];
            node.parent = parent;
            node.prev = prev;
            node.next = next;
        }

        match prev {
            Some(p) => self.nodes[p].next = Some(replacement),
            None => match parent {
                Some(p) => self.nodes[p].child = Some(replacement),
                None => self.first_root = Some(replacement),
            },
        }
        match next {
            Some(n) => self.nodes[n].prev = Some(replacement),
            None => match parent {
                Some(p) => self.nodes[p].last_child = Some(replacement),
                None => self.last_root = Some(replacement),
            },
        }

        self.retire(old);
    }

    /// Unlink a node and mark its slot dead. Remaining children become roots.
    pub(crate) fn remove(&mut self, idx: usize) {
        for child in self.children(idx) {
            self.attach(child, None);
        }
        self.unlink(idx);
        self.retire(idx);
    }

    fn retire(&mut self, idx: usize) {
        let node = &mut self.nodes[idx];
        node.parent = None;
        node.prev = None;
        node.next = None;
        node.child = None;
        node.last_child = None;
        node.pruned = true;
        if let NodeKind::Message(record) = node.kind {
            if self.by_record.get(record.0) == Some(&Some(idx)) {
                self.by_record[record.0] = None;
            }
        }
    }

    /// Rewrite the sibling list of `parent` to follow `order`
    ///
    /// `order` must be a permutation of the current children of `parent` (or
    /// of the roots when `parent` is `None`).
    pub(crate) fn set_children(&mut self, parent: Option<usize>, order: &[usize]) {
        let mut prev: Option<usize> = None;
        for &idx in order {
            let node = &mut self.nodes[idx];
            node.parent = parent;
            node.prev = prev;
            node.next = None;
            if let Some(p) = prev {
                self.nodes[p].next = Some(idx);
            }
            prev = Some(idx);
        }

        let first = order.first().copied();
        match parent {
            Some(p) => {
                self.nodes[p].child = first;
                self.nodes[p].last_child = prev;
            }
            None => {
                self.first_root = first;
                self.last_root = prev;
            }
        }
    }

    pub fn virtual_len(&self) -> usize {
        self.virtual_order.len()
    }

    pub(crate) fn node_at_virtual(&self, position: usize) -> Option<usize> {
        self.virtual_order.get(position).copied()
    }
}

pub struct SiblingIter<'a> {
    forest: &'a Forest,
    current: Option<usize>,
}

impl Iterator for SiblingIter<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let idx = self.current?;
        self.current = self.forest.nodes[idx].next;
        Some(idx)
    }
}

pub struct AncestorIter<'a> {
    forest: &'a Forest,
    current: Option<usize>,
}

impl Iterator for AncestorIter<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let idx = self.current?;
        self.current = self.forest.nodes[idx].parent;
        Some(idx)
    }
}

/// Read-only view of one node, handed out to the UI layer for rendering.
#[derive(Clone, Copy)]
pub struct ThreadNodeRef<'a> {
    forest: &'a Forest,
    index: usize,
}

impl<'a> ThreadNodeRef<'a> {
    pub(crate) fn new(forest: &'a Forest, index: usize) -> Self {
        ThreadNodeRef { forest, index }
    }

    fn node(&self) -> &'a ThreadNode {
        &self.forest.nodes[self.index]
    }

    fn link(&self, idx: Option<usize>) -> Option<NodeId> {
        idx.map(|i| self.forest.handle(i))
    }

    pub fn id(&self) -> NodeId {
        self.forest.handle(self.index)
    }

    pub fn kind(&self) -> NodeKind {
        self.node().kind
    }

    pub fn record(&self) -> Option<RecordId> {
        self.node().record()
    }

    pub fn message_id(&self) -> Option<&'a str> {
        self.node().message_id.as_deref()
    }

    pub fn is_dummy(&self) -> bool {
        self.node().is_dummy()
    }

    pub fn collapsed(&self) -> bool {
        self.node().collapsed
    }

    pub fn display_visible(&self) -> bool {
        self.node().display_visible
    }

    pub fn virtual_index(&self) -> Option<usize> {
        self.node().virtual_index
    }

    pub fn subject_linked(&self) -> bool {
        self.node().subject_linked
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.link(self.node().parent)
    }

    pub fn first_child(&self) -> Option<NodeId> {
        self.link(self.node().child)
    }

    pub fn next_sibling(&self) -> Option<NodeId> {
        self.link(self.node().next)
    }

    pub fn prev_sibling(&self) -> Option<NodeId> {
        self.link(self.node().prev)
    }

    pub fn depth(&self) -> usize {
        self.forest.ancestors(self.index).count()
    }

    /// Tree prefix glyphs computed by the last virtual numbering pass.
    pub fn tree(&self) -> &'a [TreeGlyph] {
        &self.node().tree
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(forest: &mut Forest, slot: usize) -> usize {
        forest.add_node(NodeKind::Message(RecordId(slot)), Some(format!("m{}", slot)))
    }

    #[test]
    fn test_attach_and_preorder() {
        let mut forest = Forest::new(1, 4);
        let a = message(&mut forest, 0);
        let b = message(&mut forest, 1);
        let c = message(&mut forest, 2);
        let d = message(&mut forest, 3);

        forest.attach(b, Some(a));
        forest.attach(c, Some(b));
        forest.attach(d, Some(a));

        assert_eq!(forest.roots(), vec![a]);
        assert_eq!(forest.children(a), vec![b, d]);
        assert_eq!(forest.preorder(), vec![a, b, c, d]);
        assert_eq!(forest.subtree(b), vec![b, c]);
        assert_eq!(forest.thread_root(c), a);
    }

    #[test]
    fn test_replace_keeps_position() {
        let mut forest = Forest::new(1, 3);
        let a = message(&mut forest, 0);
        let dummy = forest.add_node(NodeKind::Dummy, Some("gone".to_string()));
        let c = message(&mut forest, 2);
        forest.attach(c, Some(dummy));

        forest.replace(dummy, c);

        assert_eq!(forest.roots(), vec![a, c]);
        assert!(forest.node(dummy).pruned);
        assert_eq!(forest.node(c).parent, None);
        assert_eq!(forest.len(), 2);
    }

    #[test]
    fn test_remove_promotes_children() {
        let mut forest = Forest::new(1, 2);
        let dummy = forest.add_node(NodeKind::Dummy, None);
        let a = message(&mut forest, 0);
        forest.attach(a, Some(dummy));

        forest.remove(dummy);

        assert_eq!(forest.roots(), vec![a]);
        assert_eq!(forest.node_for_record(RecordId(0)), Some(a));
    }

    #[test]
    fn test_set_children_reorders() {
        let mut forest = Forest::new(1, 3);
        let a = message(&mut forest, 0);
        let b = message(&mut forest, 1);
        let c = message(&mut forest, 2);

        forest.set_children(None, &[c, a, b]);

        assert_eq!(forest.roots(), vec![c, a, b]);
        assert_eq!(forest.node(b).prev, Some(a));
        forest.unlink(b);
        assert_eq!(forest.roots(), vec![c, a]);
        forest.append(None, b);
        assert_eq!(forest.roots(), vec![c, a, b]);
    }

    #[test]
    fn test_stale_handle_rejected() {
        let mut old = Forest::new(1, 1);
        let a = message(&mut old, 0);
        let handle = old.handle(a);

        let mut fresh = Forest::new(2, 1);
        message(&mut fresh, 0);

        assert!(matches!(
            fresh.resolve(handle),
            Err(ThreadError::StaleHandle { current: 2, found: 1 })
        ));
        assert_eq!(old.resolve(handle).unwrap(), a);
    }

    #[test]
    fn test_out_of_range_handle_rejected() {
        let mut forest = Forest::new(1, 1);
        message(&mut forest, 0);

        assert!(matches!(
            forest.resolve(forest.handle(99)),
            Err(ThreadError::UnknownNode(99))
        ));
    }
}
