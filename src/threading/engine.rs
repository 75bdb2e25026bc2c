//! Threading engine
//!
//! Owns the forest of the current mailbox view together with the settings
//! and collapse state that survive rebuilds. Callers address nodes with
//! [`NodeId`] handles; every rebuild bumps the generation so handles from an
//! older forest fail with [`crate::error::ThreadError::StaleHandle`] instead
//! of resolving to some unrelated node. Sorting and collapsing keep the
//! generation.

use crate::config::{SortMethod, SortSpec, ThreadingConfig};
use crate::error::Result;
use crate::index::{MessageFlag, MessageIndex, RecordId};

use super::algorithm::{BuildOptions, BuildStats, build_forest};
use super::collapse_state::CollapseState;
use super::container::{Forest, NodeId, ThreadNodeRef};
use super::sort::{RecordComparator, SortOptions, record_comparator, sort_forest};
use super::subject_matching::{ReplyPrefixNormalizer, SubjectNormalizer};
use super::traversal::{self, Direction, ThreadCount, TraverseOp, TraverseOutcome};
use super::tree_glyphs::{DrawOptions, draw_tree, render_glyphs};
use super::virtual_index::assign_virtual;

pub struct ThreadEngine {
    config: ThreadingConfig,
    normalizer: Box<dyn SubjectNormalizer>,
    collapse_state: CollapseState,
    forest: Forest,
    generation: u32,
}

impl ThreadEngine {
    /// Create an engine using the configured reply pattern.
    ///
    /// An invalid pattern is logged and replaced by the default one.
    pub fn new(config: ThreadingConfig) -> Self {
        let normalizer = ReplyPrefixNormalizer::new(&config.reply_regex).unwrap_or_else(|err| {
            log::warn!(
                "invalid reply regex '{}', using the default: {}",
                config.reply_regex,
                err
            );
            ReplyPrefixNormalizer::default()
        });
        Self::with_normalizer(config, Box::new(normalizer))
    }

    pub fn with_normalizer(
        config: ThreadingConfig,
        normalizer: Box<dyn SubjectNormalizer>,
    ) -> Self {
        ThreadEngine {
            config,
            normalizer,
            collapse_state: CollapseState::new(),
            forest: Forest::default(),
            generation: 0,
        }
    }

    pub fn config(&self) -> &ThreadingConfig {
        &self.config
    }

    /// Change the sort order. Takes effect on the next [`ThreadEngine::sort`].
    pub fn set_sort(&mut self, sort: SortSpec) {
        self.config.sort = sort;
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn collapse_state(&self) -> &CollapseState {
        &self.collapse_state
    }

    /// Replace the collapse state (e.g. one loaded from disk) and apply it.
    pub fn restore_collapse_state(&mut self, index: &MessageIndex, state: CollapseState) {
        self.collapse_state = state;
        self.collapse_state.apply(&mut self.forest);
        self.assign_virtual(index);
    }

    /// Thread the whole index from scratch
    ///
    /// Discards the previous forest, reapplies the remembered collapse state,
    /// runs the initial sort and renumbers. Handles from before the call
    /// become stale.
    pub fn build(&mut self, index: &MessageIndex) -> BuildStats {
        self.generation = self.generation.wrapping_add(1);

        let options = BuildOptions {
            strict_threads: self.config.strict_threads,
            sort_re: self.config.sort_re,
            duplicates: self.config.duplicates,
            normalizer: self.normalizer.as_ref(),
        };
        let (forest, stats) = build_forest(index, self.generation, &options);
        self.forest = forest;

        let collapsed = self.collapse_state.apply(&mut self.forest);
        self.sort(index, true);

        log::info!(
            "Threaded {} messages into {} threads (generation {}, {} collapsed)",
            stats.records,
            stats.roots,
            self.generation,
            collapsed
        );
        stats
    }

    /// Drop the forest. Collapse state is kept for the next build.
    pub fn clear(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        self.forest = Forest::new(self.generation, 0);
    }

    /// Re-sort with the configured method and renumber.
    pub fn sort(&mut self, index: &MessageIndex, initial: bool) {
        let spec = self.config.sort;
        let options = SortOptions {
            reverse: spec.reverse,
            last: spec.last,
            initial,
            group_by_subject: self.config.group_by_subject && spec.method == SortMethod::Subject,
        };

        let groups = {
            let compare = record_comparator(spec.method, self.normalizer.as_ref());
            sort_forest(&mut self.forest, index, &*compare, options, self.normalizer.as_ref())
        };
        if groups > 0 {
            log::debug!("Grouped root threads into {} subject groups", groups);
        }
        self.assign_virtual(index);
    }

    /// Re-sort with a caller supplied comparator and renumber.
    pub fn sort_with(
        &mut self,
        index: &MessageIndex,
        compare: &RecordComparator<'_>,
        options: SortOptions,
    ) -> usize {
        let groups = sort_forest(
            &mut self.forest,
            index,
            compare,
            options,
            self.normalizer.as_ref(),
        );
        self.assign_virtual(index);
        groups
    }

    /// Renumber displayed messages and redraw the tree
    ///
    /// Needed after the limit or the visibility of records changes. Returns
    /// the number of displayed messages.
    pub fn assign_virtual(&mut self, index: &MessageIndex) -> usize {
        let count = assign_virtual(&mut self.forest, index);
        let options = DrawOptions {
            hide_missing: self.config.hide_missing,
            hide_limited: self.config.hide_limited,
        };
        draw_tree(&mut self.forest, index, options);
        count
    }

    fn resolve(&self, id: NodeId) -> Result<usize> {
        self.forest.resolve(id)
    }

    fn handle(&self, idx: usize) -> NodeId {
        self.forest.handle(idx)
    }

    pub fn node(&self, id: NodeId) -> Result<ThreadNodeRef<'_>> {
        let idx = self.resolve(id)?;
        Ok(ThreadNodeRef::new(&self.forest, idx))
    }

    pub fn roots(&self) -> Vec<NodeId> {
        self.forest.roots().into_iter().map(|idx| self.handle(idx)).collect()
    }

    pub fn children(&self, id: NodeId) -> Result<Vec<NodeId>> {
        let idx = self.resolve(id)?;
        Ok(self
            .forest
            .children(idx)
            .into_iter()
            .map(|child| self.handle(child))
            .collect())
    }

    pub fn node_for_record(&self, record: RecordId) -> Option<NodeId> {
        self.forest
            .node_for_record(record)
            .map(|idx| self.handle(idx))
    }

    /// Node displayed at a virtual position.
    pub fn node_at_virtual(&self, position: usize) -> Option<NodeId> {
        self.forest
            .node_at_virtual(position)
            .map(|idx| self.handle(idx))
    }

    pub fn virtual_len(&self) -> usize {
        self.forest.virtual_len()
    }

    /// Records of the displayed messages in screen order.
    pub fn display_records(&self) -> Vec<RecordId> {
        self.forest
            .virtual_order
            .iter()
            .filter_map(|&idx| self.forest.record(idx))
            .collect()
    }

    /// Tree prefix of a node rendered as ASCII.
    pub fn tree_prefix(&self, id: NodeId) -> Result<String> {
        let idx = self.resolve(id)?;
        Ok(render_glyphs(
            &self.forest.node(idx).tree,
            self.config.narrow_tree,
        ))
    }

    pub fn aside(
        &self,
        id: NodeId,
        direction: Direction,
        subthread_only: bool,
    ) -> Result<Option<NodeId>> {
        let idx = self.resolve(id)?;
        Ok(traversal::aside(&self.forest, idx, direction, subthread_only)
            .map(|i| self.handle(i)))
    }

    pub fn next_thread(&self, id: NodeId) -> Result<Option<NodeId>> {
        self.aside(id, Direction::Forward, false)
    }

    pub fn previous_thread(&self, id: NodeId) -> Result<Option<NodeId>> {
        self.aside(id, Direction::Backward, false)
    }

    pub fn next_subthread(&self, id: NodeId) -> Result<Option<NodeId>> {
        self.aside(id, Direction::Forward, true)
    }

    pub fn previous_subthread(&self, id: NodeId) -> Result<Option<NodeId>> {
        self.aside(id, Direction::Backward, true)
    }

    /// Apply a subtree operation to the node.
    pub fn traverse(
        &mut self,
        index: &MessageIndex,
        id: NodeId,
        op: TraverseOp,
    ) -> Result<TraverseOutcome> {
        match op {
            TraverseOp::Collapse => self.collapse(index, id).map(TraverseOutcome::Changed),
            TraverseOp::Uncollapse => self.uncollapse(index, id).map(TraverseOutcome::Changed),
            TraverseOp::GetHidden => self.hidden_count(index, id).map(TraverseOutcome::Hidden),
            TraverseOp::ContainsUnread => {
                self.contains_unread(index, id).map(TraverseOutcome::Contains)
            }
            TraverseOp::ContainsFlagged => {
                self.contains_flagged(index, id).map(TraverseOutcome::Contains)
            }
            TraverseOp::NextUnread => self.next_unread(index, id).map(TraverseOutcome::Next),
        }
    }

    fn set_collapsed(&mut self, index: &MessageIndex, idx: usize, collapsed: bool) -> bool {
        let node = self.forest.node_mut(idx);
        if node.collapsed == collapsed {
            return false;
        }
        node.collapsed = collapsed;
        if let Some(message_id) = node.message_id.as_deref() {
            self.collapse_state.set(message_id, collapsed);
        }
        self.assign_virtual(index);
        true
    }

    /// Collapse the subtree under a node
    ///
    /// With `collapse_unread` off, a subtree holding unread mail is left
    /// open. Returns whether the node changed.
    pub fn collapse(&mut self, index: &MessageIndex, id: NodeId) -> Result<bool> {
        let idx = self.resolve(id)?;
        if !self.config.collapse_unread && traversal::contains_unread(&self.forest, index, idx) {
            log::debug!("Not collapsing {:?}: thread has unread messages", id);
            return Ok(false);
        }
        Ok(self.set_collapsed(index, idx, true))
    }

    pub fn uncollapse(&mut self, index: &MessageIndex, id: NodeId) -> Result<bool> {
        let idx = self.resolve(id)?;
        Ok(self.set_collapsed(index, idx, false))
    }

    /// Collapse or expand every thread. Returns how many threads changed.
    pub fn collapse_all(&mut self, index: &MessageIndex, collapsed: bool) -> usize {
        let keep_unread_open = !self.config.collapse_unread;
        let changed = traversal::collapse_all(&mut self.forest, index, collapsed, keep_unread_open);
        for &root in &changed {
            if let Some(message_id) = self.forest.node(root).message_id.as_deref() {
                self.collapse_state.set(message_id, collapsed);
            }
        }
        self.assign_virtual(index);
        changed.len()
    }

    pub fn hidden_count(&self, index: &MessageIndex, id: NodeId) -> Result<usize> {
        let idx = self.resolve(id)?;
        Ok(traversal::hidden_count(&self.forest, index, idx))
    }

    pub fn contains_unread(&self, index: &MessageIndex, id: NodeId) -> Result<bool> {
        let idx = self.resolve(id)?;
        Ok(traversal::contains_unread(&self.forest, index, idx))
    }

    pub fn contains_flagged(&self, index: &MessageIndex, id: NodeId) -> Result<bool> {
        let idx = self.resolve(id)?;
        Ok(traversal::contains_flagged(&self.forest, index, idx))
    }

    /// First unread message under the node after it, wrapping back to the
    /// node itself. Never leaves the node's subtree.
    pub fn next_unread(&self, index: &MessageIndex, id: NodeId) -> Result<Option<NodeId>> {
        let idx = self.resolve(id)?;
        Ok(traversal::next_unread(&self.forest, index, idx).map(|i| self.handle(i)))
    }

    /// Nearest message above the node, or the thread's topmost message
    /// when `find_root` is set.
    pub fn parent_message(
        &self,
        index: &MessageIndex,
        id: NodeId,
        find_root: bool,
    ) -> Result<NodeId> {
        let idx = self.resolve(id)?;
        traversal::parent_message(&self.forest, index, idx, find_root).map(|i| self.handle(i))
    }

    pub fn messages_in_thread(&self, id: NodeId, count: ThreadCount) -> Result<usize> {
        let idx = self.resolve(id)?;
        Ok(traversal::messages_in_thread(&self.forest, idx, count))
    }

    /// Set a flag on the whole thread, or on the subthread under the node.
    pub fn set_thread_flag(
        &self,
        index: &mut MessageIndex,
        id: NodeId,
        flag: MessageFlag,
        value: bool,
        subthread_only: bool,
    ) -> Result<usize> {
        let idx = self.resolve(id)?;
        traversal::set_thread_flag(&self.forest, index, idx, flag, value, subthread_only)
    }
}

impl Default for ThreadEngine {
    fn default() -> Self {
        Self::new(ThreadingConfig::default())
    }
}
