//! Thread navigation and subtree queries
//!
//! Everything here works on arena slots of a single forest; the engine turns
//! caller handles into slots before calling in and reruns virtual numbering
//! after anything that changes collapse state.

use crate::error::{Result, ThreadError};
use crate::index::{MessageFlag, MessageIndex, MessageRecord};

use super::algorithm::tree_traversal::{count_messages, is_limit_visible};
use super::container::{Forest, NodeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// Operations applied to the subtree under a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraverseOp {
    Collapse,
    Uncollapse,
    /// Count messages hidden by collapsing
    GetHidden,
    ContainsUnread,
    ContainsFlagged,
    /// First unread message under the node after it, wrapping around
    NextUnread,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraverseOutcome {
    /// Whether the collapse state changed
    Changed(bool),
    Hidden(usize),
    Contains(bool),
    Next(Option<NodeId>),
}

/// Which count [`messages_in_thread`] reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadCount {
    Total,
    /// 1-based position of the node among the thread's messages
    Position,
}

fn sibling(forest: &Forest, idx: usize, direction: Direction) -> Option<usize> {
    let node = forest.node(idx);
    match direction {
        Direction::Forward => node.next,
        Direction::Backward => node.prev,
    }
}

fn first_row(forest: &Forest, top: usize) -> Option<usize> {
    forest
        .subtree(top)
        .into_iter()
        .find(|&idx| forest.node(idx).virtual_index.is_some())
}

/// Move to the next or previous thread, or subthread when `subthread_only`.
///
/// Lands on the first displayed message of the sibling subtree, skipping
/// siblings with nothing displayed. Subthread moves climb to the nearest
/// ancestor that has a sibling in the requested direction and stop at the
/// thread root, so they never cross into another thread.
pub fn aside(
    forest: &Forest,
    start: usize,
    direction: Direction,
    subthread_only: bool,
) -> Option<usize> {
    let mut cur = if subthread_only {
        let mut cur = start;
        while sibling(forest, cur, direction).is_none() {
            cur = forest.node(cur).parent?;
        }
        if forest.node(cur).parent.is_none() {
            return None;
        }
        cur
    } else {
        forest.thread_root(start)
    };

    loop {
        cur = sibling(forest, cur, direction)?;
        if let Some(row) = first_row(forest, cur) {
            return Some(row);
        }
    }
}

/// Messages under `top` (excluding itself) the limit shows but a collapsed
/// ancestor hides.
pub fn hidden_count(forest: &Forest, index: &MessageIndex, top: usize) -> usize {
    count_messages(forest, top, false, |idx| {
        !forest.node(idx).display_visible && is_limit_visible(forest, index, idx)
    })
}

/// Whether any limit-visible message in the subtree matches `predicate`.
pub fn subtree_contains<F>(
    forest: &Forest,
    index: &MessageIndex,
    top: usize,
    predicate: F,
) -> bool
where
    F: Fn(&MessageRecord) -> bool,
{
    forest
        .subtree(top)
        .into_iter()
        .filter_map(|idx| forest.record(idx))
        .filter_map(|record| index.get(record))
        .any(|record| record.visible && predicate(record))
}

pub fn contains_unread(forest: &Forest, index: &MessageIndex, top: usize) -> bool {
    subtree_contains(forest, index, top, |record| !record.flags.read)
}

pub fn contains_flagged(forest: &Forest, index: &MessageIndex, top: usize) -> bool {
    subtree_contains(forest, index, top, |record| record.flags.flagged)
}

/// Next unread message in the subtree under `start`, scanning in display
/// order from just after `start` and wrapping back to it.
///
/// A match hidden by a collapsed ancestor is reported as the nearest
/// ancestor that has a row.
pub fn next_unread(forest: &Forest, index: &MessageIndex, start: usize) -> Option<usize> {
    let order = forest.subtree(start);

    let found = order[1..]
        .iter()
        .chain(order[..1].iter())
        .copied()
        .find(|&idx| {
            forest
                .record(idx)
                .and_then(|record| index.get(record))
                .is_some_and(|record| record.visible && !record.flags.read)
        })?;

    let displayed = std::iter::once(found)
        .chain(forest.ancestors(found))
        .find(|&idx| forest.node(idx).virtual_index.is_some());
    Some(displayed.unwrap_or(found))
}

/// Nearest ancestor holding a message, or the topmost one when `find_root`.
pub fn parent_message(
    forest: &Forest,
    index: &MessageIndex,
    start: usize,
    find_root: bool,
) -> Result<usize> {
    let mut found = None;
    for ancestor in forest.ancestors(start) {
        if forest.record(ancestor).is_some() {
            found = Some(ancestor);
            if !find_root {
                break;
            }
        }
    }

    let parent = found.ok_or(ThreadError::NoParent)?;
    if !is_limit_visible(forest, index, parent) {
        return Err(ThreadError::ParentNotVisible);
    }
    Ok(parent)
}

/// Count messages in the thread of `start`, or find its position there.
pub fn messages_in_thread(forest: &Forest, start: usize, count: ThreadCount) -> usize {
    let root = forest.thread_root(start);
    let mut messages = forest
        .subtree(root)
        .into_iter()
        .filter(|&idx| forest.record(idx).is_some());

    match count {
        ThreadCount::Total => messages.count(),
        ThreadCount::Position => messages
            .position(|idx| idx == start)
            .map(|position| position + 1)
            .unwrap_or(0),
    }
}

/// Set a flag on every message of the thread (or only the subtree under
/// `start`). Returns how many records changed.
pub fn set_thread_flag(
    forest: &Forest,
    index: &mut MessageIndex,
    start: usize,
    flag: MessageFlag,
    value: bool,
    subthread_only: bool,
) -> Result<usize> {
    let top = if subthread_only {
        start
    } else {
        forest.thread_root(start)
    };

    let mut changed = 0;
    for record in forest
        .subtree(top)
        .into_iter()
        .filter_map(|idx| forest.record(idx))
    {
        if index.set_flag(record, flag, value)? {
            changed += 1;
        }
    }
    Ok(changed)
}

/// Set the collapsed flag of every root that has children. With
/// `keep_unread_open`, threads holding unread mail are not collapsed.
/// Returns the roots whose flag changed.
pub fn collapse_all(
    forest: &mut Forest,
    index: &MessageIndex,
    collapsed: bool,
    keep_unread_open: bool,
) -> Vec<usize> {
    let mut changed = Vec::new();
    for root in forest.roots() {
        if forest.node(root).child.is_none() || forest.node(root).collapsed == collapsed {
            continue;
        }
        if collapsed && keep_unread_open && contains_unread(forest, index, root) {
            continue;
        }
        forest.node_mut(root).collapsed = collapsed;
        changed.push(root);
    }
    changed
}
