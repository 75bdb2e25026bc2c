//! Tree traversal utilities for the threading forest
//!
//! Helpers shared by the builder and the sorter. All of them are iterative
//! so deeply nested threads cannot overflow the stack.

use crate::index::MessageIndex;

use super::super::container::Forest;

/// Find the first real (non-dummy, non-group) message in a subtree
///
/// Dummy and group nodes have no record of their own; sorting and subject
/// matching use the first message found in pre-order as their stand-in.
pub fn find_first_real_message(forest: &Forest, top: usize) -> Option<usize> {
    forest
        .subtree(top)
        .into_iter()
        .find(|&idx| forest.record(idx).is_some())
}

/// Count the messages in a subtree, optionally skipping its top node.
pub fn count_messages<F>(forest: &Forest, top: usize, include_top: bool, mut filter: F) -> usize
where
    F: FnMut(usize) -> bool,
{
    forest
        .subtree(top)
        .into_iter()
        .filter(|&idx| include_top || idx != top)
        .filter(|&idx| forest.record(idx).is_some())
        .filter(|&idx| filter(idx))
        .count()
}

/// Nodes of the forest ordered so that every node comes after all of its
/// descendants.
pub fn children_first(forest: &Forest) -> Vec<usize> {
    let mut order = forest.preorder();
    order.reverse();
    order
}

/// Whether a node's record is included by the active limit.
pub fn is_limit_visible(forest: &Forest, index: &MessageIndex, idx: usize) -> bool {
    forest
        .record(idx)
        .and_then(|record| index.get(record))
        .map(|record| record.visible)
        .unwrap_or(false)
}
