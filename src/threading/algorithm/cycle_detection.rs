//! Cycle detection for email threading
//!
//! Ensures that parent-child relationships don't create cycles in the thread tree.
//! A cycle would occur if we tried to make a parent a descendant of its own child.

use std::collections::HashSet;

use super::super::container::Forest;

/// Check if attaching `child` under `parent` would create a cycle
///
/// Walks up the ancestry chain starting at the proposed parent. If the child
/// shows up anywhere in that chain (including the parent itself) the link
/// would close a loop.
///
/// ## Example
///
/// ```text
/// Current tree:  A → B → C
///
/// Trying to link: A under C (would create cycle A → B → C → A)
/// Result: true (cycle detected)
///
/// Trying to link: D under C (D is not in chain)
/// Result: false (safe to link)
/// ```
pub fn detect_cycle_in_ancestry(forest: &Forest, child: usize, parent: usize) -> bool {
    // Guards against a corrupted parent chain as well
    let mut visited = HashSet::new();
    let mut current = Some(parent);

    while let Some(idx) = current {
        if idx == child || !visited.insert(idx) {
            return true;
        }
        current = forest.node(idx).parent;
    }

    false
}
