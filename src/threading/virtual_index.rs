//! Virtual numbering
//!
//! Assigns screen positions to the messages that are actually displayed: a
//! message gets a virtual index when no ancestor is collapsed and the limit
//! includes it. Dummy and group nodes never get one. There is no incremental
//! form; the pass is rerun after every sort, collapse change or limit change.

use crate::index::MessageIndex;

use super::algorithm::tree_traversal::is_limit_visible;
use super::container::Forest;

/// Number the displayed messages in pre-order, starting at zero.
///
/// Returns how many messages got an index.
pub fn assign_virtual(forest: &mut Forest, index: &MessageIndex) -> usize {
    let order = forest.preorder();
    let mut numbered = Vec::with_capacity(order.len());

    // Pre-order visits parents first, so their flags are already final
    for idx in order {
        let display_visible = match forest.node(idx).parent {
            Some(parent) => {
                let parent = forest.node(parent);
                parent.display_visible && !parent.collapsed
            }
            None => true,
        };
        let limit_visible = is_limit_visible(forest, index, idx);

        let node = forest.node_mut(idx);
        node.display_visible = display_visible;
        node.virtual_index = None;
        if display_visible && limit_visible {
            node.virtual_index = Some(numbered.len());
            numbered.push(idx);
        }
    }

    let count = numbered.len();
    forest.virtual_order = numbered;
    count
}
