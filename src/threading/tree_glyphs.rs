//! Tree prefix glyphs for the index view
//!
//! Every numbered row gets the glyphs that draw its position in the thread:
//! one column per ancestor level below the root, a connector, a horizontal
//! mark and an arrow. Turning glyphs into characters is left to the caller;
//! [`render_glyphs`] gives a plain ASCII rendering.

use crate::index::MessageIndex;

use super::algorithm::tree_traversal::children_first;
use super::container::{Forest, NodeKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TreeGlyph {
    /// Empty column: that level has no more rows below
    Space,
    /// Column continuing to a later sibling at that level
    Vertical,
    /// Connector for a row followed by a sibling
    Tee,
    /// Connector for the last row at its level
    Corner,
    HLine,
    /// Parent found by subject, not by headers
    Equals,
    /// Parent is a message we do not have
    Missing,
    /// Parent is hidden by the limit
    Star,
    RArrow,
}

/// Options for drawing, taken from the threading configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct DrawOptions {
    pub hide_missing: bool,
    pub hide_limited: bool,
}

/// Recompute the glyphs of every node. Needs up to date virtual numbering.
pub fn draw_tree(forest: &mut Forest, index: &MessageIndex, options: DrawOptions) {
    let mut has_rows = vec![false; forest.nodes.len()];
    for idx in children_first(forest) {
        let node = forest.node(idx);
        let rows = node.virtual_index.is_some()
            || forest.siblings_from(node.child).any(|child| has_rows[child]);
        has_rows[idx] = rows;
    }

    let continues = |forest: &Forest, idx: usize| {
        forest
            .siblings_from(forest.node(idx).next)
            .any(|sibling| has_rows[sibling])
    };

    for node in forest.nodes.iter_mut() {
        node.tree.clear();
    }

    for position in 0..forest.virtual_len() {
        let Some(idx) = forest.node_at_virtual(position) else {
            continue;
        };
        let Some(parent) = forest.node(idx).parent else {
            continue;
        };

        // Ancestors strictly between the thread root and this row, outermost first
        let mut levels: Vec<usize> = forest.ancestors(idx).collect();
        levels.pop();
        levels.reverse();

        let mut tree: Vec<TreeGlyph> = levels
            .into_iter()
            .map(|level| {
                if continues(forest, level) {
                    TreeGlyph::Vertical
                } else {
                    TreeGlyph::Space
                }
            })
            .collect();

        tree.push(if continues(forest, idx) {
            TreeGlyph::Tee
        } else {
            TreeGlyph::Corner
        });

        let parent_node = forest.node(parent);
        let mark = if forest.node(idx).subject_linked {
            TreeGlyph::Equals
        } else if parent_node.kind == NodeKind::Dummy && !options.hide_missing {
            TreeGlyph::Missing
        } else if !options.hide_limited
            && parent_node
                .record()
                .and_then(|record| index.get(record))
                .is_some_and(|record| !record.visible)
        {
            TreeGlyph::Star
        } else {
            TreeGlyph::HLine
        };
        tree.push(mark);
        tree.push(TreeGlyph::RArrow);

        forest.node_mut(idx).tree = tree;
    }
}

/// Render glyphs as ASCII, two characters per level or one when `narrow`.
///
/// ```rust
/// use thread_engine::threading::tree_glyphs::{TreeGlyph, render_glyphs};
///
/// let glyphs = [TreeGlyph::Vertical, TreeGlyph::Corner, TreeGlyph::HLine, TreeGlyph::RArrow];
/// assert_eq!(render_glyphs(&glyphs, false), "| `->");
/// assert_eq!(render_glyphs(&glyphs, true), "|`>");
/// ```
pub fn render_glyphs(glyphs: &[TreeGlyph], narrow: bool) -> String {
    let mut out = String::with_capacity(glyphs.len() * 2);
    for glyph in glyphs {
        let text = match (glyph, narrow) {
            (TreeGlyph::Space, false) => "  ",
            (TreeGlyph::Space, true) => " ",
            (TreeGlyph::Vertical, false) => "| ",
            (TreeGlyph::Vertical, true) => "|",
            (TreeGlyph::Tee, _) => "|",
            (TreeGlyph::Corner, _) => "`",
            (TreeGlyph::HLine, false) => "-",
            (TreeGlyph::HLine, true) => "",
            (TreeGlyph::Equals, _) => "=",
            (TreeGlyph::Missing, _) => "?",
            (TreeGlyph::Star, _) => "*",
            (TreeGlyph::RArrow, _) => ">",
        };
        out.push_str(text);
    }
    out
}
