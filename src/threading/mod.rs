//! Message threading module
//!
//! Turns a flat [`MessageIndex`](crate::index::MessageIndex) into a forest of
//! conversation threads using the JWZ algorithm
//! (https://www.jwz.org/doc/threading.html), then sorts, numbers and draws it
//! for an index view.
//!
//! ## Threading Strategy
//!
//! 1. **References Header**: the full chain of ancestor ids links each message
//!    under its parent, creating placeholders for ids nobody owns
//! 2. **In-Reply-To Header**: used when it adds a parent References lacks
//! 3. **Subject Fallback**: messages without any parent header can be placed
//!    under an older thread with the same subject (off with strict threading)
//!
//! ## Module Structure
//!
//! - `container`: arena forest, node handles and read-only node views
//! - `algorithm`: the tree builder and its helpers
//! - `id_hash`: Message-ID normalization and lookup
//! - `subject_matching`: subject normalization and the subject fallback
//! - `sort`: stable subthread sorting with pluggable comparators
//! - `virtual_index`: screen numbering of displayed messages
//! - `tree_glyphs`: tree prefix drawing
//! - `traversal`: navigation and subtree queries
//! - `collapse_state`: collapse state kept across rebuilds and sessions
//! - `engine`: the [`ThreadEngine`] tying it together

pub mod algorithm;
pub mod collapse_state;
pub mod container;
pub mod engine;
pub mod id_hash;
pub mod sort;
pub mod subject_matching;
pub mod traversal;
pub mod tree_glyphs;
pub mod virtual_index;

// Re-export main types and functions
pub use algorithm::{BuildOptions, BuildStats, build_forest};
pub use collapse_state::CollapseState;
pub use container::{Forest, NodeId, NodeKind, ThreadNodeRef};
pub use engine::ThreadEngine;
pub use sort::{RecordComparator, SortOptions, record_comparator};
pub use subject_matching::{ReplyPrefixNormalizer, SubjectNormalizer, normalize_subject};
pub use traversal::{Direction, ThreadCount, TraverseOp, TraverseOutcome};
pub use tree_glyphs::{TreeGlyph, render_glyphs};
