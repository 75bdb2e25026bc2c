//! Core tree builder
//!
//! Follows the JWZ threading algorithm (https://www.jwz.org/doc/threading.html)
//! on top of the arena forest. Runs single-threaded to completion; the
//! result replaces the previous forest as a whole.
//!
//! ## Algorithm Overview
//!
//! 1. **Create Containers**: one node per record, duplicates per policy
//! 2. **Link References**: walk each parent chain oldest → newest, creating
//!    dummies for ids nobody owns
//! 3. **Subject Fallback**: optionally place header-less replies by subject
//! 4. **Cycle Guard**: every attachment is checked against the ancestry
//! 5. **Prune Dummies**: drop empty dummies, elide dummies with one child

use std::time::Instant;

use crate::config::DuplicatePolicy;
use crate::index::MessageIndex;

use super::super::container::{Forest, NodeKind};
use super::super::id_hash::{IdHash, normalize_message_id};
use super::super::subject_matching::{SubjectNormalizer, link_by_subject};
use super::cycle_detection::detect_cycle_in_ancestry;
use super::tree_traversal::children_first;

/// Knobs the builder needs from the configuration.
pub struct BuildOptions<'a> {
    /// Disable the subject fallback entirely
    pub strict_threads: bool,
    /// Only link header-less messages whose subject looks like a reply
    pub sort_re: bool,
    pub duplicates: DuplicatePolicy,
    pub normalizer: &'a dyn SubjectNormalizer,
}

/// Counters describing one build, mostly for logging and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildStats {
    pub records: usize,
    pub roots: usize,
    pub dummies_created: usize,
    pub dummies_pruned: usize,
    pub refused_links: usize,
    pub subject_links: usize,
    pub duplicates: usize,
}

/// Build a fresh forest from the message index
///
/// Never fails: missing or malformed ids give unthreaded roots, unknown
/// references give dummies, and links that would close a cycle are refused.
/// An empty index yields an empty forest.
pub fn build_forest(
    index: &MessageIndex,
    generation: u32,
    options: &BuildOptions<'_>,
) -> (Forest, BuildStats) {
    let start_time = Instant::now();
    let mut stats = BuildStats {
        records: index.len(),
        ..BuildStats::default()
    };

    let mut forest = Forest::new(generation, index.len());
    let mut id_hash = IdHash::with_capacity(index.len());

    // Step 1: Create message containers
    let record_nodes = create_message_containers(
        &mut forest,
        &mut id_hash,
        index,
        options,
        &mut stats,
    );

    // Step 2: Build parent-child relationships from References / In-Reply-To
    build_reference_links(&mut forest, &mut id_hash, index, &record_nodes, &mut stats);

    // Step 3: Subject fallback for messages without any headers
    if !options.strict_threads {
        stats.subject_links = link_by_subject(
            &mut forest,
            index,
            options.normalizer,
            options.sort_re,
        );
    }

    // Step 5: Drop dummies that do not join at least two subtrees
    stats.dummies_pruned = prune_dummies(&mut forest);

    stats.roots = forest.roots().len();

    log::debug!(
        "threaded {} records into {} roots in {:.2}ms ({} dummies, {} pruned, {} refused links, {} subject links, {} duplicates)",
        stats.records,
        stats.roots,
        start_time.elapsed().as_secs_f64() * 1000.0,
        stats.dummies_created,
        stats.dummies_pruned,
        stats.refused_links,
        stats.subject_links,
        stats.duplicates,
    );

    (forest, stats)
}

/// Marker for record nodes placed under their first-seen twin.
struct RecordNode {
    node: usize,
    nested: bool,
}

/// Create one container per record
///
/// A record whose id is already owned by an earlier record is a duplicate:
/// it always gets its own node but stays out of the hash. Under
/// `DuplicatePolicy::Nest` it is parked below the first-seen node right away.
fn create_message_containers(
    forest: &mut Forest,
    id_hash: &mut IdHash,
    index: &MessageIndex,
    options: &BuildOptions<'_>,
    stats: &mut BuildStats,
) -> Vec<RecordNode> {
    let mut record_nodes = Vec::with_capacity(index.len());

    for record in index.iter() {
        let key = record.message_id.as_deref().and_then(normalize_message_id);
        let kind = NodeKind::Message(record.id);

        let Some(key) = key else {
            record_nodes.push(RecordNode {
                node: forest.add_node(kind, None),
                nested: false,
            });
            continue;
        };

        match id_hash.find(key) {
            Some(first) => {
                stats.duplicates += 1;
                let node = forest.add_node(kind, Some(key.to_string()));
                let nested = options.duplicates == DuplicatePolicy::Nest;
                if nested {
                    forest.attach(node, Some(first));
                }
                log::trace!("duplicate message-id {} on {}", key, record.id);
                record_nodes.push(RecordNode { node, nested });
            }
            None => {
                let node = forest.add_node(kind, Some(key.to_string()));
                id_hash.insert(key, node);
                record_nodes.push(RecordNode { node, nested: false });
            }
        }
    }

    record_nodes
}

/// Build parent-child relationships from each record's parent chain
///
/// ```text
/// Email has References: <msg1> <msg2> <msg3>
///
/// Creates links:
///   msg1 (parent) → msg2 (child)
///   msg2 (parent) → msg3 (child)
///   msg3 (parent) → this_email (child)
/// ```
///
/// Links between referenced ids are only made when the child has no parent
/// yet. The record's own parent always comes from its own nearest reference.
fn build_reference_links(
    forest: &mut Forest,
    id_hash: &mut IdHash,
    index: &MessageIndex,
    record_nodes: &[RecordNode],
    stats: &mut BuildStats,
) {
    for (record, entry) in index.iter().zip(record_nodes) {
        let own_key = forest.node(entry.node).message_id.clone();
        let mut previous_reference: Option<usize> = None;

        for raw in record.parent_chain() {
            let Some(key) = normalize_message_id(raw) else {
                continue;
            };
            // Self references carry no information
            if own_key.as_deref() == Some(key) {
                continue;
            }

            let referenced = match id_hash.find(key) {
                Some(node) => node,
                None => {
                    let node = forest.add_node(NodeKind::Dummy, Some(key.to_string()));
                    id_hash.insert(key, node);
                    stats.dummies_created += 1;
                    node
                }
            };

            if let Some(prev) = previous_reference {
                if prev != referenced && forest.node(referenced).parent.is_none() {
                    link_child_to_parent(forest, referenced, prev, stats);
                }
            }
            previous_reference = Some(referenced);
        }

        if entry.nested {
            continue;
        }

        // Link the last reference to this message
        if let Some(parent) = previous_reference {
            if forest.node(entry.node).parent != Some(parent) {
                link_child_to_parent(forest, entry.node, parent, stats);
            }
        }
    }
}

/// Attach `child` under `parent` unless that would close a cycle
///
/// A refused child keeps whatever position it had, which is a root when it
/// had no parent yet.
fn link_child_to_parent(
    forest: &mut Forest,
    child: usize,
    parent: usize,
    stats: &mut BuildStats,
) -> bool {
    if detect_cycle_in_ancestry(forest, child, parent) {
        stats.refused_links += 1;
        log::trace!("refusing link {} -> {}: would create a cycle", parent, child);
        return false;
    }

    forest.attach(child, Some(parent));
    true
}

/// Remove dummies with no children and elide dummies with exactly one
///
/// Works children-first, so a dummy whose only descendants were themselves
/// pruned is seen with its final child count.
fn prune_dummies(forest: &mut Forest) -> usize {
    let mut pruned = 0;

    for idx in children_first(forest) {
        if !forest.node(idx).is_dummy() {
            continue;
        }

        match forest.child_count(idx) {
            0 => forest.remove(idx),
            1 => {
                let Some(only_child) = forest.node(idx).child else {
                    continue;
                };
                forest.replace(idx, only_child);
            }
            _ => continue,
        }
        pruned += 1;
    }

    pruned
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{MessageRecord, RecordId};
    use crate::threading::subject_matching::ReplyPrefixNormalizer;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, minute, 0).unwrap()
    }

    fn build(
        index: &MessageIndex,
        strict: bool,
        duplicates: DuplicatePolicy,
    ) -> (Forest, BuildStats) {
        let normalizer = ReplyPrefixNormalizer::default();
        let options = BuildOptions {
            strict_threads: strict,
            sort_re: true,
            duplicates,
            normalizer: &normalizer,
        };
        build_forest(index, 1, &options)
    }

    fn node_of(forest: &Forest, slot: usize) -> usize {
        forest.node_for_record(RecordId(slot)).unwrap()
    }

    #[test]
    fn test_simple_thread() {
        let mut index = MessageIndex::new();
        index.push(MessageRecord::new("msg1", at(0)));
        index.push(MessageRecord::new("msg2", at(1)).with_references(["msg1"]));

        let (forest, stats) = build(&index, true, DuplicatePolicy::Siblings);

        assert_eq!(stats.roots, 1);
        assert_eq!(forest.children(node_of(&forest, 0)), vec![node_of(&forest, 1)]);
    }

    #[test]
    fn test_phantom_root_is_elided() {
        let mut index = MessageIndex::new();
        index.push(MessageRecord::new("msg2", at(1)).with_references(["msg1"]));

        let (forest, stats) = build(&index, true, DuplicatePolicy::Siblings);

        assert_eq!(stats.dummies_created, 1);
        assert_eq!(stats.dummies_pruned, 1);
        assert_eq!(forest.roots(), vec![node_of(&forest, 0)]);
    }

    #[test]
    fn test_dummy_with_two_children_survives() {
        let mut index = MessageIndex::new();
        index.push(MessageRecord::new("a", at(1)).with_references(["gone"]));
        index.push(MessageRecord::new("b", at(2)).with_references(["gone"]));

        let (forest, stats) = build(&index, true, DuplicatePolicy::Siblings);

        let roots = forest.roots();
        assert_eq!(roots.len(), 1);
        assert!(forest.node(roots[0]).is_dummy());
        assert_eq!(forest.child_count(roots[0]), 2);
        assert_eq!(stats.dummies_pruned, 0);
    }

    #[test]
    fn test_cycle_is_refused() {
        let mut index = MessageIndex::new();
        index.push(MessageRecord::new("a", at(0)).with_references(["b"]));
        index.push(MessageRecord::new("b", at(1)).with_references(["a"]));

        let (forest, stats) = build(&index, true, DuplicatePolicy::Siblings);

        assert_eq!(stats.refused_links, 1);
        assert_eq!(forest.roots(), vec![node_of(&forest, 1)]);
        assert_eq!(forest.preorder().len(), 2);
    }

    #[test]
    fn test_own_reference_overrides_provisional_parent() {
        let mut index = MessageIndex::new();
        index.push(MessageRecord::new("a", at(0)));
        index.push(MessageRecord::new("x", at(1)));
        // Claims b sits under a ...
        index.push(MessageRecord::new("c", at(3)).with_references(["a", "b"]));
        // ... but b itself says it replies to x
        index.push(MessageRecord::new("b", at(2)).with_references(["x"]));

        let (forest, _) = build(&index, true, DuplicatePolicy::Siblings);

        let b = node_of(&forest, 3);
        assert_eq!(forest.node(b).parent, Some(node_of(&forest, 1)));
        assert_eq!(forest.children(b), vec![node_of(&forest, 2)]);
    }

    #[test]
    fn test_missing_ids_become_roots() {
        let mut index = MessageIndex::new();
        index.push(MessageRecord::anonymous(at(0)).with_references(["<>"]));
        index.push(MessageRecord::new("<bad id>", at(1)));

        let (forest, stats) = build(&index, true, DuplicatePolicy::Siblings);

        assert_eq!(stats.roots, 2);
        assert_eq!(stats.dummies_created, 0);
        assert!(forest.node(node_of(&forest, 1)).message_id.is_none());
    }

    #[test]
    fn test_duplicates_as_siblings() {
        let mut index = MessageIndex::new();
        index.push(MessageRecord::new("root", at(0)));
        index.push(MessageRecord::new("dup", at(1)).with_references(["root"]));
        index.push(MessageRecord::new("dup", at(2)).with_references(["root"]));

        let (forest, stats) = build(&index, true, DuplicatePolicy::Siblings);

        assert_eq!(stats.duplicates, 1);
        assert_eq!(
            forest.children(node_of(&forest, 0)),
            vec![node_of(&forest, 1), node_of(&forest, 2)]
        );
    }

    #[test]
    fn test_duplicates_nested() {
        let mut index = MessageIndex::new();
        index.push(MessageRecord::new("root", at(0)));
        index.push(MessageRecord::new("dup", at(1)).with_references(["root"]));
        index.push(MessageRecord::new("dup", at(2)).with_references(["root"]));

        let (forest, _) = build(&index, true, DuplicatePolicy::Nest);

        assert_eq!(forest.children(node_of(&forest, 1)), vec![node_of(&forest, 2)]);
    }

    #[test]
    fn test_subject_fallback_respects_strict() {
        let mut index = MessageIndex::new();
        index.push(MessageRecord::new("a", at(0)).with_subject("Budget"));
        index.push(MessageRecord::new("b", at(5)).with_subject("Re: budget"));

        let (forest, stats) = build(&index, false, DuplicatePolicy::Siblings);
        assert_eq!(stats.subject_links, 1);
        assert!(forest.node(node_of(&forest, 1)).subject_linked);
        assert_eq!(forest.roots(), vec![node_of(&forest, 0)]);

        let (forest, stats) = build(&index, true, DuplicatePolicy::Siblings);
        assert_eq!(stats.subject_links, 0);
        assert_eq!(forest.roots().len(), 2);
    }

    #[test]
    fn test_subject_fallback_never_overrides_references() {
        let mut index = MessageIndex::new();
        index.push(MessageRecord::new("a", at(0)).with_subject("Budget"));
        index.push(MessageRecord::new("other", at(1)).with_subject("Lunch"));
        index.push(
            MessageRecord::new("b", at(5))
                .with_subject("Re: budget")
                .with_in_reply_to("other"),
        );

        let (forest, stats) = build(&index, false, DuplicatePolicy::Siblings);

        assert_eq!(stats.subject_links, 0);
        assert_eq!(forest.node(node_of(&forest, 2)).parent, Some(node_of(&forest, 1)));
    }

    #[test]
    fn test_empty_index() {
        let (forest, stats) = build(&MessageIndex::new(), false, DuplicatePolicy::Siblings);
        assert!(forest.is_empty());
        assert_eq!(stats, BuildStats::default());
    }
}
