//! Subthread sorting
//!
//! Orders the children of every node, and the root list, with an injected
//! record comparator. Sorting is stable, so siblings the comparator considers
//! equal keep their previous relative order.

use std::cmp::Ordering;

use crate::config::SortMethod;
use crate::index::{MessageIndex, MessageRecord, RecordId};

use super::algorithm::tree_traversal::children_first;
use super::container::{Forest, NodeKind};
use super::subject_matching::SubjectNormalizer;

/// Comparison strategy over two records.
pub type RecordComparator<'a> = dyn Fn(&MessageRecord, &MessageRecord) -> Ordering + 'a;

/// Options for one sorting pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SortOptions {
    /// Flip comparator results at every level
    pub reverse: bool,
    /// Key each subtree by its greatest record
    pub last: bool,
    /// First sort after a fresh build
    pub initial: bool,
    /// Subject grouping applies to this sort. When false, groups left over
    /// from an earlier subject sort are dissolved.
    pub group_by_subject: bool,
}

/// Comparator for a configured sort method. Ties fall back to the date.
pub fn record_comparator<'a>(
    method: SortMethod,
    normalizer: &'a dyn SubjectNormalizer,
) -> Box<RecordComparator<'a>> {
    match method {
        SortMethod::Date => Box::new(|a: &MessageRecord, b: &MessageRecord| {
            a.date.cmp(&b.date).then(a.id.cmp(&b.id))
        }),
        SortMethod::DateReceived => Box::new(|a: &MessageRecord, b: &MessageRecord| {
            a.received_or_sent()
                .cmp(&b.received_or_sent())
                .then(a.date.cmp(&b.date))
        }),
        SortMethod::Subject => Box::new(move |a: &MessageRecord, b: &MessageRecord| {
            normalizer
                .normalize(&a.subject)
                .cmp(&normalizer.normalize(&b.subject))
                .then(a.date.cmp(&b.date))
        }),
        SortMethod::From => Box::new(|a: &MessageRecord, b: &MessageRecord| {
            a.from
                .to_lowercase()
                .cmp(&b.from.to_lowercase())
                .then(a.date.cmp(&b.date))
        }),
        SortMethod::Size => Box::new(|a: &MessageRecord, b: &MessageRecord| {
            a.size.cmp(&b.size).then(a.date.cmp(&b.date))
        }),
        SortMethod::MailboxOrder => {
            Box::new(|a: &MessageRecord, b: &MessageRecord| a.id.cmp(&b.id))
        }
    }
}

/// Sort every sibling list of the forest
///
/// Returns the number of subject groups created.
pub fn sort_forest(
    forest: &mut Forest,
    index: &MessageIndex,
    compare: &RecordComparator<'_>,
    options: SortOptions,
    normalizer: &dyn SubjectNormalizer,
) -> usize {
    if !options.group_by_subject {
        dissolve_groups(forest);
    }

    let mut reps: Vec<Option<RecordId>> = vec![None; forest.nodes.len()];

    for idx in children_first(forest) {
        sort_siblings(forest, Some(idx), &reps, index, compare, options.reverse);
        reps[idx] = representative(forest, idx, &reps, index, compare, options.last);
    }
    sort_siblings(forest, None, &reps, index, compare, options.reverse);

    if options.initial && options.group_by_subject {
        group_roots_by_subject(forest, &mut reps, index, compare, options.reverse, normalizer)
    } else {
        0
    }
}

fn record_of<'a>(index: &'a MessageIndex, rep: Option<RecordId>) -> Option<&'a MessageRecord> {
    rep.and_then(|id| index.get(id))
}

/// Record that stands for a subtree when its siblings are compared
///
/// Without `last` this is the node's own record or, for dummies and groups,
/// the representative of their first (already sorted) child. With `last` it
/// is the greatest record of the subtree.
fn representative(
    forest: &Forest,
    idx: usize,
    reps: &[Option<RecordId>],
    index: &MessageIndex,
    compare: &RecordComparator<'_>,
    last: bool,
) -> Option<RecordId> {
    let own = forest.record(idx);

    if !last {
        return own.or_else(|| forest.node(idx).child.and_then(|child| reps[child]));
    }

    own.into_iter()
        .chain(forest.children(idx).into_iter().filter_map(|child| reps[child]))
        .filter_map(|id| index.get(id))
        .max_by(|a, b| compare(*a, *b))
        .map(|record| record.id)
}

fn sort_siblings(
    forest: &mut Forest,
    parent: Option<usize>,
    reps: &[Option<RecordId>],
    index: &MessageIndex,
    compare: &RecordComparator<'_>,
    reverse: bool,
) {
    let mut siblings = match parent {
        Some(p) => forest.children(p),
        None => forest.roots(),
    };
    if siblings.len() < 2 {
        return;
    }

    siblings.sort_by(|&a, &b| {
        match (record_of(index, reps[a]), record_of(index, reps[b])) {
            (Some(x), Some(y)) => {
                let ord = compare(x, y);
                if reverse { ord.reverse() } else { ord }
            }
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    });
    forest.set_children(parent, &siblings);
}

/// Put runs of adjacent roots with the same normalized subject under a
/// shared group node
///
/// Only the root list is considered, and an existing group in a run absorbs
/// the other members instead of being nested, so running this twice leaves
/// the forest unchanged.
fn group_roots_by_subject(
    forest: &mut Forest,
    reps: &mut Vec<Option<RecordId>>,
    index: &MessageIndex,
    compare: &RecordComparator<'_>,
    reverse: bool,
    normalizer: &dyn SubjectNormalizer,
) -> usize {
    let roots = forest.roots();
    let subjects: Vec<Option<String>> = roots
        .iter()
        .map(|&root| {
            record_of(index, reps[root])
                .map(|record| normalizer.normalize(&record.subject))
                .filter(|subject| !subject.is_empty())
        })
        .collect();

    let mut created = 0;
    let mut start = 0;
    while start < roots.len() {
        let mut end = start + 1;
        while end < roots.len() && subjects[start].is_some() && subjects[end] == subjects[start] {
            end += 1;
        }

        if end - start >= 2 {
            let run = &roots[start..end];
            let existing = run
                .iter()
                .copied()
                .find(|&root| forest.node(root).kind == NodeKind::Group);

            let group = match existing {
                Some(group) => group,
                None => {
                    let group = forest.add_node(NodeKind::Group, None);
                    forest.insert_before(run[0], group);
                    reps.resize(forest.nodes.len(), None);
                    created += 1;
                    group
                }
            };

            for &member in run.iter().filter(|&&member| member != group) {
                if forest.node(member).kind == NodeKind::Group {
                    for child in forest.children(member) {
                        forest.attach(child, Some(group));
                    }
                    forest.remove(member);
                } else {
                    forest.attach(member, Some(group));
                }
            }

            sort_siblings(forest, Some(group), reps, index, compare, reverse);
            reps[group] = forest.node(group).child.and_then(|child| reps[child]);
        }

        start = end;
    }

    created
}

/// Replace every root group node by its children.
fn dissolve_groups(forest: &mut Forest) {
    for root in forest.roots() {
        if forest.node(root).kind == NodeKind::Group {
            forest.remove(root);
        }
    }
}
