//! Subject normalization and matching for email threading
//!
//! When a message carries no References or In-Reply-To at all, its subject
//! is the only hint about which conversation it belongs to. This module
//! strips reply prefixes so "Re: foo" can be matched with "foo", and links
//! such messages under the oldest older thread with the same subject.

use std::collections::HashMap;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::index::MessageIndex;

use super::algorithm::cycle_detection::detect_cycle_in_ancestry;
use super::algorithm::tree_traversal::find_first_real_message;
use super::container::Forest;

/// Default reply prefix pattern: any run of `Re:`, `Aw:`, `Sv:`, `Fw:`,
/// `Fwd:`, optionally with a counter such as `Re[2]:`.
pub const DEFAULT_REPLY_PATTERN: &str = r"(?i)^((re|aw|sv|fwd?)(\[[0-9]+\])?:[ \t]*)+";

static REPLY_REGEX: OnceLock<Regex> = OnceLock::new();

fn default_reply_regex() -> &'static Regex {
    REPLY_REGEX.get_or_init(|| {
        Regex::new(DEFAULT_REPLY_PATTERN).expect("Invalid default reply regex")
    })
}

/// Strategy used to compare subjects for threading and sorting.
pub trait SubjectNormalizer {
    /// Canonical form used for equality and ordering.
    fn normalize(&self, subject: &str) -> String;

    /// Whether the subject reads like a reply.
    fn is_reply(&self, subject: &str) -> bool;
}

/// Normalizer driven by a reply-prefix regular expression.
#[derive(Debug, Clone)]
pub struct ReplyPrefixNormalizer {
    reply: Regex,
}

impl ReplyPrefixNormalizer {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            reply: Regex::new(pattern)?,
        })
    }
}

impl Default for ReplyPrefixNormalizer {
    fn default() -> Self {
        Self {
            reply: default_reply_regex().clone(),
        }
    }
}

impl SubjectNormalizer for ReplyPrefixNormalizer {
    fn normalize(&self, subject: &str) -> String {
        let trimmed = subject.trim();
        let stripped = match self.reply.find(trimmed) {
            Some(m) if m.start() == 0 => &trimmed[m.end()..],
            _ => trimmed,
        };

        // Collapse runs of whitespace and fold case
        stripped
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase()
    }

    fn is_reply(&self, subject: &str) -> bool {
        self.reply
            .find(subject.trim())
            .is_some_and(|m| m.start() == 0 && !m.is_empty())
    }
}

/// Normalize an email subject with the default reply pattern
///
/// ## Examples
///
/// ```rust
/// use thread_engine::threading::subject_matching::normalize_subject;
///
/// assert_eq!(normalize_subject("Re: Fix memory leak"), "fix memory leak");
/// assert_eq!(normalize_subject("RE: Re[2]: AW:  Quarterly   report"), "quarterly report");
/// assert_eq!(normalize_subject("Fwd: Lunch?"), "lunch?");
/// ```
pub fn normalize_subject(subject: &str) -> String {
    ReplyPrefixNormalizer::default().normalize(subject)
}

/// Link header-less root messages to older threads with the same subject
///
/// Only root nodes whose record has no References and no In-Reply-To are
/// considered, so an explicit header-based parent is never overridden. Each
/// such message is placed under the oldest strictly older root message that
/// shares its normalized subject. With `reply_only`, only subjects that look
/// like replies are linked.
///
/// Returns the number of links made.
pub fn link_by_subject(
    forest: &mut Forest,
    index: &MessageIndex,
    normalizer: &dyn SubjectNormalizer,
    reply_only: bool,
) -> usize {
    // Stand-in date of each root, taken from its own record or from the
    // first message below a dummy, grouped by normalized subject
    let mut subject_index: HashMap<String, Vec<(DateTime<Utc>, usize)>> = HashMap::new();
    for root in forest.roots() {
        let Some(record) = find_first_real_message(forest, root)
            .and_then(|idx| forest.record(idx))
            .and_then(|id| index.get(id))
        else {
            continue;
        };
        let subject = normalizer.normalize(&record.subject);
        if subject.is_empty() {
            continue;
        }
        subject_index.entry(subject).or_default().push((record.date, root));
    }
    // Oldest first; the first entry of a bucket is the only candidate parent
    for candidates in subject_index.values_mut() {
        candidates.sort_unstable();
    }

    let mut linked = 0;
    for root in forest.roots() {
        let Some(record) = forest.record(root).and_then(|id| index.get(id)) else {
            continue;
        };

        // Skip anything the headers already place
        if !record.parent_chain().is_empty() {
            continue;
        }
        if reply_only && !normalizer.is_reply(&record.subject) {
            continue;
        }

        let subject = normalizer.normalize(&record.subject);
        let Some(&(oldest_date, oldest)) = subject_index
            .get(&subject)
            .and_then(|candidates| candidates.first())
        else {
            continue;
        };
        if oldest == root || oldest_date >= record.date {
            continue;
        }

        if detect_cycle_in_ancestry(forest, root, oldest) {
            continue;
        }
        forest.attach(root, Some(oldest));
        forest.node_mut(root).subject_linked = true;
        linked += 1;
    }

    linked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{MessageRecord, RecordId};
    use crate::threading::container::NodeKind;
    use chrono::{Duration, TimeZone};

    fn flat_forest(index: &MessageIndex) -> Forest {
        let mut forest = Forest::new(1, index.len());
        for slot in 0..index.len() {
            forest.add_node(NodeKind::Message(RecordId(slot)), None);
        }
        forest
    }

    #[test]
    fn test_normalize_basic_reply() {
        assert_eq!(normalize_subject("Re: Fix memory leak"), "fix memory leak");
    }

    #[test]
    fn test_normalize_multiple_prefixes() {
        assert_eq!(normalize_subject("Re: Fwd: aw: Test"), "test");
    }

    #[test]
    fn test_normalize_counted_reply() {
        assert_eq!(normalize_subject("Re[3]: Important fix"), "important fix");
    }

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(
            normalize_subject("  Re:   Multiple    spaces  "),
            "multiple spaces"
        );
    }

    #[test]
    fn test_prefix_only_at_start() {
        assert_eq!(normalize_subject("About re: things"), "about re: things");
    }

    #[test]
    fn test_is_reply() {
        let normalizer = ReplyPrefixNormalizer::default();
        assert!(normalizer.is_reply("Re: hello"));
        assert!(normalizer.is_reply("  FWD: hello"));
        assert!(!normalizer.is_reply("hello"));
        assert!(!normalizer.is_reply("Reply needed"));
    }

    #[test]
    fn test_custom_pattern() {
        let normalizer = ReplyPrefixNormalizer::new(r"^(odp|re):\s*").unwrap();
        assert_eq!(normalizer.normalize("odp: Spotkanie"), "spotkanie");
        assert!(ReplyPrefixNormalizer::new("(").is_err());
    }

    #[test]
    fn test_link_by_subject_large_bucket() {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut index = MessageIndex::new();
        // Newest first, so the oldest root is the last one visited
        for slot in 0..3000 {
            let date = base - Duration::minutes(slot as i64);
            index.push(MessageRecord::new(format!("m{}", slot), date).with_subject("Re: status"));
        }
        let mut forest = flat_forest(&index);

        let normalizer = ReplyPrefixNormalizer::default();
        let linked = link_by_subject(&mut forest, &index, &normalizer, false);

        assert_eq!(linked, 2999);
        let roots = forest.roots();
        assert_eq!(roots.len(), 1);
        assert_eq!(forest.record(roots[0]), Some(RecordId(2999)));
        assert_eq!(forest.child_count(roots[0]), 2999);
    }

    #[test]
    fn test_link_by_subject_ties_and_headers() {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut index = MessageIndex::new();
        index.push(MessageRecord::new("a", base).with_subject("Lunch"));
        index.push(MessageRecord::new("b", base).with_subject("Re: lunch"));
        index.push(
            MessageRecord::new("c", base + Duration::minutes(1))
                .with_subject("Re: lunch")
                .with_in_reply_to("elsewhere"),
        );
        index.push(MessageRecord::new("d", base + Duration::minutes(2)).with_subject("Re: lunch"));
        let mut forest = flat_forest(&index);

        let normalizer = ReplyPrefixNormalizer::default();
        assert_eq!(link_by_subject(&mut forest, &index, &normalizer, false), 1);

        // Same date is not older, and headers always win
        let roots: Vec<_> = forest.roots().into_iter().map(|r| forest.record(r)).collect();
        assert_eq!(roots, vec![Some(RecordId(0)), Some(RecordId(1)), Some(RecordId(2))]);
        let d = forest.node_for_record(RecordId(3)).unwrap();
        assert_eq!(forest.node(d).parent, forest.node_for_record(RecordId(0)));
        assert!(forest.node(d).subject_linked);
    }
}
