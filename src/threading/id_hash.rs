//! Message-ID lookup table used while building the forest
//!
//! Maps a normalized Message-ID to the arena slot of the node that owns it.
//! The table only lives for the duration of a build; it is never updated
//! afterwards and is dropped together with the previous forest.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

/// Normalize a Message-ID token for lookup
///
/// Surrounding whitespace and one enclosing `<>` pair are stripped. Ids that
/// end up empty or that contain whitespace are malformed and yield `None`;
/// such messages are threaded as if they had no id at all.
///
/// ```rust
/// use thread_engine::threading::id_hash::normalize_message_id;
///
/// assert_eq!(normalize_message_id(" <abc@example.org> "), Some("abc@example.org"));
/// assert_eq!(normalize_message_id("abc@example.org"), Some("abc@example.org"));
/// assert_eq!(normalize_message_id("<>"), None);
/// assert_eq!(normalize_message_id("<a b@example.org>"), None);
/// ```
pub fn normalize_message_id(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    let inner = trimmed
        .strip_prefix('<')
        .and_then(|rest| rest.strip_suffix('>'))
        .unwrap_or(trimmed)
        .trim();

    if inner.is_empty() || inner.chars().any(char::is_whitespace) {
        return None;
    }
    Some(inner)
}

/// Normalized Message-ID → node slot. First inserted entry wins.
#[derive(Debug, Default)]
pub struct IdHash {
    entries: HashMap<String, usize>,
}

impl IdHash {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity),
        }
    }

    /// Look up a raw id. Malformed ids never match.
    pub fn find(&self, raw_id: &str) -> Option<usize> {
        normalize_message_id(raw_id).and_then(|id| self.entries.get(id).copied())
    }

    /// Record `node` as the owner of `raw_id`
    ///
    /// Returns `false` without touching the table when the id is malformed or
    /// already owned by another node (duplicate Message-IDs keep the first
    /// entry).
    pub fn insert(&mut self, raw_id: &str, node: usize) -> bool {
        let Some(id) = normalize_message_id(raw_id) else {
            return false;
        };
        match self.entries.entry(id.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(node);
                true
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
