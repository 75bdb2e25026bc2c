//! Message index
//!
//! Flat, owning table of message records. Each record gets a stable slot id
//! (`RecordId`) when it is pushed; the threading engine only ever refers to
//! records through these ids and borrows the index for the duration of a call.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ThreadError};
use crate::threading::id_hash::normalize_message_id;

/// Stable slot id of a record inside a [`MessageIndex`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct RecordId(pub usize);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Per-message flag bits the engine aggregates over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageFlag {
    Read,
    Flagged,
    Deleted,
    Tagged,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageFlags {
    pub read: bool,
    pub flagged: bool,
    pub deleted: bool,
    pub tagged: bool,
}

impl MessageFlags {
    pub fn get(&self, flag: MessageFlag) -> bool {
        match flag {
            MessageFlag::Read => self.read,
            MessageFlag::Flagged => self.flagged,
            MessageFlag::Deleted => self.deleted,
            MessageFlag::Tagged => self.tagged,
        }
    }

    /// Set a flag, returning whether the value changed.
    pub fn set(&mut self, flag: MessageFlag, value: bool) -> bool {
        let slot = match flag {
            MessageFlag::Read => &mut self.read,
            MessageFlag::Flagged => &mut self.flagged,
            MessageFlag::Deleted => &mut self.deleted,
            MessageFlag::Tagged => &mut self.tagged,
        };
        let changed = *slot != value;
        *slot = value;
        changed
    }
}

fn default_visible() -> bool {
    true
}

/// A message as the mailbox layer hands it to the threading engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Slot id, assigned by [`MessageIndex::push`]
    #[serde(default)]
    pub id: RecordId,

    /// Message-ID header, with or without the enclosing `<>`
    #[serde(default)]
    pub message_id: Option<String>,

    /// References header ids, oldest first
    #[serde(default)]
    pub references: Vec<String>,

    /// In-Reply-To header id
    #[serde(default)]
    pub in_reply_to: Option<String>,

    /// Date the message was sent
    pub date: DateTime<Utc>,

    /// Date the message was delivered locally, if known
    #[serde(default)]
    pub received: Option<DateTime<Utc>>,

    #[serde(default)]
    pub subject: String,

    #[serde(default)]
    pub from: String,

    #[serde(default)]
    pub size: u64,

    #[serde(default)]
    pub flags: MessageFlags,

    /// Result of the active limit pattern, evaluated by the caller
    #[serde(default = "default_visible")]
    pub visible: bool,
}

impl MessageRecord {
    pub fn new(message_id: impl Into<String>, date: DateTime<Utc>) -> Self {
        Self {
            id: RecordId::default(),
            message_id: Some(message_id.into()),
            references: Vec::new(),
            in_reply_to: None,
            date,
            received: None,
            subject: String::new(),
            from: String::new(),
            size: 0,
            flags: MessageFlags::default(),
            visible: true,
        }
    }

    /// A record without any Message-ID header.
    pub fn anonymous(date: DateTime<Utc>) -> Self {
        Self {
            message_id: None,
            ..Self::new(String::new(), date)
        }
    }

    pub fn with_references<I, S>(mut self, references: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.references = references.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_in_reply_to(mut self, in_reply_to: impl Into<String>) -> Self {
        self.in_reply_to = Some(in_reply_to.into());
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn with_from(mut self, from: impl Into<String>) -> Self {
        self.from = from.into();
        self
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    pub fn with_received(mut self, received: DateTime<Utc>) -> Self {
        self.received = Some(received);
        self
    }

    pub fn with_flag(mut self, flag: MessageFlag, value: bool) -> Self {
        self.flags.set(flag, value);
        self
    }

    pub fn with_visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    /// Date used for "date-received" ordering; falls back to the sent date.
    pub fn received_or_sent(&self) -> DateTime<Utc> {
        self.received.unwrap_or(self.date)
    }

    /// Ids of the ancestors of this message, oldest first.
    ///
    /// References come first; In-Reply-To is appended when it is not already
    /// the nearest reference. Ids are returned as found in the headers.
    pub fn parent_chain(&self) -> Vec<&str> {
        let mut chain: Vec<&str> = self.references.iter().map(String::as_str).collect();
        if let Some(irt) = self.in_reply_to.as_deref() {
            let last = chain.last().and_then(|id| normalize_message_id(id));
            if last.is_none() || last != normalize_message_id(irt) {
                chain.push(irt);
            }
        }
        chain
    }
}

/// Owning table of message records with stable slot ids.
#[derive(Debug, Clone, Default)]
pub struct MessageIndex {
    records: Vec<MessageRecord>,
}

impl MessageIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record, assigning its slot id.
    pub fn push(&mut self, mut record: MessageRecord) -> RecordId {
        let id = RecordId(self.records.len());
        record.id = id;
        self.records.push(record);
        id
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: RecordId) -> Option<&MessageRecord> {
        self.records.get(id.0)
    }

    pub fn get_mut(&mut self, id: RecordId) -> Option<&mut MessageRecord> {
        self.records.get_mut(id.0)
    }

    /// Like [`get`](Self::get) but reports unknown ids as an error.
    pub fn record(&self, id: RecordId) -> Result<&MessageRecord> {
        self.get(id).ok_or(ThreadError::UnknownRecord(id))
    }

    fn record_mut(&mut self, id: RecordId) -> Result<&mut MessageRecord> {
        self.records
            .get_mut(id.0)
            .ok_or(ThreadError::UnknownRecord(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &MessageRecord> {
        self.records.iter()
    }

    /// Set a flag on one record, returning whether it changed.
    pub fn set_flag(&mut self, id: RecordId, flag: MessageFlag, value: bool) -> Result<bool> {
        Ok(self.record_mut(id)?.flags.set(flag, value))
    }

    pub fn set_visible(&mut self, id: RecordId, visible: bool) -> Result<()> {
        self.record_mut(id)?.visible = visible;
        Ok(())
    }

    pub fn set_all_visible(&mut self, visible: bool) {
        for record in &mut self.records {
            record.visible = visible;
        }
    }

    /// Store the outcome of an already evaluated limit predicate on every record.
    pub fn apply_limit<F>(&mut self, predicate: F) -> usize
    where
        F: Fn(&MessageRecord) -> bool,
    {
        let mut matched = 0;
        for record in &mut self.records {
            record.visible = predicate(record);
            if record.visible {
                matched += 1;
            }
        }
        matched
    }

    /// Make `children` replies to `parent` by rewriting their threading headers.
    ///
    /// Each child gets In-Reply-To set to the parent's Message-ID and loses its
    /// References. Returns the number of records rewritten; the forest must be
    /// rebuilt afterwards.
    pub fn link_threads(&mut self, parent: RecordId, children: &[RecordId]) -> Result<usize> {
        let parent_id = self
            .record(parent)?
            .message_id
            .as_deref()
            .and_then(normalize_message_id)
            .map(str::to_string)
            .ok_or(ThreadError::MissingMessageId(parent))?;

        let mut linked = 0;
        for &child in children {
            if child == parent {
                continue;
            }
            let record = self.record_mut(child)?;
            record.in_reply_to = Some(format!("<{}>", parent_id));
            record.references.clear();
            linked += 1;
        }

        log::debug!("linked {} messages under {}", linked, parent);
        Ok(linked)
    }

    /// Detach a record from its thread so that it starts a thread of its own.
    ///
    /// The record loses References and In-Reply-To; records that reference it
    /// drop the ids that came before it in their References so they stay below
    /// it. Returns the number of records rewritten.
    pub fn break_thread(&mut self, id: RecordId) -> Result<usize> {
        let broken = {
            let record = self.record_mut(id)?;
            record.references.clear();
            record.in_reply_to = None;
            record
                .message_id
                .as_deref()
                .and_then(normalize_message_id)
                .map(str::to_string)
        };

        let mut changed = 1;
        if let Some(broken) = broken {
            for record in self.records.iter_mut().filter(|r| r.id != id) {
                let position = record
                    .references
                    .iter()
                    .position(|r| normalize_message_id(r) == Some(broken.as_str()));
                if let Some(position) = position {
                    if position > 0 {
                        record.references.drain(..position);
                        changed += 1;
                    }
                }
            }
        }

        log::debug!("broke thread at {}, {} records rewritten", id, changed);
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, minute, 0).unwrap()
    }

    #[test]
    fn test_push_assigns_slots() {
        let mut index = MessageIndex::new();
        let a = index.push(MessageRecord::new("a@x", at(0)));
        let b = index.push(MessageRecord::new("b@x", at(1)));

        assert_eq!(a, RecordId(0));
        assert_eq!(b, RecordId(1));
        assert_eq!(index.get(b).unwrap().id, b);
    }

    #[test]
    fn test_parent_chain_appends_in_reply_to() {
        let record = MessageRecord::new("c@x", at(0))
            .with_references(["<a@x>"])
            .with_in_reply_to("<b@x>");
        assert_eq!(record.parent_chain(), vec!["<a@x>", "<b@x>"]);

        let record = MessageRecord::new("c@x", at(0))
            .with_references(["<a@x>", "<b@x>"])
            .with_in_reply_to("b@x");
        assert_eq!(record.parent_chain(), vec!["<a@x>", "<b@x>"]);
    }

    #[test]
    fn test_set_flag_reports_change() {
        let mut index = MessageIndex::new();
        let a = index.push(MessageRecord::new("a@x", at(0)));

        assert!(index.set_flag(a, MessageFlag::Read, true).unwrap());
        assert!(!index.set_flag(a, MessageFlag::Read, true).unwrap());
        assert!(matches!(
            index.set_flag(RecordId(9), MessageFlag::Read, true),
            Err(ThreadError::UnknownRecord(RecordId(9)))
        ));
    }

    #[test]
    fn test_link_threads_rewrites_headers() {
        let mut index = MessageIndex::new();
        let parent = index.push(MessageRecord::new("<p@x>", at(0)));
        let child = index.push(MessageRecord::new("c@x", at(1)).with_references(["<q@x>"]));

        assert_eq!(index.link_threads(parent, &[child, parent]).unwrap(), 1);

        let record = index.get(child).unwrap();
        assert!(record.references.is_empty());
        assert_eq!(record.in_reply_to.as_deref(), Some("<p@x>"));
    }

    #[test]
    fn test_link_threads_requires_parent_id() {
        let mut index = MessageIndex::new();
        let parent = index.push(MessageRecord::anonymous(at(0)));
        let child = index.push(MessageRecord::new("c@x", at(1)));

        assert!(matches!(
            index.link_threads(parent, &[child]),
            Err(ThreadError::MissingMessageId(_))
        ));
    }

    #[test]
    fn test_break_thread_trims_descendant_references() {
        let mut index = MessageIndex::new();
        index.push(MessageRecord::new("a@x", at(0)));
        let b = index.push(MessageRecord::new("b@x", at(1)).with_references(["<a@x>"]));
        let c = index.push(MessageRecord::new("c@x", at(2)).with_references(["<a@x>", "<b@x>"]));

        index.break_thread(b).unwrap();

        assert!(index.get(b).unwrap().references.is_empty());
        assert_eq!(index.get(c).unwrap().references, vec!["<b@x>".to_string()]);
    }
}
