//! Mail threading engine
//!
//! Builds conversation threads from a flat index of messages, keeps them
//! sorted and numbered for display, and answers the navigation and subtree
//! queries an index view needs.

pub mod config;
pub mod error;
pub mod index;
pub mod threading;

pub use config::{DuplicatePolicy, SortMethod, SortSpec, ThreadingConfig};
pub use error::{Result, ThreadError};
pub use index::{MessageFlag, MessageFlags, MessageIndex, MessageRecord, RecordId};
pub use threading::{NodeId, ThreadEngine};

#[cfg_attr(not(test), allow(dead_code))]
pub mod test_support {
    use std::sync::Once;

    use chrono::{DateTime, Duration, TimeZone, Utc};
    use env_logger::Env;
    use serde::Deserialize;

    use crate::config::{DuplicatePolicy, SortSpec, ThreadingConfig};
    use crate::index::{MessageIndex, MessageRecord, RecordId};
    use crate::threading::subject_matching::DEFAULT_REPLY_PATTERN;
    use crate::threading::ThreadEngine;

    static LOGGER: Once = Once::new();

    /// Install an env_logger once per test binary (`RUST_LOG` to tune).
    pub fn init_logger() {
        LOGGER.call_once(|| {
            let _ = env_logger::Builder::from_env(Env::default().default_filter_or("warn"))
                .is_test(true)
                .try_init();
        });
    }

    /// Fixed timestamp `minutes` after the fixture epoch.
    pub fn at(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap() + Duration::minutes(minutes)
    }

    /// Configuration with the documented defaults, independent of the
    /// process environment.
    pub fn test_config() -> ThreadingConfig {
        ThreadingConfig {
            sort: SortSpec::default(),
            strict_threads: false,
            sort_re: true,
            reply_regex: DEFAULT_REPLY_PATTERN.to_string(),
            duplicates: DuplicatePolicy::Siblings,
            collapse_unread: true,
            hide_missing: true,
            hide_limited: false,
            narrow_tree: false,
            group_by_subject: true,
        }
    }

    /// Record with a Message-ID, a References chain and a date offset.
    pub fn message(id: &str, references: &[&str], minutes: i64) -> MessageRecord {
        MessageRecord::new(id, at(minutes))
            .with_references(references.iter().copied())
            .with_subject(format!("subject of {}", id))
    }

    pub fn index_of(records: impl IntoIterator<Item = MessageRecord>) -> MessageIndex {
        let mut index = MessageIndex::new();
        for record in records {
            index.push(record);
        }
        index
    }

    /// JSON fixture entry; `minutes` is relative to [`at`].
    #[derive(Debug, Deserialize)]
    struct FixtureMessage {
        id: Option<String>,
        #[serde(default)]
        references: Vec<String>,
        #[serde(default)]
        in_reply_to: Option<String>,
        #[serde(default)]
        subject: String,
        #[serde(default)]
        from: String,
        minutes: i64,
        #[serde(default)]
        read: bool,
    }

    /// Load a mailbox from a JSON array of fixture messages.
    pub fn index_from_json(json: &str) -> serde_json::Result<MessageIndex> {
        let fixtures: Vec<FixtureMessage> = serde_json::from_str(json)?;
        Ok(index_of(fixtures.into_iter().map(|fixture| {
            let mut record = match fixture.id {
                Some(id) => MessageRecord::new(id, at(fixture.minutes)),
                None => MessageRecord::anonymous(at(fixture.minutes)),
            };
            record.references = fixture.references;
            record.in_reply_to = fixture.in_reply_to;
            record.subject = fixture.subject;
            record.from = fixture.from;
            record.flags.read = fixture.read;
            record
        })))
    }

    /// Engine with [`test_config`], already built over `index`.
    pub fn built_engine(config: ThreadingConfig, index: &MessageIndex) -> ThreadEngine {
        init_logger();
        let mut engine = ThreadEngine::new(config);
        engine.build(index);
        engine
    }

    /// Message-IDs of the displayed rows, in screen order.
    pub fn display_ids(engine: &ThreadEngine, index: &MessageIndex) -> Vec<String> {
        engine
            .display_records()
            .into_iter()
            .filter_map(|record: RecordId| index.get(record))
            .map(|record| record.message_id.clone().unwrap_or_default())
            .collect()
    }
}
