use std::env;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ThreadError;
use crate::threading::subject_matching::DEFAULT_REPLY_PATTERN;

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(value) => parse_bool(&value).unwrap_or_else(|| {
            log::warn!("ignoring {}={}: expected a boolean", key, value);
            default
        }),
        Err(_) => default,
    }
}

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parsed<T>(key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match env::var(key) {
        Ok(value) => value.parse::<T>().unwrap_or_else(|err| {
            log::warn!("ignoring {}={}: {}", key, value, err);
            default
        }),
        Err(_) => default,
    }
}

/// How records sharing a Message-ID are threaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Every duplicate resolves its own parent, ending up next to the first
    #[default]
    Siblings,
    /// Duplicates become children of the first record with that id
    Nest,
}

impl FromStr for DuplicatePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "siblings" | "separate" => Ok(DuplicatePolicy::Siblings),
            "nest" | "thread" => Ok(DuplicatePolicy::Nest),
            other => Err(format!("unknown duplicate policy '{}'", other)),
        }
    }
}

/// Primary sort criterion for threads and subthreads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortMethod {
    #[default]
    Date,
    DateReceived,
    Subject,
    From,
    Size,
    MailboxOrder,
}

impl SortMethod {
    pub fn name(&self) -> &'static str {
        match self {
            SortMethod::Date => "date",
            SortMethod::DateReceived => "date-received",
            SortMethod::Subject => "subject",
            SortMethod::From => "from",
            SortMethod::Size => "size",
            SortMethod::MailboxOrder => "mailbox-order",
        }
    }
}

impl FromStr for SortMethod {
    type Err = ThreadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "date" | "date-sent" => Ok(SortMethod::Date),
            "date-received" => Ok(SortMethod::DateReceived),
            "subject" => Ok(SortMethod::Subject),
            "from" => Ok(SortMethod::From),
            "size" => Ok(SortMethod::Size),
            "mailbox-order" => Ok(SortMethod::MailboxOrder),
            other => Err(ThreadError::InvalidSort(other.to_string())),
        }
    }
}

/// Sort method plus the `reverse-` and `last-` modifiers.
///
/// ```rust
/// use thread_engine::config::{SortMethod, SortSpec};
///
/// let spec: SortSpec = "reverse-last-date".parse().unwrap();
/// assert_eq!(spec.method, SortMethod::Date);
/// assert!(spec.reverse && spec.last);
/// assert_eq!(spec.to_string(), "reverse-last-date");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SortSpec {
    pub method: SortMethod,
    /// Flip the order at every level
    pub reverse: bool,
    /// Order a thread by its greatest message instead of its root
    pub last: bool,
}

impl SortSpec {
    pub fn new(method: SortMethod) -> Self {
        SortSpec {
            method,
            reverse: false,
            last: false,
        }
    }

    pub fn reversed(mut self) -> Self {
        self.reverse = true;
        self
    }

    pub fn by_last(mut self) -> Self {
        self.last = true;
        self
    }
}

impl FromStr for SortSpec {
    type Err = ThreadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut rest = s.trim();
        let mut spec = SortSpec::default();

        if let Some(stripped) = rest.strip_prefix("reverse-") {
            spec.reverse = true;
            rest = stripped;
        }
        if let Some(stripped) = rest.strip_prefix("last-") {
            spec.last = true;
            rest = stripped;
        }

        spec.method = rest.parse()?;
        Ok(spec)
    }
}

impl fmt::Display for SortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            if self.reverse { "reverse-" } else { "" },
            if self.last { "last-" } else { "" },
            self.method.name()
        )
    }
}

/// Runtime configuration for the threading engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadingConfig {
    pub sort: SortSpec,
    /// Thread only by headers, never by subject
    pub strict_threads: bool,
    /// Subject fallback only for subjects that look like replies
    pub sort_re: bool,
    /// Pattern recognising reply prefixes such as "Re:"
    pub reply_regex: String,
    pub duplicates: DuplicatePolicy,
    /// Allow collapsing threads that still hold unread mail
    pub collapse_unread: bool,
    /// Do not mark missing parents in the tree
    pub hide_missing: bool,
    /// Do not mark parents hidden by the limit in the tree
    pub hide_limited: bool,
    /// One column per tree level instead of two
    pub narrow_tree: bool,
    /// Group same-subject threads when first sorting by subject
    pub group_by_subject: bool,
}

impl ThreadingConfig {
    pub fn from_env() -> Self {
        Self {
            sort: env_parsed("THREAD_SORT", SortSpec::default()),
            strict_threads: env_bool("THREAD_STRICT", false),
            sort_re: env_bool("THREAD_SORT_RE", true),
            reply_regex: env_string("THREAD_REPLY_REGEX", DEFAULT_REPLY_PATTERN),
            duplicates: env_parsed("THREAD_DUPLICATES", DuplicatePolicy::default()),
            collapse_unread: env_bool("THREAD_COLLAPSE_UNREAD", true),
            hide_missing: env_bool("THREAD_HIDE_MISSING", true),
            hide_limited: env_bool("THREAD_HIDE_LIMITED", false),
            narrow_tree: env_bool("THREAD_NARROW_TREE", false),
            group_by_subject: env_bool("THREAD_GROUP_BY_SUBJECT", true),
        }
    }

    pub fn with_sort(mut self, sort: SortSpec) -> Self {
        self.sort = sort;
        self
    }

    pub fn with_strict_threads(mut self, strict: bool) -> Self {
        self.strict_threads = strict;
        self
    }

    pub fn with_sort_re(mut self, sort_re: bool) -> Self {
        self.sort_re = sort_re;
        self
    }

    pub fn with_reply_regex(mut self, pattern: impl Into<String>) -> Self {
        self.reply_regex = pattern.into();
        self
    }

    pub fn with_duplicates(mut self, duplicates: DuplicatePolicy) -> Self {
        self.duplicates = duplicates;
        self
    }

    pub fn with_collapse_unread(mut self, collapse_unread: bool) -> Self {
        self.collapse_unread = collapse_unread;
        self
    }

    pub fn with_hide_missing(mut self, hide_missing: bool) -> Self {
        self.hide_missing = hide_missing;
        self
    }

    pub fn with_hide_limited(mut self, hide_limited: bool) -> Self {
        self.hide_limited = hide_limited;
        self
    }

    pub fn with_narrow_tree(mut self, narrow_tree: bool) -> Self {
        self.narrow_tree = narrow_tree;
        self
    }

    pub fn with_group_by_subject(mut self, group_by_subject: bool) -> Self {
        self.group_by_subject = group_by_subject;
        self
    }
}

impl Default for ThreadingConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
