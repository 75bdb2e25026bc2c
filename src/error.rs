use thiserror::Error;

use crate::index::RecordId;

/// Errors surfaced by the threading engine.
///
/// Structural anomalies in the message set (duplicate ids, missing parents,
/// reference cycles) never show up here; they are absorbed while building.
/// What remains is caller misuse and persistence failures.
#[derive(Debug, Error)]
pub enum ThreadError {
    #[error("node handle from generation {found} used against forest generation {current}")]
    StaleHandle { current: u32, found: u32 },
    #[error("node {0} does not belong to the current forest")]
    UnknownNode(usize),
    #[error("record {0} is not part of the message index")]
    UnknownRecord(RecordId),
    #[error("{0}: unknown sorting method")]
    InvalidSort(String),
    #[error("record {0} has no Message-ID to link to")]
    MissingMessageId(RecordId),
    #[error("message has no parent")]
    NoParent,
    #[error("parent message is not visible in this limited view")]
    ParentNotVisible,
    #[error("collapse state not found")]
    NotFound,
    #[error("collapse state version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
    #[error("IO error: {0}")]
    IoError(String),
    #[error("serialization error: {0}")]
    SerializeError(String),
    #[error("deserialization error: {0}")]
    DeserializeError(String),
}

pub type Result<T> = std::result::Result<T, ThreadError>;
