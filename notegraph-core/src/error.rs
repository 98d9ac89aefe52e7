use thiserror::Error;
use uuid::Uuid;

use crate::embeddings::EmbeddingError;
use crate::models::EdgeKey;

#[derive(Error, Debug)]
pub enum NotegraphError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Pattern compile error: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Unknown profile: {0}")]
    UnknownProfile(String),

    #[error("Invalid profile '{name}': {reason}")]
    InvalidProfile { name: String, reason: String },

    #[error("Unknown relationship type: {0}")]
    UnknownRelationshipType(String),

    #[error("Note not found: {0}")]
    NoteNotFound(Uuid),

    #[error(transparent)]
    FeatureExtraction(#[from] FeatureExtractionError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error("IPC error: {0}")]
    Ipc(String),
}

/// Raised when a note's text cannot be turned into a feature bundle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeatureExtractionError {
    #[error("note {0} has empty content")]
    EmptyContent(Uuid),

    #[error("note {0} has no parseable tokens")]
    Unparseable(Uuid),
}

impl FeatureExtractionError {
    pub fn note_id(&self) -> Uuid {
        match self {
            Self::EmptyContent(id) | Self::Unparseable(id) => *id,
        }
    }
}

/// Errors surfaced by document and graph store backends.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("note {0} does not exist")]
    NoteMissing(Uuid),

    #[error("note {0} cannot be related to itself")]
    SelfRelationship(Uuid),

    /// A concurrent write changed the row underneath this one.
    #[error("write conflict: {0}")]
    Conflict(String),

    #[error("stored row could not be decoded: {0}")]
    Corrupt(String),

    #[error("Database error: {0}")]
    Database(sqlx::Error),
}

impl StoreError {
    /// Errors worth retrying: the backend may come back.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::Io(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => StoreError::Unavailable(e.to_string()),
            other => StoreError::Database(other),
        }
    }
}

/// Per-edge write failures. Only `Store` errors with a transient cause abort a
/// whole plan; the others are reported and the plan continues.
#[derive(Error, Debug)]
pub enum EdgeWriteError {
    #[error("edge write conflict on {key}: {reason}")]
    Conflict { key: EdgeKey, reason: String },

    #[error("bidirectional write failed on {key} (forward rolled back: {rolled_back}): {cause}")]
    Bidirectional {
        key: EdgeKey,
        rolled_back: bool,
        cause: String,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EdgeWriteError {
    /// Short machine-readable label used in reports.
    pub fn kind(&self) -> &'static str {
        match self {
            EdgeWriteError::Conflict { .. } => "edge_write_conflict",
            EdgeWriteError::Bidirectional { .. } => "bidirectional_write_failure",
            EdgeWriteError::Store(_) => "store_error",
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, EdgeWriteError::Store(e) if e.is_transient())
    }
}
