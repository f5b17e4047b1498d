use thiserror::Error;

use crate::Position;

/// Errors that can occur when writing to or reading from the journal.
#[derive(Debug, Error)]
pub enum JournalError {
    /// Another writer appended between the caller's read and its append.
    #[error("Journal head moved: expected position {expected}, found {actual}")]
    ConcurrencyConflict { expected: Position, actual: Position },

    /// The batch handed to `append` is malformed.
    #[error("Invalid journal batch: {0}")]
    InvalidBatch(String),

    /// The journal refused the write.
    #[error("Journal unavailable: {0}")]
    Unavailable(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for journal operations.
pub type Result<T> = std::result::Result<T, JournalError>;
