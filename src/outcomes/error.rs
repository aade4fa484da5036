//! Persistence error types

use thiserror::Error;

/// Errors from the decision/outcome store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Failed to open decision store at {path}: {message}")]
    Open { path: String, message: String },

    /// Outcome recorded for a decision that was never persisted
    #[error("Unknown decision '{0}'")]
    UnknownDecision(String),

    /// A stored value could not be decoded
    #[error("Corrupt row: {0}")]
    Corrupt(String),

    /// Another thread panicked while holding the connection
    #[error("Store lock poisoned")]
    Poisoned,
}
