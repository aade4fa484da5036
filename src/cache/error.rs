//! Cache error types

use thiserror::Error;

/// Errors from the cache's backing store
///
/// Never surfaced by [`SemanticCache`](super::SemanticCache) lookups and
/// writes, which log them and degrade to a miss or a skipped write.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Failed to (de)serialize cached response: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to open cache at {path}: {message}")]
    Open { path: String, message: String },

    #[error("Cache lock poisoned")]
    Poisoned,
}
