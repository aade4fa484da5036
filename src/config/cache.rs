//! Semantic cache configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Embedding backend used for the fuzzy cache path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingKind {
    /// No embeddings, exact-hash lookups only
    #[default]
    None,
    /// Local deterministic hashing embedder
    Hashing,
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    /// SQLite file for cache rows; in-memory when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Minimum cosine similarity for a fuzzy hit (inclusive)
    pub similarity_threshold: f64,
    /// Maximum number of live entries
    pub max_size: usize,
    /// Default time-to-live for new entries
    pub ttl_seconds: u64,
    pub embedding: EmbeddingKind,
    /// Vector size for the hashing embedder
    pub embedding_dimensions: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
            similarity_threshold: 0.85,
            max_size: 10_000,
            ttl_seconds: 3600,
            embedding: EmbeddingKind::None,
            embedding_dimensions: 256,
        }
    }
}
