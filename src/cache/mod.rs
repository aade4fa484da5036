//! Two-tier response cache.
//!
//! Lookups try the exact SHA-256 prompt hash first, then (when an embedder
//! is available) the stored embedding with the highest cosine similarity.
//! Store failures never reach the caller: they are logged and the call
//! degrades to a miss or a skipped write.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub mod embedding;
pub mod error;
pub mod store;

pub use embedding::{cosine_similarity, Embedder, HashingEmbedder, NullEmbedder};
pub use error::CacheError;
pub use store::{CacheStore, Candidate, Invalidation, NewEntry, NullCacheStore, SqliteCacheStore};

use crate::config::{CacheConfig, ConfigError, EmbeddingKind};
use crate::pipeline::{ExecutionRequest, ExecutionResponse, Executor, ExecutorError};

/// Hex SHA-256 of a prompt, the exact-path cache key
pub fn prompt_hash(prompt: &str) -> String {
    hex::encode(Sha256::digest(prompt.as_bytes()))
}

/// A cache hit
#[derive(Debug, Clone, PartialEq)]
pub struct CacheHit {
    pub response: serde_json::Value,
    /// 1.0 on the exact path
    pub similarity: f64,
    pub exact: bool,
}

/// Snapshot of cache counters and settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub enabled: bool,
    pub hits: u64,
    pub misses: u64,
    /// Percentage, two decimals
    pub hit_rate: f64,
    pub cache_size: usize,
    pub max_size: usize,
    pub similarity_threshold: f64,
    pub semantic_search_available: bool,
}

/// Result of [`SemanticCache::get_or_execute`]
#[derive(Debug, Clone, PartialEq)]
pub struct CachedResponse {
    pub response: ExecutionResponse,
    pub cached: bool,
}

pub struct SemanticCache {
    store: Arc<dyn CacheStore>,
    embedder: Arc<dyn Embedder>,
    enabled: bool,
    similarity_threshold: f64,
    max_size: usize,
    default_ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl SemanticCache {
    pub fn new(store: Arc<dyn CacheStore>, embedder: Arc<dyn Embedder>, config: &CacheConfig) -> Self {
        Self {
            store,
            embedder,
            enabled: config.enabled,
            similarity_threshold: config.similarity_threshold,
            max_size: config.max_size.max(1),
            default_ttl: Duration::from_secs(config.ttl_seconds),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Build the cache a config describes.
    ///
    /// A disabled cache gets the always-miss store; otherwise rows go to
    /// `config.path`, or to an in-memory database when no path is set.
    pub fn from_config(config: &CacheConfig) -> Result<Self, ConfigError> {
        let embedder: Arc<dyn Embedder> = match config.embedding {
            EmbeddingKind::None => Arc::new(NullEmbedder),
            EmbeddingKind::Hashing => Arc::new(HashingEmbedder::new(config.embedding_dimensions)),
        };

        if !config.enabled {
            return Ok(Self::new(Arc::new(NullCacheStore), embedder, config));
        }

        let store_error = |path: String, e: CacheError| ConfigError::Store {
            path,
            message: e.to_string(),
        };
        let store = match &config.path {
            Some(path) => SqliteCacheStore::open(path)
                .map_err(|e| store_error(path.display().to_string(), e))?,
            None => SqliteCacheStore::open_in_memory()
                .map_err(|e| store_error(":memory:".to_string(), e))?,
        };
        Ok(Self::new(Arc::new(store), embedder, config))
    }

    /// Enabled cache on an in-memory database
    pub fn in_memory(config: &CacheConfig) -> Result<Self, CacheError> {
        let embedder: Arc<dyn Embedder> = match config.embedding {
            EmbeddingKind::None => Arc::new(NullEmbedder),
            EmbeddingKind::Hashing => Arc::new(HashingEmbedder::new(config.embedding_dimensions)),
        };
        Ok(Self::new(
            Arc::new(SqliteCacheStore::open_in_memory()?),
            embedder,
            config,
        ))
    }

    /// Cache that never stores or returns anything
    pub fn disabled() -> Self {
        let config = CacheConfig {
            enabled: false,
            ..CacheConfig::default()
        };
        Self::new(Arc::new(NullCacheStore), Arc::new(NullEmbedder), &config)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn semantic_search_available(&self) -> bool {
        self.embedder.is_available()
    }

    pub fn similarity_threshold(&self) -> f64 {
        self.similarity_threshold
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    fn purge(&self, now: f64) {
        match self.store.purge_expired(now) {
            Ok(0) => {}
            Ok(purged) => tracing::debug!(purged, "Purged expired cache entries"),
            Err(e) => tracing::warn!(error = %e, "Failed to purge expired cache entries"),
        }
    }

    /// Look up a response for `prompt`, stored under `model` (or under no
    /// model when `None`).
    pub fn get(&self, prompt: &str, model: Option<&str>) -> Option<CacheHit> {
        if !self.enabled {
            return None;
        }
        let now = crate::unix_now();
        self.purge(now);

        let hit = self.lookup_exact(prompt, model, now).or_else(|| {
            if self.embedder.is_available() {
                self.lookup_similar(prompt, model, now)
            } else {
                None
            }
        });

        match &hit {
            Some(found) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                let path = if found.exact { "exact" } else { "semantic" };
                metrics::counter!("routewise_cache_hits_total", "path" => path).increment(1);
                tracing::debug!(
                    model = model.unwrap_or("-"),
                    exact = found.exact,
                    similarity = found.similarity,
                    "Cache hit"
                );
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("routewise_cache_misses_total").increment(1);
            }
        }
        hit
    }

    fn lookup_exact(&self, prompt: &str, model: Option<&str>, now: f64) -> Option<CacheHit> {
        let hash = prompt_hash(prompt);
        let text = match self.store.take_exact(&hash, model, now) {
            Ok(text) => text?,
            Err(e) => {
                tracing::warn!(error = %e, "Exact cache lookup failed");
                return None;
            }
        };
        decode_response(&text).map(|response| CacheHit {
            response,
            similarity: 1.0,
            exact: true,
        })
    }

    fn lookup_similar(&self, prompt: &str, model: Option<&str>, now: f64) -> Option<CacheHit> {
        let query = self.embedder.embed(prompt)?;
        let candidates = match self.store.candidates(model, now) {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::warn!(error = %e, "Semantic cache lookup failed");
                return None;
            }
        };

        let mut best: Option<(i64, f64)> = None;
        for candidate in &candidates {
            let score = cosine_similarity(&query, &candidate.embedding);
            if best.is_none_or(|(_, top)| score > top) {
                best = Some((candidate.id, score));
            }
        }

        let (id, similarity) = best?;
        if similarity < self.similarity_threshold {
            tracing::trace!(similarity, threshold = self.similarity_threshold, "Closest entry below threshold");
            return None;
        }

        let text = match self.store.take_by_id(id, now) {
            Ok(text) => text?,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read matched cache entry");
                return None;
            }
        };
        decode_response(&text).map(|response| CacheHit {
            response,
            similarity,
            exact: false,
        })
    }

    /// Store `response` for `prompt`, replacing any entry with the same
    /// `(prompt, model)`. `ttl` defaults to the configured TTL; a zero TTL
    /// writes an entry that is already expired.
    ///
    /// Returns whether the entry was written.
    pub fn put<T: Serialize + ?Sized>(
        &self,
        prompt: &str,
        response: &T,
        model: Option<&str>,
        ttl: Option<Duration>,
    ) -> bool {
        if !self.enabled {
            return false;
        }
        let payload = match serde_json::to_string(response) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to serialize response for cache");
                return false;
            }
        };

        let now = crate::unix_now();
        self.purge(now);

        let ttl = ttl.unwrap_or(self.default_ttl);
        let hash = prompt_hash(prompt);
        let embedding = if self.embedder.is_available() {
            self.embedder.embed(prompt)
        } else {
            None
        };
        let entry = NewEntry {
            prompt_hash: &hash,
            prompt_text: prompt,
            embedding: embedding.as_deref(),
            response: &payload,
            model,
            created_at: now,
            expires_at: now + ttl.as_secs_f64(),
        };

        match self.store.insert(&entry, self.max_size) {
            Ok(evicted) => {
                if evicted > 0 {
                    tracing::debug!(evicted, max_size = self.max_size, "Evicted cache entries");
                    metrics::counter!("routewise_cache_evictions_total").increment(evicted as u64);
                }
                tracing::debug!(
                    model = model.unwrap_or("-"),
                    ttl_seconds = ttl.as_secs(),
                    has_embedding = embedding.is_some(),
                    "Cached response"
                );
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to write cache entry");
                false
            }
        }
    }

    /// Cache proxy around an executor.
    ///
    /// Keyed by `(request.prompt, request.backend)`. Fresh responses with
    /// content are stored with the default TTL.
    pub async fn get_or_execute(
        &self,
        request: ExecutionRequest,
        executor: &dyn Executor,
    ) -> Result<CachedResponse, ExecutorError> {
        if let Some(hit) = self.get(&request.prompt, Some(&request.backend)) {
            match serde_json::from_value::<ExecutionResponse>(hit.response) {
                Ok(response) => {
                    return Ok(CachedResponse {
                        response,
                        cached: true,
                    })
                }
                Err(e) => tracing::warn!(error = %e, "Cached entry is not an execution response"),
            }
        }

        let prompt = request.prompt.clone();
        let backend = request.backend.clone();
        let response = executor.execute(request).await?;
        if !response.content.is_empty() {
            self.put(&prompt, &response, Some(&backend), None);
        }
        Ok(CachedResponse {
            response,
            cached: false,
        })
    }

    /// Targeted deletion.
    ///
    /// `prompt` alone removes it under every model, `model` alone removes
    /// every entry of that model. With neither nothing is deleted; use
    /// [`clear`](Self::clear) to wipe the cache.
    pub fn invalidate(&self, prompt: Option<&str>, model: Option<&str>) -> usize {
        let hash = prompt.map(prompt_hash);
        let target = match (hash.as_deref(), model) {
            (Some(prompt_hash), Some(model)) => Invalidation::PromptAndModel { prompt_hash, model },
            (Some(prompt_hash), None) => Invalidation::Prompt { prompt_hash },
            (None, Some(model)) => Invalidation::Model { model },
            (None, None) => {
                tracing::debug!("Invalidate called without prompt or model; ignoring");
                return 0;
            }
        };

        match self.store.invalidate(target) {
            Ok(deleted) => {
                tracing::debug!(deleted, "Invalidated cache entries");
                deleted
            }
            Err(e) => {
                tracing::warn!(error = %e, "Cache invalidation failed");
                0
            }
        }
    }

    /// Delete every entry and reset the hit/miss counters
    pub fn clear(&self) -> usize {
        let deleted = match self.store.clear() {
            Ok(deleted) => deleted,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to clear cache");
                0
            }
        };
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        tracing::info!(deleted, "Cache cleared");
        deleted
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            (hits as f64 / total as f64 * 10_000.0).round() / 100.0
        } else {
            0.0
        };
        let cache_size = self
            .store
            .live_count(crate::unix_now())
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Failed to count cache entries");
                0
            });

        CacheStats {
            enabled: self.enabled,
            hits,
            misses,
            hit_rate,
            cache_size,
            max_size: self.max_size,
            similarity_threshold: self.similarity_threshold,
            semantic_search_available: self.semantic_search_available(),
        }
    }
}

fn decode_response(text: &str) -> Option<serde_json::Value> {
    serde_json::from_str(text)
        .map_err(|e| tracing::warn!(error = %e, "Discarding undecodable cache entry"))
        .ok()
}
