//! Cache row storage
//!
//! [`SemanticCache`](super::SemanticCache) talks to its rows only through the
//! [`CacheStore`] trait. Responses travel as serialised JSON text; the store
//! never looks inside them.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension};

use super::embedding::{decode_embedding, encode_embedding};
use super::CacheError;

const SCHEMA_VERSION: i64 = 1;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS cache (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    prompt_hash  TEXT NOT NULL,
    prompt_text  TEXT NOT NULL,
    embedding    BLOB,
    response     TEXT NOT NULL,
    model        TEXT,
    created_at   REAL NOT NULL,
    expires_at   REAL NOT NULL,
    hit_count    INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_cache_prompt_hash ON cache(prompt_hash);
CREATE INDEX IF NOT EXISTS idx_cache_expires_at ON cache(expires_at);
";

/// A row about to be written
#[derive(Debug, Clone)]
pub struct NewEntry<'a> {
    pub prompt_hash: &'a str,
    pub prompt_text: &'a str,
    pub embedding: Option<&'a [f32]>,
    pub response: &'a str,
    pub model: Option<&'a str>,
    pub created_at: f64,
    pub expires_at: f64,
}

/// A live row with a stored embedding, as seen by the fuzzy path
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub id: i64,
    pub embedding: Vec<f32>,
}

/// Which rows `invalidate` removes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Invalidation<'a> {
    /// One prompt under one model
    PromptAndModel { prompt_hash: &'a str, model: &'a str },
    /// One prompt under every model
    Prompt { prompt_hash: &'a str },
    /// Every prompt under one model
    Model { model: &'a str },
}

/// Backing storage for cache rows.
///
/// `model: None` addresses rows stored without a model, not "any model".
/// Every method is one lock acquisition; multi-statement writes commit
/// together or not at all.
pub trait CacheStore: Send + Sync {
    /// Delete rows with `expires_at <= now`
    fn purge_expired(&self, now: f64) -> Result<usize, CacheError>;

    /// Newest live row for `(prompt_hash, model)`; bumps its `hit_count`
    fn take_exact(
        &self,
        prompt_hash: &str,
        model: Option<&str>,
        now: f64,
    ) -> Result<Option<String>, CacheError>;

    /// Live rows for `model` that carry an embedding
    fn candidates(&self, model: Option<&str>, now: f64) -> Result<Vec<Candidate>, CacheError>;

    /// Response of a live row by id; bumps its `hit_count`
    fn take_by_id(&self, id: i64, now: f64) -> Result<Option<String>, CacheError>;

    /// Replace any row with the same `(prompt_hash, model)`, evicting the
    /// least used rows first when `max_size` live rows are already present.
    /// Returns the number of evicted rows.
    fn insert(&self, entry: &NewEntry<'_>, max_size: usize) -> Result<usize, CacheError>;

    fn invalidate(&self, target: Invalidation<'_>) -> Result<usize, CacheError>;

    /// Delete every row
    fn clear(&self) -> Result<usize, CacheError>;

    fn live_count(&self, now: f64) -> Result<usize, CacheError>;
}

/// Always-miss store used when caching is disabled
#[derive(Debug, Clone, Copy, Default)]
pub struct NullCacheStore;

impl CacheStore for NullCacheStore {
    fn purge_expired(&self, _now: f64) -> Result<usize, CacheError> {
        Ok(0)
    }

    fn take_exact(
        &self,
        _prompt_hash: &str,
        _model: Option<&str>,
        _now: f64,
    ) -> Result<Option<String>, CacheError> {
        Ok(None)
    }

    fn candidates(&self, _model: Option<&str>, _now: f64) -> Result<Vec<Candidate>, CacheError> {
        Ok(Vec::new())
    }

    fn take_by_id(&self, _id: i64, _now: f64) -> Result<Option<String>, CacheError> {
        Ok(None)
    }

    fn insert(&self, _entry: &NewEntry<'_>, _max_size: usize) -> Result<usize, CacheError> {
        Ok(0)
    }

    fn invalidate(&self, _target: Invalidation<'_>) -> Result<usize, CacheError> {
        Ok(0)
    }

    fn clear(&self) -> Result<usize, CacheError> {
        Ok(0)
    }

    fn live_count(&self, _now: f64) -> Result<usize, CacheError> {
        Ok(0)
    }
}

/// Cache rows in SQLite, file-backed or in-memory
pub struct SqliteCacheStore {
    conn: Mutex<Connection>,
}

impl SqliteCacheStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| CacheError::Open {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        }
        Self::with_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, CacheError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, CacheError> {
        let current: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if current < SCHEMA_VERSION {
            conn.execute_batch(SCHEMA)?;
            conn.execute_batch(&format!("PRAGMA user_version = {}", SCHEMA_VERSION))?;
        }
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, CacheError> {
        self.conn.lock().map_err(|_| CacheError::Poisoned)
    }
}

fn to_count(n: i64) -> usize {
    usize::try_from(n).unwrap_or(0)
}

impl CacheStore for SqliteCacheStore {
    fn purge_expired(&self, now: f64) -> Result<usize, CacheError> {
        let conn = self.conn()?;
        Ok(conn.execute("DELETE FROM cache WHERE expires_at <= ?1", params![now])?)
    }

    fn take_exact(
        &self,
        prompt_hash: &str,
        model: Option<&str>,
        now: f64,
    ) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let row: Option<(i64, String)> = tx
            .query_row(
                "SELECT id, response FROM cache
                 WHERE prompt_hash = ?1 AND model IS ?2 AND expires_at > ?3
                 ORDER BY created_at DESC, id DESC
                 LIMIT 1",
                params![prompt_hash, model, now],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((id, response)) = row else {
            return Ok(None);
        };
        tx.execute(
            "UPDATE cache SET hit_count = hit_count + 1 WHERE id = ?1",
            params![id],
        )?;
        tx.commit()?;
        Ok(Some(response))
    }

    fn candidates(&self, model: Option<&str>, now: f64) -> Result<Vec<Candidate>, CacheError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, embedding FROM cache
             WHERE embedding IS NOT NULL AND model IS ?1 AND expires_at > ?2",
        )?;
        let rows = stmt.query_map(params![model, now], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, Vec<u8>>(1)?))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (id, blob) = row?;
            match decode_embedding(&blob) {
                Some(embedding) => out.push(Candidate { id, embedding }),
                None => tracing::warn!(id, bytes = blob.len(), "Skipping malformed cache embedding"),
            }
        }
        Ok(out)
    }

    fn take_by_id(&self, id: i64, now: f64) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let response: Option<String> = tx
            .query_row(
                "SELECT response FROM cache WHERE id = ?1 AND expires_at > ?2",
                params![id, now],
                |row| row.get(0),
            )
            .optional()?;
        if response.is_some() {
            tx.execute(
                "UPDATE cache SET hit_count = hit_count + 1 WHERE id = ?1",
                params![id],
            )?;
            tx.commit()?;
        }
        Ok(response)
    }

    fn insert(&self, entry: &NewEntry<'_>, max_size: usize) -> Result<usize, CacheError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            "DELETE FROM cache WHERE prompt_hash = ?1 AND model IS ?2",
            params![entry.prompt_hash, entry.model],
        )?;

        let live: i64 = tx.query_row(
            "SELECT COUNT(*) FROM cache WHERE expires_at > ?1",
            params![entry.created_at],
            |row| row.get(0),
        )?;

        let mut evicted = 0;
        let live = to_count(live);
        if live >= max_size {
            // Overshoot happens after a reopen with a smaller bound.
            let batch = (live - max_size + 1).max((max_size / 10).max(1));
            evicted = tx.execute(
                "DELETE FROM cache WHERE id IN (
                    SELECT id FROM cache
                    WHERE expires_at > ?2
                    ORDER BY hit_count ASC, created_at ASC, id ASC
                    LIMIT ?1
                 )",
                params![i64::try_from(batch).unwrap_or(i64::MAX), entry.created_at],
            )?;
        }

        tx.execute(
            "INSERT INTO cache (
                prompt_hash, prompt_text, embedding, response, model,
                created_at, expires_at, hit_count
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0)",
            params![
                entry.prompt_hash,
                entry.prompt_text,
                entry.embedding.map(encode_embedding),
                entry.response,
                entry.model,
                entry.created_at,
                entry.expires_at,
            ],
        )?;
        tx.commit()?;
        Ok(evicted)
    }

    fn invalidate(&self, target: Invalidation<'_>) -> Result<usize, CacheError> {
        let conn = self.conn()?;
        let deleted = match target {
            Invalidation::PromptAndModel { prompt_hash, model } => conn.execute(
                "DELETE FROM cache WHERE prompt_hash = ?1 AND model = ?2",
                params![prompt_hash, model],
            )?,
            Invalidation::Prompt { prompt_hash } => conn.execute(
                "DELETE FROM cache WHERE prompt_hash = ?1",
                params![prompt_hash],
            )?,
            Invalidation::Model { model } => {
                conn.execute("DELETE FROM cache WHERE model = ?1", params![model])?
            }
        };
        Ok(deleted)
    }

    fn clear(&self) -> Result<usize, CacheError> {
        let conn = self.conn()?;
        Ok(conn.execute("DELETE FROM cache", [])?)
    }

    fn live_count(&self, now: f64) -> Result<usize, CacheError> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM cache WHERE expires_at > ?1",
            params![now],
            |row| row.get(0),
        )?;
        Ok(to_count(count))
    }
}
