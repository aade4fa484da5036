//! SQLite-backed decision store

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection};

use super::{DecisionStore, ModelPerformance, Outcome, StoreError, TrainingSample};
use super::TRAINING_QUALITY_FLOOR;
use crate::routing::RoutingDecision;

const SCHEMA_VERSION: i64 = 1;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS decisions (
    decision_id     TEXT PRIMARY KEY,
    task_text       TEXT NOT NULL,
    model           TEXT NOT NULL,
    strategy        TEXT NOT NULL,
    n_samples       INTEGER NOT NULL,
    confidence      REAL NOT NULL,
    estimated_cost  REAL NOT NULL,
    source          TEXT NOT NULL,
    reasoning       TEXT NOT NULL,
    created_at      REAL NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_decisions_model ON decisions(model);

CREATE TABLE IF NOT EXISTS outcomes (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    decision_id         TEXT NOT NULL REFERENCES decisions(decision_id),
    success             INTEGER NOT NULL,
    quality_score       REAL NOT NULL,
    actual_cost         REAL NOT NULL,
    actual_latency_ms   REAL NOT NULL,
    created_at          REAL NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_outcomes_decision ON outcomes(decision_id);
";

/// Decision store on a single SQLite connection.
///
/// The connection sits behind a mutex; every trait call takes the lock once
/// and multi-statement writes run in one transaction.
pub struct SqliteDecisionStore {
    conn: Mutex<Connection>,
}

impl SqliteDecisionStore {
    /// Open or create the database file, creating missing parent directories
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Open {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        }
        Self::with_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

fn migrate(conn: &Connection) -> Result<(), StoreError> {
    let current: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if current < SCHEMA_VERSION {
        conn.execute_batch(SCHEMA)?;
        conn.execute_batch(&format!("PRAGMA user_version = {}", SCHEMA_VERSION))?;
    }
    Ok(())
}

impl DecisionStore for SqliteDecisionStore {
    fn record_decision(&self, task: &str, decision: &RoutingDecision) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO decisions (
                decision_id, task_text, model, strategy, n_samples,
                confidence, estimated_cost, source, reasoning, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                decision.decision_id,
                task,
                decision.model,
                decision.strategy.as_str(),
                decision.n_samples,
                decision.confidence,
                decision.estimated_cost_usd,
                decision.source.as_str(),
                decision.reasoning,
                crate::unix_now(),
            ],
        )?;
        Ok(())
    }

    fn record_outcome(&self, decision_id: &str, outcome: &Outcome) -> Result<(), StoreError> {
        let outcome = outcome.sanitized();
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM decisions WHERE decision_id = ?1)",
            params![decision_id],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(StoreError::UnknownDecision(decision_id.to_string()));
        }

        tx.execute(
            "INSERT INTO outcomes (
                decision_id, success, quality_score, actual_cost, actual_latency_ms, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                decision_id,
                outcome.success,
                outcome.quality_score,
                outcome.actual_cost_usd,
                outcome.actual_latency_ms,
                crate::unix_now(),
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn training_samples(&self, limit: usize) -> Result<Vec<TrainingSample>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT d.task_text, d.model
             FROM decisions d
             JOIN outcomes o ON d.decision_id = o.decision_id
             WHERE o.success = 1 AND o.quality_score >= ?1
             ORDER BY o.created_at DESC, o.id DESC
             LIMIT ?2",
        )?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![TRAINING_QUALITY_FLOOR, limit], |row| {
            Ok(TrainingSample {
                task_text: row.get(0)?,
                model: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn model_performance(&self) -> Result<Vec<ModelPerformance>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT d.model,
                    COUNT(*) AS total,
                    AVG(o.success) AS success_rate,
                    AVG(o.quality_score) AS avg_quality,
                    AVG(o.actual_cost) AS avg_cost,
                    AVG(o.actual_latency_ms) AS avg_latency
             FROM decisions d
             JOIN outcomes o ON d.decision_id = o.decision_id
             GROUP BY d.model
             ORDER BY avg_quality DESC, d.model ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            let total: i64 = row.get(1)?;
            let avg_quality: f64 = row.get::<_, Option<f64>>(3)?.unwrap_or(0.0);
            let avg_cost_usd: f64 = row.get::<_, Option<f64>>(4)?.unwrap_or(0.0);
            Ok(ModelPerformance {
                model: row.get(0)?,
                total: total.max(0) as u64,
                success_rate: row.get::<_, Option<f64>>(2)?.unwrap_or(0.0),
                avg_quality,
                avg_cost_usd,
                avg_latency_ms: row.get::<_, Option<f64>>(5)?.unwrap_or(0.0),
                cost_per_quality: (avg_quality > 0.0).then(|| avg_cost_usd / avg_quality),
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn outcome_count(&self) -> Result<u64, StoreError> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM outcomes", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    fn decision_count(&self) -> Result<u64, StoreError> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM decisions", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }
}
