//! Routing decisions and their real-world outcomes.
//!
//! Every decision the [`Router`](crate::routing::Router) makes is persisted
//! immediately; an outcome may later be joined to it. Successful,
//! good-quality pairs are the training data of the learned router.

pub mod error;
pub mod sqlite;

pub use error::StoreError;
pub use sqlite::SqliteDecisionStore;

use serde::{Deserialize, Serialize};

use crate::routing::{RoutingDecision, SuccessRates};

/// Ground-truth result of executing a routing decision.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub success: bool,
    /// Externally judged output quality in [0, 1]
    pub quality_score: f64,
    pub actual_cost_usd: f64,
    pub actual_latency_ms: f64,
}

impl Outcome {
    /// Clamp quality to [0, 1] and negative or non-finite measurements to 0
    pub fn sanitized(self) -> Self {
        let non_negative = |v: f64| if v.is_finite() && v > 0.0 { v } else { 0.0 };
        Self {
            success: self.success,
            quality_score: if self.quality_score.is_finite() {
                self.quality_score.clamp(0.0, 1.0)
            } else {
                0.0
            },
            actual_cost_usd: non_negative(self.actual_cost_usd),
            actual_latency_ms: non_negative(self.actual_latency_ms),
        }
    }
}

/// Aggregated outcome statistics of one backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPerformance {
    pub model: String,
    pub total: u64,
    pub success_rate: f64,
    pub avg_quality: f64,
    pub avg_cost_usd: f64,
    pub avg_latency_ms: f64,
    /// Average cost per unit of quality; `None` when average quality is 0
    pub cost_per_quality: Option<f64>,
}

/// One training row: the task text and the backend that handled it well.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainingSample {
    pub task_text: String,
    pub model: String,
}

/// Minimum quality for an outcome to count as a training example.
pub const TRAINING_QUALITY_FLOOR: f64 = 0.5;

/// Storage for decisions and outcomes.
///
/// Each call is one serializable unit of work; implementations must be safe
/// to share across request handlers.
pub trait DecisionStore: Send + Sync {
    /// Persist a freshly made decision together with its task text
    fn record_decision(&self, task: &str, decision: &RoutingDecision) -> Result<(), StoreError>;

    /// Append an outcome. Fails with `UnknownDecision` if the decision was never recorded.
    fn record_outcome(&self, decision_id: &str, outcome: &Outcome) -> Result<(), StoreError>;

    /// Most recent successful rows with quality >= 0.5, newest first
    fn training_samples(&self, limit: usize) -> Result<Vec<TrainingSample>, StoreError>;

    /// Per-backend aggregates over all decision/outcome pairs, best quality first
    fn model_performance(&self) -> Result<Vec<ModelPerformance>, StoreError>;

    /// Total number of recorded outcomes
    fn outcome_count(&self) -> Result<u64, StoreError>;

    /// Total number of recorded decisions
    fn decision_count(&self) -> Result<u64, StoreError>;

    /// Historical success rate per backend
    fn success_rates(&self) -> Result<SuccessRates, StoreError> {
        Ok(self
            .model_performance()?
            .into_iter()
            .map(|perf| (perf.model, perf.success_rate))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_sanitized() {
        let outcome = Outcome {
            success: true,
            quality_score: 1.7,
            actual_cost_usd: -1.0,
            actual_latency_ms: f64::NAN,
        }
        .sanitized();

        assert_eq!(outcome.quality_score, 1.0);
        assert_eq!(outcome.actual_cost_usd, 0.0);
        assert_eq!(outcome.actual_latency_ms, 0.0);
    }
}
