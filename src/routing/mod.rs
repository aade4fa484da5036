//! Backend and strategy selection for inbound tasks
//!
//! A task flows through keyword feature extraction, a routing model (rules
//! or a learned classifier), strategy selection and cost estimation, and
//! leaves as a [`RoutingDecision`] that the [`Router`] persists before
//! returning it.

use std::collections::BTreeMap;
use std::sync::Arc;

pub mod classifier;
pub mod cost;
pub mod decision;
pub mod error;
pub mod features;
pub mod keywords;
pub mod learned;
pub mod rules;
pub mod strategy;

pub use classifier::{ClassMetrics, SoftmaxClassifier, TrainingOptions};
pub use cost::{CostEstimator, TokenEstimate};
pub use decision::{RoutingContext, RoutingDecision, RoutingSource, Strategy};
pub use error::{PredictionError, TrainingError};
pub use features::{FeatureExtractor, FeatureVector, KeywordSignals, SuccessRates};
pub use learned::{retrain_loop, LearnedRouter, TrainedModel, TrainingReport};
pub use rules::RuleBasedRouter;
pub use strategy::suggest_strategy;

use crate::catalog::ModelCatalog;
use crate::outcomes::{DecisionStore, ModelPerformance, Outcome, StoreError};

/// A routing variant. Chosen once at construction, never re-detected per call.
pub trait RoutingModel: Send + Sync {
    /// Produce a decision. Must not fail.
    fn route(&self, task: &str, context: &RoutingContext) -> RoutingDecision;

    /// Short variant name for logs and status reports
    fn name(&self) -> &'static str;

    fn is_trained(&self) -> bool {
        false
    }
}

impl RoutingModel for RuleBasedRouter {
    fn route(&self, task: &str, context: &RoutingContext) -> RoutingDecision {
        RuleBasedRouter::route(self, task, context)
    }

    fn name(&self) -> &'static str {
        "rule_based"
    }
}

impl RoutingModel for LearnedRouter {
    fn route(&self, task: &str, context: &RoutingContext) -> RoutingDecision {
        LearnedRouter::route(self, task, context)
    }

    fn name(&self) -> &'static str {
        "learned"
    }

    fn is_trained(&self) -> bool {
        LearnedRouter::is_trained(self)
    }
}

/// Routes tasks and records every decision in the outcome store.
pub struct Router {
    model: Arc<dyn RoutingModel>,
    learned: Option<Arc<LearnedRouter>>,
    estimator: CostEstimator,
    store: Arc<dyn DecisionStore>,
}

impl Router {
    /// Router backed by the deterministic rules only
    pub fn rule_based(rules: RuleBasedRouter, store: Arc<dyn DecisionStore>) -> Self {
        let estimator = rules.estimator().clone();
        Self {
            model: Arc::new(rules),
            learned: None,
            estimator,
            store,
        }
    }

    /// Router backed by a learned model (which falls back to rules internally)
    pub fn learned(learned: Arc<LearnedRouter>, store: Arc<dyn DecisionStore>) -> Self {
        let estimator = learned.rules().estimator().clone();
        Self {
            model: learned.clone(),
            learned: Some(learned),
            estimator,
            store,
        }
    }

    /// Route a task and persist the decision.
    ///
    /// A failed write is logged; the decision is still returned.
    pub fn route(&self, task: &str, context: &RoutingContext) -> RoutingDecision {
        let decision = self.model.route(task, context);

        if let Err(e) = self.store.record_decision(task, &decision) {
            tracing::warn!(
                decision_id = %decision.decision_id,
                error = %e,
                "Failed to persist routing decision"
            );
        }

        tracing::debug!(
            decision_id = %decision.decision_id,
            model = %decision.model,
            strategy = %decision.strategy,
            n_samples = decision.n_samples,
            confidence = decision.confidence,
            source = decision.source.as_str(),
            "Task routed"
        );
        metrics::counter!(
            "routewise_routing_decisions_total",
            "model" => decision.model.clone(),
            "source" => decision.source.as_str(),
        )
        .increment(1);

        decision
    }

    /// Record the real-world outcome of an earlier decision
    pub fn record_outcome(&self, decision_id: &str, outcome: &Outcome) -> Result<(), StoreError> {
        self.store.record_outcome(decision_id, outcome)
    }

    /// Estimated single-call cost of the task on every backend
    pub fn estimate_cost(&self, task: &str) -> BTreeMap<String, f64> {
        self.estimator.estimate_cost(task)
    }

    pub fn suggest_strategy(&self, task: &str) -> Strategy {
        suggest_strategy(task)
    }

    pub fn build_fallback_chain(&self, model: &str) -> Vec<String> {
        self.estimator.build_fallback_chain(model)
    }

    pub fn model_performance(&self) -> Result<Vec<ModelPerformance>, StoreError> {
        self.store.model_performance()
    }

    pub fn catalog(&self) -> &ModelCatalog {
        self.estimator.catalog()
    }

    /// The learned variant, when this router was built with one
    pub fn learned_router(&self) -> Option<&Arc<LearnedRouter>> {
        self.learned.as_ref()
    }

    /// Name of the routing variant
    pub fn kind(&self) -> &'static str {
        self.model.name()
    }

    pub fn is_trained(&self) -> bool {
        self.model.is_trained()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LearningConfig, RoutingConfig};
    use crate::outcomes::SqliteDecisionStore;

    fn rules() -> RuleBasedRouter {
        RuleBasedRouter::new(ModelCatalog::default(), RoutingConfig::default()).unwrap()
    }

    #[test]
    fn test_route_persists_decision() {
        let store = Arc::new(SqliteDecisionStore::open_in_memory().unwrap());
        let router = Router::rule_based(rules(), store.clone());

        let decision = router.route("отчёт по расходу токенов", &RoutingContext::default());
        assert_eq!(store.decision_count().unwrap(), 1);

        router
            .record_outcome(
                &decision.decision_id,
                &Outcome {
                    success: true,
                    quality_score: 0.8,
                    actual_cost_usd: 0.001,
                    actual_latency_ms: 50.0,
                },
            )
            .unwrap();
        assert_eq!(store.outcome_count().unwrap(), 1);
    }

    #[test]
    fn test_router_kinds() {
        let store: Arc<dyn DecisionStore> = Arc::new(SqliteDecisionStore::open_in_memory().unwrap());
        let rule_router = Router::rule_based(rules(), store.clone());
        assert_eq!(rule_router.kind(), "rule_based");
        assert!(rule_router.learned_router().is_none());

        let learned = Arc::new(LearnedRouter::new(rules(), store.clone(), LearningConfig::default()));
        let learned_router = Router::learned(learned, store);
        assert_eq!(learned_router.kind(), "learned");
        assert!(!learned_router.is_trained());
    }

    #[test]
    fn test_facade_helpers() {
        let store = Arc::new(SqliteDecisionStore::open_in_memory().unwrap());
        let router = Router::rule_based(rules(), store);
        assert_eq!(router.estimate_cost("short").len(), 4);
        assert_eq!(router.build_fallback_chain("sonnet"), vec!["opus"]);
        assert_eq!(router.suggest_strategy("short"), Strategy::SingleShot);
    }
}
