//! Learned routing model trained on recorded outcomes.
//!
//! Wraps a [`RuleBasedRouter`] as fallback. Until a model is trained (or
//! loaded) every call is answered by the rules; afterwards the classifier
//! picks the backend and its probability is reported as confidence. The
//! confidence never gates the decision.
//!
//! Trained weights are immutable and swapped in atomically, so a route call
//! that already cloned the current model keeps using it while a retrain
//! installs the next one.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::classifier::{
    classification_report, train_test_split, ClassMetrics, SoftmaxClassifier, TrainingOptions,
};
use super::decision::{RoutingContext, RoutingDecision, RoutingSource};
use super::error::{PredictionError, TrainingError};
use super::features::{FeatureExtractor, KeywordSignals};
use super::rules::RuleBasedRouter;
use crate::config::LearningConfig;
use crate::outcomes::DecisionStore;

/// Summary of one training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    /// Accuracy on the hold-out set (on the training set when there is none)
    pub accuracy: f64,
    pub per_class: BTreeMap<String, ClassMetrics>,
    pub train_samples: usize,
    pub test_samples: usize,
    pub label_distribution: BTreeMap<String, usize>,
    pub stratified: bool,
    pub trained_at: DateTime<Utc>,
}

/// A fitted classifier plus when it was produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainedModel {
    pub classifier: SoftmaxClassifier,
    /// Catalog ids in cost order at training time
    pub backends: Vec<String>,
    pub trained_at: DateTime<Utc>,
}

/// Router that predicts the backend from historical outcomes.
pub struct LearnedRouter {
    rules: RuleBasedRouter,
    extractor: FeatureExtractor,
    store: Arc<dyn DecisionStore>,
    config: LearningConfig,
    options: TrainingOptions,
    model: RwLock<Option<Arc<TrainedModel>>>,
    outcomes_at_last_training: AtomicU64,
}

impl LearnedRouter {
    pub fn new(rules: RuleBasedRouter, store: Arc<dyn DecisionStore>, config: LearningConfig) -> Self {
        let extractor = FeatureExtractor::new(rules.catalog().clone());
        Self {
            rules,
            extractor,
            store,
            config,
            options: TrainingOptions::default(),
            model: RwLock::new(None),
            outcomes_at_last_training: AtomicU64::new(0),
        }
    }

    /// Override optimiser settings
    pub fn with_options(mut self, options: TrainingOptions) -> Self {
        self.options = options;
        self
    }

    pub fn rules(&self) -> &RuleBasedRouter {
        &self.rules
    }

    pub fn config(&self) -> &LearningConfig {
        &self.config
    }

    pub fn is_trained(&self) -> bool {
        self.current_model().is_some()
    }

    /// The installed model, if any
    pub fn current_model(&self) -> Option<Arc<TrainedModel>> {
        match self.model.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => {
                tracing::warn!("Model lock poisoned in current_model, recovering");
                poisoned.into_inner().clone()
            }
        }
    }

    fn install(&self, model: TrainedModel) {
        let model = Some(Arc::new(model));
        match self.model.write() {
            Ok(mut guard) => *guard = model,
            Err(poisoned) => {
                tracing::warn!("Model lock poisoned in install, recovering");
                *poisoned.into_inner() = model;
            }
        }
    }

    /// Route a task, falling back to the rules on any prediction failure
    pub fn route(&self, task: &str, context: &RoutingContext) -> RoutingDecision {
        if let Some(model) = self.current_model() {
            match self.predict(&model, task) {
                Ok(decision) => return decision,
                Err(e) => {
                    tracing::warn!(error = %e, "Learned routing failed, using rule-based fallback");
                    metrics::counter!("routewise_learned_fallbacks_total").increment(1);
                }
            }
        }
        self.rules.route(task, context)
    }

    fn predict(&self, model: &TrainedModel, task: &str) -> Result<RoutingDecision, PredictionError> {
        let rates = self.store.success_rates().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Success rates unavailable, using priors");
            Default::default()
        });
        let signals = KeywordSignals::from_text(task);
        let features = self.extractor.vectorize(&signals, &rates);
        let (label, confidence) = model.classifier.predict(features.as_slice())?;

        if !self.rules.catalog().contains(&label) {
            return Err(PredictionError::UnknownLabel(label));
        }

        let mut decision = self.rules.build_decision(
            task,
            &signals,
            label,
            confidence,
            String::new(),
            RoutingSource::Learned,
        );
        decision.reasoning = format!(
            "learned: model={}, confidence={:.2}, strategy={}",
            decision.model, decision.confidence, decision.strategy
        );
        Ok(decision)
    }

    /// Train on the most recent successful outcomes and install the result.
    ///
    /// Refuses to train on fewer than `min_samples` usable rows.
    pub fn train(&self, min_samples: usize) -> Result<TrainingReport, TrainingError> {
        let outcomes_now = self.store.outcome_count()?;
        let samples = self.store.training_samples(self.config.max_training_rows)?;
        let required = min_samples.max(1);
        if samples.len() < required {
            return Err(TrainingError::InsufficientData {
                available: samples.len(),
                required,
            });
        }

        let rates = self.store.success_rates()?;
        let features: Vec<Vec<f64>> = samples
            .iter()
            .map(|s| self.extractor.extract(&s.task_text, &rates).0)
            .collect();
        let labels: Vec<String> = samples.iter().map(|s| s.model.clone()).collect();

        let split = train_test_split(&labels, self.options.test_fraction, self.options.seed);
        let pick = |idx: &[usize]| -> (Vec<Vec<f64>>, Vec<String>) {
            idx.iter()
                .map(|&i| (features[i].clone(), labels[i].clone()))
                .unzip()
        };
        let (train_x, train_y) = pick(&split.train);
        let classifier = SoftmaxClassifier::fit(&train_x, &train_y, &self.options).ok_or(
            TrainingError::InsufficientData {
                available: train_x.len(),
                required,
            },
        )?;

        let eval_idx = if split.test.is_empty() {
            &split.train
        } else {
            &split.test
        };
        let (eval_x, eval_y) = pick(eval_idx);
        let predicted: Vec<String> = eval_x
            .iter()
            .map(|x| {
                classifier
                    .predict(x)
                    .map(|(label, _)| label)
                    .unwrap_or_default()
            })
            .collect();
        let correct = predicted.iter().zip(&eval_y).filter(|(p, a)| p == a).count();
        let accuracy = correct as f64 / eval_y.len().max(1) as f64;

        let mut label_distribution = BTreeMap::new();
        for label in &labels {
            *label_distribution.entry(label.clone()).or_insert(0) += 1;
        }

        let trained_at = Utc::now();
        let report = TrainingReport {
            accuracy,
            per_class: classification_report(&eval_y, &predicted),
            train_samples: split.train.len(),
            test_samples: split.test.len(),
            label_distribution,
            stratified: split.stratified,
            trained_at,
        };

        self.install(TrainedModel {
            classifier,
            backends: self.rules.catalog().ids().iter().map(|s| s.to_string()).collect(),
            trained_at,
        });
        self.outcomes_at_last_training
            .store(outcomes_now, Ordering::Relaxed);

        tracing::info!(
            accuracy = report.accuracy,
            train_samples = report.train_samples,
            test_samples = report.test_samples,
            stratified = report.stratified,
            "Learned router trained"
        );
        metrics::counter!("routewise_training_runs_total").increment(1);
        metrics::gauge!("routewise_router_accuracy").set(report.accuracy);

        Ok(report)
    }

    /// Retrain once `retrain_threshold` new outcomes have accumulated.
    ///
    /// Returns `Ok(None)` when the threshold has not been reached yet.
    pub fn maybe_retrain(&self) -> Result<Option<TrainingReport>, TrainingError> {
        let count = self.store.outcome_count()?;
        let last = self.outcomes_at_last_training.load(Ordering::Relaxed);
        let new_outcomes = count.saturating_sub(last);
        if new_outcomes < self.config.retrain_threshold {
            tracing::debug!(new_outcomes, "Retrain threshold not reached");
            return Ok(None);
        }

        // Wait for another batch before retrying a failed attempt
        self.outcomes_at_last_training.store(count, Ordering::Relaxed);
        self.train(self.config.min_training_samples).map(Some)
    }

    /// Persist the installed model as JSON
    pub fn save_model(&self, path: &Path) -> Result<(), TrainingError> {
        let model = self
            .current_model()
            .ok_or_else(|| TrainingError::Persistence("no trained model to save".to_string()))?;
        let json = serde_json::to_string_pretty(model.as_ref())
            .map_err(|e| TrainingError::Persistence(e.to_string()))?;
        std::fs::write(path, json).map_err(|e| TrainingError::Persistence(e.to_string()))?;
        tracing::info!(path = %path.display(), "Learned router model saved");
        Ok(())
    }

    /// Load and install a model saved by [`save_model`](Self::save_model).
    ///
    /// Rejects models trained against a different catalog.
    pub fn load_model(&self, path: &Path) -> Result<(), TrainingError> {
        let json =
            std::fs::read_to_string(path).map_err(|e| TrainingError::Persistence(e.to_string()))?;
        let model: TrainedModel =
            serde_json::from_str(&json).map_err(|e| TrainingError::Persistence(e.to_string()))?;

        let catalog_ids = self.rules.catalog().ids();
        if model.backends != catalog_ids || model.classifier.dimension() != self.extractor.dimension()
        {
            return Err(TrainingError::Persistence(format!(
                "model was trained for backends {:?}, catalog has {:?}",
                model.backends, catalog_ids
            )));
        }

        self.install(model);
        self.outcomes_at_last_training
            .store(self.store.outcome_count().unwrap_or(0), Ordering::Relaxed);
        tracing::info!(path = %path.display(), "Learned router model loaded");
        Ok(())
    }
}

/// Periodically retrain the learned router until cancelled.
///
/// Training runs on the blocking pool so the loop never stalls the runtime.
pub async fn retrain_loop(
    router: Arc<LearnedRouter>,
    interval: Duration,
    cancel_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    // The first tick completes immediately
    ticker.tick().await;

    tracing::info!(
        interval_secs = interval.as_secs(),
        "Retrain loop started"
    );

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                tracing::info!("Retrain loop stopping");
                break;
            }
            _ = ticker.tick() => {
                let router = Arc::clone(&router);
                match tokio::task::spawn_blocking(move || router.maybe_retrain()).await {
                    Ok(Ok(Some(report))) => {
                        tracing::info!(accuracy = report.accuracy, "Periodic retrain completed");
                    }
                    Ok(Ok(None)) => {}
                    Ok(Err(e)) => {
                        tracing::warn!(error = %e, "Periodic retrain skipped");
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Retrain task panicked");
                    }
                }
            }
        }
    }
}
