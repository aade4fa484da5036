//! Deterministic rule-based routing
//!
//! The fallback of record: needs no history and no trained model, runs in
//! time linear in the task length and performs no I/O.

use super::cost::CostEstimator;
use super::decision::{new_decision_id, RoutingContext, RoutingDecision, RoutingSource, Strategy};
use super::features::KeywordSignals;
use super::strategy::{n_samples, strategy_for_signals};
use crate::catalog::ModelCatalog;
use crate::config::{ConfigError, RoutingConfig};

const SHORT_TASK_CHARS: usize = 80;

/// Priority-ordered keyword rules over [`KeywordSignals`].
#[derive(Debug, Clone)]
pub struct RuleBasedRouter {
    estimator: CostEstimator,
    config: RoutingConfig,
}

impl RuleBasedRouter {
    /// Create a router, failing if the configured backends are not in the catalog
    pub fn new(catalog: ModelCatalog, config: RoutingConfig) -> Result<Self, ConfigError> {
        config.validate_against(&catalog)?;
        Ok(Self {
            estimator: CostEstimator::new(catalog),
            config,
        })
    }

    pub fn catalog(&self) -> &ModelCatalog {
        self.estimator.catalog()
    }

    pub fn estimator(&self) -> &CostEstimator {
        &self.estimator
    }

    pub fn config(&self) -> &RoutingConfig {
        &self.config
    }

    /// Route a task. Always succeeds.
    pub fn route(&self, task: &str, context: &RoutingContext) -> RoutingDecision {
        let signals = KeywordSignals::from_text(task);
        let (model, confidence, reason) = self.select(&signals, context);
        self.build_decision(
            task,
            &signals,
            model.to_string(),
            confidence,
            format!("rule-based: {}", reason),
            RoutingSource::RuleBased,
        )
    }

    /// File-count signal: the larger of the caller's hint and the text's own count
    fn file_signal(signals: &KeywordSignals, context: &RoutingContext) -> u32 {
        context
            .file_count
            .unwrap_or(0)
            .max(signals.file_count.unwrap_or(0))
    }

    fn select(
        &self,
        signals: &KeywordSignals,
        context: &RoutingContext,
    ) -> (&str, f64, &'static str) {
        let files = Self::file_signal(signals, context);

        if signals.program_hits >= 2 {
            (
                self.config.economy_model.as_str(),
                0.90,
                "script-like task, cheapest backend is enough",
            )
        } else if signals.complex_hits >= 2 || files >= self.config.fanout_file_threshold {
            (
                self.config.top_model.as_str(),
                0.85,
                "complex task: architecture, security or wide fan-out",
            )
        } else if signals.medium_hits >= 1 || files >= self.config.medium_file_threshold {
            (
                self.config.mid_model.as_str(),
                0.80,
                "medium complexity: endpoint, module or integration",
            )
        } else if signals.char_len < SHORT_TASK_CHARS && signals.complex_hits == 0 {
            (self.config.economy_model.as_str(), 0.85, "short simple task")
        } else {
            (self.config.standard_model.as_str(), 0.75, "standard task")
        }
    }

    /// Fill in strategy, samples, fallback chain and cost for a chosen backend
    pub(crate) fn build_decision(
        &self,
        task: &str,
        signals: &KeywordSignals,
        model: String,
        confidence: f64,
        reasoning: String,
        source: RoutingSource,
    ) -> RoutingDecision {
        let mut strategy = strategy_for_signals(signals);
        let n_samples = n_samples(self.catalog(), strategy, &model);
        // A flagship backend gets one sample, which is just a single shot
        if strategy == Strategy::MultiSample && n_samples == 1 {
            strategy = Strategy::SingleShot;
        }
        let fallback_chain = self.estimator.build_fallback_chain(&model);
        let estimated_cost_usd =
            self.estimator
                .estimated_decision_cost(&model, strategy, n_samples, task);

        RoutingDecision {
            decision_id: new_decision_id(),
            model,
            strategy,
            n_samples,
            fallback_chain,
            confidence,
            estimated_cost_usd,
            reasoning,
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::strategy::suggest_strategy;

    fn router() -> RuleBasedRouter {
        RuleBasedRouter::new(ModelCatalog::default(), RoutingConfig::default()).unwrap()
    }

    #[test]
    fn test_program_task_goes_to_cheapest() {
        let decision = router().route("отчёт по расходу токенов", &RoutingContext::default());
        assert_eq!(decision.model, "flash");
        assert_eq!(decision.confidence, 0.90);
        assert_eq!(decision.strategy, Strategy::SingleShot);
        assert_eq!(decision.n_samples, 1);
        assert_eq!(decision.source, RoutingSource::RuleBased);
    }

    #[test]
    fn test_file_count_in_text_goes_to_top() {
        let decision = router().route(
            "полностью переработать архитектуру биллинга, 8 файлов",
            &RoutingContext::default(),
        );
        assert_eq!(decision.model, "opus");
        assert_eq!(decision.confidence, 0.85);
        assert_eq!(decision.strategy, Strategy::SingleShot);
        assert!(decision.fallback_chain.is_empty());
    }

    #[test]
    fn test_context_file_count_is_used() {
        let decision = router().route("update the readme", &RoutingContext::with_file_count(4));
        assert_eq!(decision.model, "pro");
        assert_eq!(decision.confidence, 0.80);
    }

    #[test]
    fn test_medium_task_goes_to_mid_tier() {
        let task = "добавь кэширование в сервис уведомлений, чтобы повторные запросы пользователей обрабатывались заметно быстрее";
        let decision = router().route(task, &RoutingContext::default());
        assert_eq!(decision.model, "pro");
        assert_eq!(decision.strategy, Strategy::MultiSample);
        assert_eq!(decision.n_samples, 3);
        assert_eq!(decision.fallback_chain, vec!["sonnet", "opus"]);
    }

    #[test]
    fn test_multi_sample_on_top_tier_reports_single_shot() {
        let task = "добавь кэширование в сервис уведомлений, чтобы повторные запросы пользователей обрабатывались заметно быстрее";
        assert_eq!(suggest_strategy(task), Strategy::MultiSample);

        let router = router();
        let decision = router.route(task, &RoutingContext::with_file_count(6));
        assert_eq!(decision.model, "opus");
        assert_eq!(decision.strategy, Strategy::SingleShot);
        assert_eq!(decision.n_samples, 1);
        assert_eq!(
            decision.estimated_cost_usd,
            router.estimator().base_cost("opus", task)
        );
    }

    #[test]
    fn test_short_task_goes_to_cheapest() {
        let decision = router().route("add input validation to login", &RoutingContext::default());
        assert_eq!(decision.model, "flash");
        assert_eq!(decision.confidence, 0.85);
        assert_eq!(decision.fallback_chain, vec!["pro", "sonnet", "opus"]);
    }

    #[test]
    fn test_long_plain_task_goes_to_standard() {
        let task = "please look into why the nightly job sometimes produces different totals than yesterday";
        let decision = router().route(task, &RoutingContext::default());
        assert_eq!(decision.model, "sonnet");
        assert_eq!(decision.confidence, 0.75);
        assert_eq!(decision.strategy, Strategy::Cascade);
        assert!(decision.estimated_cost_usd > 0.0);
    }

    #[test]
    fn test_empty_task() {
        let decision = router().route("", &RoutingContext::default());
        assert_eq!(decision.model, "flash");
        assert_eq!(decision.n_samples, 1);
    }

    #[test]
    fn test_unknown_configured_backend_fails_fast() {
        let config = RoutingConfig {
            top_model: "gpt-unknown".to_string(),
            ..Default::default()
        };
        assert!(RuleBasedRouter::new(ModelCatalog::default(), config).is_err());
    }
}
