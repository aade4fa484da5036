//! Integration tests for rule-based routing through the `Router` facade.

mod common;

use common::{default_rules, memory_store};
use proptest::prelude::*;
use routewise::catalog::{BackendProfile, ModelCatalog};
use routewise::outcomes::{DecisionStore, Outcome, StoreError};
use routewise::routing::{suggest_strategy, Router, RoutingContext, RoutingSource, Strategy};

fn router() -> (Router, std::sync::Arc<routewise::outcomes::SqliteDecisionStore>) {
    let store = memory_store();
    (Router::rule_based(default_rules(), store.clone()), store)
}

#[test]
fn test_report_task_routes_to_cheapest_with_high_confidence() {
    let (router, _store) = router();
    let decision = router.route("отчёт по расходу токенов за неделю", &RoutingContext::default());
    assert_eq!(decision.model, "flash");
    assert_eq!(decision.confidence, 0.90);
    assert_eq!(decision.strategy, Strategy::SingleShot);
    assert_eq!(decision.n_samples, 1);
    assert_eq!(decision.fallback_chain, vec!["pro", "sonnet", "opus"]);
}

#[test]
fn test_wide_refactor_routes_to_top_tier() {
    let (router, _store) = router();
    let decision = router.route(
        "полностью переработать архитектуру биллинга, 8 файлов",
        &RoutingContext::default(),
    );
    assert_eq!(decision.model, "opus");
    assert!(decision.fallback_chain.is_empty());
    assert_eq!(decision.strategy, Strategy::SingleShot);
}

#[test]
fn test_caching_feature_is_multi_sampled_on_mid_tier() {
    let (router, _store) = router();
    let task = "добавь кэширование в сервис уведомлений, чтобы повторные запросы пользователей обрабатывались заметно быстрее";
    let decision = router.route(task, &RoutingContext::default());
    assert_eq!(decision.model, "pro");
    assert_eq!(decision.strategy, Strategy::MultiSample);
    assert_eq!(decision.n_samples, 3);

    // Multi-sample pays for every sample
    let single = router.estimate_cost(task)["pro"];
    assert!((decision.estimated_cost_usd - single * 3.0).abs() < 1e-6);
}

#[test]
fn test_decisions_are_persisted_and_accept_outcomes() {
    let (router, store) = router();
    let decision = router.route("show me the list of open incidents", &RoutingContext::default());
    assert_eq!(store.decision_count().unwrap(), 1);
    assert_eq!(decision.source, RoutingSource::RuleBased);
    assert_eq!(decision.decision_id.len(), 16);

    router
        .record_outcome(
            &decision.decision_id,
            &Outcome {
                success: true,
                quality_score: 0.95,
                actual_cost_usd: 0.0011,
                actual_latency_ms: 420.0,
            },
        )
        .unwrap();

    let performance = router.model_performance().unwrap();
    assert_eq!(performance.len(), 1);
    assert_eq!(performance[0].model, decision.model);
    assert_eq!(performance[0].total, 1);
}

#[test]
fn test_outcome_for_unknown_decision_is_rejected() {
    let (router, store) = router();
    let outcome = Outcome {
        success: true,
        quality_score: 1.0,
        actual_cost_usd: 0.0,
        actual_latency_ms: 0.0,
    };
    assert!(matches!(
        router.record_outcome("0000000000000000", &outcome),
        Err(StoreError::UnknownDecision(_))
    ));
    assert_eq!(store.outcome_count().unwrap(), 0);
}

#[test]
fn test_decision_ids_are_unique() {
    let (router, _store) = router();
    let ids: std::collections::HashSet<String> = (0..200)
        .map(|_| router.route("short", &RoutingContext::default()).decision_id)
        .collect();
    assert_eq!(ids.len(), 200);
}

#[test]
fn test_custom_catalog_fallback_order() {
    let catalog = ModelCatalog::new(vec![
        BackendProfile::new("large", 10.0, 30.0, 0.9),
        BackendProfile::new("tiny", 0.1, 0.2, 0.5),
        BackendProfile::new("medium", 1.0, 4.0, 0.7),
    ])
    .unwrap();
    assert_eq!(catalog.ids(), vec!["tiny", "medium", "large"]);
    assert_eq!(catalog.fallback_chain("tiny"), vec!["medium", "large"]);
    assert!(catalog.fallback_chain("large").is_empty());
    assert!(catalog.fallback_chain("unknown").is_empty());
}

proptest! {
    #[test]
    fn prop_decisions_respect_invariants(task in "\\PC{0,300}", files in proptest::option::of(0u32..20)) {
        let rules = default_rules();
        let catalog = rules.catalog().clone();
        let context = RoutingContext { file_count: files };
        let decision = rules.route(&task, &context);

        prop_assert!(catalog.contains(&decision.model));
        prop_assert!((0.0..=1.0).contains(&decision.confidence));
        prop_assert!(decision.estimated_cost_usd >= 0.0);
        prop_assert!(decision.n_samples >= 1);
        if decision.strategy == Strategy::MultiSample {
            prop_assert!(decision.n_samples > 1);
        } else {
            prop_assert_eq!(decision.n_samples, 1);
        }
        let suggested = suggest_strategy(&task);
        if suggested == Strategy::MultiSample && decision.n_samples == 1 {
            prop_assert_eq!(decision.strategy, Strategy::SingleShot);
        } else {
            prop_assert_eq!(decision.strategy, suggested);
        }
    }

    #[test]
    fn prop_fallback_chain_is_strictly_ascending(task in "\\PC{0,200}") {
        let rules = default_rules();
        let catalog = rules.catalog().clone();
        let decision = rules.route(&task, &RoutingContext::default());

        let mut previous = catalog.get(&decision.model).unwrap().cost_key();
        for backend in &decision.fallback_chain {
            let cost = catalog.get(backend).unwrap().cost_key();
            prop_assert!(cost > previous);
            previous = cost;
        }
        prop_assert_eq!(
            decision.fallback_chain.len(),
            catalog.len() - 1 - catalog.rank(&decision.model).unwrap()
        );
    }
}
