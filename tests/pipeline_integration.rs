//! End-to-end tests for the pipeline orchestrator.

mod common;

use common::{
    BrokenValidator, CancellableExecutor, FailingExecutor, MarkerValidator, RecordingTracer,
    ScriptedExecutor, UnreachableTracer,
};
use routewise::catalog::ModelCatalog;
use routewise::config::{RoutewiseConfig, RoutingConfig};
use routewise::outcomes::DecisionStore;
use routewise::pipeline::{PipelineContext, PipelineOrchestrator, PipelineStatus};
use routewise::CoreContext;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn bare_pipeline() -> routewise::pipeline::PipelineBuilder {
    PipelineOrchestrator::builder(ModelCatalog::default(), RoutingConfig::default())
}

fn core() -> CoreContext {
    CoreContext::from_config(RoutewiseConfig::default()).unwrap()
}

#[tokio::test]
async fn test_runs_with_only_an_executor() {
    let pipeline = bare_pipeline()
        .executor(Arc::new(ScriptedExecutor::default()))
        .build();

    let result = pipeline
        .process("add input validation to login", &PipelineContext::default())
        .await;

    assert_eq!(result.status, PipelineStatus::Completed);
    assert!(result.is_success());
    assert!(!result.cached);
    assert!(!result.content.is_empty());
    assert!(!result.routing_decision.model.is_empty());
    assert_eq!(result.model_used, result.routing_decision.model);
    assert!(result.trace_id.is_empty());
    assert!(result.validation.input.is_none());
    assert!(result.validation.output.is_none());
    assert_eq!(result.request_id.len(), 12);
    assert!(result.latency_ms >= 0.0);

    let health = pipeline.health_check();
    assert!(health.healthy);
    assert!(health.graceful_degradation);
    assert!(health.components["validation"].optional);
}

#[tokio::test]
async fn test_missing_executor_fails_gracefully() {
    let pipeline = bare_pipeline().build();
    let result = pipeline.process("summarise the changelog", &PipelineContext::default()).await;

    assert_eq!(result.status, PipelineStatus::Failed);
    assert!(result.content.starts_with("Execution failed"));
    assert!(!pipeline.health_check().healthy);
    assert_eq!(pipeline.stats().failures, 1);
}

#[tokio::test]
async fn test_second_identical_request_is_served_from_cache() {
    let context = core();
    let executor = Arc::new(ScriptedExecutor::default());
    let pipeline = context.pipeline().executor(executor.clone()).build();

    let first = pipeline.process("write release notes for 2.3", &PipelineContext::default()).await;
    let second = pipeline.process("write release notes for 2.3", &PipelineContext::default()).await;

    assert!(!first.cached);
    assert!(second.cached);
    assert_eq!(second.status, PipelineStatus::CacheHit);
    assert_eq!(second.content, first.content);
    assert_eq!(second.model_used, first.model_used);
    assert_eq!(executor.call_count(), 1);

    let stats = pipeline.stats();
    assert_eq!(stats.total_requests, 2);
    assert_eq!(stats.cache_hits, 1);
    assert_eq!(stats.cache_misses, 1);
    assert_eq!(stats.cache_hit_rate, 50.0);
    assert_eq!(stats.successes, 2);
    assert_eq!(stats.success_rate, 100.0);
}

#[tokio::test]
async fn test_blocked_input_never_reaches_executor() {
    let executor = Arc::new(ScriptedExecutor::default());
    let pipeline = bare_pipeline()
        .executor(executor.clone())
        .validator(Arc::new(MarkerValidator { marker: "DROP TABLE" }))
        .build();

    let result = pipeline
        .process("please run DROP TABLE users", &PipelineContext::default())
        .await;

    assert_eq!(result.status, PipelineStatus::Blocked);
    assert!(!result.is_success());
    assert!(result.content.starts_with("Input blocked by validation"));
    assert_eq!(
        result.validation.blocked_reason.as_deref(),
        Some("contains 'DROP TABLE'")
    );
    assert_eq!(executor.call_count(), 0);

    let stats = pipeline.stats();
    assert_eq!(stats.validation_blocks, 1);
    assert_eq!(stats.failures, 0);
}

#[tokio::test]
async fn test_output_validation_is_advisory() {
    let pipeline = bare_pipeline()
        .executor(Arc::new(ScriptedExecutor::default()))
        .validator(Arc::new(MarkerValidator { marker: "answer" }))
        .build();

    // Input passes, output contains the marker
    let result = pipeline.process("tell me something", &PipelineContext::default()).await;
    assert_eq!(result.status, PipelineStatus::Completed);
    let output = result.validation.output.unwrap();
    assert!(!output.valid);
    assert_eq!(output.score, 0.7);
}

#[tokio::test]
async fn test_broken_validator_is_skipped() {
    let executor = Arc::new(ScriptedExecutor::default());
    let pipeline = bare_pipeline()
        .executor(executor.clone())
        .validator(Arc::new(BrokenValidator))
        .build();

    let result = pipeline.process("list open tickets", &PipelineContext::default()).await;
    assert_eq!(result.status, PipelineStatus::Completed);
    assert!(result.validation.input.is_none());
    assert!(result.validation.output.is_none());
    assert_eq!(executor.call_count(), 1);
}

#[tokio::test]
async fn test_tracer_sees_the_call() {
    let tracer = Arc::new(RecordingTracer::default());
    let pipeline = bare_pipeline()
        .executor(Arc::new(ScriptedExecutor::default()))
        .tracer(tracer.clone())
        .build();

    let result = pipeline.process("draft an onboarding email", &PipelineContext::default()).await;

    assert_eq!(result.trace_id, "trace-1");
    assert_eq!(tracer.started.lock().unwrap().as_slice(), ["pipeline_process"]);
    let calls = tracer.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].model, result.model_used);
    assert_eq!(calls[0].input_tokens, 120);
    assert_eq!(
        tracer.ended.lock().unwrap().as_slice(),
        [("trace-1".to_string(), "ok".to_string())]
    );
}

#[tokio::test]
async fn test_failed_execution_is_traced_as_error() {
    let tracer = Arc::new(RecordingTracer::default());
    let pipeline = bare_pipeline()
        .executor(Arc::new(FailingExecutor))
        .tracer(tracer.clone())
        .build();

    let result = pipeline.process("generate the weekly digest", &PipelineContext::default()).await;

    assert_eq!(result.status, PipelineStatus::Failed);
    assert!(result.content.contains("503 service unavailable"));
    assert!(tracer.calls.lock().unwrap().is_empty());
    assert_eq!(tracer.ended.lock().unwrap()[0].1, "error");
    assert_eq!(pipeline.stats().failures, 1);
}

#[tokio::test]
async fn test_unreachable_tracer_does_not_fail_request() {
    let pipeline = bare_pipeline()
        .executor(Arc::new(ScriptedExecutor::default()))
        .tracer(Arc::new(UnreachableTracer))
        .build();

    let result = pipeline.process("rename the config flag", &PipelineContext::default()).await;
    assert_eq!(result.status, PipelineStatus::Completed);
    assert!(result.trace_id.is_empty());
}

#[tokio::test]
async fn test_explicit_model_wins() {
    let executor = Arc::new(ScriptedExecutor::default());
    let pipeline = bare_pipeline().executor(executor.clone()).build();

    let result = pipeline
        .process(
            "полностью переработать архитектуру биллинга",
            &PipelineContext::with_model("flash"),
        )
        .await;

    assert_eq!(result.routing_decision.model, "flash");
    assert_eq!(result.routing_decision.fallback_chain, vec!["pro", "sonnet", "opus"]);
    assert_eq!(executor.last_request().unwrap().backend, "flash");
}

#[tokio::test]
async fn test_router_decisions_get_outcomes() {
    let context = core();
    let pipeline = context
        .pipeline()
        .executor(Arc::new(ScriptedExecutor::default()))
        .validator(Arc::new(MarkerValidator { marker: "forbidden" }))
        .build();

    let result = pipeline
        .process("отчёт по расходу токенов за неделю", &PipelineContext::default())
        .await;

    assert_eq!(result.routing_decision.model, "flash");
    assert_eq!(result.routing_decision.confidence, Some(0.90));
    assert!(result.routing_decision.decision_id.is_some());
    assert_eq!(context.store.decision_count().unwrap(), 1);
    assert_eq!(context.store.outcome_count().unwrap(), 1);

    let performance = context.router.model_performance().unwrap();
    assert_eq!(performance[0].model, "flash");
    assert_eq!(performance[0].success_rate, 1.0);
    assert!((performance[0].avg_quality - 0.7).abs() < 1e-9);

    let status = pipeline.status();
    assert_eq!(status.router.as_deref(), Some("learned"));
    assert!(!status.router_trained);
}

#[tokio::test]
async fn test_cancellation_reaches_executor() {
    let pipeline = bare_pipeline().executor(Arc::new(CancellableExecutor)).build();
    let token = CancellationToken::new();
    let context = PipelineContext {
        cancellation: Some(token.clone()),
        ..PipelineContext::default()
    };

    let (result, _) = tokio::join!(pipeline.process("long running analysis", &context), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();
    });

    assert_eq!(result.status, PipelineStatus::Failed);
    assert!(result.content.contains("Request cancelled"));
}

#[tokio::test]
async fn test_request_options_are_forwarded() {
    let executor = Arc::new(ScriptedExecutor::default());
    let pipeline = bare_pipeline().executor(executor.clone()).build();
    let context = PipelineContext {
        system_prompt: Some("You are terse.".to_string()),
        temperature: Some(0.1),
        max_tokens: Some(256),
        ..PipelineContext::default()
    };

    pipeline.process("explain the retry policy", &context).await;
    let request = executor.last_request().unwrap();
    assert_eq!(request.system_prompt.as_deref(), Some("You are terse."));
    assert_eq!(request.temperature, 0.1);
    assert_eq!(request.max_tokens, 256);
    assert_eq!(request.prompt, "explain the retry policy");
}

#[tokio::test]
async fn test_process_simple_caches_per_model() {
    let context = core();
    let executor = Arc::new(ScriptedExecutor::default());
    let pipeline = context.pipeline().executor(executor.clone()).build();

    let first = pipeline.process_simple("ping", "flash").await.unwrap();
    let again = pipeline.process_simple("ping", "flash").await.unwrap();
    pipeline.process_simple("ping", "opus").await.unwrap();

    assert_eq!(first, "answer to: ping");
    assert_eq!(again, first);
    assert_eq!(executor.call_count(), 2);
    assert_eq!(pipeline.stats().cache_hits, 1);
}

#[tokio::test]
async fn test_process_simple_surfaces_executor_errors() {
    let pipeline = bare_pipeline().executor(Arc::new(FailingExecutor)).build();
    assert!(pipeline.process_simple("ping", "flash").await.is_err());
    assert_eq!(pipeline.stats().failures, 1);
}

// =============================================================================
// Shared orchestrator under concurrent load
// =============================================================================

fn on_disk_context(dir: &std::path::Path, max_cache_size: usize) -> CoreContext {
    let mut config = RoutewiseConfig::default();
    config.cache.path = Some(dir.join("cache").join("responses.db"));
    config.cache.max_size = max_cache_size;
    config.learning.database_path = Some(dir.join("data").join("routing.db"));
    CoreContext::from_config(config).unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_share_one_orchestrator() {
    const REQUESTS: usize = 24;
    const MAX_CACHE_SIZE: usize = 8;

    let dir = tempfile::tempdir().unwrap();
    let context = on_disk_context(dir.path(), MAX_CACHE_SIZE);
    let executor = Arc::new(ScriptedExecutor::default());
    let pipeline = Arc::new(context.pipeline().executor(executor.clone()).build());

    let handles: Vec<_> = (0..REQUESTS)
        .map(|i| {
            let pipeline = pipeline.clone();
            tokio::spawn(async move {
                let task = format!("write release notes for service {i}");
                pipeline.process(&task, &PipelineContext::default()).await
            })
        })
        .collect();

    for handle in handles {
        let result = handle.await.unwrap();
        assert_eq!(result.status, PipelineStatus::Completed);
        assert!(result.routing_decision.decision_id.is_some());
    }

    let stats = pipeline.stats();
    assert_eq!(stats.total_requests, REQUESTS as u64);
    assert_eq!(stats.successes, REQUESTS as u64);
    assert_eq!(stats.cache_misses, REQUESTS as u64);
    assert_eq!(executor.call_count(), REQUESTS);

    assert_eq!(context.store.decision_count().unwrap(), REQUESTS as u64);
    assert_eq!(context.store.outcome_count().unwrap(), REQUESTS as u64);

    let cache = pipeline.cache().stats();
    assert!(cache.cache_size <= MAX_CACHE_SIZE);
    assert_eq!(cache.cache_size, MAX_CACHE_SIZE);

    // Decisions are on disk, under a directory the store created
    let reopened =
        routewise::outcomes::SqliteDecisionStore::open(dir.path().join("data").join("routing.db"))
            .unwrap();
    assert_eq!(reopened.decision_count().unwrap(), REQUESTS as u64);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_identical_requests_keep_counters_consistent() {
    const REQUESTS: usize = 16;

    let dir = tempfile::tempdir().unwrap();
    let context = on_disk_context(dir.path(), 100);
    let executor = Arc::new(ScriptedExecutor::default());
    let pipeline = Arc::new(context.pipeline().executor(executor.clone()).build());

    let handles: Vec<_> = (0..REQUESTS)
        .map(|_| {
            let pipeline = pipeline.clone();
            tokio::spawn(async move {
                pipeline
                    .process("summarise the on-call handover", &PipelineContext::default())
                    .await
            })
        })
        .collect();

    for handle in handles {
        assert!(handle.await.unwrap().is_success());
    }

    let stats = pipeline.stats();
    assert_eq!(stats.total_requests, REQUESTS as u64);
    assert_eq!(stats.cache_hits + stats.cache_misses, REQUESTS as u64);
    assert_eq!(stats.successes, REQUESTS as u64);
    assert_eq!(executor.call_count() as u64, stats.cache_misses);
    assert_eq!(context.store.decision_count().unwrap(), stats.cache_misses);
    assert_eq!(pipeline.cache().stats().cache_size, 1);
}
