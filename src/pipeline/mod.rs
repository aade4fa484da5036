//! Request pipeline
//!
//! [`PipelineOrchestrator::process`] runs a task through a fixed sequence:
//!
//! classify → cache check → input validation → model selection → execute →
//! output validation → cache populate → trace → token tracking → outcome.
//!
//! A cache hit skips straight to tracing; a blocking input verdict ends the
//! request. Every optional collaborator is a trait object with a null
//! implementation, and a failure in any of them is logged and skipped.
//! `process` never returns an error and never panics.

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use serde_json::json;
use tracing::{info, instrument};

pub mod classify;
pub mod collaborators;
pub mod error;
pub mod stats;
pub mod types;

pub use classify::{
    Classification, ComplexityBucket, KeywordComplexityClassifier, TaskComplexityClassifier,
    MIN_CLASSIFIER_CONFIDENCE,
};
pub use collaborators::{
    CallRecord, ExecutionRequest, ExecutionResponse, Executor, InputValidation, NoopTokenTracker,
    NoopTracer, NullExecutor, OutputValidation, PassthroughValidator, TokenTracker, Tracer,
    Validator,
};
pub use error::{CollaboratorError, ExecutorError};
pub use stats::{ComponentHealth, ComponentStatus, HealthReport, PipelineStats, PipelineStatusReport};
pub use types::{PipelineContext, PipelineResult, PipelineStatus, RoutingSummary, ValidationReport};

use crate::cache::SemanticCache;
use crate::catalog::ModelCatalog;
use crate::config::{PipelineConfig, RoutingConfig};
use crate::logging::{prompt_preview, truncate_prompt};
use crate::outcomes::Outcome;
use crate::routing::{Router, RoutingContext, Strategy};
use stats::PipelineCounters;
use types::CachedAnswer;

/// Builder for [`PipelineOrchestrator`]. Unset collaborators are null objects.
pub struct PipelineBuilder {
    catalog: ModelCatalog,
    routing: RoutingConfig,
    config: PipelineConfig,
    executor: Arc<dyn Executor>,
    cache: Arc<SemanticCache>,
    validator: Arc<dyn Validator>,
    tracer: Arc<dyn Tracer>,
    token_tracker: Arc<dyn TokenTracker>,
    classifier: Option<Arc<dyn TaskComplexityClassifier>>,
    router: Option<Arc<Router>>,
    content_preview: Option<usize>,
}

impl PipelineBuilder {
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn cache(mut self, cache: Arc<SemanticCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn tracer(mut self, tracer: Arc<dyn Tracer>) -> Self {
        self.tracer = tracer;
        self
    }

    pub fn token_tracker(mut self, token_tracker: Arc<dyn TokenTracker>) -> Self {
        self.token_tracker = token_tracker;
        self
    }

    pub fn classifier(mut self, classifier: Arc<dyn TaskComplexityClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn router(mut self, router: Arc<Router>) -> Self {
        self.router = Some(router);
        self
    }

    /// Include prompt previews of up to `limit` chars in debug logs
    pub fn content_logging(mut self, limit: Option<usize>) -> Self {
        self.content_preview = limit;
        self
    }

    pub fn build(self) -> PipelineOrchestrator {
        PipelineOrchestrator {
            catalog: self.catalog,
            routing: self.routing,
            config: self.config,
            executor: self.executor,
            cache: self.cache,
            validator: self.validator,
            tracer: self.tracer,
            token_tracker: self.token_tracker,
            classifier: self.classifier,
            router: self.router,
            content_preview: self.content_preview,
            counters: PipelineCounters::default(),
        }
    }
}

/// Composes routing, caching and the external collaborators into one
/// request flow.
pub struct PipelineOrchestrator {
    catalog: ModelCatalog,
    routing: RoutingConfig,
    config: PipelineConfig,
    executor: Arc<dyn Executor>,
    cache: Arc<SemanticCache>,
    validator: Arc<dyn Validator>,
    tracer: Arc<dyn Tracer>,
    token_tracker: Arc<dyn TokenTracker>,
    classifier: Option<Arc<dyn TaskComplexityClassifier>>,
    router: Option<Arc<Router>>,
    content_preview: Option<usize>,
    counters: PipelineCounters,
}

fn new_request_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(12);
    id
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

impl PipelineOrchestrator {
    /// Start a builder. `routing` supplies the complexity-table backends;
    /// callers are expected to have validated it against `catalog`.
    pub fn builder(catalog: ModelCatalog, routing: RoutingConfig) -> PipelineBuilder {
        PipelineBuilder {
            catalog,
            routing,
            config: PipelineConfig::default(),
            executor: Arc::new(NullExecutor),
            cache: Arc::new(SemanticCache::disabled()),
            validator: Arc::new(PassthroughValidator),
            tracer: Arc::new(NoopTracer),
            token_tracker: Arc::new(NoopTokenTracker),
            classifier: None,
            router: None,
            content_preview: None,
        }
    }

    pub fn cache(&self) -> &Arc<SemanticCache> {
        &self.cache
    }

    pub fn router(&self) -> Option<&Arc<Router>> {
        self.router.as_ref()
    }

    /// Run one task through the full pipeline.
    #[instrument(skip_all, fields(request_id = tracing::field::Empty))]
    pub async fn process(&self, task: &str, context: &PipelineContext) -> PipelineResult {
        let start = Instant::now();
        let request_id = new_request_id();
        tracing::Span::current().record("request_id", request_id.as_str());
        self.counters.request();

        let run = AssertUnwindSafe(self.run(task, context, &request_id, start));
        let mut result = match run.catch_unwind().await {
            Ok(result) => result,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!(error = %message, "Pipeline step panicked");
                self.counters.failure();
                PipelineResult {
                    request_id,
                    content: format!("Pipeline error: {}", message),
                    status: PipelineStatus::Failed,
                    ..PipelineResult::default()
                }
            }
        };

        result.latency_ms = elapsed_ms(start);
        self.counters.latency(result.latency_ms);

        metrics::counter!("routewise_requests_total", "status" => result.status.as_str())
            .increment(1);
        metrics::histogram!("routewise_pipeline_duration_seconds")
            .record(result.latency_ms / 1000.0);
        info!(
            status = result.status.as_str(),
            model = %result.model_used,
            cached = result.cached,
            latency_ms = result.latency_ms,
            "Pipeline request finished"
        );

        result
    }

    async fn run(
        &self,
        task: &str,
        context: &PipelineContext,
        request_id: &str,
        start: Instant,
    ) -> PipelineResult {
        let mut result = PipelineResult {
            request_id: request_id.to_string(),
            ..PipelineResult::default()
        };

        let bucket = self.classify(task);
        result.routing_decision.complexity = Some(bucket);
        tracing::debug!(
            complexity = bucket.as_str(),
            prompt = ?prompt_preview(task, self.content_preview),
            "Task classified"
        );

        if let Some(answer) = self.check_cache(task) {
            self.counters.cache_hit();
            self.counters.success(0, 0, 0.0);
            result.cached = true;
            result.status = PipelineStatus::CacheHit;
            result.model_used = if answer.model_used.is_empty() {
                "cache".to_string()
            } else {
                answer.model_used
            };
            result.content = answer.content;
            result.trace_id = self.trace(task, &result, elapsed_ms(start)).await;
            return result;
        }
        self.counters.cache_miss();

        if let Some(verdict) = self.validate_input(task) {
            let blocked = verdict.blocked;
            let reason = verdict.reason().unwrap_or("unspecified reason").to_string();
            result.validation.input = Some(verdict);
            if blocked {
                tracing::warn!(reason = %reason, "Input blocked by validation");
                self.counters.validation_block();
                metrics::counter!("routewise_validation_blocks_total").increment(1);
                result.content = format!("Input blocked by validation: {}", reason);
                result.validation.blocked_reason = Some(reason);
                result.status = PipelineStatus::Blocked;
                return result;
            }
        }

        self.select_model(task, bucket, context, &mut result.routing_decision);
        let backend = result.routing_decision.model.clone();
        result.model_used = backend.clone();

        let request = ExecutionRequest {
            backend: backend.clone(),
            fallback_chain: result.routing_decision.fallback_chain.clone(),
            strategy: result.routing_decision.strategy,
            n_samples: result.routing_decision.n_samples.max(1),
            prompt: task.to_string(),
            system_prompt: context.system_prompt.clone(),
            temperature: context.temperature.unwrap_or(self.config.temperature),
            max_tokens: context.max_tokens.unwrap_or(self.config.max_tokens),
            deadline: context.deadline,
            cancellation: context.cancellation.clone().unwrap_or_default(),
        };

        let executed = match AssertUnwindSafe(self.executor.execute(request))
            .catch_unwind()
            .await
        {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(e.to_string()),
            Err(panic) => Err(format!("executor panicked: {}", panic_message(panic.as_ref()))),
        };

        let response = match executed {
            Ok(response) => response,
            Err(message) => {
                tracing::error!(backend = %backend, error = %message, "Execution failed");
                self.counters.failure();
                result.status = PipelineStatus::Failed;
                result.content = format!("Execution failed: {}", message);
                result.trace_id = self.trace(task, &result, elapsed_ms(start)).await;
                self.record_outcome(&result, None, elapsed_ms(start));
                return result;
            }
        };

        result.content = response.content;
        result.input_tokens = response.input_tokens;
        result.output_tokens = response.output_tokens;
        result.cost_usd = response.cost_usd;
        if !response.model_used.is_empty() {
            result.model_used = response.model_used;
        }

        let output_verdict = self.validate_output(&result.content);
        let quality = output_verdict.as_ref().map(|v| v.score);
        if let Some(verdict) = &output_verdict {
            if !verdict.valid {
                tracing::info!(errors = verdict.errors.len(), "Output failed advisory validation");
            }
        }
        result.validation.output = output_verdict;

        if !result.content.is_empty() {
            let answer = CachedAnswer {
                content: result.content.clone(),
                model_used: result.model_used.clone(),
            };
            self.cache.put(task, &answer, None, None);
        }

        result.trace_id = self.trace(task, &result, elapsed_ms(start)).await;
        result.tokens_tracked = self.track_tokens(&result, context);
        self.record_outcome(&result, quality, elapsed_ms(start));

        self.counters
            .success(result.input_tokens, result.output_tokens, result.cost_usd);
        metrics::counter!("routewise_tokens_total", "direction" => "input")
            .increment(result.input_tokens);
        metrics::counter!("routewise_tokens_total", "direction" => "output")
            .increment(result.output_tokens);

        result
    }

    /// Cache → execute → cache, without classification, validation or
    /// tracing. Cached per `(prompt, model)`.
    pub async fn process_simple(&self, prompt: &str, model: &str) -> Result<String, ExecutorError> {
        self.counters.request();
        let start = Instant::now();
        let request = ExecutionRequest {
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            fallback_chain: self.catalog.fallback_chain(model),
            ..ExecutionRequest::new(model, prompt)
        };

        let outcome = self.cache.get_or_execute(request, self.executor.as_ref()).await;
        self.counters.latency(elapsed_ms(start));
        match outcome {
            Ok(answer) if answer.cached => {
                self.counters.cache_hit();
                self.counters.success(0, 0, 0.0);
                Ok(answer.response.content)
            }
            Ok(answer) => {
                self.counters.cache_miss();
                let response = answer.response;
                self.counters
                    .success(response.input_tokens, response.output_tokens, response.cost_usd);
                Ok(response.content)
            }
            Err(e) => {
                self.counters.cache_miss();
                self.counters.failure();
                tracing::warn!(model, error = %e, "Simple execution failed");
                Err(e)
            }
        }
    }

    fn classify(&self, task: &str) -> ComplexityBucket {
        if let Some(classifier) = &self.classifier {
            match classifier.classify(task) {
                Ok(verdict) if verdict.confidence >= MIN_CLASSIFIER_CONFIDENCE => {
                    tracing::debug!(
                        classifier = classifier.name(),
                        bucket = verdict.bucket.as_str(),
                        confidence = verdict.confidence,
                        "Task classified"
                    );
                    return verdict.bucket;
                }
                Ok(verdict) => tracing::debug!(
                    confidence = verdict.confidence,
                    "Low classifier confidence, using keyword buckets"
                ),
                Err(e) => tracing::warn!(error = %e, "Task classification failed"),
            }
        }
        KeywordComplexityClassifier::bucket(task)
    }

    fn check_cache(&self, task: &str) -> Option<CachedAnswer> {
        let hit = self.cache.get(task, None)?;
        match serde_json::from_value::<CachedAnswer>(hit.response) {
            Ok(answer) => Some(answer),
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring cache entry with unexpected shape");
                None
            }
        }
    }

    fn validate_input(&self, task: &str) -> Option<InputValidation> {
        if !(self.config.validation_enabled
            && self.config.validate_input
            && self.validator.is_available())
        {
            return None;
        }
        match self.validator.validate_input(task) {
            Ok(verdict) => Some(verdict),
            Err(e) => {
                tracing::warn!(error = %e, "Input validation failed, continuing unvalidated");
                None
            }
        }
    }

    fn validate_output(&self, content: &str) -> Option<OutputValidation> {
        if !(self.config.validation_enabled
            && self.config.validate_output
            && self.validator.is_available())
        {
            return None;
        }
        match self.validator.validate_output(content) {
            Ok(verdict) => Some(verdict),
            Err(e) => {
                tracing::warn!(error = %e, "Output validation failed");
                None
            }
        }
    }

    fn select_model(
        &self,
        task: &str,
        bucket: ComplexityBucket,
        context: &PipelineContext,
        summary: &mut RoutingSummary,
    ) {
        if let Some(model) = &context.model {
            if self.catalog.contains(model) {
                summary.model = model.clone();
                summary.reason = "explicit model from request context".to_string();
                summary.strategy = Strategy::SingleShot;
                summary.n_samples = 1;
                summary.fallback_chain = self.catalog.fallback_chain(model);
                return;
            }
            tracing::warn!(model = %model, "Ignoring unknown model in request context");
        }

        if let Some(router) = &self.router {
            let routing_context = RoutingContext {
                file_count: context.file_count,
            };
            let decision = router.route(task, &routing_context);
            summary.apply_decision(&decision);
            return;
        }

        let (model, reason) = match bucket {
            ComplexityBucket::Program => (&self.routing.default_model, "utility task, lowest cost"),
            ComplexityBucket::Simple => (&self.routing.economy_model, "simple task, cost/quality balance"),
            ComplexityBucket::Medium => (&self.routing.mid_model, "medium task, quality review"),
            ComplexityBucket::Complex => (&self.routing.top_model, "complex task, maximum quality"),
        };
        summary.model = model.clone();
        summary.reason = format!("{} -> {}", reason, model);
        summary.strategy = Strategy::SingleShot;
        summary.n_samples = 1;
        summary.fallback_chain = self.catalog.fallback_chain(model);
    }

    /// Report the request to the tracer; returns the issued trace id
    async fn trace(&self, task: &str, result: &PipelineResult, latency_ms: f64) -> String {
        if !(self.config.observability_enabled && self.tracer.is_available()) {
            return String::new();
        }

        let metadata = json!({
            "request_id": result.request_id,
            "cached": result.cached,
            "status": result.status.as_str(),
            "routing": result.routing_decision,
        });
        let trace_id = match self.tracer.start_trace("pipeline_process", metadata).await {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to start trace");
                return String::new();
            }
        };

        if !result.cached && result.status != PipelineStatus::Failed {
            let preview = self.config.trace_preview_chars;
            let call = CallRecord {
                model: result.model_used.clone(),
                input_text: truncate_prompt(task, preview),
                output_text: truncate_prompt(&result.content, preview),
                input_tokens: result.input_tokens,
                output_tokens: result.output_tokens,
                cost_usd: result.cost_usd,
                latency_ms,
                metadata: serde_json::to_value(&result.routing_decision).unwrap_or_default(),
            };
            if let Err(e) = self.tracer.log_call(&trace_id, call).await {
                tracing::warn!(trace_id = %trace_id, error = %e, "Failed to log traced call");
            }
        }

        let status = if result.status == PipelineStatus::Failed {
            "error"
        } else {
            "ok"
        };
        let output = json!({
            "content_length": result.content.chars().count(),
            "cached": result.cached,
        });
        if let Err(e) = self.tracer.end_trace(&trace_id, output, status).await {
            tracing::warn!(trace_id = %trace_id, error = %e, "Failed to end trace");
        }
        trace_id
    }

    fn track_tokens(&self, result: &PipelineResult, context: &PipelineContext) -> bool {
        if !(self.config.token_tracking_enabled && self.token_tracker.is_available()) {
            return false;
        }
        if result.input_tokens == 0 && result.output_tokens == 0 {
            return false;
        }
        let task_id = context
            .task_id
            .as_deref()
            .unwrap_or(&self.config.tracking_task_id);
        match self.token_tracker.record(
            task_id,
            &result.model_used,
            "pipeline",
            result.input_tokens,
            result.output_tokens,
        ) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(error = %e, "Token tracking failed");
                false
            }
        }
    }

    /// Feed the result back to the router's outcome store
    fn record_outcome(&self, result: &PipelineResult, quality: Option<f64>, latency_ms: f64) {
        let (Some(router), Some(decision_id)) = (&self.router, &result.routing_decision.decision_id)
        else {
            return;
        };
        let success = result.status == PipelineStatus::Completed;
        let outcome = Outcome {
            success,
            quality_score: quality.unwrap_or(if success { 1.0 } else { 0.0 }),
            actual_cost_usd: result.cost_usd,
            actual_latency_ms: latency_ms,
        };
        if let Err(e) = router.record_outcome(decision_id, &outcome) {
            tracing::warn!(decision_id = %decision_id, error = %e, "Failed to record outcome");
        }
    }

    /// Counter snapshot
    pub fn stats(&self) -> PipelineStats {
        self.counters.snapshot()
    }

    fn component_statuses(&self) -> BTreeMap<String, ComponentStatus> {
        let mut components = BTreeMap::new();
        components.insert(
            "executor".to_string(),
            ComponentStatus::new(self.executor.is_available(), true),
        );
        components.insert(
            "cache".to_string(),
            ComponentStatus::new(self.cache.is_enabled(), self.cache.is_enabled()),
        );
        components.insert(
            "semantic_search".to_string(),
            ComponentStatus::new(self.cache.semantic_search_available(), self.cache.is_enabled()),
        );
        components.insert(
            "validation".to_string(),
            ComponentStatus::new(self.validator.is_available(), self.config.validation_enabled),
        );
        components.insert(
            "observability".to_string(),
            ComponentStatus::new(self.tracer.is_available(), self.config.observability_enabled),
        );
        components.insert(
            "token_tracker".to_string(),
            ComponentStatus::new(
                self.token_tracker.is_available(),
                self.config.token_tracking_enabled,
            ),
        );
        components.insert(
            "classifier".to_string(),
            ComponentStatus::new(self.classifier.is_some(), true),
        );
        components.insert(
            "router".to_string(),
            ComponentStatus::new(self.router.is_some(), true),
        );
        components
    }

    /// Per-collaborator availability report
    pub fn status(&self) -> PipelineStatusReport {
        PipelineStatusReport {
            components: self.component_statuses(),
            router: self.router.as_ref().map(|r| r.kind().to_string()),
            router_trained: self.router.as_ref().is_some_and(|r| r.is_trained()),
        }
    }

    /// Health per collaborator. Only a missing executor is unhealthy;
    /// the other collaborators are optional.
    pub fn health_check(&self) -> HealthReport {
        let mut components = BTreeMap::new();
        for (name, status) in self.component_statuses() {
            let required = name == "executor";
            let health = if status.initialized {
                ComponentHealth {
                    healthy: true,
                    detail: "initialized".to_string(),
                    optional: !required,
                }
            } else if !status.available {
                ComponentHealth {
                    healthy: !required,
                    detail: "not installed".to_string(),
                    optional: !required,
                }
            } else {
                ComponentHealth {
                    healthy: !required,
                    detail: "disabled by configuration".to_string(),
                    optional: !required,
                }
            };
            components.insert(name, health);
        }

        if let (Some(router), Some(health)) = (&self.router, components.get_mut("router")) {
            health.detail = if router.is_trained() {
                format!("{} (trained)", router.kind())
            } else {
                format!("{} (rule-based fallback)", router.kind())
            };
        }

        HealthReport {
            healthy: components.values().all(|c| c.healthy),
            components,
            graceful_degradation: true,
        }
    }
}
