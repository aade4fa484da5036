//! Shared test utilities for routewise integration tests.
//!
//! Provides stores, routers and scripted collaborators so test files can
//! focus on behaviour instead of setup.

#![allow(dead_code)]

use async_trait::async_trait;
use routewise::catalog::ModelCatalog;
use routewise::config::{LearningConfig, RoutingConfig};
use routewise::outcomes::{DecisionStore, Outcome, SqliteDecisionStore};
use routewise::pipeline::{
    CallRecord, CollaboratorError, ExecutionRequest, ExecutionResponse, Executor, ExecutorError,
    InputValidation, OutputValidation, Tracer, Validator,
};
use routewise::routing::{LearnedRouter, RoutingContext, RuleBasedRouter};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// =============================================================================
// Routing
// =============================================================================

pub fn default_rules() -> RuleBasedRouter {
    RuleBasedRouter::new(ModelCatalog::default(), RoutingConfig::default())
        .expect("default routing config is valid")
}

pub fn memory_store() -> Arc<SqliteDecisionStore> {
    Arc::new(SqliteDecisionStore::open_in_memory().expect("in-memory store opens"))
}

pub fn learned_router(store: Arc<SqliteDecisionStore>, min_samples: usize) -> LearnedRouter {
    let config = LearningConfig {
        min_training_samples: min_samples,
        retrain_threshold: 5,
        ..LearningConfig::default()
    };
    LearnedRouter::new(default_rules(), store, config)
}

/// Record a decision for `task` pinned to `model` plus a successful outcome
pub fn seed_outcome(store: &dyn DecisionStore, task: &str, model: &str, quality: f64) {
    let mut decision = default_rules().route(task, &RoutingContext::default());
    decision.model = model.to_string();
    store.record_decision(task, &decision).unwrap();
    store
        .record_outcome(
            &decision.decision_id,
            &Outcome {
                success: true,
                quality_score: quality,
                actual_cost_usd: 0.001,
                actual_latency_ms: 150.0,
            },
        )
        .unwrap();
}

// =============================================================================
// Executors
// =============================================================================

/// Echoes the prompt and remembers every request it saw
#[derive(Default)]
pub struct ScriptedExecutor {
    pub requests: Mutex<Vec<ExecutionRequest>>,
    pub calls: AtomicUsize,
}

impl ScriptedExecutor {
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<ExecutionRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl Executor for ScriptedExecutor {
    async fn execute(&self, request: ExecutionRequest) -> Result<ExecutionResponse, ExecutorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let response = ExecutionResponse {
            content: format!("answer to: {}", request.prompt),
            model_used: request.backend.clone(),
            input_tokens: 120,
            output_tokens: 80,
            cost_usd: 0.002,
        };
        self.requests.lock().unwrap().push(request);
        Ok(response)
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Always fails with a backend error
pub struct FailingExecutor;

#[async_trait]
impl Executor for FailingExecutor {
    async fn execute(&self, request: ExecutionRequest) -> Result<ExecutionResponse, ExecutorError> {
        Err(ExecutorError::Backend {
            backend: request.backend,
            message: "503 service unavailable".to_string(),
        })
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}

/// Resolves only when the caller's cancellation token fires
pub struct CancellableExecutor;

#[async_trait]
impl Executor for CancellableExecutor {
    async fn execute(&self, request: ExecutionRequest) -> Result<ExecutionResponse, ExecutorError> {
        request.cancellation.cancelled().await;
        Err(ExecutorError::Cancelled)
    }

    fn name(&self) -> &'static str {
        "cancellable"
    }
}

// =============================================================================
// Validators and tracers
// =============================================================================

/// Blocks inputs containing a marker; flags outputs containing it
pub struct MarkerValidator {
    pub marker: &'static str,
}

impl Validator for MarkerValidator {
    fn validate_input(&self, text: &str) -> Result<InputValidation, CollaboratorError> {
        if text.contains(self.marker) {
            Ok(InputValidation::blocked(format!("contains '{}'", self.marker)))
        } else {
            Ok(InputValidation::default())
        }
    }

    fn validate_output(&self, text: &str) -> Result<OutputValidation, CollaboratorError> {
        Ok(OutputValidation {
            valid: !text.contains(self.marker),
            score: 0.7,
            ..OutputValidation::default()
        })
    }
}

/// Validator whose every call fails
pub struct BrokenValidator;

impl Validator for BrokenValidator {
    fn validate_input(&self, _text: &str) -> Result<InputValidation, CollaboratorError> {
        Err(CollaboratorError::failed("validator", "rules file missing"))
    }

    fn validate_output(&self, _text: &str) -> Result<OutputValidation, CollaboratorError> {
        Err(CollaboratorError::failed("validator", "rules file missing"))
    }
}

/// Collects trace events in memory
#[derive(Default)]
pub struct RecordingTracer {
    pub started: Mutex<Vec<String>>,
    pub calls: Mutex<Vec<CallRecord>>,
    pub ended: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl Tracer for RecordingTracer {
    async fn start_trace(
        &self,
        name: &str,
        _metadata: serde_json::Value,
    ) -> Result<String, CollaboratorError> {
        let mut started = self.started.lock().unwrap();
        started.push(name.to_string());
        Ok(format!("trace-{}", started.len()))
    }

    async fn log_call(&self, _trace_id: &str, call: CallRecord) -> Result<(), CollaboratorError> {
        self.calls.lock().unwrap().push(call);
        Ok(())
    }

    async fn end_trace(
        &self,
        trace_id: &str,
        _output: serde_json::Value,
        status: &str,
    ) -> Result<(), CollaboratorError> {
        self.ended
            .lock()
            .unwrap()
            .push((trace_id.to_string(), status.to_string()));
        Ok(())
    }
}

/// Tracer that cannot reach its backend
pub struct UnreachableTracer;

#[async_trait]
impl Tracer for UnreachableTracer {
    async fn start_trace(
        &self,
        _name: &str,
        _metadata: serde_json::Value,
    ) -> Result<String, CollaboratorError> {
        Err(CollaboratorError::failed("tracer", "connection refused"))
    }

    async fn log_call(&self, _trace_id: &str, _call: CallRecord) -> Result<(), CollaboratorError> {
        Err(CollaboratorError::failed("tracer", "connection refused"))
    }

    async fn end_trace(
        &self,
        _trace_id: &str,
        _output: serde_json::Value,
        _status: &str,
    ) -> Result<(), CollaboratorError> {
        Err(CollaboratorError::failed("tracer", "connection refused"))
    }
}
