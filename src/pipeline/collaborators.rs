//! Contracts for the external collaborators the pipeline composes.
//!
//! The executor is the only collaborator expected to block for long. Every
//! other one is optional and has a null object that reports
//! `is_available() == false`, so the orchestrator never branches on
//! "is it installed".

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::error::{CollaboratorError, ExecutorError};
use crate::routing::Strategy;

// ============================================================================
// Executor
// ============================================================================

/// Everything an executor needs for one call.
///
/// The deadline and cancellation token are the caller's, passed through
/// unchanged. Fallback-chain retries happen inside the executor.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub backend: String,
    pub fallback_chain: Vec<String>,
    pub strategy: Strategy,
    pub n_samples: u32,
    pub prompt: String,
    pub system_prompt: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub deadline: Option<tokio::time::Instant>,
    pub cancellation: CancellationToken,
}

impl ExecutionRequest {
    /// Single-shot request with default sampling settings
    pub fn new(backend: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            fallback_chain: Vec::new(),
            strategy: Strategy::SingleShot,
            n_samples: 1,
            prompt: prompt.into(),
            system_prompt: None,
            temperature: 0.7,
            max_tokens: 4096,
            deadline: None,
            cancellation: CancellationToken::new(),
        }
    }
}

/// What an executor returns
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResponse {
    pub content: String,
    /// Backend that actually answered (may differ from the requested one
    /// after a fallback)
    pub model_used: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
}

/// Language-model execution capability.
///
/// This trait is object-safe and used as `Arc<dyn Executor>`.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, request: ExecutionRequest) -> Result<ExecutionResponse, ExecutorError>;

    fn is_available(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str;
}

/// Executor used when none is installed; every call fails with
/// [`ExecutorError::Unavailable`].
#[derive(Debug, Clone, Copy, Default)]
pub struct NullExecutor;

#[async_trait]
impl Executor for NullExecutor {
    async fn execute(&self, _request: ExecutionRequest) -> Result<ExecutionResponse, ExecutorError> {
        Err(ExecutorError::Unavailable)
    }

    fn is_available(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "none"
    }
}

// ============================================================================
// Validator
// ============================================================================

/// Result of validating the inbound task text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputValidation {
    pub valid: bool,
    pub blocked: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub score: f64,
}

impl Default for InputValidation {
    fn default() -> Self {
        Self {
            valid: true,
            blocked: false,
            errors: Vec::new(),
            warnings: Vec::new(),
            score: 1.0,
        }
    }
}

impl InputValidation {
    /// Blocking verdict with one error
    pub fn blocked(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            blocked: true,
            errors: vec![reason.into()],
            warnings: Vec::new(),
            score: 0.0,
        }
    }

    /// First error, used as the block reason
    pub fn reason(&self) -> Option<&str> {
        self.errors.first().map(String::as_str)
    }
}

/// Result of validating executor output; advisory only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputValidation {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub score: f64,
}

impl Default for OutputValidation {
    fn default() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
            score: 1.0,
        }
    }
}

pub trait Validator: Send + Sync {
    fn validate_input(&self, text: &str) -> Result<InputValidation, CollaboratorError>;

    fn validate_output(&self, text: &str) -> Result<OutputValidation, CollaboratorError>;

    fn is_available(&self) -> bool {
        true
    }
}

/// Accepts everything
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughValidator;

impl Validator for PassthroughValidator {
    fn validate_input(&self, _text: &str) -> Result<InputValidation, CollaboratorError> {
        Ok(InputValidation::default())
    }

    fn validate_output(&self, _text: &str) -> Result<OutputValidation, CollaboratorError> {
        Ok(OutputValidation::default())
    }

    fn is_available(&self) -> bool {
        false
    }
}

// ============================================================================
// Tracer
// ============================================================================

/// One executed call as reported to the tracer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRecord {
    pub model: String,
    /// Truncated prompt
    pub input_text: String,
    /// Truncated response
    pub output_text: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
    pub latency_ms: f64,
    pub metadata: serde_json::Value,
}

#[async_trait]
pub trait Tracer: Send + Sync {
    /// Open a trace and return its id
    async fn start_trace(
        &self,
        name: &str,
        metadata: serde_json::Value,
    ) -> Result<String, CollaboratorError>;

    async fn log_call(&self, trace_id: &str, call: CallRecord) -> Result<(), CollaboratorError>;

    async fn end_trace(
        &self,
        trace_id: &str,
        output: serde_json::Value,
        status: &str,
    ) -> Result<(), CollaboratorError>;

    fn is_available(&self) -> bool {
        true
    }
}

/// Tracer that records nothing and issues no ids
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

#[async_trait]
impl Tracer for NoopTracer {
    async fn start_trace(
        &self,
        _name: &str,
        _metadata: serde_json::Value,
    ) -> Result<String, CollaboratorError> {
        Ok(String::new())
    }

    async fn log_call(&self, _trace_id: &str, _call: CallRecord) -> Result<(), CollaboratorError> {
        Ok(())
    }

    async fn end_trace(
        &self,
        _trace_id: &str,
        _output: serde_json::Value,
        _status: &str,
    ) -> Result<(), CollaboratorError> {
        Ok(())
    }

    fn is_available(&self) -> bool {
        false
    }
}

// ============================================================================
// Token tracker
// ============================================================================

pub trait TokenTracker: Send + Sync {
    fn record(
        &self,
        task_id: &str,
        backend: &str,
        role: &str,
        input_tokens: u64,
        output_tokens: u64,
    ) -> Result<(), CollaboratorError>;

    fn is_available(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTokenTracker;

impl TokenTracker for NoopTokenTracker {
    fn record(
        &self,
        _task_id: &str,
        _backend: &str,
        _role: &str,
        _input_tokens: u64,
        _output_tokens: u64,
    ) -> Result<(), CollaboratorError> {
        Ok(())
    }

    fn is_available(&self) -> bool {
        false
    }
}
