//! Request and result types for the pipeline

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::classify::ComplexityBucket;
use super::collaborators::{InputValidation, OutputValidation};
use crate::routing::{RoutingDecision, Strategy};

/// Per-request options supplied by the caller
#[derive(Debug, Clone, Default)]
pub struct PipelineContext {
    /// Explicit backend; wins over every other selection rule when the
    /// catalog knows it
    pub model: Option<String>,
    pub system_prompt: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// File-count hint forwarded to the router
    pub file_count: Option<u32>,
    /// Token-tracking task id; the configured default when unset
    pub task_id: Option<String>,
    pub deadline: Option<tokio::time::Instant>,
    pub cancellation: Option<CancellationToken>,
}

impl PipelineContext {
    pub fn with_model(model: impl Into<String>) -> Self {
        Self {
            model: Some(model.into()),
            ..Self::default()
        }
    }
}

/// Terminal state of one request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    #[default]
    Completed,
    CacheHit,
    Blocked,
    Failed,
}

impl PipelineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStatus::Completed => "completed",
            PipelineStatus::CacheHit => "cache_hit",
            PipelineStatus::Blocked => "blocked",
            PipelineStatus::Failed => "failed",
        }
    }
}

/// Validator verdicts for one request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<InputValidation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<OutputValidation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_reason: Option<String>,
}

/// Denormalised routing facts attached to a result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutingSummary {
    pub complexity: Option<ComplexityBucket>,
    pub model: String,
    pub reason: String,
    pub strategy: Strategy,
    pub n_samples: u32,
    pub fallback_chain: Vec<String>,
    pub confidence: Option<f64>,
    pub estimated_cost_usd: Option<f64>,
    /// Set when a router made the decision
    pub decision_id: Option<String>,
}

impl RoutingSummary {
    pub(crate) fn apply_decision(&mut self, decision: &RoutingDecision) {
        self.model = decision.model.clone();
        self.reason = decision.reasoning.clone();
        self.strategy = decision.strategy;
        self.n_samples = decision.n_samples;
        self.fallback_chain = decision.fallback_chain.clone();
        self.confidence = Some(decision.confidence);
        self.estimated_cost_usd = Some(decision.estimated_cost_usd);
        self.decision_id = Some(decision.decision_id.clone());
    }
}

/// Outcome of one `process` call. Owned by the caller; never persisted here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineResult {
    pub request_id: String,
    pub content: String,
    pub model_used: String,
    pub cached: bool,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
    pub latency_ms: f64,
    pub validation: ValidationReport,
    /// Empty unless a tracer issued an id
    pub trace_id: String,
    pub tokens_tracked: bool,
    pub status: PipelineStatus,
    pub routing_decision: RoutingSummary,
}

impl PipelineResult {
    pub fn is_success(&self) -> bool {
        matches!(self.status, PipelineStatus::Completed | PipelineStatus::CacheHit)
    }
}

/// Payload stored in the cache by the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct CachedAnswer {
    pub content: String,
    #[serde(default)]
    pub model_used: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serde() {
        let json = serde_json::to_string(&PipelineStatus::CacheHit).unwrap();
        assert_eq!(json, "\"cache_hit\"");
    }

    #[test]
    fn test_default_result_is_zeroed() {
        let result = PipelineResult::default();
        assert!(result.trace_id.is_empty());
        assert!(!result.cached);
        assert!(!result.tokens_tracked);
        assert_eq!(result.validation, ValidationReport::default());
    }

    #[test]
    fn test_cached_answer_tolerates_missing_model() {
        let answer: CachedAnswer = serde_json::from_str(r#"{"content":"hi"}"#).unwrap();
        assert_eq!(answer.content, "hi");
        assert!(answer.model_used.is_empty());
    }
}
