//! Pipeline configuration

use serde::{Deserialize, Serialize};

/// Pipeline configuration
///
/// The `*_enabled` switches are reported by `health_check()` as the
/// "enabled by configuration" flag of each optional collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub validation_enabled: bool,
    pub validate_input: bool,
    pub validate_output: bool,
    pub observability_enabled: bool,
    pub token_tracking_enabled: bool,
    /// Default sampling temperature passed to the executor
    pub temperature: f32,
    /// Default completion budget passed to the executor
    pub max_tokens: u32,
    /// Characters of prompt/response text forwarded to the tracer
    pub trace_preview_chars: usize,
    /// Task id used for token tracking when the context carries none
    pub tracking_task_id: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            validation_enabled: true,
            validate_input: true,
            validate_output: true,
            observability_enabled: true,
            token_tracking_enabled: true,
            temperature: 0.7,
            max_tokens: 4096,
            trace_preview_chars: 2000,
            tracking_task_id: "pipeline".to_string(),
        }
    }
}
