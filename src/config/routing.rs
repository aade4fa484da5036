//! Routing configuration

use serde::{Deserialize, Serialize};

use crate::catalog::ModelCatalog;
use crate::config::error::ConfigError;

/// Routing configuration
///
/// Names the backends the rule-based router and the complexity table pick
/// from. Every id must exist in the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Backend used for "program" tasks in the pipeline's complexity table
    pub default_model: String,
    /// Cheapest backend, used for script-like and short tasks
    pub economy_model: String,
    /// Mid-tier backend for medium-complexity tasks
    pub mid_model: String,
    /// Standard backend when nothing else matches
    pub standard_model: String,
    /// Most capable backend for complex tasks and wide fan-out
    pub top_model: String,
    /// File-count signal at which a task is routed to the top model
    pub fanout_file_threshold: u32,
    /// File-count signal at which a task is routed to the mid model
    pub medium_file_threshold: u32,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            default_model: "flash".to_string(),
            economy_model: "flash".to_string(),
            mid_model: "pro".to_string(),
            standard_model: "sonnet".to_string(),
            top_model: "opus".to_string(),
            fanout_file_threshold: 6,
            medium_file_threshold: 3,
        }
    }
}

impl RoutingConfig {
    /// Check that every configured backend id exists in the catalog
    pub fn validate_against(&self, catalog: &ModelCatalog) -> Result<(), ConfigError> {
        let fields = [
            ("routing.default_model", &self.default_model),
            ("routing.economy_model", &self.economy_model),
            ("routing.mid_model", &self.mid_model),
            ("routing.standard_model", &self.standard_model),
            ("routing.top_model", &self.top_model),
        ];
        for (field, backend) in fields {
            if !catalog.contains(backend) {
                return Err(ConfigError::UnknownBackend {
                    field: field.to_string(),
                    backend: backend.clone(),
                });
            }
        }

        if self.medium_file_threshold > self.fanout_file_threshold {
            return Err(ConfigError::validation(
                "routing.medium_file_threshold",
                "must not exceed fanout_file_threshold",
            ));
        }

        Ok(())
    }
}
