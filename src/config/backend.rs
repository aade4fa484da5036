//! Backend catalog configuration

use serde::{Deserialize, Serialize};

/// One `[[backends]]` entry.
///
/// Prices are USD per one million tokens. When no backends are configured the
/// built-in catalog is used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub input_price_per_million: f64,
    pub output_price_per_million: f64,
    #[serde(default = "default_quality")]
    pub quality_prior: f64,
}

fn default_quality() -> f64 {
    0.5
}
