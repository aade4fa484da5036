//! Backend catalog: identifiers, token pricing and quality priors.
//!
//! The catalog is built once at startup and shared across the router, the
//! cost estimator and the pipeline. Backends are kept in strictly ascending
//! cost order (input + output price per million tokens), which is the order
//! fallback chains and feature vectors follow.
//!
//! ## Example
//!
//! ```rust
//! use routewise::catalog::ModelCatalog;
//!
//! let catalog = ModelCatalog::default();
//! assert_eq!(catalog.cheapest().id, "flash");
//! assert_eq!(catalog.fallback_chain("pro"), vec!["sonnet", "opus"]);
//!
//! // flash: $0.50/1M input + $3.00/1M output
//! let cost = catalog.estimate_cost("flash", 1_000_000, 1_000_000);
//! assert_eq!(cost, Some(3.5));
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::{BackendConfig, ConfigError};

/// Pricing and quality profile of one backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendProfile {
    pub id: String,
    pub display_name: String,
    /// Input (prompt) cost in USD per 1M tokens.
    pub input_price_per_million: f64,
    /// Output (completion) cost in USD per 1M tokens.
    pub output_price_per_million: f64,
    /// Quality prior in [0, 1].
    pub quality_prior: f64,
}

impl BackendProfile {
    pub fn new(
        id: impl Into<String>,
        input_price_per_million: f64,
        output_price_per_million: f64,
        quality_prior: f64,
    ) -> Self {
        let id = id.into();
        Self {
            display_name: id.clone(),
            id,
            input_price_per_million,
            output_price_per_million,
            quality_prior,
        }
    }

    /// Sort key for cost ordering
    pub fn cost_key(&self) -> f64 {
        self.input_price_per_million + self.output_price_per_million
    }
}

impl From<&BackendConfig> for BackendProfile {
    fn from(config: &BackendConfig) -> Self {
        Self {
            id: config.id.clone(),
            display_name: config
                .display_name
                .clone()
                .unwrap_or_else(|| config.id.clone()),
            input_price_per_million: config.input_price_per_million,
            output_price_per_million: config.output_price_per_million,
            quality_prior: config.quality_prior,
        }
    }
}

/// Cost tier of a backend within its catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// The cheapest backend
    Economy,
    /// Anything between the cheapest and the most expensive
    Standard,
    /// The most expensive backend
    Flagship,
}

/// Immutable, cost-ordered backend catalog.
///
/// Cloning is cheap; the table is shared behind an `Arc`.
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    backends: Arc<Vec<BackendProfile>>,
    index: Arc<HashMap<String, usize>>,
}

impl ModelCatalog {
    /// Build a catalog, sorting backends by ascending cost.
    ///
    /// Rejects an empty list, duplicate ids, negative prices, quality priors
    /// outside [0, 1] and ties in cost (the order must be strict).
    pub fn new(mut backends: Vec<BackendProfile>) -> Result<Self, ConfigError> {
        if backends.is_empty() {
            return Err(ConfigError::validation(
                "backends",
                "at least one backend is required",
            ));
        }

        for backend in &backends {
            if backend.id.trim().is_empty() {
                return Err(ConfigError::validation("backends.id", "must not be empty"));
            }
            let prices = [
                backend.input_price_per_million,
                backend.output_price_per_million,
            ];
            if prices.iter().any(|p| !p.is_finite() || *p < 0.0) {
                return Err(ConfigError::validation(
                    format!("backends.{}", backend.id),
                    "prices must be finite and non-negative",
                ));
            }
            if !(0.0..=1.0).contains(&backend.quality_prior) {
                return Err(ConfigError::validation(
                    format!("backends.{}.quality_prior", backend.id),
                    format!("must be in [0, 1], got {}", backend.quality_prior),
                ));
            }
        }

        backends.sort_by(|a, b| a.cost_key().total_cmp(&b.cost_key()));

        for pair in backends.windows(2) {
            if pair[0].cost_key() == pair[1].cost_key() {
                return Err(ConfigError::validation(
                    format!("backends.{}", pair[1].id),
                    format!("has the same cost as '{}'; cost order must be strict", pair[0].id),
                ));
            }
        }

        let mut index = HashMap::with_capacity(backends.len());
        for (rank, backend) in backends.iter().enumerate() {
            if index.insert(backend.id.clone(), rank).is_some() {
                return Err(ConfigError::validation(
                    "backends.id",
                    format!("duplicate backend id '{}'", backend.id),
                ));
            }
        }

        Ok(Self {
            backends: Arc::new(backends),
            index: Arc::new(index),
        })
    }

    /// Build a catalog from `[[backends]]` configuration entries
    pub fn from_configs(configs: &[BackendConfig]) -> Result<Self, ConfigError> {
        Self::new(configs.iter().map(BackendProfile::from).collect())
    }

    pub fn get(&self, id: &str) -> Option<&BackendProfile> {
        self.index.get(id).map(|&rank| &self.backends[rank])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Backend ids in ascending cost order
    pub fn ids(&self) -> Vec<&str> {
        self.backends.iter().map(|b| b.id.as_str()).collect()
    }

    /// Backends in ascending cost order
    pub fn backends(&self) -> &[BackendProfile] {
        &self.backends
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    pub fn cheapest(&self) -> &BackendProfile {
        &self.backends[0]
    }

    pub fn most_expensive(&self) -> &BackendProfile {
        &self.backends[self.backends.len() - 1]
    }

    /// Position in cost order, 0 for the cheapest
    pub fn rank(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Cost tier of a backend. A single-backend catalog is all Economy.
    pub fn tier(&self, id: &str) -> Option<Tier> {
        let rank = self.rank(id)?;
        Some(if rank == 0 {
            Tier::Economy
        } else if rank == self.backends.len() - 1 {
            Tier::Flagship
        } else {
            Tier::Standard
        })
    }

    /// The next backend up in cost order
    pub fn next_after(&self, id: &str) -> Option<&BackendProfile> {
        let rank = self.rank(id)?;
        self.backends.get(rank + 1)
    }

    /// Every backend strictly more expensive than `id`, ascending.
    ///
    /// Empty for the most expensive backend or an unknown id.
    pub fn fallback_chain(&self, id: &str) -> Vec<String> {
        match self.rank(id) {
            Some(rank) => self.backends[rank + 1..]
                .iter()
                .map(|b| b.id.clone())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Estimate cost in USD for a backend based on token counts.
    ///
    /// Returns `None` if the backend is not in the catalog.
    pub fn estimate_cost(&self, id: &str, input_tokens: u64, output_tokens: u64) -> Option<f64> {
        self.get(id).map(|profile| {
            let input_cost = (input_tokens as f64 / 1_000_000.0) * profile.input_price_per_million;
            let output_cost =
                (output_tokens as f64 / 1_000_000.0) * profile.output_price_per_million;
            input_cost + output_cost
        })
    }
}

impl Default for ModelCatalog {
    /// Built-in catalog, already in cost order.
    fn default() -> Self {
        let backends = vec![
            BackendProfile::new("flash", 0.50, 3.00, 0.65),
            BackendProfile::new("pro", 2.00, 12.00, 0.80),
            BackendProfile::new("sonnet", 3.00, 15.00, 0.85),
            BackendProfile::new("opus", 15.00, 75.00, 0.95),
        ];
        let index = backends
            .iter()
            .enumerate()
            .map(|(rank, b)| (b.id.clone(), rank))
            .collect();
        Self {
            backends: Arc::new(backends),
            index: Arc::new(index),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_catalog_order() {
        let catalog = ModelCatalog::default();
        assert_eq!(catalog.ids(), vec!["flash", "pro", "sonnet", "opus"]);
        assert_eq!(catalog.cheapest().id, "flash");
        assert_eq!(catalog.most_expensive().id, "opus");
    }

    #[test]
    fn test_default_catalog_passes_validation() {
        let rebuilt = ModelCatalog::new(ModelCatalog::default().backends().to_vec()).unwrap();
        assert_eq!(rebuilt.ids(), ModelCatalog::default().ids());
    }

    #[test]
    fn test_new_sorts_by_cost() {
        let catalog = ModelCatalog::new(vec![
            BackendProfile::new("big", 10.0, 30.0, 0.9),
            BackendProfile::new("small", 0.1, 0.2, 0.5),
        ])
        .unwrap();
        assert_eq!(catalog.ids(), vec!["small", "big"]);
        assert_eq!(catalog.rank("big"), Some(1));
    }

    #[test]
    fn test_rejects_duplicate_ids() {
        let result = ModelCatalog::new(vec![
            BackendProfile::new("a", 1.0, 1.0, 0.5),
            BackendProfile::new("a", 2.0, 2.0, 0.5),
        ]);
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_rejects_cost_ties() {
        let result = ModelCatalog::new(vec![
            BackendProfile::new("a", 1.0, 2.0, 0.5),
            BackendProfile::new("b", 2.0, 1.0, 0.5),
        ]);
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_rejects_empty_and_bad_values() {
        assert!(ModelCatalog::new(vec![]).is_err());
        assert!(ModelCatalog::new(vec![BackendProfile::new("a", -1.0, 1.0, 0.5)]).is_err());
        assert!(ModelCatalog::new(vec![BackendProfile::new("a", 1.0, 1.0, 1.5)]).is_err());
    }

    #[test]
    fn test_tiers() {
        let catalog = ModelCatalog::default();
        assert_eq!(catalog.tier("flash"), Some(Tier::Economy));
        assert_eq!(catalog.tier("pro"), Some(Tier::Standard));
        assert_eq!(catalog.tier("sonnet"), Some(Tier::Standard));
        assert_eq!(catalog.tier("opus"), Some(Tier::Flagship));
        assert_eq!(catalog.tier("unknown"), None);
    }

    #[test]
    fn test_fallback_chain() {
        let catalog = ModelCatalog::default();
        assert_eq!(catalog.fallback_chain("flash"), vec!["pro", "sonnet", "opus"]);
        assert!(catalog.fallback_chain("opus").is_empty());
        assert!(catalog.fallback_chain("unknown").is_empty());
    }

    #[test]
    fn test_estimate_cost() {
        let catalog = ModelCatalog::default();
        // opus: 700 * 15 / 1M + 233 * 75 / 1M
        let cost = catalog.estimate_cost("opus", 700, 233).unwrap();
        assert!((cost - 0.027975).abs() < 1e-12);
        assert_eq!(catalog.estimate_cost("unknown", 1, 1), None);
    }

    #[test]
    fn test_display_name_defaults_to_id() {
        let config = BackendConfig {
            id: "local".to_string(),
            display_name: None,
            input_price_per_million: 0.0,
            output_price_per_million: 0.0,
            quality_prior: 0.5,
        };
        assert_eq!(BackendProfile::from(&config).display_name, "local");
    }
}
