//! Up-front cost estimation and fallback-chain construction.
//!
//! Token counts are estimated from task length only:
//!
//! - **Input tokens**: `max(chars / 4, 200) + 500` (prompt plus surrounding context)
//! - **Output tokens**: `max(input / 3, 100)`
//!
//! Costs are priced from the [`ModelCatalog`] and rounded to 6 decimals.

use std::collections::BTreeMap;

use super::decision::Strategy;
use crate::catalog::ModelCatalog;

/// Share of cascades expected to escalate to the next backend.
const CASCADE_ESCALATION_RATE: f64 = 0.30;

/// Estimated token counts for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenEstimate {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenEstimate {
    pub fn for_task(task: &str) -> Self {
        let chars = task.chars().count() as u64;
        let input_tokens = (chars / 4).max(200) + 500;
        let output_tokens = (input_tokens / 3).max(100);
        Self {
            input_tokens,
            output_tokens,
        }
    }
}

fn round6(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}

/// Prices tasks against a catalog.
#[derive(Debug, Clone)]
pub struct CostEstimator {
    catalog: ModelCatalog,
}

impl CostEstimator {
    pub fn new(catalog: ModelCatalog) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    /// Estimated USD cost of a single call to every backend
    pub fn estimate_cost(&self, task: &str) -> BTreeMap<String, f64> {
        let tokens = TokenEstimate::for_task(task);
        self.catalog
            .backends()
            .iter()
            .filter_map(|b| {
                let cost = self.catalog.estimate_cost(
                    &b.id,
                    tokens.input_tokens,
                    tokens.output_tokens,
                )?;
                Some((b.id.clone(), round6(cost)))
            })
            .collect()
    }

    /// Single-call cost of one backend, 0.0 when unknown
    pub fn base_cost(&self, model: &str, task: &str) -> f64 {
        let tokens = TokenEstimate::for_task(task);
        self.catalog
            .estimate_cost(model, tokens.input_tokens, tokens.output_tokens)
            .map(round6)
            .unwrap_or(0.0)
    }

    /// Expected cost of executing a decision.
    ///
    /// `MultiSample` pays for every sample; `Cascade` adds 30% of the next
    /// backend's cost to model the chance of escalation.
    pub fn estimated_decision_cost(
        &self,
        model: &str,
        strategy: Strategy,
        n_samples: u32,
        task: &str,
    ) -> f64 {
        let base = self.base_cost(model, task);
        let cost = match strategy {
            Strategy::SingleShot => base,
            Strategy::MultiSample => base * f64::from(n_samples),
            Strategy::Cascade => match self.catalog.next_after(model) {
                Some(next) => base + CASCADE_ESCALATION_RATE * self.base_cost(&next.id, task),
                None => base,
            },
        };
        round6(cost)
    }

    /// Every backend strictly more expensive than `model`, ascending
    pub fn build_fallback_chain(&self, model: &str) -> Vec<String> {
        self.catalog.fallback_chain(model)
    }
}
