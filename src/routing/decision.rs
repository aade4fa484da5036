//! Routing decision types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Execution pattern for the chosen backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// One call to the chosen backend
    #[default]
    SingleShot,
    /// Several calls with majority voting over the answers
    MultiSample,
    /// Start with the chosen backend, escalate along the fallback chain
    Cascade,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::SingleShot => "single_shot",
            Strategy::MultiSample => "multi_sample",
            Strategy::Cascade => "cascade",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single_shot" => Ok(Strategy::SingleShot),
            "multi_sample" => Ok(Strategy::MultiSample),
            "cascade" => Ok(Strategy::Cascade),
            other => Err(format!("Unknown strategy: {}", other)),
        }
    }
}

/// Which routing variant produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingSource {
    RuleBased,
    Learned,
}

impl RoutingSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoutingSource::RuleBased => "rule_based",
            RoutingSource::Learned => "learned",
        }
    }
}

/// Caller-supplied hints for a routing call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingContext {
    /// Number of files the task touches, when the caller knows it
    pub file_count: Option<u32>,
}

impl RoutingContext {
    pub fn with_file_count(file_count: u32) -> Self {
        Self {
            file_count: Some(file_count),
        }
    }
}

/// The outcome of routing one task. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub decision_id: String,
    pub model: String,
    pub strategy: Strategy,
    pub n_samples: u32,
    /// Backends strictly more expensive than `model`, ascending
    pub fallback_chain: Vec<String>,
    pub confidence: f64,
    pub estimated_cost_usd: f64,
    /// Diagnostic only
    pub reasoning: String,
    pub source: RoutingSource,
}

/// New opaque decision id: 16 hex characters of a v4 UUID
pub fn new_decision_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(16);
    id
}
