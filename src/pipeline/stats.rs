//! Lifetime counters and status reports for the orchestrator

use std::collections::BTreeMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// Raw running totals
#[derive(Debug, Clone, Default, PartialEq)]
struct Totals {
    total_requests: u64,
    cache_hits: u64,
    cache_misses: u64,
    input_tokens: u64,
    output_tokens: u64,
    cost_usd: f64,
    latency_ms: f64,
    successes: u64,
    failures: u64,
    validation_blocks: u64,
}

/// Counter snapshot with derived rates
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineStats {
    pub total_requests: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    /// Percentage of requests
    pub cache_hit_rate: f64,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_tokens: u64,
    pub total_cost_usd: f64,
    pub avg_latency_ms: f64,
    /// Percentage of requests
    pub success_rate: f64,
    pub successes: u64,
    pub failures: u64,
    pub validation_blocks: u64,
}

/// Thread-safe counters; each update is one short lock
#[derive(Debug, Default)]
pub(crate) struct PipelineCounters {
    totals: Mutex<Totals>,
}

impl PipelineCounters {
    fn update(&self, f: impl FnOnce(&mut Totals)) {
        let mut totals = match self.totals.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("Pipeline counters lock poisoned, recovering");
                poisoned.into_inner()
            }
        };
        f(&mut totals);
    }

    pub fn request(&self) {
        self.update(|t| t.total_requests += 1);
    }

    pub fn cache_hit(&self) {
        self.update(|t| t.cache_hits += 1);
    }

    pub fn cache_miss(&self) {
        self.update(|t| t.cache_misses += 1);
    }

    pub fn validation_block(&self) {
        self.update(|t| t.validation_blocks += 1);
    }

    pub fn success(&self, input_tokens: u64, output_tokens: u64, cost_usd: f64) {
        self.update(|t| {
            t.successes += 1;
            t.input_tokens += input_tokens;
            t.output_tokens += output_tokens;
            t.cost_usd += cost_usd;
        });
    }

    pub fn failure(&self) {
        self.update(|t| t.failures += 1);
    }

    pub fn latency(&self, latency_ms: f64) {
        self.update(|t| t.latency_ms += latency_ms);
    }

    pub fn snapshot(&self) -> PipelineStats {
        let mut copy = Totals::default();
        self.update(|t| copy = t.clone());

        let total = copy.total_requests;
        let percent = |n: u64| {
            if total > 0 {
                n as f64 / total as f64 * 100.0
            } else {
                0.0
            }
        };
        PipelineStats {
            total_requests: total,
            cache_hits: copy.cache_hits,
            cache_misses: copy.cache_misses,
            cache_hit_rate: percent(copy.cache_hits),
            total_input_tokens: copy.input_tokens,
            total_output_tokens: copy.output_tokens,
            total_tokens: copy.input_tokens + copy.output_tokens,
            total_cost_usd: copy.cost_usd,
            avg_latency_ms: if total > 0 {
                copy.latency_ms / total as f64
            } else {
                0.0
            },
            success_rate: percent(copy.successes),
            successes: copy.successes,
            failures: copy.failures,
            validation_blocks: copy.validation_blocks,
        }
    }
}

/// State of one collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentStatus {
    /// A real implementation (not a null object) is installed
    pub available: bool,
    /// Turned on by configuration
    pub enabled: bool,
    /// Will actually be used by `process`
    pub initialized: bool,
}

impl ComponentStatus {
    pub(crate) fn new(available: bool, enabled: bool) -> Self {
        Self {
            available,
            enabled,
            initialized: available && enabled,
        }
    }
}

/// Component map returned by `status()`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineStatusReport {
    pub components: BTreeMap<String, ComponentStatus>,
    /// Name of the routing variant, when a router is attached
    pub router: Option<String>,
    pub router_trained: bool,
}

/// Health of one collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub healthy: bool,
    pub detail: String,
    /// Absent collaborators are optional and never unhealthy
    pub optional: bool,
}

/// Result of `health_check()`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub components: BTreeMap<String, ComponentHealth>,
    pub graceful_degradation: bool,
}
