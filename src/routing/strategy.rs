//! Execution-strategy selection, independent of the chosen backend.

use super::decision::Strategy;
use super::features::KeywordSignals;
use crate::catalog::{ModelCatalog, Tier};

const SHORT_TASK_CHARS: usize = 60;
const MULTI_SAMPLE_MIN_CHARS: usize = 100;
const CASCADE_MIN_CHARS: usize = 80;

/// Pick an execution strategy for a task
pub fn suggest_strategy(task: &str) -> Strategy {
    strategy_for_signals(&KeywordSignals::from_text(task))
}

/// First matching rule wins.
pub fn strategy_for_signals(signals: &KeywordSignals) -> Strategy {
    // Clearly scripted or clearly hard: one call is enough
    if signals.program_hits >= 2 || signals.complex_hits >= 2 {
        return Strategy::SingleShot;
    }

    if signals.char_len < SHORT_TASK_CHARS {
        return Strategy::SingleShot;
    }

    if signals.medium_hits == 1
        && signals.code_markers == 0
        && signals.char_len > MULTI_SAMPLE_MIN_CHARS
    {
        return Strategy::MultiSample;
    }

    if signals.no_keyword_hits() && signals.char_len > CASCADE_MIN_CHARS {
        return Strategy::Cascade;
    }

    Strategy::SingleShot
}

/// Number of samples to request.
///
/// Only `MultiSample` takes more than one, scaled inversely with the
/// backend's cost tier.
pub fn n_samples(catalog: &ModelCatalog, strategy: Strategy, model: &str) -> u32 {
    if strategy != Strategy::MultiSample {
        return 1;
    }
    match catalog.tier(model) {
        Some(Tier::Economy) => 5,
        Some(Tier::Standard) => 3,
        Some(Tier::Flagship) | None => 1,
    }
}
