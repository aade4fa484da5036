//! Feature extraction from free-text task descriptions.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::keywords::{
    count_hits, CODE_MARKERS, COMPLEX_KEYWORDS, MEDIUM_KEYWORDS, PROGRAM_KEYWORDS,
};
use crate::catalog::ModelCatalog;

/// Explicit file-count mentions such as "8 файлов" or "3 files".
static FILE_COUNT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+)\s*(файл|file)").expect("FILE_COUNT_RE regex should compile")
});

/// Saturation constant for keyword and code-marker counts.
const HIT_SATURATION: f64 = 3.0;
const LENGTH_SCALE: f64 = 200.0;
const WORD_SCALE: f64 = 30.0;

/// Success rate assumed for a backend with no history.
pub const DEFAULT_SUCCESS_RATE: f64 = 0.5;

/// Per-backend historical success rates, keyed by backend id.
pub type SuccessRates = HashMap<String, f64>;

/// Number of features before the per-backend success rates.
pub const TEXT_FEATURES: usize = 8;

/// Keyword-derived signals of a task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordSignals {
    pub program_hits: usize,
    pub medium_hits: usize,
    pub complex_hits: usize,
    pub code_markers: usize,
    /// Length in Unicode scalar values
    pub char_len: usize,
    pub word_count: usize,
    /// Largest explicit file count mentioned in the text
    pub file_count: Option<u32>,
    pub has_question: bool,
}

impl KeywordSignals {
    pub fn from_text(task: &str) -> Self {
        let lower = task.to_lowercase();
        let file_count = FILE_COUNT_RE
            .captures_iter(&lower)
            .filter_map(|caps| caps.get(1)?.as_str().parse::<u32>().ok())
            .max();

        Self {
            program_hits: count_hits(&lower, PROGRAM_KEYWORDS),
            medium_hits: count_hits(&lower, MEDIUM_KEYWORDS),
            complex_hits: count_hits(&lower, COMPLEX_KEYWORDS),
            code_markers: count_hits(task, CODE_MARKERS),
            char_len: task.chars().count(),
            word_count: task.split_whitespace().count(),
            file_count,
            has_question: task.contains('?'),
        }
    }

    /// True when no keyword of any family matched
    pub fn no_keyword_hits(&self) -> bool {
        self.program_hits == 0 && self.medium_hits == 0 && self.complex_hits == 0
    }
}

/// Fixed-order numeric feature vector.
///
/// Layout: `[program, complex, medium, length, words, code, file_count,
/// question, success_rate(backend)...]` with backends in catalog cost order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector(pub Vec<f64>);

impl FeatureVector {
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Turns task text into a [`FeatureVector`].
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    catalog: ModelCatalog,
}

impl FeatureExtractor {
    pub fn new(catalog: ModelCatalog) -> Self {
        Self { catalog }
    }

    /// Length of every vector this extractor produces
    pub fn dimension(&self) -> usize {
        TEXT_FEATURES + self.catalog.len()
    }

    /// Extract features. Backends missing from `stats` get a rate of 0.5.
    pub fn extract(&self, task: &str, stats: &SuccessRates) -> FeatureVector {
        let signals = KeywordSignals::from_text(task);
        self.vectorize(&signals, stats)
    }

    pub fn vectorize(&self, signals: &KeywordSignals, stats: &SuccessRates) -> FeatureVector {
        let saturate = |hits: usize| (hits as f64 / HIT_SATURATION).min(1.0);
        let flag = |b: bool| if b { 1.0 } else { 0.0 };

        let mut features = Vec::with_capacity(self.dimension());
        features.push(saturate(signals.program_hits));
        features.push(saturate(signals.complex_hits));
        features.push(saturate(signals.medium_hits));
        features.push((signals.char_len as f64 / LENGTH_SCALE).min(1.0));
        features.push((signals.word_count as f64 / WORD_SCALE).min(1.0));
        features.push(saturate(signals.code_markers));
        features.push(flag(signals.file_count.is_some()));
        features.push(flag(signals.has_question));

        for id in self.catalog.ids() {
            let rate = stats.get(id).copied().unwrap_or(DEFAULT_SUCCESS_RATE);
            features.push(rate);
        }

        FeatureVector(features)
    }
}
