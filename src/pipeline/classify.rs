//! Task complexity buckets and the built-in keyword classifier.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::CollaboratorError;

/// Coarse complexity of a task, used by the pipeline's model table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplexityBucket {
    /// Script-like work: reports, listings, lint runs
    Program,
    Simple,
    Medium,
    Complex,
}

impl ComplexityBucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComplexityBucket::Program => "program",
            ComplexityBucket::Simple => "simple",
            ComplexityBucket::Medium => "medium",
            ComplexityBucket::Complex => "complex",
        }
    }
}

impl fmt::Display for ComplexityBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classifier verdict
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub bucket: ComplexityBucket,
    /// [0, 1]
    pub confidence: f64,
}

/// Verdicts below this confidence are replaced by the keyword classifier
pub const MIN_CLASSIFIER_CONFIDENCE: f64 = 0.5;

/// External task-complexity classifier
pub trait TaskComplexityClassifier: Send + Sync {
    fn classify(&self, text: &str) -> Result<Classification, CollaboratorError>;

    fn is_trained(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str;
}

const PROGRAM_HINTS: &[&str] = &[
    "отчёт", "отчет", "статистик", "покажи", "список", "валидац", "lint", "format",
    "тест запуст", "pytest", "report", "statistic", "show me", "list all", "run tests",
];

const COMPLEX_HINTS: &[&str] = &[
    "архитектур", "рефактор", "миграц", "безопасн", "производительн", "оптимизац",
    "переписать", "architect", "refactor", "migrat", "security", "performance", "optimiz",
    "rewrite",
];

const MEDIUM_HINTS: &[&str] = &[
    "api endpoint", "модуль", "компонент", "фич", "интеграц", "crud", "middleware",
    "module", "component", "feature", "integrat",
];

/// Last-resort classifier: first matching hint list wins, in the order
/// program, complex, medium; anything else is simple.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordComplexityClassifier;

impl KeywordComplexityClassifier {
    pub fn bucket(text: &str) -> ComplexityBucket {
        let lower = text.to_lowercase();
        let matches = |hints: &[&str]| hints.iter().any(|h| lower.contains(h));

        if matches(PROGRAM_HINTS) {
            ComplexityBucket::Program
        } else if matches(COMPLEX_HINTS) {
            ComplexityBucket::Complex
        } else if matches(MEDIUM_HINTS) {
            ComplexityBucket::Medium
        } else {
            ComplexityBucket::Simple
        }
    }
}

impl TaskComplexityClassifier for KeywordComplexityClassifier {
    fn classify(&self, text: &str) -> Result<Classification, CollaboratorError> {
        Ok(Classification {
            bucket: Self::bucket(text),
            confidence: 1.0,
        })
    }

    fn is_trained(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "keyword"
    }
}
