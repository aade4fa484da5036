//! Learned-router configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Learning configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningConfig {
    /// Use the learned router (falls back to rules until trained)
    pub enabled: bool,
    /// SQLite file for decisions and outcomes; in-memory when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,
    /// Minimum successful outcomes required before training
    pub min_training_samples: usize,
    /// New outcomes since the last training that trigger a retrain
    pub retrain_threshold: u64,
    /// Most recent rows considered per training run
    pub max_training_rows: usize,
    /// Interval of the background retrain loop
    pub retrain_interval_seconds: u64,
    /// Where trained weights are saved and loaded from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_path: Option<PathBuf>,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            database_path: None,
            min_training_samples: 50,
            retrain_threshold: 20,
            max_training_rows: 2000,
            retrain_interval_seconds: 300,
            model_path: None,
        }
    }
}
