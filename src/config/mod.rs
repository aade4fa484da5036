//! Configuration module for routewise
//!
//! Provides layered configuration loading from files, environment variables, and defaults.
//!
//! # Configuration Precedence
//!
//! 1. Environment variables (`ROUTEWISE_*`)
//! 2. Configuration file (TOML)
//! 3. Default values (lowest priority)
//!
//! # Example
//!
//! ```rust
//! use routewise::config::RoutewiseConfig;
//!
//! let config = RoutewiseConfig::default();
//! assert_eq!(config.cache.similarity_threshold, 0.85);
//!
//! let toml = r#"
//! [cache]
//! max_size = 500
//! "#;
//! let config: RoutewiseConfig = toml::from_str(toml).unwrap();
//! assert_eq!(config.cache.max_size, 500);
//! assert_eq!(config.cache.ttl_seconds, 3600);
//! ```

pub mod backend;
pub mod cache;
pub mod error;
pub mod learning;
pub mod logging;
pub mod pipeline;
pub mod routing;

pub use backend::BackendConfig;
pub use cache::{CacheConfig, EmbeddingKind};
pub use error::ConfigError;
pub use learning::LearningConfig;
pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use pipeline::PipelineConfig;
pub use routing::RoutingConfig;

use crate::catalog::ModelCatalog;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Unified configuration for the router, cache and pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RoutewiseConfig {
    /// Backend catalog; the built-in catalog is used when empty
    pub backends: Vec<BackendConfig>,
    pub routing: RoutingConfig,
    pub learning: LearningConfig,
    pub cache: CacheConfig,
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
}

impl RoutewiseConfig {
    /// Load configuration from a TOML file
    ///
    /// If path is None, returns default configuration.
    /// If path doesn't exist, returns NotFound error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => {
                if !p.exists() {
                    return Err(ConfigError::NotFound(p.to_path_buf()));
                }
                let content = std::fs::read_to_string(p)?;
                toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
            }
            None => Ok(Self::default()),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Invalid values are ignored and the current value is kept.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(level) = std::env::var("ROUTEWISE_LOG_LEVEL") {
            if let Ok(l) = level.parse() {
                self.logging.level = l;
            }
        }
        if let Ok(format) = std::env::var("ROUTEWISE_LOG_FORMAT") {
            if let Ok(f) = format.parse() {
                self.logging.format = f;
            }
        }

        if let Ok(model) = std::env::var("ROUTEWISE_DEFAULT_MODEL") {
            self.routing.default_model = model;
        }

        if let Ok(threshold) = std::env::var("ROUTEWISE_SIMILARITY_THRESHOLD") {
            if let Ok(t) = threshold.parse() {
                self.cache.similarity_threshold = t;
            }
        }
        if let Ok(size) = std::env::var("ROUTEWISE_MAX_CACHE_SIZE") {
            if let Ok(s) = size.parse() {
                self.cache.max_size = s;
            }
        }
        if let Ok(ttl) = std::env::var("ROUTEWISE_CACHE_TTL") {
            if let Ok(t) = ttl.parse() {
                self.cache.ttl_seconds = t;
            }
        }
        if let Ok(enabled) = std::env::var("ROUTEWISE_CACHE") {
            self.cache.enabled = enabled.to_lowercase() == "true";
        }

        if let Ok(samples) = std::env::var("ROUTEWISE_MIN_TRAINING_SAMPLES") {
            if let Ok(s) = samples.parse() {
                self.learning.min_training_samples = s;
            }
        }

        self
    }

    /// Build the backend catalog described by this configuration
    pub fn catalog(&self) -> Result<ModelCatalog, ConfigError> {
        if self.backends.is_empty() {
            Ok(ModelCatalog::default())
        } else {
            ModelCatalog::from_configs(&self.backends)
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let catalog = self.catalog()?;
        self.routing.validate_against(&catalog)?;

        let threshold = self.cache.similarity_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(ConfigError::validation(
                "cache.similarity_threshold",
                format!("must be in (0, 1], got {}", threshold),
            ));
        }
        if self.cache.max_size == 0 {
            return Err(ConfigError::validation(
                "cache.max_size",
                "must be at least 1",
            ));
        }
        if self.cache.ttl_seconds == 0 {
            return Err(ConfigError::validation(
                "cache.ttl_seconds",
                "must be non-zero",
            ));
        }
        if self.cache.embedding == EmbeddingKind::Hashing && self.cache.embedding_dimensions == 0 {
            return Err(ConfigError::validation(
                "cache.embedding_dimensions",
                "must be non-zero for the hashing embedder",
            ));
        }

        if self.learning.min_training_samples < 2 {
            return Err(ConfigError::validation(
                "learning.min_training_samples",
                "at least 2 samples are needed for a train/test split",
            ));
        }
        if self.learning.max_training_rows < self.learning.min_training_samples {
            return Err(ConfigError::validation(
                "learning.max_training_rows",
                "must be at least min_training_samples",
            ));
        }

        if !(0.0..=2.0).contains(&self.pipeline.temperature) {
            return Err(ConfigError::validation(
                "pipeline.temperature",
                "must be between 0 and 2",
            ));
        }
        if self.pipeline.max_tokens == 0 {
            return Err(ConfigError::validation(
                "pipeline.max_tokens",
                "must be non-zero",
            ));
        }

        self.logging.validate()
    }
}
