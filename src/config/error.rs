//! Configuration error types

use std::path::PathBuf;
use thiserror::Error;

/// Configuration-related errors
///
/// These are the only errors the core surfaces to the process that constructs
/// it. Everything after construction degrades instead of failing.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid value for '{field}': {message}")]
    Validation { field: String, message: String },

    #[error("Unknown backend '{backend}' referenced by '{field}'")]
    UnknownBackend { field: String, backend: String },

    #[error("Failed to open store at {path}: {message}")]
    Store { path: String, message: String },
}

impl ConfigError {
    pub(crate) fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        ConfigError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }
}
