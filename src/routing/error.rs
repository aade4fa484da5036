//! Error types for training and prediction

use crate::outcomes::StoreError;
use thiserror::Error;

/// Errors from training the learned router
#[derive(Debug, Error)]
pub enum TrainingError {
    /// Fewer usable outcomes than the configured minimum
    #[error("Not enough training data: {available} < {required}")]
    InsufficientData { available: usize, required: usize },

    /// Reading training rows failed
    #[error("Failed to load training data: {0}")]
    Store(#[from] StoreError),

    /// Reading or writing persisted weights failed
    #[error("Model persistence failed: {0}")]
    Persistence(String),
}

/// Errors from applying a trained model; always recovered by rule-based routing
#[derive(Debug, Error)]
pub enum PredictionError {
    #[error("Feature dimension mismatch: model expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Predicted backend '{0}' is not in the catalog")]
    UnknownLabel(String),

    #[error("Model produced no usable prediction")]
    Degenerate,
}
