//! Error types for pipeline collaborators.

use thiserror::Error;

/// Errors an [`Executor`](super::Executor) can report.
#[derive(Error, Debug)]
pub enum ExecutorError {
    /// No executor is installed.
    #[error("No executor available")]
    Unavailable,

    /// Every backend in the fallback chain failed.
    #[error("Backend '{backend}' failed: {message}")]
    Backend { backend: String, message: String },

    /// The caller's deadline passed before the call completed.
    #[error("Deadline exceeded after {0}ms")]
    DeadlineExceeded(u64),

    /// The caller's cancellation token fired.
    #[error("Request cancelled")]
    Cancelled,

    /// Backend response could not be interpreted.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Failure inside an optional collaborator (validator, tracer, tracker,
/// classifier). The pipeline logs these and carries on.
#[derive(Error, Debug)]
pub enum CollaboratorError {
    #[error("{component} unavailable: {message}")]
    Unavailable {
        component: &'static str,
        message: String,
    },

    #[error("{component} failed: {message}")]
    Failed {
        component: &'static str,
        message: String,
    },
}

impl CollaboratorError {
    pub fn failed(component: &'static str, message: impl Into<String>) -> Self {
        Self::Failed {
            component,
            message: message.into(),
        }
    }
}
