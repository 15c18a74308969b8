// Engine error taxonomy
// Stage-level failures are fail-fast; only invocation errors flagged
// retryable are eligible for the retry schedule.

use thiserror::Error;

/// Errors that fail a single stage
#[derive(Debug, Clone, Error)]
pub enum StageError {
    /// A template reference could not be resolved and no default applies.
    /// Configuration-shaped, so never retried.
    #[error("unresolved template reference '{{{token}}}'")]
    Template { token: String },

    /// The model invocation failed. `retryable` decides whether the
    /// retry schedule applies.
    #[error("model invocation failed: {message}")]
    Invocation { message: String, retryable: bool },

    /// The model responded but its output could not be parsed in the
    /// declared format. Deterministic for a given response, never retried.
    #[error("failed to parse model output: {message}")]
    Parse { message: String },

    /// A required extraction field was absent and declared no default.
    #[error("missing required field '{name}' at path '{path}'")]
    MissingField { name: String, path: String },
}

impl StageError {
    /// Whether the retry schedule applies to this error
    pub fn is_retryable(&self) -> bool {
        matches!(self, StageError::Invocation { retryable: true, .. })
    }

    /// Shorthand for a retryable invocation failure
    pub fn retryable(message: impl Into<String>) -> Self {
        StageError::Invocation {
            message: message.into(),
            retryable: true,
        }
    }

    /// Shorthand for a non-retryable invocation failure
    pub fn fatal(message: impl Into<String>) -> Self {
        StageError::Invocation {
            message: message.into(),
            retryable: false,
        }
    }
}

/// Errors that abort a run before any stage starts
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// The pipeline definition failed validation. No StageResults are
    /// produced for this run.
    #[error("invalid pipeline configuration: {0}")]
    Configuration(String),
}
