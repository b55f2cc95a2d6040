//! Error types for the scoring core

use thiserror::Error;

/// Errors that can occur while building sessions, encoding features,
/// or loading and evaluating model artifacts
#[derive(Error, Debug)]
pub enum CoreError {
    /// A view/buy event lacks a property the session join depends on
    #[error("Event {event_id} is missing required property `{field}`")]
    MissingField { event_id: String, field: String },

    /// Categorical map invariant violated (the default code is absent)
    #[error("Encoding invariant violated: {0}")]
    Encoding(String),

    /// Caller supplied input that cannot be processed
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Persisted artifact does not match its recorded hash
    #[error("Model integrity mismatch: expected {expected}, computed {actual}")]
    IntegrityMismatch { expected: String, actual: String },

    /// Result combination failed
    #[error("Combine failed: {0}")]
    Combine(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Canonical JSON error
    #[error("Canonical serialization error: {0}")]
    Canonical(#[from] crate::serde_canon::CanonicalError),
}

/// Result type for scoring core operations
pub type Result<T> = std::result::Result<T, CoreError>;
