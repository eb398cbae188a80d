//! Error taxonomy for the statistics engine.

use thiserror::Error;

/// Top-level error type for all stat-core operations.
#[derive(Debug, Error)]
pub enum StatError {
    #[error("missing required header field: {0}")]
    MissingField(String),

    #[error("failed to parse header field {0}")]
    ParseError(String),

    #[error("validation failed: {0:?}")]
    ValidationError(Vec<String>),

    #[error("invalid transition: {command} while in {from}")]
    InvalidTransition { from: String, command: String },

    #[error("segment shape error: {0}")]
    ShapeError(String),

    #[error("timeout waiting for {0}")]
    Timeout(String),

    #[error("I/O error at {path}: {cause}")]
    IoError { path: String, cause: String },

    #[error("unrecognised telescope value: {0}")]
    BadTelescope(String),

    #[error("operation interrupted")]
    Interrupted,
}

pub type Result<T> = std::result::Result<T, StatError>;
