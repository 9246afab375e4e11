//! Error types for the portfolio backend.

use thiserror::Error;

use crate::generation::FailureKind;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the portfolio Lambda functions.
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// AWS SDK error
    #[error("AWS error: {0}")]
    Aws(String),

    /// Configuration error, fatal at start-up
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Not found error
    #[error("Not found: {0}")]
    NotFound(String),

    /// Text-generation service failed after retries, or permanently
    #[error("Upstream {kind} failure: {detail}")]
    Upstream { kind: FailureKind, detail: String },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Get HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Validation(_) => 400,
            Error::NotFound(_) => 404,
            _ => 500,
        }
    }

    /// Message that is safe to return to a caller.
    ///
    /// Database and upstream details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            Error::Validation(msg) => msg.clone(),
            Error::NotFound(what) => format!("{} not found", what),
            Error::Upstream { .. } => {
                "The assistant is unavailable right now. Please try again later.".to_string()
            }
            _ => "Internal server error".to_string(),
        }
    }
}
