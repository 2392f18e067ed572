//! Error types for placeholder parsing and parameter sanitization.

use thiserror::Error;

/// Result type for sanitization operations.
pub type Result<T> = std::result::Result<T, RedactionError>;

/// Errors that can occur while configuring factories or sanitizing parameters.
#[derive(Error, Debug)]
pub enum RedactionError {
    /// Invalid or inconsistent configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Failed to load, generate or decode key material.
    #[error("key error: {0}")]
    Key(String),

    /// A cryptographic operation failed while sanitizing a tagged parameter.
    ///
    /// The message never contains the parameter value.
    #[error("failed to sanitize {{{tag}}}: {message}")]
    Crypto { tag: String, message: String },

    /// A component was used before it was started (or after it was stopped).
    #[error("{component} has not been started")]
    NotStarted { component: String },

    /// I/O error during key, escrow or configuration file operations.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RedactionError {
    /// Wrap a cryptographic failure for `tag`.
    pub fn crypto(tag: &str, message: impl std::fmt::Display) -> Self {
        RedactionError::Crypto {
            tag: tag.to_string(),
            message: message.to_string(),
        }
    }

    /// Lifecycle-order error naming the offending component.
    pub fn not_started(component: impl Into<String>) -> Self {
        RedactionError::NotStarted {
            component: component.into(),
        }
    }
}
