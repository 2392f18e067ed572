//! Error types for template building, signing and verification.

use pl_redact::RedactionError;
use thiserror::Error;

/// Errors that can occur while building, writing or reading templates.
#[derive(Error, Debug)]
pub enum AuditError {
    /// A required component was not supplied before start.
    #[error("not configured: {0}")]
    NotConfigured(String),

    /// A component was used before start or after close.
    #[error("{component} has not been started")]
    NotStarted { component: String },

    /// Signing key or signature operation failed.
    #[error("signing error: {0}")]
    Signing(String),

    /// A sanitizer failed while extracting template entries.
    #[error(transparent)]
    Sanitizer(#[from] RedactionError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Signature verification failed
    #[error("invalid signature on template {template_id}")]
    InvalidSignature { template_id: u64 },

    /// Malformed template line in a template stream
    #[error("malformed template on line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    /// Digest chain could not be resumed
    #[error("digest chain error: {0}")]
    Digest(String),

    /// Invalid conversion pattern
    #[error("invalid pattern: {0}")]
    Pattern(String),
}

impl AuditError {
    pub fn not_started(component: impl Into<String>) -> Self {
        AuditError::NotStarted {
            component: component.into(),
        }
    }
}

/// Result type alias for audit operations.
pub type Result<T> = std::result::Result<T, AuditError>;
