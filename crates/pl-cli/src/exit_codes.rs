//! Exit codes for `privlog`.
//!
//! Ranges:
//! - 0-9: outcomes
//! - 10-19: user or environment errors
//! - 20-29: internal errors

/// Process exit codes. Stable for scripting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Success.
    Clean = 0,

    /// A template failed signature verification.
    VerifyFailed = 1,

    /// Some encrypted values could not be disclosed.
    PartialDisclosure = 2,

    /// Invalid arguments.
    ArgsError = 10,

    /// Key material could not be decoded or did not match.
    KeyError = 11,

    /// Malformed input file.
    FormatError = 12,

    /// Internal error.
    InternalError = 20,

    /// I/O error.
    IoError = 21,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn is_error(self) -> bool {
        (self as i32) >= 10
    }

    /// Stable name for JSON output.
    pub fn code_name(&self) -> &'static str {
        match self {
            ExitCode::Clean => "OK",
            ExitCode::VerifyFailed => "ERR_VERIFY",
            ExitCode::PartialDisclosure => "ERR_PARTIAL_DISCLOSURE",
            ExitCode::ArgsError => "ERR_ARGS",
            ExitCode::KeyError => "ERR_KEY",
            ExitCode::FormatError => "ERR_FORMAT",
            ExitCode::InternalError => "ERR_INTERNAL",
            ExitCode::IoError => "ERR_IO",
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.code_name(), self.as_i32())
    }
}

impl From<&pl_audit::AuditError> for ExitCode {
    fn from(err: &pl_audit::AuditError) -> Self {
        use pl_audit::AuditError;
        match err {
            AuditError::InvalidSignature { .. } => ExitCode::VerifyFailed,
            AuditError::Signing(_) => ExitCode::KeyError,
            AuditError::Parse { .. } | AuditError::Json(_) | AuditError::Pattern(_) => {
                ExitCode::FormatError
            }
            AuditError::Io(_) => ExitCode::IoError,
            AuditError::Sanitizer(e) => ExitCode::from(e),
            AuditError::NotConfigured(_) => ExitCode::ArgsError,
            AuditError::NotStarted { .. } | AuditError::Digest(_) => ExitCode::InternalError,
        }
    }
}

impl From<&pl_redact::RedactionError> for ExitCode {
    fn from(err: &pl_redact::RedactionError) -> Self {
        use pl_redact::RedactionError;
        match err {
            RedactionError::Key(_) | RedactionError::Crypto { .. } => ExitCode::KeyError,
            RedactionError::Config(_) => ExitCode::ArgsError,
            RedactionError::Io(_) => ExitCode::IoError,
            RedactionError::Json(_) => ExitCode::FormatError,
            RedactionError::NotStarted { .. } => ExitCode::InternalError,
        }
    }
}
