//! Shared error taxonomy for backend failures surfaced by the shell.
//!
//! Components show failures inline; this module gives every one of them the
//! same category and log line.

use crate::backend::BackendError;
use crate::logging;

/// Broad category for typed error handling and log triage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Network,
    Conflict,
    Rejected,
    Parse,
    InvalidInput,
}

/// Severity hint for UI and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
}

/// Unified envelope used when a failure crosses into the UI.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ErrorEnvelope {
    pub category: ErrorCategory,
    pub severity: ErrorSeverity,
    pub recoverable: bool,
    pub code: String,
    pub message: String,
}

impl ErrorEnvelope {
    #[must_use]
    pub fn new(
        category: ErrorCategory,
        severity: ErrorSeverity,
        recoverable: bool,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            severity,
            recoverable,
            code: code.into(),
            message: message.into(),
        }
    }

    /// Envelope for an input the shell refused before contacting the backend.
    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(
            ErrorCategory::InvalidInput,
            ErrorSeverity::Info,
            true,
            "local_validation",
            message,
        )
    }
}

impl From<&BackendError> for ErrorEnvelope {
    fn from(value: &BackendError) -> Self {
        let message = value.to_string();
        match value {
            BackendError::Unreachable(_) => Self::new(
                ErrorCategory::Network,
                ErrorSeverity::Error,
                true,
                "runtime_unreachable",
                message,
            ),
            BackendError::Rejected { status, .. } if value.is_conflict() => Self::new(
                ErrorCategory::Conflict,
                ErrorSeverity::Info,
                true,
                format!("runtime_conflict_{}", status.unwrap_or(409)),
                message,
            ),
            BackendError::Rejected { status, .. } => Self::new(
                ErrorCategory::Rejected,
                ErrorSeverity::Warning,
                true,
                status.map_or_else(
                    || "runtime_rejected".to_string(),
                    |status| format!("runtime_rejected_{status}"),
                ),
                message,
            ),
            BackendError::Decode(_) => Self::new(
                ErrorCategory::Parse,
                ErrorSeverity::Error,
                false,
                "runtime_decode_error",
                message,
            ),
        }
    }
}

/// Log a failed backend command and return the text to show the user.
pub fn report(operation: &str, err: &BackendError) -> String {
    let envelope = ErrorEnvelope::from(err);
    let line = format!(
        "{operation} failed [{}]: {}",
        envelope.code, envelope.message
    );
    match envelope.severity {
        ErrorSeverity::Info => logging::info(line),
        ErrorSeverity::Warning | ErrorSeverity::Error => logging::warn(line),
    }
    envelope.message
}
