//! Error types for continuations.

use crate::token::ContinuationId;
use gqlc_runtime::FieldError;
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced while issuing, storing or resolving continuations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ContinuationError {
    #[error("Missing continuation {0}")]
    NotFound(ContinuationId),

    #[error("Not authorized to access continuation {0}")]
    Unauthorized(ContinuationId),

    #[error("Continuation backend error: {0}")]
    Backend(String),

    #[error("Continuation serialization error: {0}")]
    Serialization(String),

    #[error("Continuation field \"{0}\" must select a subtree")]
    MissingSelectionSet(String),

    #[error("waitMs must be a non-negative integer, got {0}")]
    InvalidWaitMs(String),

    #[error("Unknown fragment \"{0}\"")]
    UnknownFragment(String),
}

impl ContinuationError {
    /// The `extensions.code` reported with this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "CONTINUATION_NOT_FOUND",
            Self::Unauthorized(_) => "CONTINUATION_UNAUTHORIZED",
            Self::Backend(_) => "CONTINUATION_BACKEND_ERROR",
            Self::Serialization(_) => "CONTINUATION_SERIALIZATION_ERROR",
            Self::MissingSelectionSet(_) | Self::InvalidWaitMs(_) | Self::UnknownFragment(_) => {
                "CONTINUATION_INVALID_ARGUMENT"
            }
        }
    }

    /// Converts to a field error carrying the error code.
    pub fn to_field_error(&self) -> FieldError {
        FieldError::new(self.to_string()).with_code(self.code())
    }
}

impl From<ContinuationError> for FieldError {
    fn from(error: ContinuationError) -> Self {
        error.to_field_error()
    }
}

impl From<ContinuationError> for gqlc_runtime::ResolverError {
    fn from(error: ContinuationError) -> Self {
        Self::Upstream(error.to_field_error())
    }
}

impl From<BackendError> for ContinuationError {
    fn from(error: BackendError) -> Self {
        Self::Backend(error.to_string())
    }
}

impl From<serde_json::Error> for ContinuationError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

/// Failures reported by a key/value store or pub/sub backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("subscription to {0} closed")]
    SubscriptionClosed(String),

    #[error("{0}")]
    Other(String),
}

/// Invalid continuation configuration, detected while augmenting a schema.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("waitMs for {scope} must be a non-negative integer, got {value}")]
    InvalidWaitMs { scope: String, value: i64 },

    #[error("schema has no query type")]
    MissingQueryType,

    #[error("type \"{type_name}\" cannot be wrapped: {reason}")]
    MissingIdentityField { type_name: String, reason: String },

    #[error("unknown type \"{0}\" in continuation config")]
    UnknownType(String),

    #[error("type \"{0}\" already exists in the schema")]
    TypeConflict(String),

    #[error("field \"{type_name}.{field}\" already exists in the schema")]
    FieldConflict { type_name: String, field: String },
}

/// Callback for errors that cannot be reported to a caller.
pub type ErrorCallback = Arc<dyn Fn(&ContinuationError) + Send + Sync>;

/// The default callback: log at error level.
pub fn log_error() -> ErrorCallback {
    Arc::new(|error: &ContinuationError| {
        tracing::error!(error = %error, code = error.code(), "unhandled continuation error");
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_names_the_identifier() {
        let error = ContinuationError::NotFound(ContinuationId::from("abc"));
        let field_error = error.to_field_error();
        assert_eq!(field_error.message, "Missing continuation abc");
        assert_eq!(field_error.code(), Some("CONTINUATION_NOT_FOUND"));
    }

    #[test]
    fn test_resolver_error_keeps_code() {
        let error: gqlc_runtime::ResolverError =
            ContinuationError::Unauthorized(ContinuationId::from("abc")).into();
        let field_error = FieldError::from(error);
        assert_eq!(field_error.code(), Some("CONTINUATION_UNAUTHORIZED"));
    }

    #[test]
    fn test_backend_errors_convert() {
        let error = ContinuationError::from(BackendError::Connection("refused".into()));
        assert_eq!(error, ContinuationError::Backend("connection error: refused".into()));
        assert_eq!(error.code(), "CONTINUATION_BACKEND_ERROR");
    }
}
