//! Normalized error types for the remote accessor layer.
//!
//! Transport-agnostic errors that hide gRPC/tonic details and provide
//! actionable categories for the coordination engine.

use std::fmt;

/// Normalized error for remote accessor operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabApiError {
    /// Entity not found by id.
    NotFound { entity: &'static str, id: i64 },

    /// Request validation failed before reaching the server (missing
    /// required fields, bad arguments).
    InvalidArgument { message: String },

    /// The server rejected the input; the message is surfaced verbatim.
    Remote { message: String },

    /// The backend is unreachable, or the call timed out.
    TransportUnavailable { message: String },

    /// An RPC call returned an internal/unexpected error.
    Internal { message: String },
}

impl fmt::Display for LabApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { entity, id } => write!(f, "{entity} {id} not found"),
            Self::InvalidArgument { message } => write!(f, "invalid argument: {message}"),
            Self::Remote { message } => write!(f, "{message}"),
            Self::TransportUnavailable { message } => {
                write!(f, "lab backend unavailable: {message}")
            }
            Self::Internal { message } => write!(f, "internal error: {message}"),
        }
    }
}

impl std::error::Error for LabApiError {}

impl LabApiError {
    /// Whether this error is retryable (transport failures only — server
    /// rejections will not change on resubmission).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransportUnavailable { .. })
    }
}
