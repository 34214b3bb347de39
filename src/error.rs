//! Error types for the Syncro SDK

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Result type for SDK operations
pub type Result<T> = std::result::Result<T, SdkError>;

/// SDK error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SdkError {
    /// Input rejected locally, before any network call
    #[error("{0}")]
    Validation(String),

    /// Server answered with a non-2xx status
    #[error("{message}")]
    Http { status: u16, message: String },

    /// Network, DNS or body decoding failure
    #[error("{0}")]
    Transport(String),

    /// Operation exceeded its deadline
    #[error("Operation timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// JSON-RPC error object returned by the event source
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// Response could not be interpreted
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Subscription with the same name already tracked
    #[error("{0} already exists in your subscriptions")]
    DuplicateName(String),

    /// Plan cap reached
    #[error("Plan limit of {0} subscriptions reached")]
    PlanLimit(usize),

    /// Id not present in the local collection
    #[error("Subscription not found: {0}")]
    NotFound(String),

    /// A bulk operation is already running
    #[error("A bulk operation is already in progress")]
    BulkBusy,

    /// Bulk operation requested with nothing selected
    #[error("No subscriptions selected")]
    EmptySelection,

    /// Failure already normalized into a result envelope
    #[error("{message}")]
    Reported { kind: FailureKind, message: String },
}

/// Failure class reported to callers so each can be messaged distinctly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Validation,
    Http,
    Transport,
    Timeout,
}

impl SdkError {
    /// Classify this error for result envelopes
    pub fn kind(&self) -> FailureKind {
        match self {
            SdkError::Validation(_)
            | SdkError::DuplicateName(_)
            | SdkError::PlanLimit(_)
            | SdkError::NotFound(_)
            | SdkError::BulkBusy
            | SdkError::EmptySelection => FailureKind::Validation,
            SdkError::Http { .. } => FailureKind::Http,
            SdkError::Reported { kind, .. } => *kind,
            SdkError::Timeout(_) => FailureKind::Timeout,
            SdkError::Transport(_) | SdkError::Rpc { .. } | SdkError::InvalidResponse(_) => {
                FailureKind::Transport
            }
        }
    }

    /// Whether retrying the same request later might succeed
    pub fn is_transient(&self) -> bool {
        match self {
            SdkError::Transport(_) | SdkError::Timeout(_) => true,
            SdkError::Reported { kind, .. } => {
                matches!(kind, FailureKind::Transport | FailureKind::Timeout)
            }
            SdkError::Http { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for SdkError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            // No deadline on the error; the client maps its own timeouts first
            SdkError::Timeout(Duration::ZERO)
        } else {
            SdkError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SdkError {
    fn from(err: serde_json::Error) -> Self {
        SdkError::InvalidResponse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_error_displays_server_message() {
        let err = SdkError::Http {
            status: 500,
            message: "db down".into(),
        };
        assert_eq!(err.to_string(), "db down");
        assert_eq!(err.kind(), FailureKind::Http);
        assert!(err.is_transient());
    }

    #[test]
    fn test_conflict_is_not_transient() {
        let err = SdkError::Http {
            status: 409,
            message: "version mismatch".into(),
        };
        assert!(!err.is_transient());
    }

    #[test]
    fn test_timeout_message() {
        let err = SdkError::Timeout(Duration::from_secs(30));
        assert_eq!(err.to_string(), "Operation timed out after 30s");
        assert_eq!(err.kind(), FailureKind::Timeout);
    }
}
