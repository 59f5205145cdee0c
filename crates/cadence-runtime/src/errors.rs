//! Runtime error types.

use cadence_core::{PolicyError, TransportError};
use thiserror::Error;

use crate::session::types::SessionState;

/// Errors returned by session and registry operations.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RuntimeError {
    /// Malformed create configuration; the session was never registered.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The policy could not be loaded for a new session.
    #[error("Policy load failed: {0}")]
    PolicyLoad(String),

    /// Transport failure while creating rooms or subscribing.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A policy call failed.
    #[error("Inference error: {0}")]
    Inference(String),

    /// A command could not be published.
    #[error("Transport send error: {0}")]
    TransportSend(String),

    /// An external call exceeded its core-enforced bound.
    #[error("Timed out after {timeout_ms}ms: {operation}")]
    Timeout {
        /// What was being attempted.
        operation: String,
        /// Bound that was exceeded.
        timeout_ms: u64,
    },

    /// The operation is not valid in the session's current state.
    #[error("Session {session_id} cannot {operation} while {state}")]
    InvalidState {
        /// Session that rejected the operation.
        session_id: String,
        /// Operation name.
        operation: &'static str,
        /// State at the time of the call.
        state: SessionState,
    },

    /// No session with this id.
    #[error("Session not found: {0}")]
    NotFound(String),

    /// A session with this id already exists.
    #[error("Session already exists: {0}")]
    AlreadyExists(String),

    /// The registry is at its session limit.
    #[error("Registry full: {max} sessions")]
    RegistryFull {
        /// Configured limit.
        max: usize,
    },

    /// Internal / unexpected error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RuntimeError {
    /// Stable category label for logs and metrics.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::PolicyLoad(_) => "policy_load",
            Self::Connection(_) => "connection",
            Self::Inference(_) => "inference",
            Self::TransportSend(_) => "transport_send",
            Self::Timeout { .. } => "timeout",
            Self::InvalidState { .. } => "invalid_state",
            Self::NotFound(_) => "not_found",
            Self::AlreadyExists(_) => "already_exists",
            Self::RegistryFull { .. } => "registry_full",
            Self::Internal(_) => "internal",
        }
    }

    /// Map a transport failure during session setup.
    pub(crate) fn connection(err: &TransportError) -> Self {
        Self::Connection(err.to_string())
    }

    /// Build a timeout error for `operation`.
    pub(crate) fn timeout(operation: impl Into<String>, bound: std::time::Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms: u64::try_from(bound.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

impl From<PolicyError> for RuntimeError {
    fn from(err: PolicyError) -> Self {
        match err {
            PolicyError::Load(msg) => Self::PolicyLoad(msg),
            other => Self::Inference(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn runtime_error_display() {
        let err = RuntimeError::NotFound("s1".into());
        assert_eq!(err.to_string(), "Session not found: s1");

        let err = RuntimeError::InvalidState {
            session_id: "s1".into(),
            operation: "start",
            state: SessionState::Stopping,
        };
        assert_eq!(err.to_string(), "Session s1 cannot start while stopping");
    }

    #[test]
    fn runtime_error_category() {
        assert_eq!(RuntimeError::Validation("x".into()).category(), "validation");
        assert_eq!(RuntimeError::Connection("x".into()).category(), "connection");
        assert_eq!(RuntimeError::AlreadyExists("s".into()).category(), "already_exists");
        assert_eq!(RuntimeError::RegistryFull { max: 1 }.category(), "registry_full");
        assert_eq!(
            RuntimeError::timeout("predict", Duration::from_secs(5)).category(),
            "timeout"
        );
    }

    #[test]
    fn timeout_reports_millis() {
        let err = RuntimeError::timeout("create room", Duration::from_millis(3_000));
        assert_eq!(err.to_string(), "Timed out after 3000ms: create room");
    }

    #[test]
    fn policy_error_mapping() {
        assert_eq!(
            RuntimeError::from(PolicyError::Load("missing weights".into())),
            RuntimeError::PolicyLoad("missing weights".into())
        );
        assert_eq!(
            RuntimeError::from(PolicyError::Inference("nan".into())).category(),
            "inference"
        );
    }

    #[test]
    fn transport_error_maps_to_connection() {
        let err = RuntimeError::connection(&TransportError::Unreachable("refused".into()));
        assert_eq!(err.category(), "connection");
        assert!(err.to_string().contains("refused"));
    }
}
