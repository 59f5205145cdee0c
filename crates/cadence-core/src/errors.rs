//! Errors reported by the external ports.
//!
//! The runtime maps these onto its own taxonomy; implementations of the
//! policy and transport ports only need to produce one of these.

use thiserror::Error;

/// Failure of a single policy call or policy load.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PolicyError {
    /// The model could not be loaded.
    #[error("policy load failed: {0}")]
    Load(String),
    /// Inputs were rejected by the policy (wrong cameras, bad joint vector).
    #[error("invalid policy input: {0}")]
    InvalidInput(String),
    /// The forward pass failed.
    #[error("inference failed: {0}")]
    Inference(String),
}

/// Failure of a transport operation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The transport server could not be reached.
    #[error("transport unreachable: {0}")]
    Unreachable(String),
    /// The referenced workspace or room does not exist.
    #[error("unknown room: {0}")]
    UnknownRoom(String),
    /// A message could not be delivered.
    #[error("send failed: {0}")]
    Send(String),
}
