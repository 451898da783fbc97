//! Orchestrator error types.

use domain::DomainError;
use state_store::StateStoreError;
use thiserror::Error;

use crate::bus::BusError;

/// Errors that can occur during phase orchestration.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The message payload is inconsistent with the aggregate's state or
    /// shape; rejected before any state mutation.
    #[error("Malformed message: {reason}")]
    MalformedMessage { reason: String },

    /// Domain error.
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// State store error.
    #[error("State store error: {0}")]
    StateStore(#[from] StateStoreError),

    /// Message bus error.
    #[error("Message bus error: {0}")]
    Bus(#[from] BusError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for orchestration operations.
pub type Result<T> = std::result::Result<T, OrchestratorError>;
