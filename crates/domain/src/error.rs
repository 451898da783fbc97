//! Domain error types.

use state_store::StateStoreError;
use thiserror::Error;

use crate::bulk::BulkTransactionPhase;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An error occurred in the state store.
    #[error("State store error: {0}")]
    StateStore(#[from] StateStoreError),

    /// Aggregate not found.
    #[error("Aggregate not found: {entity_type} with id {id}")]
    NotFound { entity_type: &'static str, id: String },

    /// An aggregate already exists for the id being created.
    #[error("Duplicate aggregate: {entity_type} with id {id}")]
    Duplicate { entity_type: &'static str, id: String },

    /// The requested phase transition is not in the bulk state graph.
    #[error("Invalid phase transition: cannot {action} from {phase} phase")]
    InvalidPhaseTransition {
        phase: BulkTransactionPhase,
        action: &'static str,
    },

    /// No entity is hydrated on the aggregate for the requested operation.
    #[error("No entity loaded on aggregate for operation: {action}")]
    NoEntity { action: &'static str },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for domain operations.
pub type Result<T> = std::result::Result<T, DomainError>;
