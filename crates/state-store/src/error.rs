use thiserror::Error;

/// Errors that can occur when interacting with the state store.
#[derive(Debug, Error)]
pub enum StateStoreError {
    /// The key was required to exist but does not.
    #[error("Key not found: {key}")]
    NotFound { key: String },

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The backing store failed to service the request.
    #[error("Store backend error: {0}")]
    Backend(String),
}

/// Result type for state store operations.
pub type Result<T> = std::result::Result<T, StateStoreError>;
