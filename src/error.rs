//! Error types for subscription set operations.

use thiserror::Error;

/// Main error type for subscription set operations.
#[derive(Debug, Error)]
pub enum SubscriptionError {
    /// Operation attempted outside its required phase.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Subscription with name already exists: {0}")]
    DuplicateName(String),

    #[error("Index out of range: {index} (len is {len})")]
    IndexOutOfRange { index: usize, len: usize },

    /// The server rejected a committed version.
    #[error("Subscription set rejected by server: {0}")]
    Subscription(String),

    #[error("Wait for synchronization was cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Invalid snapshot format: {0}")]
    InvalidFormat(String),

    #[error("Checksum mismatch: expected {expected}, got {got}")]
    ChecksumMismatch { expected: u32, got: u32 },

    #[error("Subscription store is locked by another owner")]
    Locked,
}

impl SubscriptionError {
    pub(crate) fn invalid_state(msg: impl Into<String>) -> Self {
        SubscriptionError::InvalidState(msg.into())
    }
}

impl From<serde_json::Error> for SubscriptionError {
    fn from(e: serde_json::Error) -> Self {
        SubscriptionError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::encode::Error> for SubscriptionError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        SubscriptionError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for SubscriptionError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        SubscriptionError::Deserialization(e.to_string())
    }
}

/// Result type for subscription set operations.
pub type Result<T> = std::result::Result<T, SubscriptionError>;
