//! Error types for keeper-core

use thiserror::Error;

use crate::models::RecordId;

/// Result type alias using keeper-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in keeper-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Record (or other entity) not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Missing or rejected caller identity
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Malformed kind, title or payload
    #[error("Validation error: {0}")]
    Validation(String),

    /// libSQL error
    #[error("Storage error: {0}")]
    Storage(#[from] libsql::Error),

    /// Schema or row decoding error
    #[error("Database error: {0}")]
    Database(String),

    /// Cipher failure
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// Sync transport failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Sync round exceeded its deadline
    #[error("Sync timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Merge aborted after some changes were already committed
    #[error("Merge aborted after applying {} change(s): {source}", applied.len())]
    PartialMerge {
        applied: Vec<RecordId>,
        #[source]
        source: Box<Error>,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    /// The error behind a partial merge, or `self` otherwise.
    pub fn root(&self) -> &Self {
        match self {
            Self::PartialMerge { source, .. } => source.root(),
            other => other,
        }
    }
}
