use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] keeper_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Not logged in. Run `keeper login` first.")]
    NotLoggedIn,
    #[error("Session expired. Run `keeper login` again.")]
    SessionExpired,
    #[error("Secure storage error: {0}")]
    SecureStorage(String),
    #[error("ENCRYPTION_KEY is not set; it is required to sync or read remote records")]
    MissingEncryptionKey,
    #[error("Record ID cannot be empty")]
    EmptyRecordId,
    #[error("Record not found for id/prefix: {0}")]
    RecordNotFound(String),
    #[error("{0}")]
    AmbiguousRecordId(String),
    #[error("Invalid field: {0}")]
    InvalidField(String),
    #[error("Nothing to change: pass --title, --metadata or new fields")]
    EmptyEdit,
}
