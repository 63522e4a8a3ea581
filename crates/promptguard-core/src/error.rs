//! Error types for the orchestration core.

use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum PromptGuardError {
    /// Authentication tag did not verify: wrong key, truncation, or tampering.
    /// Fatal for the operation; no partial plaintext is ever returned.
    #[error("Decryption failed: ciphertext could not be authenticated")]
    DecryptionFailure,

    #[error("Invalid master key: {0}")]
    InvalidMasterKey(String),

    #[error("No active prompt for session type: {0}")]
    PromptNotFound(String),

    #[error("Session not found: {0}")]
    SessionNotFound(Uuid),

    #[error("Session does not belong to the requesting user")]
    UnauthorizedAccess,

    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Validation failed: {0:?}")]
    Validation(Vec<String>),

    #[error("Record not found: {0}")]
    RecordNotFound(Uuid),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Stream channel closed")]
    ChannelClosed,
}
