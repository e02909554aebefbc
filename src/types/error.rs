//! Error types for keyknock
//!
//! One flat enum with a human-readable detail per variant.

/// Main error type for keyknock operations
#[derive(Debug, thiserror::Error)]
pub enum KnockError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid challenge: {0}")]
    InvalidChallenge(String),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("I/O failure: {0}")]
    IoFailure(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Rejected by server: {0}")]
    Rejected(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl KnockError {
    /// Message safe to hand back to a remote client.
    ///
    /// Storage, I/O and internal details stay in the server logs.
    pub fn public_message(&self) -> String {
        match self {
            Self::NotFound(msg)
            | Self::AlreadyExists(msg)
            | Self::InvalidChallenge(msg)
            | Self::InvalidSignature(msg)
            | Self::InvalidToken(msg)
            | Self::BadRequest(msg)
            | Self::Rejected(msg) => msg.clone(),
            Self::StorageUnavailable(_) => "Service temporarily unavailable".into(),
            Self::DecryptionFailed(_) => "Unable to unlock key vault".into(),
            Self::IoFailure(_) | Self::Config(_) | Self::Internal(_) => "Internal error".into(),
        }
    }
}

// Implement From conversions for common error types

impl From<std::io::Error> for KnockError {
    fn from(err: std::io::Error) -> Self {
        Self::IoFailure(err.to_string())
    }
}

impl From<serde_json::Error> for KnockError {
    fn from(err: serde_json::Error) -> Self {
        Self::BadRequest(format!("JSON error: {}", err))
    }
}

impl From<jsonwebtoken::errors::Error> for KnockError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        Self::InvalidToken(format!("JWT error: {}", err))
    }
}

impl From<rusqlite::Error> for KnockError {
    fn from(err: rusqlite::Error) -> Self {
        Self::StorageUnavailable(err.to_string())
    }
}

/// Result type alias for keyknock operations
pub type Result<T> = std::result::Result<T, KnockError>;
