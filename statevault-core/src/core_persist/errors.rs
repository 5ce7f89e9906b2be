//! Error types for the persistence pipeline

use crate::core_persist::cipher::CipherError;
use crate::core_storage::StorageError;
use thiserror::Error;

/// Errors surfaced by the persistence pipeline
#[derive(Debug, Error)]
pub enum PersistError {
    /// Missing or invalid backend-selection options; fatal at construction
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Encryption failure while computing the persistable state
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// Malformed token or failed authentication during restore; fatal for
    /// that restore call, never treated as plaintext
    #[error("Decryption error: {0}")]
    Decryption(String),

    /// Storage-layer failure that could not be degraded
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Result type for persistence operations
pub type PersistResult<T> = Result<T, PersistError>;

impl From<CipherError> for PersistError {
    fn from(err: CipherError) -> Self {
        match err {
            CipherError::MalformedToken(_) | CipherError::AuthenticationFailed => {
                PersistError::Decryption(err.to_string())
            }
            CipherError::KeyDerivation(_) | CipherError::Encryption(_) => {
                PersistError::Encryption(err.to_string())
            }
        }
    }
}
