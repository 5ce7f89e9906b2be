//! Error types for the storage subsystem

use thiserror::Error;

/// Errors that can occur in a storage backend
#[derive(Debug, Error)]
pub enum StorageError {
    /// Backend open/transaction failure; callers degrade to an empty result
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// Structural mismatch on the versioned backend; recovered by
    /// incrementing the stored schema version and reopening
    #[error("Version conflict: requested {requested}, database at {actual}")]
    VersionConflict { requested: u32, actual: u32 },

    /// JSON encode/decode failure at the storage layer
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Unavailable(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::Unavailable("disk gone".to_string());
        assert_eq!(err.to_string(), "Storage unavailable: disk gone");

        let err = StorageError::VersionConflict {
            requested: 1,
            actual: 3,
        };
        assert!(err.to_string().contains("requested 1"));
        assert!(err.to_string().contains("database at 3"));
    }
}
