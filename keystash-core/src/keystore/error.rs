//! Keystore error types

use crate::storage::StorageError;
use thiserror::Error;

/// Keystore errors
#[derive(Debug, Error)]
pub enum KeystoreError {
    /// Malformed, oversized or empty name or data
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Key not found: {0}")]
    NotFound(String),

    #[error("Key already exists: {0}")]
    AlreadyExists(String),

    /// The caller's buffer cannot hold the stored key
    #[error("Buffer too small: key needs {required} bytes, buffer holds {capacity}")]
    BufferTooSmall { required: usize, capacity: usize },

    #[error("Insufficient storage space: {0}")]
    InsufficientSpace(String),

    /// The stored bytes do not decode into a consistent record
    #[error("Corrupt record: {0}")]
    CorruptRecord(String),

    #[error("Storage failure: {0}")]
    StorageFailure(#[source] StorageError),

    /// The key was written to the destination but could not be removed from
    /// the source. It now exists in both keystores.
    #[error("Move of '{name}' partially failed, key remains in source: {source}")]
    PartialMove {
        name: String,
        #[source]
        source: Box<KeystoreError>,
    },

    /// A remote keystore is no longer being served
    #[error("Keystore unavailable: {0}")]
    Unavailable(String),
}

/// Result type for keystore operations
pub type KeystoreResult<T> = Result<T, KeystoreError>;

impl From<StorageError> for KeystoreError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(name) => KeystoreError::NotFound(name),
            StorageError::AlreadyExists(name) => KeystoreError::AlreadyExists(name),
            StorageError::InsufficientSpace { requested, available } => {
                KeystoreError::InsufficientSpace(format!(
                    "requested {} bytes, {} available",
                    requested, available
                ))
            }
            StorageError::Integrity(msg) => KeystoreError::CorruptRecord(msg),
            other => KeystoreError::StorageFailure(other),
        }
    }
}

impl KeystoreError {
    /// Short label used for metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            KeystoreError::InvalidParameter(_) => "invalid_parameter",
            KeystoreError::NotFound(_) => "not_found",
            KeystoreError::AlreadyExists(_) => "already_exists",
            KeystoreError::BufferTooSmall { .. } => "buffer_too_small",
            KeystoreError::InsufficientSpace(_) => "insufficient_space",
            KeystoreError::CorruptRecord(_) => "corrupt_record",
            KeystoreError::StorageFailure(_) => "storage_failure",
            KeystoreError::PartialMove { .. } => "partial_move",
            KeystoreError::Unavailable(_) => "unavailable",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_mapping() {
        assert!(matches!(
            KeystoreError::from(StorageError::NotFound("a/b".to_string())),
            KeystoreError::NotFound(_)
        ));
        assert!(matches!(
            KeystoreError::from(StorageError::AlreadyExists("a/b".to_string())),
            KeystoreError::AlreadyExists(_)
        ));
        assert!(matches!(
            KeystoreError::from(StorageError::InsufficientSpace { requested: 2, available: 1 }),
            KeystoreError::InsufficientSpace(_)
        ));
        assert!(matches!(
            KeystoreError::from(StorageError::Integrity("tag".to_string())),
            KeystoreError::CorruptRecord(_)
        ));
        assert!(matches!(
            KeystoreError::from(StorageError::Other("boom".to_string())),
            KeystoreError::StorageFailure(_)
        ));
    }

    #[test]
    fn test_buffer_too_small_display() {
        let err = KeystoreError::BufferTooSmall { required: 32, capacity: 16 };
        assert!(err.to_string().contains("32 bytes"));
        assert!(err.to_string().contains("16"));
    }

    #[test]
    fn test_partial_move_keeps_cause() {
        use std::error::Error;

        let err = KeystoreError::PartialMove {
            name: "KeyMov".to_string(),
            source: Box::new(KeystoreError::StorageFailure(StorageError::Other(
                "device busy".to_string(),
            ))),
        };
        assert!(err.to_string().contains("KeyMov"));
        assert!(err.source().unwrap().to_string().contains("device busy"));
        assert_eq!(err.kind(), "partial_move");
    }
}
