//! Error types for the store crate.

use nimbus_core::RetryClass;
use thiserror::Error;

/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by instance storage.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// No record exists under the key.
    #[error("instance '{key}' not found")]
    NotFound { key: String },

    /// A record already exists under the key.
    #[error("instance '{key}' already exists")]
    AlreadyExists { key: String },

    /// The write was based on a stale resource version.
    #[error("conflict on instance '{key}': expected resource version {expected}, found {actual}")]
    Conflict {
        key: String,
        expected: u64,
        actual: u64,
    },

    /// The updated object could not be computed or does not match the key.
    #[error("update of instance '{key}' rejected: {reason}")]
    UpdateRejected { key: String, reason: String },

    /// A subresource was resolved from a context that carries no parent storage.
    #[error("no parent storage found in the context")]
    NoParentStorage,

    /// The backend could not be reached.
    #[error("storage unavailable: {reason}")]
    Unavailable { reason: String },
}

impl Error {
    /// Create a not found error.
    pub fn not_found(key: impl ToString) -> Self {
        Self::NotFound {
            key: key.to_string(),
        }
    }

    /// Create an already exists error.
    pub fn already_exists(key: impl ToString) -> Self {
        Self::AlreadyExists {
            key: key.to_string(),
        }
    }

    /// Create a version conflict error.
    pub fn conflict(key: impl ToString, expected: u64, actual: u64) -> Self {
        Self::Conflict {
            key: key.to_string(),
            expected,
            actual,
        }
    }

    /// Create an update rejected error.
    pub fn update_rejected(key: impl ToString, reason: impl Into<String>) -> Self {
        Self::UpdateRejected {
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    /// Create an unavailable error.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    /// Returns `true` for [`Error::NotFound`].
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` for [`Error::Conflict`].
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// How a caller should treat this failure.
    #[must_use]
    pub const fn retry_class(&self) -> RetryClass {
        match self {
            Self::Conflict { .. } | Self::Unavailable { .. } => RetryClass::Fast,
            Self::NotFound { .. }
            | Self::AlreadyExists { .. }
            | Self::UpdateRejected { .. }
            | Self::NoParentStorage => RetryClass::Never,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_parent_storage_message() {
        assert_eq!(
            Error::NoParentStorage.to_string(),
            "no parent storage found in the context"
        );
        assert_eq!(Error::NoParentStorage.retry_class(), RetryClass::Never);
    }

    #[test]
    fn test_conflict_is_retryable() {
        let err = Error::conflict("default/vm1", 3, 4);
        assert!(err.is_conflict());
        assert!(err.retry_class().is_retryable());
        assert!(err.to_string().contains("expected resource version 3"));
    }
}
