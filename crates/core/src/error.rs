//! Core error types for Nimbus records.

use itertools::Itertools;
use thiserror::Error;

use crate::validation::FieldError;

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while validating or parsing instance records.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// The record violates one or more field constraints.
    #[error("invalid instance '{name}': {}", .errors.iter().join("; "))]
    InvalidInstance {
        name: String,
        errors: Vec<FieldError>,
    },

    /// A manifest document could not be decoded.
    #[error("failed to parse manifest: {reason}")]
    ManifestParseFailed { reason: String },
}

impl Error {
    /// Create an invalid instance error.
    pub fn invalid_instance(name: impl Into<String>, errors: Vec<FieldError>) -> Self {
        Self::InvalidInstance {
            name: name.into(),
            errors,
        }
    }

    /// Create a manifest parse error.
    pub fn manifest_parse_failed(reason: impl Into<String>) -> Self {
        Self::ManifestParseFailed {
            reason: reason.into(),
        }
    }

    /// Field errors carried by an [`Error::InvalidInstance`].
    #[must_use]
    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            Self::InvalidInstance { errors, .. } => errors,
            Self::ManifestParseFailed { .. } => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_instance_lists_every_field() {
        let err = Error::invalid_instance(
            "vm1",
            vec![
                FieldError::new("spec.resource.cpuLimit", "must be at least 1"),
                FieldError::new("spec.environment.os", "must not be empty"),
            ],
        );
        let message = err.to_string();
        assert!(message.contains("vm1"));
        assert!(message.contains("spec.resource.cpuLimit"));
        assert!(message.contains("spec.environment.os"));
        assert_eq!(err.field_errors().len(), 2);
    }

    #[test]
    fn test_manifest_parse_failed() {
        let err = Error::manifest_parse_failed("unexpected end of input");
        assert!(err.to_string().contains("unexpected end of input"));
        assert!(err.field_errors().is_empty());
    }
}
