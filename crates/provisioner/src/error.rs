//! Error types for the provisioner crate.

use nimbus_core::RetryClass;
use thiserror::Error;

/// Result type for provisioning operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while creating a backing resource.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The request never produced a response (refused, reset, timed out).
    #[error("transport failure: {reason}")]
    Transport { reason: String },

    /// The service answered with a non-success status.
    #[error("provisioning service rejected the request with status {status}: {body}")]
    Rejected { status: u16, body: String },

    /// The response body is not a creation response.
    #[error("failed to decode provisioning response: {reason}")]
    Decode { reason: String },

    /// The client cannot be built from its configuration.
    #[error("configuration error: {reason}")]
    Config { reason: String },
}

impl Error {
    /// Create a transport error.
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: reason.into(),
        }
    }

    /// Create a rejected error.
    pub fn rejected(status: u16, body: impl Into<String>) -> Self {
        Self::Rejected {
            status,
            body: body.into(),
        }
    }

    /// Create a decode error.
    pub fn decode(reason: impl Into<String>) -> Self {
        Self::Decode {
            reason: reason.into(),
        }
    }

    /// Create a config error.
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    /// How the reconciliation driver should back off after this error.
    #[must_use]
    pub const fn retry_class(&self) -> RetryClass {
        match self {
            Self::Transport { .. } => RetryClass::Fast,
            Self::Rejected { .. } | Self::Decode { .. } => RetryClass::Slow,
            Self::Config { .. } => RetryClass::Never,
        }
    }

    /// Check if this error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.retry_class().is_retryable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_is_fast() {
        assert_eq!(Error::transport("refused").retry_class(), RetryClass::Fast);
    }

    #[test]
    fn test_rejection_and_decode_are_slow() {
        assert_eq!(Error::rejected(409, "exists").retry_class(), RetryClass::Slow);
        assert_eq!(Error::decode("eof").retry_class(), RetryClass::Slow);
    }

    #[test]
    fn test_config_is_not_retryable() {
        assert!(!Error::config("no host").is_retryable());
    }

    #[test]
    fn test_rejected_display() {
        let message = Error::rejected(503, "maintenance").to_string();
        assert!(message.contains("503"));
        assert!(message.contains("maintenance"));
    }
}
