//! Error types for the reconciler crate.

use std::fmt;

use nimbus_core::RetryClass;

/// Result type alias for reconciler operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Reconciler error types.
#[derive(Debug, Clone)]
pub enum Error {
    /// The record could not be loaded for a reason other than absence.
    RecordLoad { record: String, reason: String },
    /// The runtime layer could not answer whether the backing resource exists.
    Lookup { key: String, reason: String },
    /// The provisioning service granted no identity.
    Provisioning {
        record: String,
        source: nimbus_provisioner::Error,
    },
    /// The granted identity could not be written back to the store.
    StatusWrite {
        record: String,
        identity: String,
        reason: String,
    },
    /// The record's spec is invalid.
    Validation(nimbus_core::Error),
    /// Loop was stopped.
    LoopStopped,
    /// Invalid configuration.
    InvalidConfig { reason: String },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RecordLoad { record, reason } => {
                write!(f, "failed to load instance '{record}': {reason}")
            }
            Self::Lookup { key, reason } => {
                write!(f, "failed to look up backing resource '{key}': {reason}")
            }
            Self::Provisioning { record, source } => {
                write!(f, "failed to provision instance '{record}': {source}")
            }
            Self::StatusWrite {
                record,
                identity,
                reason,
            } => {
                write!(
                    f,
                    "failed to record identity '{identity}' on instance '{record}': {reason}"
                )
            }
            Self::Validation(source) => {
                write!(f, "validation failed: {source}")
            }
            Self::LoopStopped => {
                write!(f, "reconciliation loop stopped")
            }
            Self::InvalidConfig { reason } => {
                write!(f, "invalid configuration: {reason}")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Provisioning { source, .. } => Some(source),
            Self::Validation(source) => Some(source),
            _ => None,
        }
    }
}

impl Error {
    /// Create a record load error.
    pub fn record_load(record: impl ToString, reason: impl Into<String>) -> Self {
        Self::RecordLoad {
            record: record.to_string(),
            reason: reason.into(),
        }
    }

    /// Create a lookup error.
    pub fn lookup(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Lookup {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Create a provisioning error.
    pub fn provisioning(record: impl ToString, source: nimbus_provisioner::Error) -> Self {
        Self::Provisioning {
            record: record.to_string(),
            source,
        }
    }

    /// Create a status write error.
    pub fn status_write(
        record: impl ToString,
        identity: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::StatusWrite {
            record: record.to_string(),
            identity: identity.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid config error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// How the driving loop should back off after this error.
    #[must_use]
    pub const fn retry_class(&self) -> RetryClass {
        match self {
            Self::RecordLoad { .. } | Self::Lookup { .. } | Self::StatusWrite { .. } => {
                RetryClass::Fast
            }
            Self::Provisioning { source, .. } => source.retry_class(),
            Self::Validation(_) | Self::LoopStopped | Self::InvalidConfig { .. } => {
                RetryClass::Never
            }
        }
    }

    /// Check if this error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.retry_class().is_retryable()
    }
}
