//! Retry classification shared by every Nimbus error type.

use std::fmt;

use serde::{Deserialize, Serialize};

/// How the driving scheduler should treat a failed pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryClass {
    /// Infrastructure hiccup (connection refused, timeout, store unavailable).
    Fast,
    /// The remote service answered but refused or garbled the request.
    Slow,
    /// Retrying cannot help until the record or wiring changes.
    Never,
}

impl RetryClass {
    /// Whether the failure may succeed on a later attempt.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        !matches!(self, Self::Never)
    }
}

impl fmt::Display for RetryClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fast => write!(f, "fast"),
            Self::Slow => write!(f, "slow"),
            Self::Never => write!(f, "never"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable() {
        assert!(RetryClass::Fast.is_retryable());
        assert!(RetryClass::Slow.is_retryable());
        assert!(!RetryClass::Never.is_retryable());
    }
}
