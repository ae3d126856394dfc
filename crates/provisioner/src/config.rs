//! Configuration for the provisioning client.

use std::net::Ipv6Addr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};

/// Environment variable holding the provisioning service host.
pub const HOST_ENV: &str = "NEBULA_REST_API_HOST_IP";
/// Environment variable holding the provisioning service port.
pub const PORT_ENV: &str = "NEBULA_REST_API_HOST_PORT";
/// Optional environment variable overriding the request timeout in seconds.
pub const TIMEOUT_ENV: &str = "NEBULA_REST_API_TIMEOUT_SECS";

/// Path of the creation endpoint on the provisioning service.
pub const CREATE_PATH: &str = "note";

/// Where the provisioning service lives and how long to wait for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionerConfig {
    /// Host name or IP address.
    pub host: String,

    /// TCP port.
    pub port: u16,

    /// Timeout for a single creation request.
    #[serde(with = "duration_secs", default = "default_timeout")]
    pub timeout: Duration,
}

impl ProvisionerConfig {
    /// Create a config for the given host and port.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            timeout: default_timeout(),
        }
    }

    /// Set the timeout.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when a required variable is missing or
    /// malformed.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when a required variable is missing or
    /// malformed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup(HOST_ENV)
            .filter(|h| !h.trim().is_empty())
            .ok_or_else(|| Error::config(format!("{HOST_ENV} is not set")))?;

        let port = lookup(PORT_ENV)
            .ok_or_else(|| Error::config(format!("{PORT_ENV} is not set")))?
            .trim()
            .parse::<u16>()
            .map_err(|e| Error::config(format!("{PORT_ENV} is not a valid port: {e}")))?;

        let mut config = Self::new(host.trim(), port);

        if let Some(secs) = lookup(TIMEOUT_ENV) {
            let secs = secs
                .trim()
                .parse::<u64>()
                .map_err(|e| Error::config(format!("{TIMEOUT_ENV} is not a number: {e}")))?;
            config.timeout = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the file cannot be read, parsed or fails
    /// validation.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("Failed to read {}: {e}", path.display())))?;

        // JSON by extension, TOML otherwise
        let config: Self = if path.extension().is_some_and(|e| e == "json") {
            serde_json::from_str(&content)
                .map_err(|e| Error::config(format!("Failed to parse config: {e}")))?
        } else {
            toml::from_str(&content)
                .map_err(|e| Error::config(format!("Failed to parse config: {e}")))?
        };

        config.validate()?;
        Ok(config)
    }

    /// Check required fields.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an empty host, port zero or zero timeout.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::config("host must not be empty"));
        }
        if self.port == 0 {
            return Err(Error::config("port must not be zero"));
        }
        if self.timeout.is_zero() {
            return Err(Error::config("timeout must be greater than zero"));
        }
        Ok(())
    }

    /// URL of the creation endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when host and port do not form a valid URL.
    pub fn endpoint(&self) -> Result<Url> {
        let base = if self.host.parse::<Ipv6Addr>().is_ok() {
            format!("http://[{}]:{}/", self.host, self.port)
        } else {
            format!("http://{}:{}/", self.host, self.port)
        };
        let base = Url::parse(&base)
            .map_err(|e| Error::config(format!("Invalid provisioning URL: {e}")))?;
        base.join(CREATE_PATH)
            .map_err(|e| Error::config(format!("Invalid provisioning URL: {e}")))
    }
}

const fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

/// Serialization helper for Duration as seconds.
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
