//! Controller configuration.
//!
//! A config file (TOML, or JSON by extension) may hold a `[provisioner]`
//! table and a `[reconciler]` table. The provisioning service location from
//! the `NEBULA_REST_API_*` environment variables overrides the file.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use std::path::Path;

use anyhow::{Context, Result, anyhow};
use nimbus_provisioner::ProvisionerConfig;
use nimbus_provisioner::config::HOST_ENV;
use nimbus_reconciler::LoopConfig;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Everything the controller binary needs to start.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Location of the provisioning service.
    pub provisioner: Option<ProvisionerConfig>,
    /// Reconciliation loop tuning.
    pub reconciler: LoopConfig,
}

impl ControllerConfig {
    /// Load from an optional file, then apply the process environment.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be read or parsed, or when the environment
    /// holds a malformed provisioning location.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with(path, |key| std::env::var(key).ok())
    }

    /// Load from an optional file, then apply variables from `lookup`.
    ///
    /// # Errors
    ///
    /// See [`ControllerConfig::load`].
    pub fn load_with<F>(path: Option<&Path>, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        if lookup(HOST_ENV).is_some() {
            debug!("Provisioning service location taken from environment");
            config.provisioner = Some(
                ProvisionerConfig::from_lookup(lookup)
                    .context("Invalid provisioning service environment")?,
            );
        }

        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let config: Self = if path.extension().is_some_and(|e| e == "json") {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?
        } else {
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?
        };

        Ok(config)
    }

    /// The provisioning service location, validated.
    ///
    /// # Errors
    ///
    /// Fails when no location was configured or it is invalid.
    pub fn provisioner(&self) -> Result<&ProvisionerConfig> {
        let provisioner = self.provisioner.as_ref().ok_or_else(|| {
            anyhow!("Provisioning service not configured: set {HOST_ENV} or a [provisioner] table")
        })?;
        provisioner
            .validate()
            .context("Invalid provisioning service configuration")?;
        Ok(provisioner)
    }
}
