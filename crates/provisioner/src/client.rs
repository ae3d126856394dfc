//! Provisioning client.
//!
//! This module provides the `ProvisioningClient` seam used by the reconciler
//! and the `HttpProvisioningClient` that talks to the provisioning service.

use std::time::Instant;

use async_trait::async_trait;
use nimbus_core::Instance;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::ProvisionerConfig;
use crate::error::{Error, Result};
use crate::types::{InstanceCreationRequest, InstanceCreationResponse, InstanceIdentity};

/// Creates backing resources for instance records.
#[async_trait]
pub trait ProvisioningClient: Send + Sync {
    /// Ask the provisioning service to create the backing resource for
    /// `instance` and return the identity it assigned.
    ///
    /// Implementations make exactly one attempt.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] describing why no identity was granted.
    async fn create_backing_resource(&self, instance: &Instance) -> Result<InstanceIdentity>;
}

/// HTTP client for the provisioning service.
#[derive(Debug, Clone)]
pub struct HttpProvisioningClient {
    /// Creation endpoint, resolved once from configuration.
    endpoint: Url,
    /// HTTP client carrying the request timeout.
    http_client: reqwest::Client,
}

impl HttpProvisioningClient {
    /// Create a client from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the configuration is invalid or the
    /// HTTP client cannot be built.
    pub fn with_config(config: &ProvisionerConfig) -> Result<Self> {
        config.validate()?;
        let endpoint = config.endpoint()?;

        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            endpoint,
            http_client,
        })
    }

    /// The creation endpoint this client posts to.
    #[must_use]
    pub const fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl ProvisioningClient for HttpProvisioningClient {
    async fn create_backing_resource(&self, instance: &Instance) -> Result<InstanceIdentity> {
        let request = InstanceCreationRequest::from(instance);
        info!(
            name = %request.name,
            owner = %request.owner,
            endpoint = %self.endpoint,
            "Requesting backing resource"
        );
        let start = Instant::now();

        let response = self
            .http_client
            .post(self.endpoint.clone())
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "Provisioning request failed");
                Error::transport(e.to_string())
            })?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| Error::transport(format!("Failed to read response body: {e}")))?;

        debug!(
            status = status.as_u16(),
            duration_ms = start.elapsed().as_millis(),
            "Provisioning service responded"
        );

        if !status.is_success() {
            return Err(Error::rejected(
                status.as_u16(),
                String::from_utf8_lossy(&body).trim().to_string(),
            ));
        }

        parse_creation_response(&body)
    }
}

/// Decode a creation response into the assigned identity.
fn parse_creation_response(body: &[u8]) -> Result<InstanceIdentity> {
    let response: InstanceCreationResponse =
        serde_json::from_slice(body).map_err(|e| Error::decode(e.to_string()))?;

    if response.uuid.trim().is_empty() {
        return Err(Error::decode("response carried an empty UUID"));
    }

    Ok(InstanceIdentity::new(response.uuid))
}
