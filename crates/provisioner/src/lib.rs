#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

//! # nimbus-provisioner
//!
//! Client for the remote provisioning service that creates the compute
//! instance behind an `Instance` record.
//!
//! The client sends exactly one creation request per call and holds no retry
//! logic; retries belong to whoever drives reconciliation. Failures are split
//! into transport, rejection and decode errors so the driver can back off
//! differently for each.
//!
//! ## Example
//!
//! ```ignore
//! use nimbus_provisioner::{HttpProvisioningClient, ProvisionerConfig, ProvisioningClient};
//!
//! let config = ProvisionerConfig::from_env()?;
//! let client = HttpProvisioningClient::with_config(&config)?;
//! let identity = client.create_backing_resource(&instance).await?;
//! println!("assigned {identity}");
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod types;

pub use client::{HttpProvisioningClient, ProvisioningClient};
pub use config::ProvisionerConfig;
pub use error::{Error, Result};
pub use types::{InstanceCreationRequest, InstanceCreationResponse, InstanceIdentity};
