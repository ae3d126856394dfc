#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

//! # nimbus-core
//!
//! The desired-state record managed by the Nimbus controller.
//!
//! An [`Instance`] declares the compute resource a user wants (sizing, owner,
//! OS image) and carries what the controller has observed about it (the
//! identity assigned by the provisioning service, a lifecycle status and the
//! list of point-in-time snapshots).
//!
//! ```ignore
//! use nimbus_core::{Instance, InstanceSpec};
//!
//! let instance = Instance::new("default", "vm1", InstanceSpec::new("alice", "ubuntu22", 2, 4, 20));
//! assert_eq!(instance.backing_resource_key(), "alice-vm1");
//! instance.validate()?;
//! ```

pub mod error;
pub mod instance;
pub mod manifest;
pub mod retry;
pub mod validation;

pub use error::{Error, Result};
pub use instance::{
    Environment, Instance, InstanceSpec, InstanceStatus, NamespacedName, ObjectMeta, Resource,
    Snapshot, TypeMeta, backing_resource_key, phase,
};
pub use manifest::{ManifestFormat, parse_manifests};
pub use retry::RetryClass;
pub use validation::FieldError;
