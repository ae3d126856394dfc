//! K8s-style reconciliation for Nimbus instances.
//!
//! This crate drives `Instance` records toward having a backing compute
//! resource:
//!
//! - **Desired State**: the `Instance` record in the control-plane store
//! - **Actual State**: whether the runtime layer hosts a backing resource
//!   named `{owner}-{name}`
//! - **Action**: ask the provisioning service to create it, then record the
//!   granted identity in `status.instanceID`
//!
//! # Key Concepts
//!
//! ## Reconciliation
//!
//! One pass of the [`Reconciler`]:
//! 1. Loads the record (a missing record is a terminal success)
//! 2. Stops if an identity is already recorded
//! 3. Looks up the backing resource and stops if it exists
//! 4. Validates the spec
//! 5. Creates it and persists the identity
//!
//! ## Loop
//!
//! The [`ReconciliationLoop`] feeds keys to the engine from explicit triggers
//! and periodic resyncs, backing off according to each error's retry class.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use nimbus_provisioner::{HttpProvisioningClient, ProvisionerConfig};
//! use nimbus_reconciler::{InMemoryRuntime, LoopConfig, ReconcilerBuilder, ReconciliationLoop};
//! use nimbus_store::InMemoryInstanceStore;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = InMemoryInstanceStore::new_arc();
//!     let client = HttpProvisioningClient::with_config(&ProvisionerConfig::from_env()?)?;
//!     let reconciler = ReconcilerBuilder::new()
//!         .with_store(store.clone())
//!         .with_runtime(Arc::new(InMemoryRuntime::new()))
//!         .with_provisioner(Arc::new(client))
//!         .build()?;
//!
//!     let loop_runner = ReconciliationLoop::new(Arc::new(reconciler), store, LoopConfig::default());
//!     loop_runner.run().await?;
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod r#loop;
pub mod reconciler;
pub mod runtime;
pub mod types;

#[cfg(test)]
mod testing;

// Re-export main types
pub use error::{Error, Result};
pub use r#loop::{LoopConfig, LoopStopper, ReconciliationLoop};
pub use reconciler::{Reconciler, ReconcilerBuilder, ReconcilerConfig};
pub use runtime::{BackingResource, BackingResourceLookup, InMemoryRuntime};
pub use types::{ReconcileOutcome, ReconcileState};
