#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

//! # Nimbus
//!
//! Declarative instance controller. Users declare `Instance` records; the
//! controller makes sure each one has a backing compute instance created by
//! the provisioning service and records the identity it was given.
//!
//! This library re-exports the workspace crates and hosts the pieces of the
//! `nimbus` binary that are worth testing on their own.

// Re-export all crates
pub use nimbus_core;
pub use nimbus_provisioner;
pub use nimbus_reconciler;
pub use nimbus_store;

pub mod cli;
pub mod commands;
pub mod config;
