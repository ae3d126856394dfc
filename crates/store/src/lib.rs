//! Storage for Nimbus instance records.
//!
//! - [`InstanceStorage`]: the contract every control-plane store fulfils
//! - [`InMemoryInstanceStore`]: optimistic-concurrency store used by the
//!   controller binary and tests
//! - [`SnapshotSubresource`]: the `snapshot` subresource, which owns no
//!   storage and forwards every call to its parent storage

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod context;
pub mod error;
pub mod memory;
pub mod snapshot;
pub mod storage;

pub use context::RequestContext;
pub use error::{Error, Result};
pub use memory::InMemoryInstanceStore;
pub use snapshot::{SNAPSHOT_SUBRESOURCE, SnapshotSubresource};
pub use storage::{InstanceStorage, TracingInstanceStorage, UpdatedObjectInfo};
