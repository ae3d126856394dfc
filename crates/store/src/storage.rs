//! Storage trait and wrappers.

use std::fmt;

use async_trait::async_trait;
use nimbus_core::{Instance, NamespacedName};

use crate::error::Result;

type Transform = Box<dyn FnOnce(Option<&Instance>) -> Result<Instance> + Send>;

/// Computes the object to store from the one currently stored.
///
/// The current object is `None` when nothing is stored under the key and the
/// caller allowed the update to create it.
pub struct UpdatedObjectInfo {
    transform: Transform,
}

impl UpdatedObjectInfo {
    /// Replace whatever is stored with `instance`.
    #[must_use]
    pub fn replace(instance: Instance) -> Self {
        Self {
            transform: Box::new(move |_| Ok(instance)),
        }
    }

    /// Derive the new object with a closure.
    pub fn from_fn<F>(transform: F) -> Self
    where
        F: FnOnce(Option<&Instance>) -> Result<Instance> + Send + 'static,
    {
        Self {
            transform: Box::new(transform),
        }
    }

    /// Compute the updated object.
    ///
    /// # Errors
    ///
    /// Returns whatever the transform returns.
    pub fn updated_object(self, current: Option<&Instance>) -> Result<Instance> {
        (self.transform)(current)
    }
}

impl fmt::Debug for UpdatedObjectInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdatedObjectInfo").finish_non_exhaustive()
    }
}

/// Contract for a store that owns instance records.
///
/// Every successful write assigns a new `metadata.resource_version`. Writes
/// that carry a non-zero resource version only succeed when it matches the
/// stored one.
#[async_trait]
pub trait InstanceStorage: Send + Sync {
    /// Read a record.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` when no record exists under `key`.
    async fn get(&self, key: &NamespacedName) -> Result<Instance>;

    /// List every record.
    async fn list(&self) -> Result<Vec<Instance>>;

    /// Store a new record.
    ///
    /// # Errors
    ///
    /// Returns `Error::AlreadyExists` when the key is taken.
    async fn create(&self, instance: Instance) -> Result<Instance>;

    /// Update a record, returning the stored object and whether it was created.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` when the record is missing and
    /// `force_allow_create` is false, `Error::Conflict` on a stale resource
    /// version.
    async fn update(
        &self,
        key: &NamespacedName,
        info: UpdatedObjectInfo,
        force_allow_create: bool,
    ) -> Result<(Instance, bool)>;

    /// Replace only the status of a record.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` or `Error::Conflict`.
    async fn update_status(&self, instance: &Instance) -> Result<Instance>;
}

/// A wrapper that adds tracing to a storage backend.
pub struct TracingInstanceStorage<S: InstanceStorage> {
    inner: S,
}

impl<S: InstanceStorage> TracingInstanceStorage<S> {
    /// Create a new tracing storage.
    pub const fn new(inner: S) -> Self {
        Self { inner }
    }

    /// Access the wrapped storage.
    pub const fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: InstanceStorage> InstanceStorage for TracingInstanceStorage<S> {
    async fn get(&self, key: &NamespacedName) -> Result<Instance> {
        tracing::debug!(record = %key, "Reading instance");
        self.inner.get(key).await
    }

    async fn list(&self) -> Result<Vec<Instance>> {
        tracing::debug!("Listing instances");
        self.inner.list().await
    }

    async fn create(&self, instance: Instance) -> Result<Instance> {
        tracing::debug!(record = %instance.key(), "Creating instance");
        let result = self.inner.create(instance).await;
        if let Ok(ref stored) = result {
            tracing::trace!(resource_version = stored.metadata.resource_version, "Instance created");
        }
        result
    }

    async fn update(
        &self,
        key: &NamespacedName,
        info: UpdatedObjectInfo,
        force_allow_create: bool,
    ) -> Result<(Instance, bool)> {
        tracing::debug!(record = %key, force_allow_create, "Updating instance");
        self.inner.update(key, info, force_allow_create).await
    }

    async fn update_status(&self, instance: &Instance) -> Result<Instance> {
        tracing::debug!(
            record = %instance.key(),
            instance_id = %instance.status.instance_id,
            "Updating instance status"
        );
        let result = self.inner.update_status(instance).await;
        if let Err(ref e) = result {
            tracing::debug!(error = %e, "Status update failed");
        }
        result
    }
}
