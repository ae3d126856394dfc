//! The `snapshot` subresource.
//!
//! The subresource keeps no state of its own. Reads and updates go straight
//! to the storage that owns the primary `Instance`, so the subresource can be
//! routed independently of wherever that storage lives.

use std::sync::Arc;

use nimbus_core::{Instance, NamespacedName};
use tracing::debug;

use crate::context::RequestContext;
use crate::error::{Error, Result};
use crate::storage::{InstanceStorage, UpdatedObjectInfo};

/// Name under which the subresource is served.
pub const SNAPSHOT_SUBRESOURCE: &str = "snapshot";

/// Forwarding view of an instance's snapshots.
#[derive(Clone)]
pub struct SnapshotSubresource {
    parent: Arc<dyn InstanceStorage>,
}

impl SnapshotSubresource {
    /// Create the subresource over its parent storage.
    #[must_use]
    pub fn new(parent: Arc<dyn InstanceStorage>) -> Self {
        Self { parent }
    }

    /// Resolve the parent storage from a request context.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoParentStorage`] when the context carries none. This
    /// is a wiring defect and is never retried.
    pub fn from_context(ctx: &RequestContext) -> Result<Self> {
        ctx.parent_storage()
            .cloned()
            .map(Self::new)
            .ok_or(Error::NoParentStorage)
    }

    /// Name under which this subresource is served.
    #[must_use]
    pub const fn subresource_name(&self) -> &'static str {
        SNAPSHOT_SUBRESOURCE
    }

    /// Read the instance through the parent storage.
    ///
    /// # Errors
    ///
    /// Returns whatever the parent storage returns.
    pub async fn get(&self, key: &NamespacedName) -> Result<Instance> {
        debug!(record = %key, subresource = SNAPSHOT_SUBRESOURCE, "Forwarding get");
        self.parent.get(key).await
    }

    /// Update the instance through the parent storage.
    ///
    /// # Errors
    ///
    /// Returns whatever the parent storage returns.
    pub async fn update(
        &self,
        key: &NamespacedName,
        info: UpdatedObjectInfo,
        force_allow_create: bool,
    ) -> Result<(Instance, bool)> {
        debug!(record = %key, subresource = SNAPSHOT_SUBRESOURCE, "Forwarding update");
        self.parent.update(key, info, force_allow_create).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use nimbus_core::{InstanceSpec, Snapshot};

    use super::*;
    use crate::memory::InMemoryInstanceStore;

    /// Parent storage that answers every call with canned objects.
    #[derive(Default)]
    struct StubStorage {
        calls: AtomicUsize,
    }

    impl StubStorage {
        fn canned() -> Instance {
            let mut instance = Instance::new(
                "stub",
                "canned",
                InstanceSpec::new("carol", "alpine", 1, 1, 1),
            )
            .with_snapshot(Snapshot {
                name: "nightly".to_string(),
                generated: "2024-05-01".to_string(),
                size: 3,
            });
            instance.metadata.resource_version = 42;
            instance
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn touch(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl InstanceStorage for StubStorage {
        async fn get(&self, _key: &NamespacedName) -> Result<Instance> {
            self.touch();
            Ok(Self::canned())
        }

        async fn list(&self) -> Result<Vec<Instance>> {
            self.touch();
            Ok(vec![Self::canned()])
        }

        async fn create(&self, instance: Instance) -> Result<Instance> {
            self.touch();
            Ok(instance)
        }

        async fn update(
            &self,
            _key: &NamespacedName,
            _info: UpdatedObjectInfo,
            _force_allow_create: bool,
        ) -> Result<(Instance, bool)> {
            self.touch();
            Ok((Self::canned(), true))
        }

        async fn update_status(&self, instance: &Instance) -> Result<Instance> {
            self.touch();
            Ok(instance.clone())
        }
    }

    fn vm1() -> Instance {
        Instance::new("default", "vm1", InstanceSpec::new("alice", "ubuntu22", 2, 4, 20))
    }

    #[tokio::test]
    async fn test_get_returns_delegate_result_unmodified() {
        let stub = Arc::new(StubStorage::default());
        let ctx = RequestContext::new().with_parent_storage(stub.clone());
        let subresource = SnapshotSubresource::from_context(&ctx).unwrap();

        let instance = subresource.get(&vm1().key()).await.unwrap();

        assert_eq!(instance, StubStorage::canned());
        assert_eq!(stub.calls(), 1);
    }

    #[tokio::test]
    async fn test_update_returns_delegate_result_unmodified() {
        let stub = Arc::new(StubStorage::default());
        let subresource = SnapshotSubresource::new(stub.clone());

        let (instance, created) = subresource
            .update(&vm1().key(), UpdatedObjectInfo::replace(vm1()), false)
            .await
            .unwrap();

        assert_eq!(instance, StubStorage::canned());
        assert!(created);
        assert_eq!(stub.calls(), 1);
    }

    #[tokio::test]
    async fn test_missing_parent_storage_is_a_configuration_error() {
        let stub = StubStorage::default();
        let ctx = RequestContext::new();

        let result = SnapshotSubresource::from_context(&ctx);

        assert!(matches!(result, Err(Error::NoParentStorage)));
        assert_eq!(stub.calls(), 0);
    }

    #[tokio::test]
    async fn test_update_appends_snapshot_through_real_store() {
        let store = InMemoryInstanceStore::new_arc();
        let created = store.create(vm1()).await.unwrap();
        let subresource = SnapshotSubresource::new(store.clone());

        let (updated, was_created) = subresource
            .update(
                &created.key(),
                UpdatedObjectInfo::from_fn(|current| {
                    let current = current.cloned().ok_or(Error::not_found("default/vm1"))?;
                    Ok(current.with_snapshot(Snapshot {
                        name: "before-upgrade".to_string(),
                        generated: "2024-06-01T08:00:00Z".to_string(),
                        size: 20,
                    }))
                }),
                false,
            )
            .await
            .unwrap();

        assert!(!was_created);
        assert_eq!(updated.status.snapshots.len(), 1);
        assert_eq!(store.get(&created.key()).await.unwrap(), updated);
        assert_eq!(subresource.subresource_name(), "snapshot");
    }
}
