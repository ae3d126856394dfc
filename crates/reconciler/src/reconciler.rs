//! Reconciler implementation.

use std::sync::Arc;

use nimbus_core::{Instance, NamespacedName};
use nimbus_provisioner::ProvisioningClient;
use nimbus_store::InstanceStorage;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::runtime::BackingResourceLookup;
use crate::types::ReconcileOutcome;

/// Configuration for the reconciler.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Whether to write a granted identity back to the store.
    pub persist_status: bool,
    /// Attempts at writing the identity when the record changed concurrently.
    pub status_write_attempts: u32,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            persist_status: true,
            status_write_attempts: 3,
        }
    }
}

/// K8s-style reconciler that drives `Instance` records toward having a
/// backing resource.
///
/// A pass creates at most one backing resource, keyed by the record's
/// deterministic `{owner}-{name}`, and never updates or deletes one.
pub struct Reconciler {
    /// Store owning the instance records.
    store: Arc<dyn InstanceStorage>,
    /// Runtime layer hosting backing resources.
    runtime: Arc<dyn BackingResourceLookup>,
    /// Client for the provisioning service.
    provisioner: Arc<dyn ProvisioningClient>,
    /// Configuration.
    config: ReconcilerConfig,
}

impl Reconciler {
    /// Create a new reconciler.
    pub fn new(
        store: Arc<dyn InstanceStorage>,
        runtime: Arc<dyn BackingResourceLookup>,
        provisioner: Arc<dyn ProvisioningClient>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            store,
            runtime,
            provisioner,
            config,
        }
    }

    /// Run one reconciliation pass for the record under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error classified by [`Error::retry_class`]. The record's
    /// status is never changed when an error is returned before the
    /// provisioning service granted an identity.
    pub async fn reconcile(&self, key: &NamespacedName) -> Result<ReconcileOutcome> {
        debug!(record = %key, "Starting reconciliation");

        let mut instance = match self.store.get(key).await {
            Ok(instance) => instance,
            Err(e) if e.is_not_found() => {
                info!(record = %key, "Instance not found, nothing to reconcile");
                return Ok(ReconcileOutcome::record_gone());
            }
            Err(e) => {
                warn!(record = %key, error = %e, "Failed to load instance");
                return Err(Error::record_load(key, e.to_string()));
            }
        };

        if instance.is_provisioned() {
            debug!(
                record = %key,
                instance_id = %instance.status.instance_id,
                "Identity already recorded"
            );
            return Ok(ReconcileOutcome::already_provisioned(instance));
        }

        let backing_key = instance.backing_resource_key();
        let found = self
            .runtime
            .lookup(&key.namespace, &backing_key)
            .await
            .inspect_err(|e| warn!(record = %key, error = %e, "Failed to look up backing resource"))?;

        if found.is_some() {
            debug!(record = %key, backing_resource = %backing_key, "Backing resource exists");
            return Ok(ReconcileOutcome::backing_resource_found(instance));
        }

        instance.validate().map_err(Error::Validation)?;

        info!(record = %key, backing_resource = %backing_key, "Creating backing resource");
        let identity = self
            .provisioner
            .create_backing_resource(&instance)
            .await
            .map_err(|source| {
                warn!(
                    record = %key,
                    backing_resource = %backing_key,
                    error = %source,
                    retry = %source.retry_class(),
                    "Failed to create backing resource"
                );
                Error::provisioning(key, source)
            })?;

        info!(record = %key, instance_id = %identity, "Backing resource created");
        instance.record_identity(identity.as_str());

        if self.config.persist_status {
            instance = self.persist_identity(instance).await?;
        }

        Ok(ReconcileOutcome::created(instance))
    }

    /// Write the identity recorded on `instance` back to the store.
    ///
    /// A conflict means someone else wrote the record since it was loaded.
    /// The identity is re-applied onto the latest version unless that
    /// version already carries an identity of its own.
    async fn persist_identity(&self, instance: Instance) -> Result<Instance> {
        let key = instance.key();
        let identity = instance.status.instance_id.clone();
        let mut candidate = instance;
        let mut attempt = 0u32;

        loop {
            attempt = attempt.saturating_add(1);

            match self.store.update_status(&candidate).await {
                Ok(stored) => return Ok(stored),
                Err(e) if e.is_conflict() && attempt < self.config.status_write_attempts => {
                    debug!(record = %key, attempt, "Status write conflicted, re-reading");
                    let latest = self
                        .store
                        .get(&key)
                        .await
                        .map_err(|e| Error::status_write(&key, &identity, e.to_string()))?;

                    if latest.is_provisioned() {
                        warn!(
                            record = %key,
                            granted = %identity,
                            recorded = %latest.status.instance_id,
                            "Record already carries an identity, keeping it"
                        );
                        return Ok(latest);
                    }

                    let status = candidate.status;
                    candidate = latest;
                    candidate.status.instance_id = status.instance_id;
                    candidate.status.status = status.status;
                }
                Err(e) => {
                    warn!(record = %key, error = %e, "Failed to record identity");
                    return Err(Error::status_write(&key, &identity, e.to_string()));
                }
            }
        }
    }

    /// Get the configuration.
    pub const fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Get the store the reconciler reads from.
    pub fn store(&self) -> &Arc<dyn InstanceStorage> {
        &self.store
    }
}

/// Builder for Reconciler.
pub struct ReconcilerBuilder {
    store: Option<Arc<dyn InstanceStorage>>,
    runtime: Option<Arc<dyn BackingResourceLookup>>,
    provisioner: Option<Arc<dyn ProvisioningClient>>,
    config: ReconcilerConfig,
}

impl ReconcilerBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            store: None,
            runtime: None,
            provisioner: None,
            config: ReconcilerConfig::default(),
        }
    }

    /// Set the instance store.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn InstanceStorage>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the runtime layer.
    #[must_use]
    pub fn with_runtime(mut self, runtime: Arc<dyn BackingResourceLookup>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Set the provisioning client.
    #[must_use]
    pub fn with_provisioner(mut self, provisioner: Arc<dyn ProvisioningClient>) -> Self {
        self.provisioner = Some(provisioner);
        self
    }

    /// Set the configuration.
    #[must_use]
    pub fn with_config(mut self, config: ReconcilerConfig) -> Self {
        self.config = config;
        self
    }

    /// Enable/disable writing identities back to the store.
    #[must_use]
    pub const fn persist_status(mut self, enabled: bool) -> Self {
        self.config.persist_status = enabled;
        self
    }

    /// Build the reconciler.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] when a collaborator is missing.
    pub fn build(self) -> Result<Reconciler> {
        let store = self
            .store
            .ok_or_else(|| Error::invalid_config("Instance store is required"))?;
        let runtime = self
            .runtime
            .ok_or_else(|| Error::invalid_config("Runtime lookup is required"))?;
        let provisioner = self
            .provisioner
            .ok_or_else(|| Error::invalid_config("Provisioning client is required"))?;

        if self.config.status_write_attempts == 0 {
            return Err(Error::invalid_config(
                "status_write_attempts must be at least 1",
            ));
        }

        Ok(Reconciler::new(store, runtime, provisioner, self.config))
    }
}

impl Default for ReconcilerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use nimbus_core::{InstanceSpec, RetryClass, Snapshot, phase};
    use nimbus_provisioner::InstanceIdentity;
    use nimbus_store::{InMemoryInstanceStore, SnapshotSubresource, UpdatedObjectInfo};
    use proptest::prelude::*;

    use super::*;
    use crate::runtime::{BackingResource, InMemoryRuntime};
    use crate::testing::{ScriptedProvisioner, vm1};
    use crate::types::ReconcileState;

    /// Runtime layer that cannot be reached.
    struct UnreachableRuntime;

    #[async_trait]
    impl BackingResourceLookup for UnreachableRuntime {
        async fn lookup(&self, _namespace: &str, name: &str) -> Result<Option<BackingResource>> {
            Err(Error::lookup(name, "connection reset"))
        }
    }

    /// Store whose reads fail.
    struct UnavailableStore;

    #[async_trait]
    impl InstanceStorage for UnavailableStore {
        async fn get(&self, _key: &NamespacedName) -> nimbus_store::Result<Instance> {
            Err(nimbus_store::Error::unavailable("etcd leader lost"))
        }

        async fn list(&self) -> nimbus_store::Result<Vec<Instance>> {
            Err(nimbus_store::Error::unavailable("etcd leader lost"))
        }

        async fn create(&self, _instance: Instance) -> nimbus_store::Result<Instance> {
            Err(nimbus_store::Error::unavailable("etcd leader lost"))
        }

        async fn update(
            &self,
            _key: &NamespacedName,
            _info: UpdatedObjectInfo,
            _force_allow_create: bool,
        ) -> nimbus_store::Result<(Instance, bool)> {
            Err(nimbus_store::Error::unavailable("etcd leader lost"))
        }

        async fn update_status(&self, _instance: &Instance) -> nimbus_store::Result<Instance> {
            Err(nimbus_store::Error::unavailable("etcd leader lost"))
        }
    }

    async fn setup(
        provisioner: Arc<ScriptedProvisioner>,
    ) -> (Reconciler, Arc<InMemoryInstanceStore>, Arc<InMemoryRuntime>) {
        let store = InMemoryInstanceStore::new_arc();
        store.create(vm1()).await.unwrap();
        let runtime = Arc::new(InMemoryRuntime::new());
        let reconciler = ReconcilerBuilder::new()
            .with_store(store.clone())
            .with_runtime(runtime.clone())
            .with_provisioner(provisioner)
            .build()
            .unwrap();
        (reconciler, store, runtime)
    }

    #[tokio::test]
    async fn test_first_pass_creates_and_records_identity() {
        let provisioner = ScriptedProvisioner::granting("uuid-123");
        let (reconciler, store, _) = setup(provisioner.clone()).await;

        let outcome = reconciler.reconcile(&vm1().key()).await.unwrap();

        assert_eq!(outcome.state, ReconcileState::Created);
        assert!(outcome.requeue);
        let instance = outcome.instance.unwrap();
        assert_eq!(instance.status.instance_id, "uuid-123");
        assert_eq!(instance.status.status, phase::CREATED);
        assert_eq!(store.get(&vm1().key()).await.unwrap(), instance);
        assert_eq!(provisioner.calls(), 1);
    }

    #[tokio::test]
    async fn test_second_pass_does_not_create_again() {
        // GIVEN: a pass already granted an identity and the runtime still
        // reports no backing resource
        let provisioner = ScriptedProvisioner::new(vec![
            Ok(InstanceIdentity::new("uuid-123")),
            Ok(InstanceIdentity::new("uuid-456")),
        ]);
        let (reconciler, store, runtime) = setup(provisioner.clone()).await;
        reconciler.reconcile(&vm1().key()).await.unwrap();
        let after_first = store.get(&vm1().key()).await.unwrap();

        // WHEN: the record is reconciled again
        let outcome = reconciler.reconcile(&vm1().key()).await.unwrap();

        // THEN: the client is not called and the status is unchanged
        assert_eq!(outcome.state, ReconcileState::AlreadyProvisioned);
        assert!(outcome.is_converged());
        assert_eq!(provisioner.calls(), 1);
        assert!(runtime.is_empty().await);
        assert_eq!(store.get(&vm1().key()).await.unwrap(), after_first);
    }

    #[tokio::test]
    async fn test_found_backing_resource_short_circuits() {
        let provisioner = ScriptedProvisioner::granting("uuid-123");
        let (reconciler, store, runtime) = setup(provisioner.clone()).await;
        runtime
            .insert(BackingResource::new("default", "alice-vm1"))
            .await;

        let outcome = reconciler.reconcile(&vm1().key()).await.unwrap();

        assert_eq!(outcome.state, ReconcileState::BackingResourceFound);
        assert!(!outcome.requeue);
        assert_eq!(provisioner.calls(), 0);
        assert!(!store.get(&vm1().key()).await.unwrap().is_provisioned());
    }

    #[tokio::test]
    async fn test_missing_record_is_terminal_success() {
        let provisioner = ScriptedProvisioner::granting("uuid-123");
        let (reconciler, _, _) = setup(provisioner.clone()).await;

        let outcome = reconciler
            .reconcile(&NamespacedName::new("default", "ghost"))
            .await
            .unwrap();

        assert_eq!(outcome, ReconcileOutcome::record_gone());
        assert_eq!(provisioner.calls(), 0);
    }

    #[tokio::test]
    async fn test_failed_provisioning_leaves_status_untouched() {
        let provisioner = ScriptedProvisioner::new(vec![Err(
            nimbus_provisioner::Error::transport("connection refused"),
        )]);
        let (reconciler, store, _) = setup(provisioner.clone()).await;
        let before = store.get(&vm1().key()).await.unwrap();

        let result = reconciler.reconcile(&vm1().key()).await;

        let error = result.err().expect("provisioning should fail");
        assert!(matches!(error, Error::Provisioning { .. }));
        assert_eq!(error.retry_class(), RetryClass::Fast);
        let after = store.get(&vm1().key()).await.unwrap();
        assert_eq!(after, before);
        assert!(after.status.instance_id.is_empty());
    }

    #[tokio::test]
    async fn test_rejected_provisioning_is_slow_retry() {
        let provisioner = ScriptedProvisioner::new(vec![Err(
            nimbus_provisioner::Error::rejected(422, "unknown image"),
        )]);
        let (reconciler, _, _) = setup(provisioner).await;

        let result = reconciler.reconcile(&vm1().key()).await;

        assert_eq!(result.err().map(|e| e.retry_class()), Some(RetryClass::Slow));
    }

    #[tokio::test]
    async fn test_invalid_spec_is_never_provisioned() {
        let provisioner = ScriptedProvisioner::granting("uuid-123");
        let (reconciler, store, _) = setup(provisioner.clone()).await;
        let bad = Instance::new("default", "bad", InstanceSpec::new("alice", "", 0, 4, 20));
        store.create(bad.clone()).await.unwrap();

        let result = reconciler.reconcile(&bad.key()).await;

        assert!(matches!(result, Err(Error::Validation(_))));
        assert_eq!(result.err().map(|e| e.is_retryable()), Some(false));
        assert_eq!(provisioner.calls(), 0);
    }

    #[tokio::test]
    async fn test_invalid_spec_with_existing_backing_resource_is_found() {
        let provisioner = ScriptedProvisioner::granting("uuid-123");
        let (reconciler, store, runtime) = setup(provisioner.clone()).await;
        let bad = Instance::new("default", "bad", InstanceSpec::new("alice", "", 0, 4, 20));
        store.create(bad.clone()).await.unwrap();
        runtime
            .insert(BackingResource::new("default", "alice-bad"))
            .await;

        let outcome = reconciler.reconcile(&bad.key()).await.unwrap();

        assert_eq!(outcome.state, ReconcileState::BackingResourceFound);
        assert_eq!(provisioner.calls(), 0);
    }

    #[tokio::test]
    async fn test_lookup_error_is_retryable_without_mutation() {
        let provisioner = ScriptedProvisioner::granting("uuid-123");
        let store = InMemoryInstanceStore::new_arc();
        store.create(vm1()).await.unwrap();
        let reconciler = Reconciler::new(
            store.clone(),
            Arc::new(UnreachableRuntime),
            provisioner.clone(),
            ReconcilerConfig::default(),
        );

        let result = reconciler.reconcile(&vm1().key()).await;

        assert!(matches!(result, Err(Error::Lookup { .. })));
        assert_eq!(provisioner.calls(), 0);
        assert!(!store.get(&vm1().key()).await.unwrap().is_provisioned());
    }

    #[tokio::test]
    async fn test_load_error_is_retryable() {
        let provisioner = ScriptedProvisioner::granting("uuid-123");
        let reconciler = Reconciler::new(
            Arc::new(UnavailableStore),
            Arc::new(InMemoryRuntime::new()),
            provisioner.clone(),
            ReconcilerConfig::default(),
        );

        let result = reconciler.reconcile(&vm1().key()).await;

        assert!(matches!(result, Err(Error::RecordLoad { .. })));
        assert_eq!(result.err().map(|e| e.retry_class()), Some(RetryClass::Fast));
        assert_eq!(provisioner.calls(), 0);
    }

    #[tokio::test]
    async fn test_without_persistence_only_memory_is_mutated() {
        let provisioner = ScriptedProvisioner::granting("uuid-123");
        let store = InMemoryInstanceStore::new_arc();
        store.create(vm1()).await.unwrap();
        let reconciler = ReconcilerBuilder::new()
            .with_store(store.clone())
            .with_runtime(Arc::new(InMemoryRuntime::new()))
            .with_provisioner(provisioner)
            .persist_status(false)
            .build()
            .unwrap();

        let outcome = reconciler.reconcile(&vm1().key()).await.unwrap();

        assert_eq!(
            outcome.instance.map(|i| i.status.instance_id),
            Some("uuid-123".to_string())
        );
        assert!(!store.get(&vm1().key()).await.unwrap().is_provisioned());
    }

    /// Store that lets one concurrent write slip in before the first status
    /// write, like a snapshot update racing the reconciler.
    struct RacingStore {
        inner: InMemoryInstanceStore,
        raced: AtomicUsize,
    }

    #[async_trait]
    impl InstanceStorage for RacingStore {
        async fn get(&self, key: &NamespacedName) -> nimbus_store::Result<Instance> {
            self.inner.get(key).await
        }

        async fn list(&self) -> nimbus_store::Result<Vec<Instance>> {
            self.inner.list().await
        }

        async fn create(&self, instance: Instance) -> nimbus_store::Result<Instance> {
            self.inner.create(instance).await
        }

        async fn update(
            &self,
            key: &NamespacedName,
            info: UpdatedObjectInfo,
            force_allow_create: bool,
        ) -> nimbus_store::Result<(Instance, bool)> {
            self.inner.update(key, info, force_allow_create).await
        }

        async fn update_status(&self, instance: &Instance) -> nimbus_store::Result<Instance> {
            if self.raced.fetch_add(1, Ordering::SeqCst) == 0 {
                let key = instance.key();
                self.inner
                    .update(
                        &key,
                        UpdatedObjectInfo::from_fn(|current| {
                            let current = current
                                .cloned()
                                .ok_or(nimbus_store::Error::not_found("racing"))?;
                            Ok(current.with_snapshot(Snapshot {
                                name: "racing-snapshot".to_string(),
                                ..Snapshot::default()
                            }))
                        }),
                        false,
                    )
                    .await?;
            }
            self.inner.update_status(instance).await
        }
    }

    #[tokio::test]
    async fn test_status_write_conflict_reapplies_identity_on_latest() {
        let store = Arc::new(RacingStore {
            inner: InMemoryInstanceStore::new(),
            raced: AtomicUsize::new(0),
        });
        store.create(vm1()).await.unwrap();
        let provisioner = ScriptedProvisioner::granting("uuid-123");
        let reconciler = Reconciler::new(
            store.clone(),
            Arc::new(InMemoryRuntime::new()),
            provisioner.clone(),
            ReconcilerConfig::default(),
        );

        let outcome = reconciler.reconcile(&vm1().key()).await.unwrap();

        let stored = store.get(&vm1().key()).await.unwrap();
        assert_eq!(stored.status.instance_id, "uuid-123");
        assert_eq!(stored.status.snapshots.len(), 1);
        assert_eq!(outcome.instance, Some(stored));
        assert_eq!(provisioner.calls(), 1);
    }

    #[tokio::test]
    async fn test_snapshot_update_after_creation_does_not_recreate() {
        let provisioner = ScriptedProvisioner::new(vec![
            Ok(InstanceIdentity::new("uuid-123")),
            Ok(InstanceIdentity::new("uuid-456")),
        ]);
        let (reconciler, store, _) = setup(provisioner.clone()).await;
        reconciler.reconcile(&vm1().key()).await.unwrap();

        SnapshotSubresource::new(store.clone())
            .update(
                &vm1().key(),
                UpdatedObjectInfo::replace(vm1().with_snapshot(Snapshot {
                    name: "after-create".to_string(),
                    ..Snapshot::default()
                })),
                false,
            )
            .await
            .unwrap();
        let outcome = reconciler.reconcile(&vm1().key()).await.unwrap();

        assert_eq!(outcome.state, ReconcileState::AlreadyProvisioned);
        assert_eq!(provisioner.calls(), 1);
        let stored = store.get(&vm1().key()).await.unwrap();
        assert_eq!(stored.status.instance_id, "uuid-123");
        assert_eq!(stored.status.status, phase::CREATED);
        assert_eq!(stored.status.snapshots.len(), 1);
    }

    #[test]
    fn test_builder_requires_collaborators() {
        let result = ReconcilerBuilder::new()
            .with_runtime(Arc::new(InMemoryRuntime::new()))
            .build();

        assert!(matches!(result, Err(Error::InvalidConfig { .. })));
    }

    #[test]
    fn test_builder_rejects_zero_write_attempts() {
        let result = ReconcilerBuilder::new()
            .with_store(InMemoryInstanceStore::new_arc())
            .with_runtime(Arc::new(InMemoryRuntime::new()))
            .with_provisioner(ScriptedProvisioner::granting("uuid-1"))
            .with_config(ReconcilerConfig {
                status_write_attempts: 0,
                ..Default::default()
            })
            .build();

        assert!(matches!(result, Err(Error::InvalidConfig { .. })));
    }

    proptest! {
        /// Property: the backing resource key depends only on owner and name
        #[test]
        fn prop_backing_resource_key_is_stable(
            owner in "[a-z][a-z0-9]{0,15}",
            name in "[a-z][a-z0-9]{0,15}",
            cpu in 1i64..64,
        ) {
            let first = Instance::new("default", &name, InstanceSpec::new(&owner, "ubuntu22", cpu, 4, 20));
            let mut second = Instance::new("other", &name, InstanceSpec::new(&owner, "debian12", 1, 1, 1));
            second.record_identity("uuid-x");

            prop_assert_eq!(first.backing_resource_key(), second.backing_resource_key());
            prop_assert_eq!(first.backing_resource_key(), format!("{owner}-{name}"));
        }
    }
}
