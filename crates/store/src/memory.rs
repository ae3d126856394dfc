//! In-memory instance store.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use itertools::Itertools;
use nimbus_core::{Instance, NamespacedName};
use tokio::sync::RwLock;

use crate::error::{Error, Result};
use crate::storage::{InstanceStorage, UpdatedObjectInfo};

#[derive(Debug, Default)]
struct State {
    objects: BTreeMap<NamespacedName, Instance>,
    revision: u64,
}

impl State {
    fn next_revision(&mut self) -> u64 {
        self.revision = self.revision.saturating_add(1);
        self.revision
    }
}

/// In-memory store with optimistic concurrency on `resource_version`.
#[derive(Debug, Default)]
pub struct InMemoryInstanceStore {
    state: RwLock<State>,
}

impl InMemoryInstanceStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new empty store wrapped in an Arc.
    pub fn new_arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.state.read().await.objects.len()
    }

    /// Whether the store holds no records.
    pub async fn is_empty(&self) -> bool {
        self.state.read().await.objects.is_empty()
    }
}

/// Fail when `incoming` carries a version other than the stored one.
fn check_version(key: &NamespacedName, incoming: u64, stored: u64) -> Result<()> {
    if incoming != 0 && incoming != stored {
        return Err(Error::conflict(key, incoming, stored));
    }
    Ok(())
}

/// An identity, once recorded, is owned by `update_status` alone.
fn keep_recorded_identity(updated: &mut Instance, stored: &Instance) {
    if stored.is_provisioned() {
        updated.status.instance_id.clone_from(&stored.status.instance_id);
        updated.status.status.clone_from(&stored.status.status);
    }
}

#[async_trait]
impl InstanceStorage for InMemoryInstanceStore {
    async fn get(&self, key: &NamespacedName) -> Result<Instance> {
        self.state
            .read()
            .await
            .objects
            .get(key)
            .cloned()
            .ok_or_else(|| Error::not_found(key))
    }

    async fn list(&self) -> Result<Vec<Instance>> {
        Ok(self.state.read().await.objects.values().cloned().collect_vec())
    }

    async fn create(&self, mut instance: Instance) -> Result<Instance> {
        let key = instance.key();
        let mut state = self.state.write().await;
        if state.objects.contains_key(&key) {
            return Err(Error::already_exists(&key));
        }

        instance.metadata.resource_version = state.next_revision();
        state.objects.insert(key, instance.clone());
        Ok(instance)
    }

    async fn update(
        &self,
        key: &NamespacedName,
        info: UpdatedObjectInfo,
        force_allow_create: bool,
    ) -> Result<(Instance, bool)> {
        let mut state = self.state.write().await;
        let current = state.objects.get(key).cloned();
        if current.is_none() && !force_allow_create {
            return Err(Error::not_found(key));
        }

        let mut updated = info.updated_object(current.as_ref())?;
        if updated.key() != *key {
            return Err(Error::update_rejected(
                key,
                format!("object is named '{}'", updated.key()),
            ));
        }
        if let Some(ref stored) = current {
            check_version(
                key,
                updated.metadata.resource_version,
                stored.metadata.resource_version,
            )?;
            keep_recorded_identity(&mut updated, stored);
        }

        updated.metadata.resource_version = state.next_revision();
        state.objects.insert(key.clone(), updated.clone());
        Ok((updated, current.is_none()))
    }

    async fn update_status(&self, instance: &Instance) -> Result<Instance> {
        let key = instance.key();
        let mut state = self.state.write().await;
        let revision = state.next_revision();
        let stored = state
            .objects
            .get_mut(&key)
            .ok_or_else(|| Error::not_found(&key))?;
        check_version(
            &key,
            instance.metadata.resource_version,
            stored.metadata.resource_version,
        )?;

        stored.status = instance.status.clone();
        stored.metadata.resource_version = revision;
        Ok(stored.clone())
    }
}
