//! Runtime layer that hosts backing resources.
//!
//! The reconciler only ever looks backing resources up. It never creates,
//! updates or deletes them directly.

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::Result;

/// A backing resource as reported by the runtime layer.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BackingResource {
    pub namespace: String,
    pub name: String,
}

impl BackingResource {
    /// Create a new backing resource reference.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

/// Answers whether a backing resource exists.
#[async_trait]
pub trait BackingResourceLookup: Send + Sync {
    /// Look up a backing resource by namespace and deterministic name.
    ///
    /// Returns `Ok(None)` when the resource does not exist.
    ///
    /// # Errors
    ///
    /// Returns `Error::Lookup` when the runtime layer cannot answer.
    async fn lookup(&self, namespace: &str, name: &str) -> Result<Option<BackingResource>>;
}

/// In-memory runtime layer.
#[derive(Debug, Default)]
pub struct InMemoryRuntime {
    resources: RwLock<BTreeSet<BackingResource>>,
}

impl InMemoryRuntime {
    /// Create an empty runtime.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backing resource.
    pub async fn insert(&self, resource: BackingResource) {
        self.resources.write().await.insert(resource);
    }

    /// Remove a backing resource, returning whether it existed.
    pub async fn remove(&self, resource: &BackingResource) -> bool {
        self.resources.write().await.remove(resource)
    }

    /// Number of registered backing resources.
    pub async fn len(&self) -> usize {
        self.resources.read().await.len()
    }

    /// Whether no backing resources are registered.
    pub async fn is_empty(&self) -> bool {
        self.resources.read().await.is_empty()
    }
}

#[async_trait]
impl BackingResourceLookup for InMemoryRuntime {
    async fn lookup(&self, namespace: &str, name: &str) -> Result<Option<BackingResource>> {
        let wanted = BackingResource::new(namespace, name);
        Ok(self.resources.read().await.get(&wanted).cloned())
    }
}
