//! Per-request context handed to subresources.

use std::fmt;
use std::sync::Arc;

use crate::storage::InstanceStorage;

/// Values attached to a single API request.
#[derive(Clone, Default)]
pub struct RequestContext {
    parent_storage: Option<Arc<dyn InstanceStorage>>,
}

impl RequestContext {
    /// Create an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the storage that owns the primary resource.
    #[must_use]
    pub fn with_parent_storage(mut self, storage: Arc<dyn InstanceStorage>) -> Self {
        self.parent_storage = Some(storage);
        self
    }

    /// Storage that owns the primary resource, if attached.
    #[must_use]
    pub fn parent_storage(&self) -> Option<&Arc<dyn InstanceStorage>> {
        self.parent_storage.as_ref()
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("parent_storage", &self.parent_storage.is_some())
            .finish()
    }
}
