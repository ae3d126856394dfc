//! Core types for the reconciler.

use std::fmt;

use nimbus_core::Instance;
use serde::{Deserialize, Serialize};

/// Where a single pass left the record, from the engine's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReconcileState {
    /// The record no longer exists; nothing to converge.
    RecordGone,
    /// An identity is already recorded; creation is never repeated.
    AlreadyProvisioned,
    /// The backing resource exists in the runtime layer.
    BackingResourceFound,
    /// The provisioning service granted an identity during this pass.
    Created,
}

impl fmt::Display for ReconcileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RecordGone => write!(f, "record gone"),
            Self::AlreadyProvisioned => write!(f, "already provisioned"),
            Self::BackingResourceFound => write!(f, "backing resource found"),
            Self::Created => write!(f, "created"),
        }
    }
}

/// Result of one reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// What the pass observed or did.
    pub state: ReconcileState,
    /// Whether the record should be reconciled again to confirm convergence.
    pub requeue: bool,
    /// The record as the pass left it, absent when it was gone.
    pub instance: Option<Instance>,
}

impl ReconcileOutcome {
    /// The record was deleted or never existed.
    #[must_use]
    pub const fn record_gone() -> Self {
        Self {
            state: ReconcileState::RecordGone,
            requeue: false,
            instance: None,
        }
    }

    /// The record already carries an identity.
    #[must_use]
    pub const fn already_provisioned(instance: Instance) -> Self {
        Self {
            state: ReconcileState::AlreadyProvisioned,
            requeue: false,
            instance: Some(instance),
        }
    }

    /// The backing resource already exists.
    #[must_use]
    pub const fn backing_resource_found(instance: Instance) -> Self {
        Self {
            state: ReconcileState::BackingResourceFound,
            requeue: false,
            instance: Some(instance),
        }
    }

    /// A backing resource was created during this pass.
    #[must_use]
    pub const fn created(instance: Instance) -> Self {
        Self {
            state: ReconcileState::Created,
            requeue: true,
            instance: Some(instance),
        }
    }

    /// Whether no further action is needed.
    #[must_use]
    pub const fn is_converged(&self) -> bool {
        !self.requeue
    }
}
