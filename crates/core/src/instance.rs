//! The `Instance` desired-state record.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle values written to `status.status`.
pub mod phase {
    /// The provisioning service granted an identity.
    pub const CREATED: &str = "Created";
}

/// API group/version written on records created by Nimbus.
pub const API_VERSION: &str = "nimbus.io/v1";

/// Kind of the desired-state record.
pub const KIND: &str = "Instance";

/// Derive the name of the backing resource for an owner and record name.
///
/// The key is the only thing tying a record to its backing resource, so it
/// must depend on nothing but these two stable fields.
#[must_use]
pub fn backing_resource_key(owner: &str, name: &str) -> String {
    format!("{owner}-{name}")
}

/// Namespaced identity of a record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NamespacedName {
    /// Namespace, empty for cluster-scoped records.
    #[serde(default)]
    pub namespace: String,
    /// Record name.
    pub name: String,
}

impl NamespacedName {
    /// Create a new namespaced name.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for NamespacedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}/{}", self.namespace, self.name)
        }
    }
}

/// Type information carried by manifests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeMeta {
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_kind")]
    pub kind: String,
}

impl Default for TypeMeta {
    fn default() -> Self {
        Self {
            api_version: default_api_version(),
            kind: default_kind(),
        }
    }
}

fn default_api_version() -> String {
    API_VERSION.to_string()
}

fn default_kind() -> String {
    KIND.to_string()
}

/// Object metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    /// Version assigned by the store on every write; zero means unset.
    #[serde(default, skip_serializing_if = "is_zero_u64")]
    pub resource_version: u64,
}

/// Requested sizing of the compute resource.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    #[serde(default, skip_serializing_if = "is_zero_i64")]
    pub cpu_limit: i64,
    #[serde(default, skip_serializing_if = "is_zero_i64")]
    pub ram_limit: i64,
    #[serde(default, skip_serializing_if = "is_zero_i64")]
    pub disk_limit: i64,
}

/// Who owns the instance and which OS image it runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub owner: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub os: String,
}

/// Desired state of an instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceSpec {
    #[serde(default)]
    pub resource: Resource,
    #[serde(default)]
    pub environment: Environment,
}

impl InstanceSpec {
    /// Create a spec from its fields.
    pub fn new(
        owner: impl Into<String>,
        os: impl Into<String>,
        cpu_limit: i64,
        ram_limit: i64,
        disk_limit: i64,
    ) -> Self {
        Self {
            resource: Resource {
                cpu_limit,
                ram_limit,
                disk_limit,
            },
            environment: Environment {
                owner: owner.into(),
                os: os.into(),
            },
        }
    }
}

/// Point-in-time capture of an instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub generated: String,
    #[serde(default, skip_serializing_if = "is_zero_i64")]
    pub size: i64,
}

/// Observed state of an instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceStatus {
    /// Identity assigned by the provisioning service.
    #[serde(rename = "instanceID", default, skip_serializing_if = "String::is_empty")]
    pub instance_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub status: String,
    #[serde(default)]
    pub snapshots: Vec<Snapshot>,
}

/// Desired-state record tracked to convergence by the reconciler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    #[serde(flatten)]
    pub type_meta: TypeMeta,
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: InstanceSpec,
    #[serde(default)]
    pub status: InstanceStatus,
}

impl Instance {
    /// Create a new record with an empty status.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, spec: InstanceSpec) -> Self {
        Self {
            type_meta: TypeMeta::default(),
            metadata: ObjectMeta {
                name: name.into(),
                namespace: namespace.into(),
                resource_version: 0,
            },
            spec,
            status: InstanceStatus::default(),
        }
    }

    /// Identity of this record in the store.
    #[must_use]
    pub fn key(&self) -> NamespacedName {
        NamespacedName::new(&self.metadata.namespace, &self.metadata.name)
    }

    /// Record name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Owner from the environment descriptor.
    #[must_use]
    pub fn owner(&self) -> &str {
        &self.spec.environment.owner
    }

    /// Name of the backing resource that fulfils this record.
    #[must_use]
    pub fn backing_resource_key(&self) -> String {
        backing_resource_key(self.owner(), self.name())
    }

    /// Whether an identity has already been recorded.
    #[must_use]
    pub fn is_provisioned(&self) -> bool {
        !self.status.instance_id.is_empty()
    }

    /// Record the identity granted by the provisioning service.
    pub fn record_identity(&mut self, instance_id: impl Into<String>) {
        self.status.instance_id = instance_id.into();
        self.status.status = phase::CREATED.to_string();
    }

    /// Append a snapshot to the status.
    #[must_use]
    pub fn with_snapshot(mut self, snapshot: Snapshot) -> Self {
        self.status.snapshots.push(snapshot);
        self
    }
}

#[allow(clippy::trivially_copy_pass_by_ref)]
const fn is_zero_i64(value: &i64) -> bool {
    *value == 0
}

#[allow(clippy::trivially_copy_pass_by_ref)]
const fn is_zero_u64(value: &u64) -> bool {
    *value == 0
}
