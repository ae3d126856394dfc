//! Wire types exchanged with the provisioning service.

use std::fmt;

use nimbus_core::Instance;
use serde::{Deserialize, Serialize};

/// Description sent with every creation request.
pub const REQUEST_DESCRIPTION: &str = "post request from nimbus";

/// Body of `POST /note`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceCreationRequest {
    pub name: String,
    pub owner: String,
    pub description: String,
    pub os: String,
    pub cpu_size: i64,
    pub ram_size: i64,
    pub disk_size: i64,
}

impl From<&Instance> for InstanceCreationRequest {
    fn from(instance: &Instance) -> Self {
        Self {
            name: instance.name().to_string(),
            owner: instance.owner().to_string(),
            description: REQUEST_DESCRIPTION.to_string(),
            os: instance.spec.environment.os.clone(),
            cpu_size: instance.spec.resource.cpu_limit,
            ram_size: instance.spec.resource.ram_limit,
            disk_size: instance.spec.resource.disk_limit,
        }
    }
}

/// Response to a creation request. Fields other than `UUID` are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceCreationResponse {
    #[serde(rename = "UUID")]
    pub uuid: String,
}

/// Identity the provisioning service assigned to a backing resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceIdentity(String);

impl InstanceIdentity {
    /// Wrap an identity string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identity.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Take the identity string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for InstanceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use nimbus_core::InstanceSpec;

    #[test]
    fn test_request_from_instance() {
        let instance = Instance::new(
            "default",
            "vm1",
            InstanceSpec::new("alice", "ubuntu22", 2, 4, 20),
        );

        let value = serde_json::to_value(InstanceCreationRequest::from(&instance)).unwrap();

        assert_eq!(
            value,
            serde_json::json!({
                "name": "vm1",
                "owner": "alice",
                "description": REQUEST_DESCRIPTION,
                "os": "ubuntu22",
                "cpuSize": 2,
                "ramSize": 4,
                "diskSize": 20
            })
        );
    }

    #[test]
    fn test_response_ignores_extra_fields() {
        let response: InstanceCreationResponse =
            serde_json::from_str(r#"{"UUID": "uuid-123", "name": "vm1", "state": "BUILDING"}"#)
                .unwrap();

        assert_eq!(response.uuid, "uuid-123");
    }
}
