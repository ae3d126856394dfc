//! Test doubles shared by the engine and loop tests.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use nimbus_core::{Instance, InstanceSpec};
use nimbus_provisioner::{InstanceIdentity, ProvisioningClient};
use tokio::sync::Mutex;

/// Provisioning client that replays scripted answers and counts calls.
///
/// Once the script runs out every call fails with a transport error.
pub struct ScriptedProvisioner {
    answers: Mutex<VecDeque<nimbus_provisioner::Result<InstanceIdentity>>>,
    calls: AtomicUsize,
}

impl ScriptedProvisioner {
    pub fn new(answers: Vec<nimbus_provisioner::Result<InstanceIdentity>>) -> Arc<Self> {
        Arc::new(Self {
            answers: Mutex::new(answers.into()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn granting(id: &str) -> Arc<Self> {
        Self::new(vec![Ok(InstanceIdentity::new(id))])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProvisioningClient for ScriptedProvisioner {
    async fn create_backing_resource(
        &self,
        _instance: &Instance,
    ) -> nimbus_provisioner::Result<InstanceIdentity> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answers
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Err(nimbus_provisioner::Error::transport("script exhausted")))
    }
}

pub fn vm1() -> Instance {
    Instance::new(
        "default",
        "vm1",
        InstanceSpec::new("alice", "ubuntu22", 2, 4, 20),
    )
}
