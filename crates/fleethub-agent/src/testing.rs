//! In-memory hub used by the agent's tests

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding};
use kube::ResourceExt;

use fleethub_common::crd::{
    Condition, ConditionStatus, KlusterletConfig, ManagedCluster, ManagedClusterSpec,
    ManagedClusterStatus, CONDITION_AVAILABLE,
};
use fleethub_common::Error;

use crate::client::HubClient;

/// Stateful fake hub recording every write it receives
#[derive(Default)]
pub struct FakeHub {
    secrets: Mutex<BTreeMap<(String, String), Secret>>,
    configs: Mutex<BTreeMap<String, KlusterletConfig>>,
    clusters: Mutex<BTreeMap<String, ManagedCluster>>,
    roles: Mutex<BTreeMap<String, ClusterRole>>,
    bindings: Mutex<BTreeMap<String, ClusterRoleBinding>>,
    writes: Mutex<Vec<String>>,
    conflicts: AtomicU32,
    failing_reads: AtomicU32,
}

impl FakeHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a cluster accepting its hub with the given Available status
    pub fn with_cluster(self, name: &str, available: ConditionStatus) -> Self {
        let mut mc = ManagedCluster::new(
            name,
            ManagedClusterSpec {
                hub_accepts_client: true,
                ..Default::default()
            },
        );
        mc.status = Some(ManagedClusterStatus {
            conditions: vec![Condition::new(CONDITION_AVAILABLE, available)],
        });
        self.clusters.lock().unwrap().insert(name.to_string(), mc);
        self
    }

    pub fn set_availability(&self, name: &str, available: ConditionStatus) {
        if let Some(mc) = self.clusters.lock().unwrap().get_mut(name) {
            mc.status = Some(ManagedClusterStatus {
                conditions: vec![Condition::new(CONDITION_AVAILABLE, available)],
            });
        }
    }

    pub fn cluster(&self, name: &str) -> Option<ManagedCluster> {
        self.clusters.lock().unwrap().get(name).cloned()
    }

    pub fn secret(&self, name: &str, namespace: &str) -> Option<Secret> {
        self.secrets
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn klusterlet_config(&self, name: &str) -> Option<KlusterletConfig> {
        self.configs.lock().unwrap().get(name).cloned()
    }

    pub fn role(&self, name: &str) -> Option<ClusterRole> {
        self.roles.lock().unwrap().get(name).cloned()
    }

    pub fn binding(&self, name: &str) -> Option<ClusterRoleBinding> {
        self.bindings.lock().unwrap().get(name).cloned()
    }

    /// Every write so far, as `verb:name`
    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().unwrap().clone()
    }

    pub fn clear_writes(&self) {
        self.writes.lock().unwrap().clear();
    }

    /// Make the next `n` cluster replaces fail with 409
    pub fn inject_conflicts(&self, n: u32) {
        self.conflicts.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` cluster reads fail with 500
    pub fn inject_read_failures(&self, n: u32) {
        self.failing_reads.store(n, Ordering::SeqCst);
    }

    fn record(&self, write: String) {
        self.writes.lock().unwrap().push(write);
    }

    fn take(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

pub fn api_error(code: u16) -> Error {
    Error::from(kube::Error::Api(kube::error::ErrorResponse {
        status: "Failure".to_string(),
        message: "injected".to_string(),
        reason: "Injected".to_string(),
        code,
    }))
}

#[async_trait]
impl HubClient for FakeHub {
    async fn get_secret(&self, name: &str, namespace: &str) -> Result<Option<Secret>, Error> {
        Ok(self.secret(name, namespace))
    }

    async fn create_secret(&self, secret: &Secret) -> Result<(), Error> {
        let key = (secret.namespace().unwrap_or_default(), secret.name_any());
        let mut secrets = self.secrets.lock().unwrap();
        if secrets.contains_key(&key) {
            return Err(api_error(409));
        }
        secrets.insert(key, secret.clone());
        drop(secrets);
        self.record(format!("create_secret:{}", secret.name_any()));
        Ok(())
    }

    async fn replace_secret(&self, secret: &Secret) -> Result<(), Error> {
        let key = (secret.namespace().unwrap_or_default(), secret.name_any());
        self.secrets.lock().unwrap().insert(key, secret.clone());
        self.record(format!("replace_secret:{}", secret.name_any()));
        Ok(())
    }

    async fn get_klusterlet_config(&self, name: &str) -> Result<Option<KlusterletConfig>, Error> {
        Ok(self.klusterlet_config(name))
    }

    async fn create_klusterlet_config(&self, config: &KlusterletConfig) -> Result<(), Error> {
        self.configs
            .lock()
            .unwrap()
            .insert(config.name_any(), config.clone());
        self.record(format!("create_klusterlet_config:{}", config.name_any()));
        Ok(())
    }

    async fn replace_klusterlet_config(&self, config: &KlusterletConfig) -> Result<(), Error> {
        self.configs
            .lock()
            .unwrap()
            .insert(config.name_any(), config.clone());
        self.record(format!("replace_klusterlet_config:{}", config.name_any()));
        Ok(())
    }

    async fn get_managed_cluster(&self, name: &str) -> Result<Option<ManagedCluster>, Error> {
        if Self::take(&self.failing_reads) {
            return Err(api_error(500));
        }
        Ok(self.cluster(name))
    }

    async fn replace_managed_cluster(&self, cluster: &ManagedCluster) -> Result<(), Error> {
        if Self::take(&self.conflicts) {
            return Err(api_error(409));
        }
        self.clusters
            .lock()
            .unwrap()
            .insert(cluster.name_any(), cluster.clone());
        self.record(format!("replace_managed_cluster:{}", cluster.name_any()));
        Ok(())
    }

    async fn delete_managed_cluster(&self, name: &str) -> Result<(), Error> {
        if self.clusters.lock().unwrap().remove(name).is_some() {
            self.record(format!("delete_managed_cluster:{name}"));
        }
        Ok(())
    }

    async fn apply_cluster_role(&self, role: &ClusterRole) -> Result<(), Error> {
        self.roles.lock().unwrap().insert(role.name_any(), role.clone());
        self.record(format!("apply_cluster_role:{}", role.name_any()));
        Ok(())
    }

    async fn apply_cluster_role_binding(&self, binding: &ClusterRoleBinding) -> Result<(), Error> {
        self.bindings
            .lock()
            .unwrap()
            .insert(binding.name_any(), binding.clone());
        self.record(format!("apply_cluster_role_binding:{}", binding.name_any()));
        Ok(())
    }
}
