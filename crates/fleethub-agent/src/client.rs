//! Hub-local Kubernetes access for the migration agent
//!
//! Everything the agent reads or writes on its own hub goes through
//! [`HubClient`], so handlers can be driven against an in-memory hub in tests.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding};
use kube::api::{Api, DeleteParams, Patch, PatchParams, PostParams};
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;

#[cfg(test)]
use mockall::automock;

use fleethub_common::crd::{KlusterletConfig, ManagedCluster};
use fleethub_common::{Error, FIELD_MANAGER};

/// Kubernetes operations a hub agent performs
#[cfg_attr(test, automock)]
#[async_trait]
pub trait HubClient: Send + Sync {
    /// Get a Secret
    async fn get_secret(&self, name: &str, namespace: &str) -> Result<Option<Secret>, Error>;

    /// Create a Secret
    async fn create_secret(&self, secret: &Secret) -> Result<(), Error>;

    /// Replace a Secret; `secret` must carry the observed resourceVersion
    async fn replace_secret(&self, secret: &Secret) -> Result<(), Error>;

    /// Get a KlusterletConfig (cluster-scoped)
    async fn get_klusterlet_config(&self, name: &str) -> Result<Option<KlusterletConfig>, Error>;

    /// Create a KlusterletConfig
    async fn create_klusterlet_config(&self, config: &KlusterletConfig) -> Result<(), Error>;

    /// Replace a KlusterletConfig; `config` must carry the observed resourceVersion
    async fn replace_klusterlet_config(&self, config: &KlusterletConfig) -> Result<(), Error>;

    /// Get a ManagedCluster (cluster-scoped)
    async fn get_managed_cluster(&self, name: &str) -> Result<Option<ManagedCluster>, Error>;

    /// Replace a ManagedCluster; 409 if it changed since it was read
    async fn replace_managed_cluster(&self, cluster: &ManagedCluster) -> Result<(), Error>;

    /// Delete a ManagedCluster, treating absence as success
    async fn delete_managed_cluster(&self, name: &str) -> Result<(), Error>;

    /// Server-side apply a ClusterRole
    async fn apply_cluster_role(&self, role: &ClusterRole) -> Result<(), Error>;

    /// Server-side apply a ClusterRoleBinding
    async fn apply_cluster_role_binding(&self, binding: &ClusterRoleBinding) -> Result<(), Error>;
}

/// Real Kubernetes client implementation
pub struct HubClientImpl {
    client: Client,
}

impl HubClientImpl {
    /// Wrap a kube client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn cluster_api<K>(&self) -> Api<K>
    where
        K: Resource<Scope = k8s_openapi::ClusterResourceScope>,
        <K as Resource>::DynamicType: Default,
    {
        Api::all(self.client.clone())
    }
}

async fn replace<K>(api: &Api<K>, obj: &K) -> Result<(), Error>
where
    K: Resource + Clone + DeserializeOwned + Serialize + std::fmt::Debug,
{
    api.replace(&obj.name_any(), &PostParams::default(), obj).await?;
    Ok(())
}

async fn apply<K>(api: &Api<K>, obj: &K) -> Result<(), Error>
where
    K: Resource + Clone + DeserializeOwned + Serialize + std::fmt::Debug,
{
    api.patch(
        &obj.name_any(),
        &PatchParams::apply(FIELD_MANAGER).force(),
        &Patch::Apply(obj),
    )
    .await?;
    Ok(())
}

#[async_trait]
impl HubClient for HubClientImpl {
    async fn get_secret(&self, name: &str, namespace: &str) -> Result<Option<Secret>, Error> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn create_secret(&self, secret: &Secret) -> Result<(), Error> {
        let api: Api<Secret> =
            Api::namespaced(self.client.clone(), &secret.namespace().unwrap_or_default());
        api.create(&PostParams::default(), secret).await?;
        Ok(())
    }

    async fn replace_secret(&self, secret: &Secret) -> Result<(), Error> {
        let api: Api<Secret> =
            Api::namespaced(self.client.clone(), &secret.namespace().unwrap_or_default());
        replace(&api, secret).await
    }

    async fn get_klusterlet_config(&self, name: &str) -> Result<Option<KlusterletConfig>, Error> {
        Ok(self.cluster_api::<KlusterletConfig>().get_opt(name).await?)
    }

    async fn create_klusterlet_config(&self, config: &KlusterletConfig) -> Result<(), Error> {
        self.cluster_api::<KlusterletConfig>()
            .create(&PostParams::default(), config)
            .await?;
        Ok(())
    }

    async fn replace_klusterlet_config(&self, config: &KlusterletConfig) -> Result<(), Error> {
        replace(&self.cluster_api(), config).await
    }

    async fn get_managed_cluster(&self, name: &str) -> Result<Option<ManagedCluster>, Error> {
        Ok(self.cluster_api::<ManagedCluster>().get_opt(name).await?)
    }

    async fn replace_managed_cluster(&self, cluster: &ManagedCluster) -> Result<(), Error> {
        replace(&self.cluster_api(), cluster).await
    }

    async fn delete_managed_cluster(&self, name: &str) -> Result<(), Error> {
        match self
            .cluster_api::<ManagedCluster>()
            .delete(name, &DeleteParams::default())
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn apply_cluster_role(&self, role: &ClusterRole) -> Result<(), Error> {
        apply(&self.cluster_api(), role).await
    }

    async fn apply_cluster_role_binding(&self, binding: &ClusterRoleBinding) -> Result<(), Error> {
        apply(&self.cluster_api(), binding).await
    }
}
