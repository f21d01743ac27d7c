//! `migration.to` handler for the destination hub
//!
//! Clusters arriving from another hub register with the migration service
//! account's token, so that account needs registration permissions here.

use std::sync::Arc;

use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, PolicyRule, RoleRef, Subject};
use kube::api::ObjectMeta;
use tracing::{info, instrument};

use fleethub_common::{Error, OWNER_LABEL_KEY, OWNER_LABEL_MIGRATION};
use fleethub_transport::MigrationToEvent;

use crate::client::HubClient;

/// Prefix of the ClusterRole and ClusterRoleBinding names
pub const REGISTRATION_ROLE_PREFIX: &str = "fleethub:migration:";

/// Name of the ClusterRole and ClusterRoleBinding for service account `sa`
pub fn registration_role_name(sa: &str) -> String {
    format!("{REGISTRATION_ROLE_PREFIX}{sa}")
}

fn rule(group: &str, resources: &[&str], verbs: &[&str]) -> PolicyRule {
    PolicyRule {
        api_groups: Some(vec![group.to_string()]),
        resources: Some(resources.iter().map(|r| r.to_string()).collect()),
        verbs: verbs.iter().map(|v| v.to_string()).collect(),
        ..Default::default()
    }
}

fn metadata(name: String) -> ObjectMeta {
    ObjectMeta {
        name: Some(name),
        labels: Some([(OWNER_LABEL_KEY.to_string(), OWNER_LABEL_MIGRATION.to_string())].into()),
        ..Default::default()
    }
}

/// ClusterRole allowing a cluster to register with this hub
pub fn registration_role(sa: &str) -> ClusterRole {
    ClusterRole {
        metadata: metadata(registration_role_name(sa)),
        rules: Some(vec![
            rule("cluster.open-cluster-management.io", &["managedclusters"], &["create", "get"]),
            rule("certificates.k8s.io", &["certificatesigningrequests"], &["create", "get"]),
            rule(
                "register.open-cluster-management.io",
                &["managedclusters/clientcertificates"],
                &["renew"],
            ),
            rule("register.open-cluster-management.io", &["managedclusters/accept"], &["update"]),
        ]),
        ..Default::default()
    }
}

/// ClusterRoleBinding granting [`registration_role`] to `namespace/sa`
pub fn registration_binding(sa: &str, namespace: &str) -> ClusterRoleBinding {
    let name = registration_role_name(sa);
    ClusterRoleBinding {
        metadata: metadata(name.clone()),
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "ClusterRole".to_string(),
            name,
        },
        subjects: Some(vec![Subject {
            kind: "User".to_string(),
            api_group: Some("rbac.authorization.k8s.io".to_string()),
            name: format!("system:serviceaccount:{namespace}:{sa}"),
            ..Default::default()
        }]),
    }
}

/// Destination-hub side of the migration protocol
pub struct ToSyncer {
    client: Arc<dyn HubClient>,
}

impl ToSyncer {
    /// Create a syncer writing through `client`
    pub fn new(client: Arc<dyn HubClient>) -> Self {
        Self { client }
    }

    /// Apply one `migration.to` delivery
    #[instrument(skip(self, event), fields(service_account = %event.service_account_name))]
    pub async fn handle(&self, event: &MigrationToEvent) -> Result<(), Error> {
        let sa = &event.service_account_name;
        let namespace = &event.service_account_install_namespace;

        self.client.apply_cluster_role(&registration_role(sa)).await?;
        self.client
            .apply_cluster_role_binding(&registration_binding(sa, namespace))
            .await?;

        info!(namespace = %namespace, "Granted registration permissions to migration service account");
        Ok(())
    }
}
