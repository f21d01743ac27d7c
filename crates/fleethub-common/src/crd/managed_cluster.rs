//! ManagedCluster, the registration record a hub keeps for each worker cluster
//!
//! The resource is owned by the cluster registration controller; fleethub only
//! reads it and mutates annotations, `hubAcceptsClient`, and deletes it on
//! detach. Unknown fields are not modelled, so writers must use merge patches.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{find_condition, Condition, ConditionStatus};

/// Condition type reporting whether the cluster's agent is reachable
pub const CONDITION_AVAILABLE: &str = "ManagedClusterConditionAvailable";

/// Annotation that stops the import controller from re-importing the cluster
pub const DISABLE_AUTO_IMPORT_ANNOTATION: &str = "import.open-cluster-management.io/disable-auto-import";

/// Annotation pinning the klusterlet to a KlusterletConfig by name
pub const KLUSTERLET_CONFIG_ANNOTATION: &str = "agent.open-cluster-management.io/klusterlet-config";

/// Annotation marking a cluster as part of an in-flight migration
pub const MIGRATING_ANNOTATION: &str = "fleethub.dev/migrating";

/// Spec of a ManagedCluster
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "cluster.open-cluster-management.io",
    derive = "PartialEq",
    version = "v1",
    kind = "ManagedCluster",
    plural = "managedclusters",
    status = "ManagedClusterStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct ManagedClusterSpec {
    /// Whether the hub accepts the cluster's registration agent
    #[serde(default)]
    pub hub_accepts_client: bool,

    /// API endpoints the cluster advertises
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub managed_cluster_client_configs: Vec<ClientConfig>,
}

/// One advertised API endpoint
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    /// API server URL
    pub url: String,

    /// Base64-encoded CA bundle
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_bundle: Option<String>,
}

/// Status of a ManagedCluster
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ManagedClusterStatus {
    /// Conditions reported by the registration controller
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl ManagedCluster {
    /// First advertised API URL, if any
    pub fn api_url(&self) -> Option<&str> {
        self.spec
            .managed_cluster_client_configs
            .first()
            .map(|c| c.url.as_str())
            .filter(|u| !u.is_empty())
    }

    /// Status of the Available condition, if present
    pub fn availability(&self) -> Option<ConditionStatus> {
        self.status
            .as_ref()
            .and_then(|s| find_condition(&s.conditions, CONDITION_AVAILABLE))
            .map(|c| c.status)
    }

    /// True when the cluster carries all three migration annotations pinned to `policy`
    pub fn is_pinned_to(&self, policy: &str) -> bool {
        let Some(a) = self.metadata.annotations.as_ref() else {
            return false;
        };
        a.contains_key(MIGRATING_ANNOTATION)
            && a.contains_key(DISABLE_AUTO_IMPORT_ANNOTATION)
            && a.get(KLUSTERLET_CONFIG_ANNOTATION).map(String::as_str) == Some(policy)
    }

    /// Set the migration annotations, pinning the cluster to `policy`
    pub fn pin_to(&mut self, policy: &str) {
        let a = self.metadata.annotations.get_or_insert_with(Default::default);
        a.insert(DISABLE_AUTO_IMPORT_ANNOTATION.to_string(), String::new());
        a.insert(KLUSTERLET_CONFIG_ANNOTATION.to_string(), policy.to_string());
        a.insert(MIGRATING_ANNOTATION.to_string(), String::new());
    }
}
