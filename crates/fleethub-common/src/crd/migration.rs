//! ManagedClusterMigration Custom Resource Definition
//!
//! A ManagedClusterMigration asks fleethub to move a set of managed clusters
//! from their current hub to another hub. The source hub is either named
//! explicitly or resolved per cluster from the fleet inventory.

use std::collections::HashSet;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Finalizer held on a migration until its credentials are torn down
pub const MIGRATION_FINALIZER: &str = "fleethub.dev/migration-cleanup";

/// Annotation overriding the namespace the migration service account is installed in
pub const SERVICE_ACCOUNT_NAMESPACE_ANNOTATION: &str =
    "fleethub.dev/managed-serviceaccount-install-namespace";

/// Default install namespace for the migration service account
pub const DEFAULT_SERVICE_ACCOUNT_NAMESPACE: &str = "open-cluster-management-agent-addon";

/// Install namespace when the manager runs in hosted import mode
pub const HOSTED_SERVICE_ACCOUNT_NAMESPACE: &str = "open-cluster-management-fleethub-agent-addon";

/// Specification for a ManagedClusterMigration
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "fleethub.dev",
    derive = "PartialEq",
    version = "v1alpha1",
    kind = "ManagedClusterMigration",
    plural = "managedclustermigrations",
    shortname = "mcm",
    namespaced,
    printcolumn = r#"{"name":"From","type":"string","jsonPath":".spec.from"}"#,
    printcolumn = r#"{"name":"To","type":"string","jsonPath":".spec.to"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ManagedClusterMigrationSpec {
    /// Source hub. When unset, each cluster's owning hub is looked up in inventory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,

    /// Destination hub
    pub to: String,

    /// Clusters to migrate
    #[serde(default)]
    pub included_managed_clusters: Vec<String>,
}

impl ManagedClusterMigrationSpec {
    /// Explicit source hub, treating an empty string as unset
    pub fn source_hub(&self) -> Option<&str> {
        self.from.as_deref().filter(|s| !s.is_empty())
    }

    /// Validate the migration specification
    pub fn validate(&self, migration: &str) -> Result<(), crate::Error> {
        if self.to.is_empty() {
            return Err(crate::Error::validation(migration, "to cannot be empty"));
        }
        if self.included_managed_clusters.is_empty() {
            return Err(crate::Error::validation(
                migration,
                "includedManagedClusters must not be empty",
            ));
        }
        if self.included_managed_clusters.iter().any(|c| c.is_empty()) {
            return Err(crate::Error::validation(
                migration,
                "includedManagedClusters contains an empty name",
            ));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = self
            .included_managed_clusters
            .iter()
            .find(|c| !seen.insert(c.as_str()))
        {
            return Err(crate::Error::validation(
                migration,
                format!("cluster {dup} is listed more than once"),
            ));
        }
        if self.source_hub() == Some(self.to.as_str()) {
            return Err(crate::Error::validation(
                migration,
                format!("from and to are both {}", self.to),
            ));
        }
        Ok(())
    }
}

impl ManagedClusterMigration {
    /// Namespace the migration service account is installed in on managed clusters
    pub fn service_account_install_namespace(&self, hosted: bool) -> String {
        if let Some(ns) = self
            .metadata
            .annotations
            .as_ref()
            .and_then(|a| a.get(SERVICE_ACCOUNT_NAMESPACE_ANNOTATION))
            .filter(|ns| !ns.is_empty())
        {
            return ns.clone();
        }
        if hosted {
            HOSTED_SERVICE_ACCOUNT_NAMESPACE.to_string()
        } else {
            DEFAULT_SERVICE_ACCOUNT_NAMESPACE.to_string()
        }
    }

    /// True once the API server has set a deletion timestamp
    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::BTreeMap;

    fn spec(from: Option<&str>, to: &str, clusters: &[&str]) -> ManagedClusterMigrationSpec {
        ManagedClusterMigrationSpec {
            from: from.map(String::from),
            to: to.to_string(),
            included_managed_clusters: clusters.iter().map(|c| c.to_string()).collect(),
        }
    }

    #[rstest]
    #[case(spec(None, "hub-b", &["c1", "c2"]), true)]
    #[case(spec(Some("hub-a"), "hub-b", &["c1"]), true)]
    #[case(spec(Some(""), "hub-b", &["c1"]), true)]
    #[case(spec(None, "", &["c1"]), false)]
    #[case(spec(None, "hub-b", &[]), false)]
    #[case(spec(None, "hub-b", &["c1", ""]), false)]
    #[case(spec(None, "hub-b", &["c1", "c1"]), false)]
    #[case(spec(Some("hub-b"), "hub-b", &["c1"]), false)]
    fn test_validate(#[case] spec: ManagedClusterMigrationSpec, #[case] ok: bool) {
        assert_eq!(spec.validate("m1").is_ok(), ok);
    }

    #[test]
    fn test_spec_wire_format_is_camel_case() {
        let s: ManagedClusterMigrationSpec = serde_yaml::from_str(
            "to: hub-b\nincludedManagedClusters: [c1, c2]\n",
        )
        .unwrap();
        assert_eq!(s.to, "hub-b");
        assert_eq!(s.included_managed_clusters, vec!["c1", "c2"]);
        assert!(s.from.is_none());
    }

    #[rstest]
    #[case(None, false, DEFAULT_SERVICE_ACCOUNT_NAMESPACE)]
    #[case(None, true, HOSTED_SERVICE_ACCOUNT_NAMESPACE)]
    #[case(Some("custom-ns"), true, "custom-ns")]
    #[case(Some(""), false, DEFAULT_SERVICE_ACCOUNT_NAMESPACE)]
    fn test_service_account_install_namespace(
        #[case] annotation: Option<&str>,
        #[case] hosted: bool,
        #[case] expected: &str,
    ) {
        let mut m = ManagedClusterMigration::new("m1", spec(None, "hub-b", &["c1"]));
        if let Some(ns) = annotation {
            m.metadata.annotations = Some(BTreeMap::from([(
                SERVICE_ACCOUNT_NAMESPACE_ANNOTATION.to_string(),
                ns.to_string(),
            )]));
        }
        assert_eq!(m.service_account_install_namespace(hosted), expected);
    }
}
