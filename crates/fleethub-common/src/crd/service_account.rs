//! ManagedServiceAccount, the credential request served by the
//! managed-serviceaccount addon
//!
//! The addon creates a token Secret of the same name and namespace once the
//! service account exists on the target hub.

use std::collections::BTreeMap;

use kube::api::ObjectMeta;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{MIGRATION_LABEL_KEY, OWNER_LABEL_KEY, OWNER_LABEL_MIGRATION};

/// Token validity requested for migration credentials
pub const MIGRATION_TOKEN_VALIDITY: &str = "86400h0m0s";

/// Secret key holding the bearer token
pub const TOKEN_KEY: &str = "token";

/// Secret key holding the PEM CA bundle
pub const CA_CERT_KEY: &str = "ca.crt";

/// Spec of a ManagedServiceAccount
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "authentication.open-cluster-management.io",
    derive = "PartialEq",
    version = "v1beta1",
    kind = "ManagedServiceAccount",
    plural = "managedserviceaccounts",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ManagedServiceAccountSpec {
    /// Token rotation policy
    #[serde(default)]
    pub rotation: Rotation,
}

/// Token rotation settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Rotation {
    /// Whether the addon rotates the token
    #[serde(default)]
    pub enabled: bool,

    /// Token lifetime as a Go duration string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validity: Option<String>,
}

impl ManagedServiceAccount {
    /// Credential request for `migration` on `hub`, living in the hub's namespace
    pub fn for_migration(migration: &str, hub: &str) -> Self {
        let labels = BTreeMap::from([
            (OWNER_LABEL_KEY.to_string(), OWNER_LABEL_MIGRATION.to_string()),
            (MIGRATION_LABEL_KEY.to_string(), migration.to_string()),
        ]);
        Self {
            metadata: ObjectMeta {
                name: Some(migration.to_string()),
                namespace: Some(hub.to_string()),
                labels: Some(labels),
                ..Default::default()
            },
            spec: ManagedServiceAccountSpec {
                rotation: Rotation {
                    enabled: true,
                    validity: Some(MIGRATION_TOKEN_VALIDITY.to_string()),
                },
            },
        }
    }

    /// Label selector matching every credential request of `migration`
    pub fn selector_for(migration: &str) -> String {
        format!("{OWNER_LABEL_KEY}={OWNER_LABEL_MIGRATION},{MIGRATION_LABEL_KEY}={migration}")
    }

    /// True if this credential request was created by the migration controller
    pub fn is_migration_owned(&self) -> bool {
        self.metadata
            .labels
            .as_ref()
            .and_then(|l| l.get(OWNER_LABEL_KEY))
            .map(String::as_str)
            == Some(OWNER_LABEL_MIGRATION)
    }
}
