//! KlusterletConfig, the routing policy a hub hands to a cluster's
//! registration agent
//!
//! fleethub writes only `spec.bootstrapKubeConfigs`; other spec fields set by
//! operators are preserved through the derivative comparison on the agent.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Name prefix of the routing policy for a destination hub
pub const ROUTING_POLICY_PREFIX: &str = "migration-";

/// Bootstrap kubeconfig source type listing local Secrets
pub const LOCAL_SECRETS: &str = "LocalSecrets";

/// Spec of a KlusterletConfig
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "config.open-cluster-management.io",
    derive = "PartialEq",
    version = "v1alpha1",
    kind = "KlusterletConfig",
    plural = "klusterletconfigs"
)]
#[serde(rename_all = "camelCase")]
pub struct KlusterletConfigSpec {
    /// Where the klusterlet finds its bootstrap kubeconfigs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bootstrap_kube_configs: Option<BootstrapKubeConfigs>,
}

/// Bootstrap kubeconfig sources
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapKubeConfigs {
    /// Source type (e.g. LocalSecrets)
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,

    /// Secrets to try, in order
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_secrets_config: Option<LocalSecretsConfig>,
}

/// Ordered list of bootstrap kubeconfig Secrets
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LocalSecretsConfig {
    /// Secret references
    #[serde(default)]
    pub kube_config_secrets: Vec<KubeConfigSecret>,
}

/// Reference to a bootstrap kubeconfig Secret
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct KubeConfigSecret {
    /// Secret name
    pub name: String,
}

impl KlusterletConfig {
    /// Routing policy name for a destination hub
    pub fn name_for(to_hub: &str) -> String {
        format!("{ROUTING_POLICY_PREFIX}{to_hub}")
    }

    /// Routing policy for `to_hub` listing `secrets` in order
    pub fn routing_policy(to_hub: &str, secrets: &[&str]) -> Self {
        Self::new(
            &Self::name_for(to_hub),
            KlusterletConfigSpec {
                bootstrap_kube_configs: Some(BootstrapKubeConfigs {
                    type_: Some(LOCAL_SECRETS.to_string()),
                    local_secrets_config: Some(LocalSecretsConfig {
                        kube_config_secrets: secrets
                            .iter()
                            .map(|name| KubeConfigSecret {
                                name: name.to_string(),
                            })
                            .collect(),
                    }),
                }),
            },
        )
    }

    /// Names of the bootstrap secrets in order
    pub fn secret_names(&self) -> Vec<&str> {
        self.spec
            .bootstrap_kube_configs
            .as_ref()
            .and_then(|b| b.local_secrets_config.as_ref())
            .map(|l| l.kube_config_secrets.iter().map(|s| s.name.as_str()).collect())
            .unwrap_or_default()
    }
}
