//! Bootstrap descriptors
//!
//! A bootstrap descriptor is what a managed cluster's registration agent needs
//! to register with a hub: the hub API URL, its CA bundle and a bearer token.
//! It is built from the token Secret the managed-serviceaccount addon writes
//! and is shipped to the source hub as a kubeconfig Secret.

use std::collections::BTreeMap;

use base64::{engine::general_purpose::STANDARD, Engine};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::api::ObjectMeta;
use serde::Serialize;

use fleethub_common::crd::{CA_CERT_KEY, TOKEN_KEY};
use fleethub_common::kube_utils::secret_value;
use fleethub_common::Error;

/// Namespace bootstrap kubeconfig Secrets are installed in on the source hub
pub const BOOTSTRAP_SECRET_NAMESPACE: &str = "multicluster-engine";

/// Prefix of bootstrap kubeconfig Secret names
pub const BOOTSTRAP_SECRET_PREFIX: &str = "bootstrap-";

/// Data key holding the rendered kubeconfig
pub const KUBECONFIG_KEY: &str = "kubeconfig";

const KUBECONFIG_USER: &str = "user";
const KUBECONFIG_CONTEXT: &str = "default-context";

/// Bootstrap Secret name for a hub
pub fn bootstrap_secret_name(hub: &str) -> String {
    format!("{BOOTSTRAP_SECRET_PREFIX}{hub}")
}

/// Connection material for registering with one hub
#[derive(Clone, PartialEq, Eq)]
pub struct BootstrapDescriptor {
    /// Hub name, also the kubeconfig cluster name
    pub hub: String,
    /// Hub API server URL
    pub server: String,
    /// PEM CA bundle
    pub ca_bundle: Vec<u8>,
    /// Bearer token
    pub token: String,
}

impl std::fmt::Debug for BootstrapDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BootstrapDescriptor")
            .field("hub", &self.hub)
            .field("server", &self.server)
            .field("ca_bundle_len", &self.ca_bundle.len())
            .field("token", &"<redacted>")
            .finish()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "kebab-case")]
struct Kubeconfig<'a> {
    api_version: &'static str,
    kind: &'static str,
    clusters: [NamedCluster<'a>; 1],
    users: [NamedUser<'a>; 1],
    contexts: [NamedContext<'a>; 1],
    current_context: &'static str,
}

#[derive(Serialize)]
struct NamedCluster<'a> {
    name: &'a str,
    cluster: ClusterEntry<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "kebab-case")]
struct ClusterEntry<'a> {
    server: &'a str,
    certificate_authority_data: String,
}

#[derive(Serialize)]
struct NamedUser<'a> {
    name: &'static str,
    user: UserEntry<'a>,
}

#[derive(Serialize)]
struct UserEntry<'a> {
    token: &'a str,
}

#[derive(Serialize)]
struct NamedContext<'a> {
    name: &'static str,
    context: ContextEntry<'a>,
}

#[derive(Serialize)]
struct ContextEntry<'a> {
    cluster: &'a str,
    user: &'static str,
}

// =============================================================================
// Pure Functions (unit-testable)
// =============================================================================

impl BootstrapDescriptor {
    /// Build a descriptor from a credential Secret and the hub's API URL
    ///
    /// Fails if the Secret lacks `token` or `ca.crt`, the token is not UTF-8,
    /// or the URL is empty.
    pub fn from_credential(hub: &str, secret: &Secret, server: &str) -> Result<Self, Error> {
        let server = server.trim();
        if server.is_empty() {
            return Err(Error::credential(hub, "hub advertises no API server URL"));
        }
        let token = secret_value(secret, TOKEN_KEY)
            .ok_or_else(|| Error::credential(hub, format!("credential secret missing {TOKEN_KEY}")))?;
        let ca_bundle = secret_value(secret, CA_CERT_KEY)
            .ok_or_else(|| Error::credential(hub, format!("credential secret missing {CA_CERT_KEY}")))?;
        let token = std::str::from_utf8(token)
            .map_err(|_| Error::credential(hub, "token is not valid UTF-8"))?;

        Ok(Self {
            hub: hub.to_string(),
            server: server.to_string(),
            ca_bundle: ca_bundle.to_vec(),
            token: token.trim().to_string(),
        })
    }

    /// Render the descriptor as kubeconfig YAML
    pub fn to_kubeconfig(&self) -> Result<String, Error> {
        let config = Kubeconfig {
            api_version: "v1",
            kind: "Config",
            clusters: [NamedCluster {
                name: &self.hub,
                cluster: ClusterEntry {
                    server: &self.server,
                    certificate_authority_data: STANDARD.encode(&self.ca_bundle),
                },
            }],
            users: [NamedUser {
                name: KUBECONFIG_USER,
                user: UserEntry { token: &self.token },
            }],
            contexts: [NamedContext {
                name: KUBECONFIG_CONTEXT,
                context: ContextEntry {
                    cluster: &self.hub,
                    user: KUBECONFIG_USER,
                },
            }],
            current_context: KUBECONFIG_CONTEXT,
        };
        serde_yaml::to_string(&config)
            .map_err(|e| Error::serialization_for_kind("kubeconfig", e.to_string()))
    }

    /// Render the descriptor as the `bootstrap-<hub>` Secret
    pub fn to_secret(&self) -> Result<Secret, Error> {
        let kubeconfig = self.to_kubeconfig()?;
        Ok(Secret {
            metadata: ObjectMeta {
                name: Some(bootstrap_secret_name(&self.hub)),
                namespace: Some(BOOTSTRAP_SECRET_NAMESPACE.to_string()),
                ..Default::default()
            },
            data: Some(BTreeMap::from([(
                KUBECONFIG_KEY.to_string(),
                ByteString(kubeconfig.into_bytes()),
            )])),
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::ResourceExt;

    fn credential(token: Option<&[u8]>, ca: Option<&[u8]>) -> Secret {
        let mut data = BTreeMap::new();
        if let Some(t) = token {
            data.insert(TOKEN_KEY.to_string(), ByteString(t.to_vec()));
        }
        if let Some(c) = ca {
            data.insert(CA_CERT_KEY.to_string(), ByteString(c.to_vec()));
        }
        Secret {
            data: Some(data),
            ..Default::default()
        }
    }

    #[test]
    fn test_builds_descriptor_from_complete_credential() {
        let d = BootstrapDescriptor::from_credential(
            "hub-b",
            &credential(Some(b"tok-123\n"), Some(b"-----BEGIN CERTIFICATE-----")),
            "https://hub-b.example:6443",
        )
        .unwrap();

        assert_eq!(d.hub, "hub-b");
        assert_eq!(d.server, "https://hub-b.example:6443");
        assert_eq!(d.token, "tok-123");
        assert!(!format!("{d:?}").contains("tok-123"));
    }

    #[test]
    fn test_missing_token_or_ca_is_credential_error() {
        for secret in [credential(None, Some(b"ca")), credential(Some(b"t"), None)] {
            let err = BootstrapDescriptor::from_credential("hub-a", &secret, "https://a").unwrap_err();
            assert!(matches!(err, Error::Credential { ref hub, .. } if hub == "hub-a"));
        }
    }

    #[test]
    fn test_empty_url_is_credential_error() {
        let err = BootstrapDescriptor::from_credential("hub-a", &credential(Some(b"t"), Some(b"c")), " ")
            .unwrap_err();
        assert!(err.to_string().contains("no API server URL"));
    }

    #[test]
    fn test_kubeconfig_layout() {
        let d = BootstrapDescriptor {
            hub: "hub-b".to_string(),
            server: "https://hub-b:6443".to_string(),
            ca_bundle: b"ca".to_vec(),
            token: "tok".to_string(),
        };
        let parsed: serde_json::Value = serde_yaml::from_str(&d.to_kubeconfig().unwrap()).unwrap();

        assert_eq!(parsed["current-context"], "default-context");
        assert_eq!(parsed["clusters"][0]["name"], "hub-b");
        assert_eq!(parsed["clusters"][0]["cluster"]["server"], "https://hub-b:6443");
        assert_eq!(parsed["clusters"][0]["cluster"]["certificate-authority-data"], "Y2E=");
        assert_eq!(parsed["users"][0]["user"]["token"], "tok");
        assert_eq!(parsed["contexts"][0]["context"]["cluster"], "hub-b");
        assert_eq!(parsed["contexts"][0]["context"]["user"], "user");
    }

    #[test]
    fn test_secret_name_namespace_and_key() {
        let d = BootstrapDescriptor::from_credential(
            "hub-a",
            &credential(Some(b"t"), Some(b"c")),
            "https://hub-a:6443",
        )
        .unwrap();
        let s = d.to_secret().unwrap();

        assert_eq!(s.name_any(), "bootstrap-hub-a");
        assert_eq!(s.namespace().as_deref(), Some(BOOTSTRAP_SECRET_NAMESPACE));
        let data = s.data.unwrap();
        assert_eq!(data.len(), 1);
        assert!(data.contains_key(KUBECONFIG_KEY));
    }

    #[test]
    fn test_same_inputs_render_identical_secrets() {
        let secret = credential(Some(b"t"), Some(b"c"));
        let a = BootstrapDescriptor::from_credential("hub-a", &secret, "https://a").unwrap();
        let b = BootstrapDescriptor::from_credential("hub-a", &secret, "https://a").unwrap();
        assert_eq!(a.to_secret().unwrap(), b.to_secret().unwrap());
    }
}
