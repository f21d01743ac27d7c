//! Shared Kubernetes helpers: finalizers, secret data access and cancellable
//! polling.

use std::future::Future;
use std::time::Duration;

use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, Patch, PatchParams};
use kube::{Resource, ResourceExt};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::{Error, FIELD_MANAGER};

// =============================================================================
// Finalizers
// =============================================================================

/// Check if a resource carries `finalizer`
pub fn has_finalizer<K: Resource>(obj: &K, finalizer: &str) -> bool {
    obj.meta()
        .finalizers
        .as_ref()
        .is_some_and(|f| f.iter().any(|x| x == finalizer))
}

/// Merge patch replacing the finalizer list, guarded by the observed resourceVersion
///
/// The API server rejects the patch with 409 if the object changed since it
/// was read, so a concurrent writer's finalizer is never dropped.
pub fn finalizer_patch<K: Resource>(obj: &K, finalizers: Vec<String>) -> serde_json::Value {
    serde_json::json!({
        "metadata": {
            "finalizers": finalizers,
            "resourceVersion": obj.meta().resource_version,
        }
    })
}

/// Add `finalizer` to a resource if absent
pub async fn add_finalizer<K>(api: &Api<K>, obj: &K, finalizer: &str) -> Result<(), Error>
where
    K: Resource + Clone + DeserializeOwned + std::fmt::Debug,
{
    if has_finalizer(obj, finalizer) {
        return Ok(());
    }
    let mut finalizers = obj.finalizers().to_vec();
    finalizers.push(finalizer.to_string());

    api.patch(
        &obj.name_any(),
        &PatchParams::apply(FIELD_MANAGER),
        &Patch::Merge(&finalizer_patch(obj, finalizers)),
    )
    .await?;
    debug!(name = %obj.name_any(), finalizer, "Added finalizer");
    Ok(())
}

/// Remove `finalizer` from a resource if present
pub async fn remove_finalizer<K>(api: &Api<K>, obj: &K, finalizer: &str) -> Result<(), Error>
where
    K: Resource + Clone + DeserializeOwned + std::fmt::Debug,
{
    if !has_finalizer(obj, finalizer) {
        return Ok(());
    }
    let finalizers: Vec<String> = obj
        .finalizers()
        .iter()
        .filter(|f| f.as_str() != finalizer)
        .cloned()
        .collect();

    api.patch(
        &obj.name_any(),
        &PatchParams::apply(FIELD_MANAGER),
        &Patch::Merge(&finalizer_patch(obj, finalizers)),
    )
    .await?;
    debug!(name = %obj.name_any(), finalizer, "Removed finalizer");
    Ok(())
}

// =============================================================================
// Secrets
// =============================================================================

/// Raw bytes stored under `key`, treating an empty value as missing
pub fn secret_value<'a>(secret: &'a Secret, key: &str) -> Option<&'a [u8]> {
    secret
        .data
        .as_ref()
        .and_then(|d| d.get(key))
        .map(|b| b.0.as_slice())
        .filter(|b| !b.is_empty())
}

/// True if two secrets carry the same data and type
pub fn secret_data_equal(a: &Secret, b: &Secret) -> bool {
    let empty = Default::default();
    a.data.as_ref().unwrap_or(&empty) == b.data.as_ref().unwrap_or(&empty) && a.type_ == b.type_
}

// =============================================================================
// Polling
// =============================================================================

/// Poll `check_fn` every `interval` until it reports convergence or `token` is cancelled
///
/// The first check runs immediately. A check error is logged and the check is
/// retried at the next tick. Returns `true` on convergence, `false` on
/// cancellation.
pub async fn poll_until_cancelled<F, Fut>(
    interval: Duration,
    token: &CancellationToken,
    mut check_fn: F,
) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, Error>>,
{
    loop {
        if token.is_cancelled() {
            return false;
        }

        match check_fn().await {
            Ok(true) => return true,
            Ok(false) => trace!("Polling condition not yet met"),
            Err(e) => debug!(error = %e, "Polling check failed, retrying at next tick"),
        }

        tokio::select! {
            _ = token.cancelled() => return false,
            _ = tokio::time::sleep(interval) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{ManagedClusterMigration, ManagedClusterMigrationSpec};
    use k8s_openapi::ByteString;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn migration_with(finalizers: &[&str]) -> ManagedClusterMigration {
        let mut m = ManagedClusterMigration::new(
            "m1",
            ManagedClusterMigrationSpec {
                from: None,
                to: "hub-b".to_string(),
                included_managed_clusters: vec!["c1".to_string()],
            },
        );
        m.metadata.finalizers = Some(finalizers.iter().map(|f| f.to_string()).collect());
        m.metadata.resource_version = Some("42".to_string());
        m
    }

    fn secret(pairs: &[(&str, &[u8])]) -> Secret {
        Secret {
            data: Some(
                pairs
                    .iter()
                    .map(|(k, v)| (k.to_string(), ByteString(v.to_vec())))
                    .collect::<BTreeMap<_, _>>(),
            ),
            ..Default::default()
        }
    }

    #[test]
    fn test_has_finalizer() {
        assert!(has_finalizer(&migration_with(&["a", "b"]), "b"));
        assert!(!has_finalizer(&migration_with(&["a"]), "b"));
        assert!(!has_finalizer(&migration_with(&[]), "a"));
    }

    #[test]
    fn test_finalizer_patch_carries_resource_version() {
        let m = migration_with(&["a"]);
        let patch = finalizer_patch(&m, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(patch["metadata"]["resourceVersion"], "42");
        assert_eq!(patch["metadata"]["finalizers"], serde_json::json!(["a", "b"]));
    }

    #[test]
    fn test_secret_value_treats_empty_as_missing() {
        let s = secret(&[("token", b"abc"), ("ca.crt", b"")]);
        assert_eq!(secret_value(&s, "token"), Some(&b"abc"[..]));
        assert!(secret_value(&s, "ca.crt").is_none());
        assert!(secret_value(&Secret::default(), "token").is_none());
    }

    #[test]
    fn test_secret_data_equal_ignores_metadata() {
        let mut a = secret(&[("kubeconfig", b"x")]);
        let b = secret(&[("kubeconfig", b"x")]);
        a.metadata.resource_version = Some("7".to_string());
        assert!(secret_data_equal(&a, &b));
        assert!(!secret_data_equal(&a, &secret(&[("kubeconfig", b"y")])));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_checks_immediately_then_converges() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        let token = CancellationToken::new();

        let converged = poll_until_cancelled(Duration::from_secs(2), &token, || {
            let c = c.clone();
            async move { Ok(c.fetch_add(1, Ordering::SeqCst) >= 2) }
        })
        .await;

        assert!(converged);
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_survives_errors_until_cancelled() {
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(7)).await;
            canceller.cancel();
        });

        let converged = poll_until_cancelled(Duration::from_secs(2), &token, || async {
            Err(Error::internal("store unavailable"))
        })
        .await;

        assert!(!converged);
    }
}
