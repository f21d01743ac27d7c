//! `migration.from` handler for the source hub
//!
//! Installs both bootstrap Secrets and the routing policy, pins every
//! migrating cluster to that policy, then hands the clusters to the cutover
//! scheduler. Each step reads first and writes only when the live object
//! differs, so a redelivered message produces no writes.

use std::sync::Arc;

use k8s_openapi::api::core::v1::Secret;
use kube::ResourceExt;
use tracing::{debug, info, instrument, warn};

use fleethub_common::crd::KlusterletConfig;
use fleethub_common::kube_utils::secret_data_equal;
use fleethub_common::retry::{retry_if, RetryConfig};
use fleethub_common::Error;
use fleethub_transport::MigrationFromEvent;

use crate::client::HubClient;
use crate::cutover::CutoverScheduler;
use crate::merge::spec_is_derivative;

// =============================================================================
// Idempotent steps
// =============================================================================

/// Create `desired` or bring the live Secret's data in line with it
///
/// Returns true if anything was written.
pub async fn upsert_bootstrap_secret(client: &dyn HubClient, desired: &Secret) -> Result<bool, Error> {
    let name = desired.name_any();
    let namespace = desired.namespace().unwrap_or_default();

    match client.get_secret(&name, &namespace).await? {
        None => {
            let mut fresh = desired.clone();
            fresh.metadata.resource_version = None;
            fresh.metadata.uid = None;
            client.create_secret(&fresh).await?;
            info!(secret = %name, namespace = %namespace, "Created bootstrap secret");
            Ok(true)
        }
        Some(existing) if secret_data_equal(&existing, desired) => {
            debug!(secret = %name, "Bootstrap secret up to date");
            Ok(false)
        }
        Some(mut existing) => {
            existing.data = desired.data.clone();
            existing.type_ = desired.type_.clone();
            client.replace_secret(&existing).await?;
            info!(secret = %name, namespace = %namespace, "Updated bootstrap secret");
            Ok(true)
        }
    }
}

/// Create the routing policy or update it when the live spec does not satisfy it
pub async fn upsert_routing_policy(client: &dyn HubClient, desired: &KlusterletConfig) -> Result<bool, Error> {
    let name = desired.name_any();

    match client.get_klusterlet_config(&name).await? {
        None => {
            let mut fresh = desired.clone();
            fresh.metadata.resource_version = None;
            fresh.metadata.uid = None;
            client.create_klusterlet_config(&fresh).await?;
            info!(policy = %name, "Created routing policy");
            Ok(true)
        }
        Some(existing) if spec_is_derivative(&desired.spec, &existing.spec) => {
            debug!(policy = %name, "Routing policy up to date");
            Ok(false)
        }
        Some(mut existing) => {
            existing.spec = desired.spec.clone();
            client.replace_klusterlet_config(&existing).await?;
            info!(policy = %name, "Updated routing policy");
            Ok(true)
        }
    }
}

/// Mark `cluster` as migrating and pin it to `policy`
///
/// An absent cluster is an error, so the delivery is redelivered until the
/// cluster's record shows up. 409s re-read and retry.
pub async fn pin_cluster(client: &dyn HubClient, cluster: &str, policy: &str) -> Result<bool, Error> {
    retry_if(&RetryConfig::conflict(), "pin_cluster", Error::is_conflict, || async move {
        let Some(mut mc) = client.get_managed_cluster(cluster).await? else {
            warn!(cluster = %cluster, "Migrating cluster not found on this hub");
            return Err(Error::internal_with_context(
                "pin_cluster",
                format!("managed cluster {cluster} not found on this hub"),
            ));
        };
        if mc.is_pinned_to(policy) {
            return Ok(false);
        }
        mc.pin_to(policy);
        client.replace_managed_cluster(&mc).await?;
        info!(cluster = %cluster, policy = %policy, "Pinned cluster to routing policy");
        Ok(true)
    })
    .await
}

// =============================================================================
// Handler
// =============================================================================

/// Source-hub side of the migration protocol
pub struct FromSyncer {
    client: Arc<dyn HubClient>,
    cutover: Arc<CutoverScheduler>,
}

impl FromSyncer {
    /// Create a syncer writing through `client`
    pub fn new(client: Arc<dyn HubClient>, cutover: Arc<CutoverScheduler>) -> Self {
        Self { client, cutover }
    }

    /// Apply one `migration.from` delivery
    ///
    /// Cutover is scheduled only after every cluster is pinned, so no cluster
    /// is told to stop accepting this hub before its routing policy exists.
    #[instrument(skip(self, event), fields(policy = %event.routing_policy.name_any(), clusters = event.managed_clusters.len()))]
    pub async fn handle(&self, event: &MigrationFromEvent) -> Result<(), Error> {
        let client = self.client.as_ref();

        upsert_bootstrap_secret(client, &event.bootstrap_secret).await?;
        upsert_bootstrap_secret(client, &event.original_bootstrap_secret).await?;
        upsert_routing_policy(client, &event.routing_policy).await?;

        let policy = event.routing_policy.name_any();
        for cluster in &event.managed_clusters {
            pin_cluster(client, cluster, &policy).await?;
        }

        self.cutover.schedule(&policy, event.managed_clusters.clone());
        Ok(())
    }
}
