//! Detach loop
//!
//! After cutover the source hub still holds a ManagedCluster record for each
//! migrated cluster. Each pass stops this hub accepting any cluster it still
//! accepts. Once a cluster's agent stops reporting to this hub its Available
//! condition drops to Unknown and the record is deleted.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use fleethub_common::crd::ConditionStatus;
use fleethub_common::kube_utils::poll_until_cancelled;
use fleethub_common::Error;

use crate::client::HubClient;
use crate::cutover::disable_acceptance;

/// Default interval between detach passes
pub const DEFAULT_DETACH_INTERVAL: Duration = Duration::from_secs(2);

/// How a detach loop ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetachOutcome {
    /// Every cluster is gone from this hub
    Converged,
    /// The loop was cancelled before convergence
    Cancelled,
}

/// One pass over `clusters`
///
/// Flips `hubAcceptsClient` off on every cluster still accepted, then deletes
/// every cluster whose Available condition is Unknown. Returns true when every
/// cluster was already absent or was deleted in this pass.
pub async fn detach_pass(client: &dyn HubClient, clusters: &[String]) -> Result<bool, Error> {
    let mut converged = true;

    for name in clusters {
        let Some(cluster) = client.get_managed_cluster(name).await? else {
            continue;
        };

        if cluster.spec.hub_accepts_client && disable_acceptance(client, name).await? {
            info!(cluster = %name, "Cluster no longer accepted by this hub");
        }

        if cluster.availability() == Some(ConditionStatus::Unknown) {
            client.delete_managed_cluster(name).await?;
            info!(cluster = %name, "Detached cluster from source hub");
        } else {
            debug!(cluster = %name, available = ?cluster.availability(), "Cluster still reporting, waiting");
            converged = false;
        }
    }

    Ok(converged)
}

/// Poll [`detach_pass`] every `interval` until convergence or cancellation
pub async fn run_detach(
    client: Arc<dyn HubClient>,
    clusters: Vec<String>,
    interval: Duration,
    token: CancellationToken,
) -> Result<DetachOutcome, Error> {
    let converged = poll_until_cancelled(interval, &token, || {
        let client = client.clone();
        let clusters = &clusters;
        async move { detach_pass(client.as_ref(), clusters).await }
    })
    .await;

    Ok(if converged {
        DetachOutcome::Converged
    } else {
        DetachOutcome::Cancelled
    })
}
