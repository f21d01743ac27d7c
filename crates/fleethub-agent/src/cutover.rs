//! Scheduled cutover of migrating clusters
//!
//! Cutover waits out the settle window so the routing policy reaches each
//! cluster's registration agent, then hands the cluster to the detach loop,
//! which stops this hub accepting it and removes its record. Tasks are keyed
//! by cluster name; a newer delivery naming the same cluster cancels and
//! replaces that cluster's task only.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use fleethub_common::retry::{retry_if, RetryConfig};
use fleethub_common::Error;

use crate::client::HubClient;
use crate::detach::{run_detach, DetachOutcome, DEFAULT_DETACH_INTERVAL};

/// Default delay between tagging clusters and cutting them over
pub const DEFAULT_SETTLE_WINDOW: Duration = Duration::from_secs(10);

/// Timing of the cutover task
#[derive(Clone, Debug)]
pub struct CutoverConfig {
    /// Delay before clusters stop being accepted
    pub settle_window: Duration,
    /// Interval between detach passes
    pub detach_interval: Duration,
}

impl Default for CutoverConfig {
    fn default() -> Self {
        Self {
            settle_window: DEFAULT_SETTLE_WINDOW,
            detach_interval: DEFAULT_DETACH_INTERVAL,
        }
    }
}

/// Stop this hub accepting `name`
///
/// Returns false if the cluster is absent or already not accepted. 409s
/// re-read the cluster and try again.
pub async fn disable_acceptance(client: &dyn HubClient, name: &str) -> Result<bool, Error> {
    retry_if(&RetryConfig::conflict(), "disable_acceptance", Error::is_conflict, || async move {
        let Some(mut cluster) = client.get_managed_cluster(name).await? else {
            return Ok(false);
        };
        if !cluster.spec.hub_accepts_client {
            return Ok(false);
        }
        cluster.spec.hub_accepts_client = false;
        client.replace_managed_cluster(&cluster).await?;
        Ok(true)
    })
    .await
}

struct RunningTask {
    generation: u64,
    token: CancellationToken,
}

/// Registry of in-flight cutover tasks
pub struct CutoverScheduler {
    client: Arc<dyn HubClient>,
    config: CutoverConfig,
    lifecycle: CancellationToken,
    tasks: Arc<DashMap<String, RunningTask>>,
    generation: AtomicU64,
}

impl CutoverScheduler {
    /// Create a scheduler whose tasks all stop when `lifecycle` is cancelled
    pub fn new(client: Arc<dyn HubClient>, config: CutoverConfig, lifecycle: CancellationToken) -> Self {
        Self {
            client,
            config,
            lifecycle,
            tasks: Arc::new(DashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    /// Number of in-flight tasks
    pub fn active(&self) -> usize {
        self.tasks.len()
    }

    /// Schedule cutover of `clusters` for routing policy `policy`
    ///
    /// Each cluster gets its own task, cancelling any task already scheduled
    /// for that cluster. The returned handle resolves once every cluster's
    /// task has ended: `Converged` only if all of them converged.
    pub fn schedule(&self, policy: &str, clusters: Vec<String>) -> JoinHandle<Result<DetachOutcome, Error>> {
        let tasks: Vec<_> = clusters
            .into_iter()
            .map(|cluster| self.schedule_cluster(policy, cluster))
            .collect();

        tokio::spawn(async move {
            let mut outcome = DetachOutcome::Converged;
            for task in tasks {
                let result = task
                    .await
                    .map_err(|e| Error::internal_with_context("cutover", e.to_string()))?;
                if result? == DetachOutcome::Cancelled {
                    outcome = DetachOutcome::Cancelled;
                }
            }
            Ok(outcome)
        })
    }

    fn schedule_cluster(&self, policy: &str, cluster: String) -> JoinHandle<Result<DetachOutcome, Error>> {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let token = self.lifecycle.child_token();

        if let Some(previous) = self.tasks.insert(
            cluster.clone(),
            RunningTask {
                generation,
                token: token.clone(),
            },
        ) {
            debug!(cluster = %cluster, policy = %policy, "Replacing in-flight cutover");
            previous.token.cancel();
        }

        let client = self.client.clone();
        let config = self.config.clone();
        let tasks = self.tasks.clone();
        let policy = policy.to_string();

        tokio::spawn(async move {
            let outcome = run_cutover(client, &cluster, &config, token).await;
            tasks.remove_if(&cluster, |_, t| t.generation == generation);
            match &outcome {
                Ok(DetachOutcome::Converged) => info!(cluster = %cluster, policy = %policy, "Cutover complete"),
                Ok(DetachOutcome::Cancelled) => debug!(cluster = %cluster, policy = %policy, "Cutover cancelled"),
                Err(e) => warn!(cluster = %cluster, policy = %policy, error = %e, "Cutover failed"),
            }
            outcome
        })
    }
}

async fn run_cutover(
    client: Arc<dyn HubClient>,
    cluster: &str,
    config: &CutoverConfig,
    token: CancellationToken,
) -> Result<DetachOutcome, Error> {
    tokio::select! {
        _ = token.cancelled() => return Ok(DetachOutcome::Cancelled),
        _ = tokio::time::sleep(config.settle_window) => {}
    }

    run_detach(client, vec![cluster.to_string()], config.detach_interval, token).await
}
