//! Fleethub hub agent
//!
//! Runs inside every regional hub and applies the migration messages the
//! global hub manager sends it:
//!
//! - **`migration.from`**: this hub is losing clusters. Install the bootstrap
//!   secrets and routing policy, pin the clusters, then cut them over and
//!   detach them once they have left.
//! - **`migration.to`**: this hub is gaining clusters. Grant the migration
//!   service account the permissions registration needs.

#![warn(missing_docs)]

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

pub mod client;
pub mod cutover;
pub mod detach;
pub mod dispatcher;
pub mod from_syncer;
pub mod merge;
pub mod to_syncer;

#[cfg(test)]
mod testing;

pub use client::{HubClient, HubClientImpl};
pub use cutover::{CutoverConfig, CutoverScheduler, DEFAULT_SETTLE_WINDOW};
pub use detach::{DetachOutcome, DEFAULT_DETACH_INTERVAL};
pub use dispatcher::{DeadLetter, DeadLetterQueue, Delivery, Dispatcher, DEFAULT_DEAD_LETTER_CAPACITY};
pub use from_syncer::FromSyncer;
pub use to_syncer::ToSyncer;

/// Settings for one hub agent
#[derive(Clone, Debug)]
pub struct AgentConfig {
    /// Name of the hub this agent runs in
    pub hub: String,
    /// Cutover timing
    pub cutover: CutoverConfig,
    /// Dead-letter queue capacity
    pub dead_letter_capacity: usize,
}

impl AgentConfig {
    /// Defaults for `hub`
    pub fn new(hub: impl Into<String>) -> Self {
        Self {
            hub: hub.into(),
            cutover: CutoverConfig::default(),
            dead_letter_capacity: DEFAULT_DEAD_LETTER_CAPACITY,
        }
    }
}

/// Wire the handlers for one hub into a dispatcher
///
/// Background cutover tasks stop when `lifecycle` is cancelled.
pub fn build_dispatcher(
    client: Arc<dyn HubClient>,
    config: &AgentConfig,
    lifecycle: CancellationToken,
) -> Dispatcher {
    let cutover = Arc::new(CutoverScheduler::new(
        client.clone(),
        config.cutover.clone(),
        lifecycle,
    ));
    Dispatcher::new(
        config.hub.clone(),
        FromSyncer::new(client.clone(), cutover),
        ToSyncer::new(client),
    )
    .with_dead_letters(Arc::new(DeadLetterQueue::new(config.dead_letter_capacity)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleethub_common::crd::{ConditionStatus, KlusterletConfig};
    use fleethub_transport::{InMemoryTransport, MessageEnvelope, MessageProducer, MessageType, MigrationFromEvent};
    use k8s_openapi::api::core::v1::Secret;
    use kube::api::ObjectMeta;
    use std::time::Duration;

    use crate::testing::FakeHub;

    fn secret(name: &str) -> Secret {
        Secret {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("multicluster-engine".to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Story: a source hub agent receives migration.from over the in-memory
    /// transport, pins the cluster, cuts it over and detaches it once it
    /// stops reporting
    #[tokio::test(start_paused = true)]
    async fn story_source_hub_end_to_end() {
        let hub = Arc::new(FakeHub::new().with_cluster("c1", ConditionStatus::True));
        let transport = InMemoryTransport::new();
        let rx = transport.register("hub-a");
        let lifecycle = CancellationToken::new();

        let dispatcher = build_dispatcher(hub.clone(), &AgentConfig::new("hub-a"), lifecycle.clone());
        let running = tokio::spawn(dispatcher.run(rx, lifecycle.clone()));

        let event = MigrationFromEvent {
            bootstrap_secret: secret("bootstrap-hub-b"),
            original_bootstrap_secret: secret("bootstrap-hub-a"),
            routing_policy: KlusterletConfig::routing_policy("hub-b", &["bootstrap-hub-b", "bootstrap-hub-a"]),
            managed_clusters: vec!["c1".to_string()],
        };
        let envelope = MessageEnvelope::new(MessageType::MigrationFrom, "mgr", "hub-a", &event).unwrap();
        transport.send(&envelope).await.unwrap();

        tokio::time::sleep(Duration::from_secs(11)).await;
        let mc = hub.cluster("c1").unwrap();
        assert!(mc.is_pinned_to("migration-hub-b"));
        assert!(!mc.spec.hub_accepts_client);

        hub.set_availability("c1", ConditionStatus::Unknown);
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(hub.cluster("c1").is_none());

        lifecycle.cancel();
        running.await.unwrap();
    }
}
