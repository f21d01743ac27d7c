//! Emission of the two-message migration protocol
//!
//! `migration.from` goes to each ready source hub with that hub's own state.
//! `migration.to` goes to the destination hub. Neither depends on the other
//! and both may be re-sent on every pass; receivers upsert.

use kube::ResourceExt;
use tracing::info;

use fleethub_common::crd::{KlusterletConfig, ManagedClusterMigration};
use fleethub_common::Error;
use fleethub_transport::{
    MessageEnvelope, MessageProducer, MessageType, MigrationFromEvent, MigrationToEvent,
};

use crate::state::PerHubMigrationState;

/// Routing policy for `migration` listing the inbound then outbound descriptor
pub fn routing_policy(
    migration: &ManagedClusterMigration,
    state: &PerHubMigrationState,
) -> Result<KlusterletConfig, Error> {
    let name = migration.name_any();
    let inbound = state
        .inbound
        .as_ref()
        .and_then(|s| s.metadata.name.as_deref())
        .ok_or_else(|| Error::internal_with_context("routing_policy", format!("{name}: no inbound descriptor")))?;
    let outbound = state
        .outbound
        .as_ref()
        .and_then(|s| s.metadata.name.as_deref())
        .ok_or_else(|| Error::internal_with_context("routing_policy", format!("{name}: no outbound descriptor")))?;

    Ok(KlusterletConfig::routing_policy(&migration.spec.to, &[inbound, outbound]))
}

/// Build the `migration.from` envelope for one ready source hub
pub fn from_envelope(
    source: &str,
    migration: &ManagedClusterMigration,
    from_hub: &str,
    state: &PerHubMigrationState,
) -> Result<MessageEnvelope, Error> {
    let routing_policy = routing_policy(migration, state)?;
    let (Some(inbound), Some(outbound)) = (state.inbound.clone(), state.outbound.clone()) else {
        return Err(Error::internal_with_context(
            "from_envelope",
            format!("hub {from_hub} is not ready"),
        ));
    };
    let event = MigrationFromEvent {
        bootstrap_secret: inbound,
        original_bootstrap_secret: outbound,
        routing_policy,
        managed_clusters: state.managed_clusters.clone(),
    };
    MessageEnvelope::new(MessageType::MigrationFrom, source, from_hub, &event)
}

/// Build the `migration.to` envelope for the destination hub
pub fn to_envelope(
    source: &str,
    migration: &ManagedClusterMigration,
    hosted: bool,
) -> Result<MessageEnvelope, Error> {
    let event = MigrationToEvent {
        service_account_name: migration.name_any(),
        service_account_install_namespace: migration.service_account_install_namespace(hosted),
    };
    MessageEnvelope::new(MessageType::MigrationTo, source, &migration.spec.to, &event)
}

/// Send `migration.from` to every ready hub, then `migration.to` once
///
/// Does nothing when no hub is ready.
pub async fn emit(
    producer: &dyn MessageProducer,
    source: &str,
    migration: &ManagedClusterMigration,
    ready: &[(String, PerHubMigrationState)],
    hosted: bool,
) -> Result<(), Error> {
    if ready.is_empty() {
        return Ok(());
    }
    let name = migration.name_any();

    for (hub, state) in ready {
        let envelope = from_envelope(source, migration, hub, state)?;
        producer.send(&envelope).await?;
        info!(migration = %name, hub = %hub, clusters = state.managed_clusters.len(), "Sent migration.from");
    }

    let envelope = to_envelope(source, migration, hosted)?;
    producer.send(&envelope).await?;
    info!(migration = %name, hub = %migration.spec.to, "Sent migration.to");
    Ok(())
}
