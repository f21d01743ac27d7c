//! In-memory per-(migration, hub) accumulation of bootstrap descriptors
//!
//! Credentials for the destination and each source hub materialize
//! independently. The store collects them until a source hub has both its
//! inbound (destination) and outbound (its own) descriptor.

use std::collections::BTreeMap;

use dashmap::DashMap;
use k8s_openapi::api::core::v1::Secret;
use tracing::{debug, warn};

use crate::resolve::Membership;

/// What the coordinator knows about one source hub of one migration
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PerHubMigrationState {
    /// Clusters leaving this hub
    pub managed_clusters: Vec<String>,
    /// Descriptor for the destination hub
    pub inbound: Option<Secret>,
    /// Descriptor for this source hub
    pub outbound: Option<Secret>,
}

impl PerHubMigrationState {
    /// Ready to emit once both descriptors are present
    pub fn is_ready(&self) -> bool {
        self.inbound.is_some() && self.outbound.is_some()
    }
}

/// Coordinator-owned state keyed by migration, then source hub
#[derive(Default)]
pub struct MigrationStateStore {
    migrations: DashMap<String, BTreeMap<String, PerHubMigrationState>>,
}

impl MigrationStateStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// True if state exists for `migration`
    pub fn contains(&self, migration: &str) -> bool {
        self.migrations.contains_key(migration)
    }

    /// Seed per-hub entries from `membership` unless already present
    ///
    /// Returns true if the migration was newly initialized.
    pub fn init_if_absent(&self, migration: &str, membership: &Membership) -> bool {
        let mut inserted = false;
        self.migrations.entry(migration.to_string()).or_insert_with(|| {
            inserted = true;
            membership
                .iter()
                .map(|(hub, clusters)| {
                    (
                        hub.clone(),
                        PerHubMigrationState {
                            managed_clusters: clusters.clone(),
                            ..Default::default()
                        },
                    )
                })
                .collect()
        });
        if inserted {
            debug!(migration = %migration, hubs = membership.len(), "Initialized migration state");
        }
        inserted
    }

    /// Store the destination descriptor on every source hub entry
    pub fn record_inbound(&self, migration: &str, secret: &Secret) {
        if let Some(mut hubs) = self.migrations.get_mut(migration) {
            for state in hubs.values_mut() {
                state.inbound = Some(secret.clone());
            }
        }
    }

    /// Store a source hub's own descriptor
    ///
    /// Returns false if `hub` is not a source hub of `migration`.
    pub fn record_outbound(&self, migration: &str, hub: &str, secret: &Secret) -> bool {
        let Some(mut hubs) = self.migrations.get_mut(migration) else {
            return false;
        };
        match hubs.get_mut(hub) {
            Some(state) => {
                state.outbound = Some(secret.clone());
                true
            }
            None => {
                warn!(migration = %migration, hub = %hub, "Credential for a hub that is not a source of this migration");
                false
            }
        }
    }

    /// Snapshot of every ready source hub
    pub fn ready_states(&self, migration: &str) -> Vec<(String, PerHubMigrationState)> {
        self.migrations
            .get(migration)
            .map(|hubs| {
                hubs.iter()
                    .filter(|(_, s)| s.is_ready())
                    .map(|(hub, s)| (hub.clone(), s.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Snapshot of one hub entry
    pub fn get(&self, migration: &str, hub: &str) -> Option<PerHubMigrationState> {
        self.migrations.get(migration).and_then(|h| h.get(hub).cloned())
    }

    /// Drop all state for `migration`
    pub fn remove(&self, migration: &str) -> bool {
        self.migrations.remove(migration).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::api::ObjectMeta;

    fn secret(name: &str) -> Secret {
        Secret {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn membership() -> Membership {
        BTreeMap::from([
            ("hub-a".to_string(), vec!["c1".to_string()]),
            ("hub-b".to_string(), vec!["c2".to_string()]),
        ])
    }

    #[test]
    fn test_single_descriptor_is_not_ready() {
        let store = MigrationStateStore::new();
        store.init_if_absent("m1", &membership());

        store.record_inbound("m1", &secret("bootstrap-hub-c"));
        assert!(store.ready_states("m1").is_empty());

        let store = MigrationStateStore::new();
        store.init_if_absent("m1", &membership());
        store.record_outbound("m1", "hub-a", &secret("bootstrap-hub-a"));
        assert!(store.ready_states("m1").is_empty());
    }

    #[test]
    fn test_each_hub_becomes_ready_with_its_own_outbound() {
        let store = MigrationStateStore::new();
        store.init_if_absent("m1", &membership());
        store.record_inbound("m1", &secret("bootstrap-hub-c"));
        store.record_outbound("m1", "hub-a", &secret("bootstrap-hub-a"));

        let ready = store.ready_states("m1");
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].0, "hub-a");
        assert_eq!(ready[0].1.managed_clusters, vec!["c1"]);

        store.record_outbound("m1", "hub-b", &secret("bootstrap-hub-b"));
        assert_eq!(store.ready_states("m1").len(), 2);
    }

    #[test]
    fn test_init_does_not_clobber_existing_state() {
        let store = MigrationStateStore::new();
        assert!(store.init_if_absent("m1", &membership()));
        store.record_outbound("m1", "hub-a", &secret("bootstrap-hub-a"));

        assert!(!store.init_if_absent("m1", &membership()));
        assert!(store.get("m1", "hub-a").unwrap().outbound.is_some());
    }

    #[test]
    fn test_outbound_for_unknown_hub_is_ignored() {
        let store = MigrationStateStore::new();
        store.init_if_absent("m1", &membership());
        assert!(!store.record_outbound("m1", "hub-x", &secret("bootstrap-hub-x")));
        assert!(store.get("m1", "hub-x").is_none());
        assert!(!store.record_outbound("m2", "hub-a", &secret("bootstrap-hub-a")));
    }

    #[test]
    fn test_retry_overwrites_descriptor() {
        let store = MigrationStateStore::new();
        store.init_if_absent("m1", &membership());
        store.record_inbound("m1", &secret("old"));
        store.record_inbound("m1", &secret("new"));

        let inbound = store.get("m1", "hub-b").unwrap().inbound.unwrap();
        assert_eq!(inbound.metadata.name.as_deref(), Some("new"));
    }

    #[test]
    fn test_remove() {
        let store = MigrationStateStore::new();
        store.init_if_absent("m1", &membership());
        assert!(store.remove("m1"));
        assert!(!store.contains("m1"));
        assert!(!store.remove("m1"));
    }
}
