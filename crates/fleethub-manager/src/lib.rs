//! Global hub migration coordinator
//!
//! Watches ManagedClusterMigration records, requests migration credentials on
//! every involved hub, turns them into bootstrap descriptors and drives the
//! `migration.from` / `migration.to` protocol toward the regional hubs.

#![warn(missing_docs)]

pub mod bootstrap;
pub mod controller;
pub mod protocol;
pub mod resolve;
pub mod state;

pub use bootstrap::{bootstrap_secret_name, BootstrapDescriptor};
pub use controller::{
    credential_error_policy, migration_error_policy, reconcile_credential, reconcile_migration,
    Coordinator, CoordinatorConfig, MigrationKubeClient, MigrationKubeClientImpl, ReconcileRequest,
};
pub use resolve::{resolve_membership, ClusterInventory, Membership, SqliteInventory};
pub use state::{MigrationStateStore, PerHubMigrationState};
