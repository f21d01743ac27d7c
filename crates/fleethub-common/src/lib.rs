//! Common types for fleethub: CRDs, errors, and utilities shared by the
//! migration manager and the per-hub agent.

#![warn(missing_docs)]

pub mod crd;
pub mod error;
pub mod kube_utils;
pub mod retry;
pub mod telemetry;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Namespace holding ManagedClusterMigration resources and the manager itself
pub const FLEETHUB_SYSTEM_NAMESPACE: &str = "fleethub-system";

/// Field manager used for every server-side apply and merge patch
pub const FIELD_MANAGER: &str = "fleethub-controller";

/// Label carried by every resource the migration controller derives
pub const OWNER_LABEL_KEY: &str = "fleethub.dev/owner";

/// Value of [`OWNER_LABEL_KEY`] for migration-owned resources
pub const OWNER_LABEL_MIGRATION: &str = "managedclustermigration";

/// Label naming the ManagedClusterMigration a derived resource belongs to
pub const MIGRATION_LABEL_KEY: &str = "fleethub.dev/migration";
