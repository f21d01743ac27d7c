//! Custom Resource Definitions used by fleethub
//!
//! `ManagedClusterMigration` is owned by fleethub. The remaining kinds belong
//! to open-cluster-management components and are modelled only as far as the
//! migration workflow reads or writes them.

mod klusterlet_config;
mod managed_cluster;
mod migration;
mod service_account;
mod types;

pub use klusterlet_config::{
    BootstrapKubeConfigs, KlusterletConfig, KlusterletConfigSpec, KubeConfigSecret,
    LocalSecretsConfig, LOCAL_SECRETS, ROUTING_POLICY_PREFIX,
};
pub use managed_cluster::{
    ClientConfig, ManagedCluster, ManagedClusterSpec, ManagedClusterStatus, CONDITION_AVAILABLE,
    DISABLE_AUTO_IMPORT_ANNOTATION, KLUSTERLET_CONFIG_ANNOTATION, MIGRATING_ANNOTATION,
};
pub use migration::{
    ManagedClusterMigration, ManagedClusterMigrationSpec, DEFAULT_SERVICE_ACCOUNT_NAMESPACE,
    HOSTED_SERVICE_ACCOUNT_NAMESPACE, MIGRATION_FINALIZER, SERVICE_ACCOUNT_NAMESPACE_ANNOTATION,
};
pub use service_account::{
    ManagedServiceAccount, ManagedServiceAccountSpec, Rotation, CA_CERT_KEY,
    MIGRATION_TOKEN_VALIDITY, TOKEN_KEY,
};
pub use types::{find_condition, Condition, ConditionStatus};
