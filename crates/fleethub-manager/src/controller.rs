//! ManagedClusterMigration coordinator
//!
//! Two controllers feed one idempotent entry point, [`Coordinator::reconcile`]:
//! changes to a migration arrive as [`ReconcileRequest::Migration`] and
//! changes to one of its credential requests arrive as
//! [`ReconcileRequest::Credential`]. The coordinator requests credentials on
//! every involved hub, gathers the resulting descriptors per source hub, and
//! emits the migration protocol once a source hub has both.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::runtime::controller::Action;
use kube::{Client, ResourceExt};
use tracing::{debug, error, info, instrument, warn};

#[cfg(test)]
use mockall::automock;

use fleethub_common::crd::{
    ManagedCluster, ManagedClusterMigration, ManagedServiceAccount, CA_CERT_KEY,
    MIGRATION_FINALIZER, TOKEN_KEY,
};
use fleethub_common::kube_utils::{add_finalizer, has_finalizer, remove_finalizer, secret_value};
use fleethub_common::{Error, FLEETHUB_SYSTEM_NAMESPACE, MIGRATION_LABEL_KEY};
use fleethub_transport::MessageProducer;

use crate::bootstrap::BootstrapDescriptor;
use crate::protocol;
use crate::resolve::{resolve_membership, ClusterInventory};
use crate::state::MigrationStateStore;

/// Requeue interval while waiting for a credential Secret to materialize
pub const CREDENTIAL_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Requeue interval after a failed reconcile
pub const ERROR_REQUEUE_INTERVAL: Duration = Duration::from_secs(5);

/// Kubernetes operations the coordinator performs
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MigrationKubeClient: Send + Sync {
    /// Get a ManagedClusterMigration by name
    async fn get_migration(&self, name: &str) -> Result<Option<ManagedClusterMigration>, Error>;

    /// Add the cleanup finalizer
    async fn add_migration_finalizer(&self, migration: &ManagedClusterMigration) -> Result<(), Error>;

    /// Remove the cleanup finalizer
    async fn remove_migration_finalizer(&self, migration: &ManagedClusterMigration) -> Result<(), Error>;

    /// Get a ManagedServiceAccount
    async fn get_service_account(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<ManagedServiceAccount>, Error>;

    /// Create a ManagedServiceAccount
    async fn create_service_account(&self, msa: &ManagedServiceAccount) -> Result<(), Error>;

    /// List every ManagedServiceAccount derived from `migration`, across namespaces
    async fn list_service_accounts(&self, migration: &str) -> Result<Vec<ManagedServiceAccount>, Error>;

    /// Delete a ManagedServiceAccount, treating absence as success
    async fn delete_service_account(&self, name: &str, namespace: &str) -> Result<(), Error>;

    /// Get a Secret
    async fn get_secret(&self, name: &str, namespace: &str) -> Result<Option<Secret>, Error>;

    /// Get a ManagedCluster (cluster-scoped)
    async fn get_managed_cluster(&self, name: &str) -> Result<Option<ManagedCluster>, Error>;
}

/// Real Kubernetes client implementation
pub struct MigrationKubeClientImpl {
    client: Client,
    namespace: String,
}

impl MigrationKubeClientImpl {
    /// Create a client that reads migrations from `namespace`
    pub fn new(client: Client, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
        }
    }

    fn migrations(&self) -> Api<ManagedClusterMigration> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }
}

#[async_trait]
impl MigrationKubeClient for MigrationKubeClientImpl {
    async fn get_migration(&self, name: &str) -> Result<Option<ManagedClusterMigration>, Error> {
        Ok(self.migrations().get_opt(name).await?)
    }

    async fn add_migration_finalizer(&self, migration: &ManagedClusterMigration) -> Result<(), Error> {
        add_finalizer(&self.migrations(), migration, MIGRATION_FINALIZER).await
    }

    async fn remove_migration_finalizer(&self, migration: &ManagedClusterMigration) -> Result<(), Error> {
        remove_finalizer(&self.migrations(), migration, MIGRATION_FINALIZER).await
    }

    async fn get_service_account(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<ManagedServiceAccount>, Error> {
        let api: Api<ManagedServiceAccount> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn create_service_account(&self, msa: &ManagedServiceAccount) -> Result<(), Error> {
        let namespace = msa.namespace().unwrap_or_default();
        let api: Api<ManagedServiceAccount> = Api::namespaced(self.client.clone(), &namespace);
        match api.create(&PostParams::default(), msa).await {
            Ok(_) => Ok(()),
            // Lost a race with another pass; the object exists, which is all we need
            Err(kube::Error::Api(ae)) if ae.code == 409 => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_service_accounts(&self, migration: &str) -> Result<Vec<ManagedServiceAccount>, Error> {
        let api: Api<ManagedServiceAccount> = Api::all(self.client.clone());
        let lp = ListParams::default().labels(&ManagedServiceAccount::selector_for(migration));
        Ok(api.list(&lp).await?.items)
    }

    async fn delete_service_account(&self, name: &str, namespace: &str) -> Result<(), Error> {
        let api: Api<ManagedServiceAccount> = Api::namespaced(self.client.clone(), namespace);
        match api.delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_secret(&self, name: &str, namespace: &str) -> Result<Option<Secret>, Error> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn get_managed_cluster(&self, name: &str) -> Result<Option<ManagedCluster>, Error> {
        let api: Api<ManagedCluster> = Api::all(self.client.clone());
        Ok(api.get_opt(name).await?)
    }
}

/// The record kind that triggered a reconcile
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReconcileRequest {
    /// A ManagedClusterMigration changed
    Migration {
        /// Migration name
        name: String,
    },
    /// A migration's credential request on `hub` changed
    Credential {
        /// Migration name
        migration: String,
        /// Hub the credential was issued for
        hub: String,
    },
}

impl fmt::Display for ReconcileRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Migration { name } => write!(f, "migration/{name}"),
            Self::Credential { migration, hub } => write!(f, "credential/{migration}@{hub}"),
        }
    }
}

impl ReconcileRequest {
    /// Request derived from a changed credential record
    ///
    /// The migration name comes from the migration label, falling back to the
    /// record name, and the hub is the record's namespace.
    pub fn for_credential(msa: &ManagedServiceAccount) -> Option<Self> {
        let hub = msa.namespace()?;
        let migration = msa
            .labels()
            .get(MIGRATION_LABEL_KEY)
            .cloned()
            .unwrap_or_else(|| msa.name_any());
        Some(Self::Credential { migration, hub })
    }
}

/// Static coordinator settings
#[derive(Clone, Debug)]
pub struct CoordinatorConfig {
    /// Namespace ManagedClusterMigrations live in
    pub namespace: String,
    /// Sender identity stamped on outgoing messages
    pub identity: String,
    /// Whether clusters are imported in hosted mode
    pub hosted_mode: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            namespace: FLEETHUB_SYSTEM_NAMESPACE.to_string(),
            identity: "fleethub-manager".to_string(),
            hosted_mode: false,
        }
    }
}

/// Migration coordinator shared by both controllers
pub struct Coordinator {
    kube: Arc<dyn MigrationKubeClient>,
    inventory: Arc<dyn ClusterInventory>,
    producer: Arc<dyn MessageProducer>,
    state: MigrationStateStore,
    config: CoordinatorConfig,
}

impl Coordinator {
    /// Create a coordinator over explicit collaborators
    pub fn new(
        kube: Arc<dyn MigrationKubeClient>,
        inventory: Arc<dyn ClusterInventory>,
        producer: Arc<dyn MessageProducer>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            kube,
            inventory,
            producer,
            state: MigrationStateStore::new(),
            config,
        }
    }

    /// Create a coordinator that talks to the cluster through `client`
    pub fn with_client(
        client: Client,
        inventory: Arc<dyn ClusterInventory>,
        producer: Arc<dyn MessageProducer>,
        config: CoordinatorConfig,
    ) -> Self {
        let kube = Arc::new(MigrationKubeClientImpl::new(client, config.namespace.clone()));
        Self::new(kube, inventory, producer, config)
    }

    /// Coordinator settings
    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Per-hub state store
    pub fn state(&self) -> &MigrationStateStore {
        &self.state
    }

    /// Single entry point for both controllers
    #[instrument(skip_all, fields(request = %request))]
    pub async fn reconcile(&self, request: ReconcileRequest) -> Result<Action, Error> {
        match request {
            ReconcileRequest::Migration { name } => self.reconcile_migration_request(&name).await,
            ReconcileRequest::Credential { migration, hub } => {
                self.reconcile_credential_request(&migration, &hub).await
            }
        }
    }

    async fn reconcile_migration_request(&self, name: &str) -> Result<Action, Error> {
        let Some(migration) = self.kube.get_migration(name).await? else {
            debug!(migration = %name, "Migration not found, nothing to do");
            self.state.remove(name);
            return Ok(Action::await_change());
        };

        if migration.is_deleting() {
            return self.handle_deletion(&migration).await;
        }

        if !has_finalizer(&migration, MIGRATION_FINALIZER) {
            info!(migration = %name, "Adding cleanup finalizer");
            self.kube.add_migration_finalizer(&migration).await?;
            return Ok(Action::requeue(CREDENTIAL_POLL_INTERVAL));
        }

        if let Err(e) = migration.spec.validate(name) {
            warn!(migration = %name, error = %e, "Invalid migration, waiting for spec change");
            return Ok(Action::await_change());
        }

        let membership = resolve_membership(&migration, self.inventory.as_ref()).await?;

        for hub in membership.keys() {
            self.ensure_service_account(name, hub).await?;
        }
        self.ensure_service_account(name, &migration.spec.to).await?;

        Ok(Action::await_change())
    }

    async fn ensure_service_account(&self, migration: &str, hub: &str) -> Result<(), Error> {
        if self.kube.get_service_account(migration, hub).await?.is_some() {
            return Ok(());
        }
        info!(migration = %migration, hub = %hub, "Requesting migration credential");
        self.kube
            .create_service_account(&ManagedServiceAccount::for_migration(migration, hub))
            .await
    }

    async fn handle_deletion(&self, migration: &ManagedClusterMigration) -> Result<Action, Error> {
        let name = migration.name_any();

        if has_finalizer(migration, MIGRATION_FINALIZER) {
            let accounts = self.kube.list_service_accounts(&name).await?;
            for msa in &accounts {
                let namespace = msa.namespace().unwrap_or_default();
                self.kube
                    .delete_service_account(&msa.name_any(), &namespace)
                    .await?;
                debug!(migration = %name, hub = %namespace, "Deleted migration credential");
            }
            info!(migration = %name, credentials = accounts.len(), "Credentials removed, releasing finalizer");
            self.kube.remove_migration_finalizer(migration).await?;
        }

        self.state.remove(&name);
        Ok(Action::await_change())
    }

    async fn reconcile_credential_request(&self, name: &str, hub: &str) -> Result<Action, Error> {
        let Some(migration) = self.kube.get_migration(name).await? else {
            debug!(migration = %name, hub = %hub, "Credential for a missing migration, ignoring");
            return Ok(Action::await_change());
        };
        if migration.is_deleting() {
            return Ok(Action::await_change());
        }

        if !self.state.contains(name) {
            if let Err(e) = migration.spec.validate(name) {
                warn!(migration = %name, error = %e, "Invalid migration, ignoring credential");
                return Ok(Action::await_change());
            }
            let membership = resolve_membership(&migration, self.inventory.as_ref()).await?;
            self.state.init_if_absent(name, &membership);
        }

        let secret = self.kube.get_secret(name, hub).await?;
        let materialized = secret
            .as_ref()
            .is_some_and(|s| secret_value(s, TOKEN_KEY).is_some() && secret_value(s, CA_CERT_KEY).is_some());
        let Some(secret) = secret.filter(|_| materialized) else {
            debug!(migration = %name, hub = %hub, "Credential secret not ready yet");
            return Ok(Action::requeue(CREDENTIAL_POLL_INTERVAL));
        };

        let hub_cluster = self
            .kube
            .get_managed_cluster(hub)
            .await?
            .ok_or_else(|| Error::credential(hub, "hub has no ManagedCluster record"))?;
        let server = hub_cluster
            .api_url()
            .ok_or_else(|| Error::credential(hub, "hub advertises no API server URL"))?;

        let descriptor = BootstrapDescriptor::from_credential(hub, &secret, server)?;
        let bootstrap_secret = descriptor.to_secret()?;

        if hub == migration.spec.to {
            self.state.record_inbound(name, &bootstrap_secret);
        } else {
            self.state.record_outbound(name, hub, &bootstrap_secret);
        }

        let ready = self.state.ready_states(name);
        protocol::emit(
            self.producer.as_ref(),
            &self.config.identity,
            &migration,
            &ready,
            self.config.hosted_mode,
        )
        .await?;

        Ok(Action::await_change())
    }
}

/// Controller adapter for ManagedClusterMigration events
pub async fn reconcile_migration(
    migration: Arc<ManagedClusterMigration>,
    ctx: Arc<Coordinator>,
) -> Result<Action, Error> {
    ctx.reconcile(ReconcileRequest::Migration {
        name: migration.name_any(),
    })
    .await
}

/// Controller adapter for ManagedServiceAccount events
pub async fn reconcile_credential(
    msa: Arc<ManagedServiceAccount>,
    ctx: Arc<Coordinator>,
) -> Result<Action, Error> {
    match ReconcileRequest::for_credential(&msa) {
        Some(request) => ctx.reconcile(request).await,
        None => Ok(Action::await_change()),
    }
}

/// Error policy for the migration controller
pub fn migration_error_policy(
    migration: Arc<ManagedClusterMigration>,
    error: &Error,
    _ctx: Arc<Coordinator>,
) -> Action {
    error!(?error, migration = %migration.name_any(), "migration reconciliation failed");
    Action::requeue(ERROR_REQUEUE_INTERVAL)
}

/// Error policy for the credential controller
pub fn credential_error_policy(
    msa: Arc<ManagedServiceAccount>,
    error: &Error,
    _ctx: Arc<Coordinator>,
) -> Action {
    error!(
        ?error,
        migration = %msa.name_any(),
        hub = %msa.namespace().unwrap_or_default(),
        "credential reconciliation failed"
    );
    Action::requeue(ERROR_REQUEUE_INTERVAL)
}
