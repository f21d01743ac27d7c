//! Controller runner - builds the manager's controller futures
//!
//! Two controllers share one [`Coordinator`]: one watches migrations, the
//! other watches the credentials derived from them. A credential disappearing
//! also re-triggers its migration so the credential is recreated.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::StreamExt;
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, ResourceExt};

use fleethub_common::crd::{ManagedClusterMigration, ManagedServiceAccount};
use fleethub_common::{MIGRATION_LABEL_KEY, OWNER_LABEL_KEY, OWNER_LABEL_MIGRATION};
use fleethub_manager::{
    credential_error_policy, migration_error_policy, reconcile_credential, reconcile_migration,
    Coordinator,
};

/// Watcher timeout (seconds) - must be less than client read_timeout (30s)
const WATCH_TIMEOUT_SECS: u32 = 25;

/// Boxed controller future
pub type ControllerFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

fn owned_credentials() -> WatcherConfig {
    WatcherConfig::default()
        .labels(&format!("{OWNER_LABEL_KEY}={OWNER_LABEL_MIGRATION}"))
        .timeout(WATCH_TIMEOUT_SECS)
}

/// Migration that a credential was derived from
fn migration_for(msa: &ManagedServiceAccount, namespace: &str) -> Option<ObjectRef<ManagedClusterMigration>> {
    if !msa.is_migration_owned() {
        return None;
    }
    msa.labels()
        .get(MIGRATION_LABEL_KEY)
        .map(|name| ObjectRef::new(name).within(namespace))
}

/// Build the migration and credential controllers
pub fn build_manager_controllers(client: Client, coordinator: Arc<Coordinator>) -> Vec<ControllerFuture> {
    let namespace = coordinator.config().namespace.clone();
    let migrations: Api<ManagedClusterMigration> = Api::namespaced(client.clone(), &namespace);
    let credentials: Api<ManagedServiceAccount> = Api::all(client);

    let migration_ctrl = Controller::new(
        migrations,
        WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS),
    )
    .watches(credentials.clone(), owned_credentials(), move |msa| {
        migration_for(&msa, &namespace)
    })
    .shutdown_on_signal()
    .run(reconcile_migration, migration_error_policy, coordinator.clone())
    .for_each(log_reconcile_result("ManagedClusterMigration"));

    let credential_ctrl = Controller::new(credentials, owned_credentials())
        .shutdown_on_signal()
        .run(reconcile_credential, credential_error_policy, coordinator)
        .for_each(log_reconcile_result("ManagedServiceAccount"));

    tracing::info!("- ManagedClusterMigration controller");
    tracing::info!("- ManagedServiceAccount controller");

    vec![Box::pin(migration_ctrl), Box::pin(credential_ctrl)]
}

fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    controller_name: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(action) => tracing::debug!(?action, "{} reconciliation completed", controller_name),
            Err(e) => tracing::error!(error = ?e, "{} reconciliation error", controller_name),
        }
        std::future::ready(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_maps_back_to_its_migration() {
        let msa = ManagedServiceAccount::for_migration("m1", "hub-a");
        let target = migration_for(&msa, "fleethub-system").unwrap();
        assert_eq!(target.name, "m1");
        assert_eq!(target.namespace.as_deref(), Some("fleethub-system"));
    }

    #[test]
    fn test_unlabelled_credential_maps_nowhere() {
        let msa = ManagedServiceAccount::new("other", Default::default());
        assert!(migration_for(&msa, "fleethub-system").is_none());
    }

    #[test]
    fn test_credential_from_another_owner_maps_nowhere() {
        let mut msa = ManagedServiceAccount::for_migration("m1", "hub-a");
        msa.labels_mut()
            .insert(OWNER_LABEL_KEY.to_string(), "someone-else".to_string());
        assert!(migration_for(&msa, "fleethub-system").is_none());
    }
}
