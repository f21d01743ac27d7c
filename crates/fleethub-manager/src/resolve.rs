//! Cluster-to-hub resolution
//!
//! A migration either names its source hub or leaves it to the fleet
//! inventory, which records which hub currently owns each managed cluster.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params_from_iter, Connection};
use tracing::{debug, warn};

#[cfg(test)]
use mockall::automock;

use fleethub_common::crd::ManagedClusterMigration;
use fleethub_common::Error;
use kube::ResourceExt;

/// Hub name to the clusters it owns, in the order the migration lists them
pub type Membership = BTreeMap<String, Vec<String>>;

/// Read-only view of which hub owns which cluster
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterInventory: Send + Sync {
    /// Owning hub for each of `clusters` that the inventory knows, as `(hub, cluster)`
    async fn owning_hubs(&self, clusters: &[String]) -> Result<Vec<(String, String)>, Error>;
}

/// Inventory backed by the `managed_clusters` table
///
/// The table has at least `leaf_hub_name TEXT` and `cluster_name TEXT`.
pub struct SqliteInventory {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteInventory {
    /// Open an inventory database file
    pub fn open(path: &Path) -> Result<Self, Error> {
        let conn = Connection::open(path).map_err(|e| {
            Error::internal_with_context("inventory", format!("open {}: {}", path.display(), e))
        })?;
        Ok(Self::from_connection(conn))
    }

    /// Wrap an existing connection
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }
}

fn query_owning_hubs(conn: &Connection, clusters: &[String]) -> rusqlite::Result<Vec<(String, String)>> {
    let placeholders = vec!["?"; clusters.len()].join(", ");
    let sql = format!(
        "SELECT leaf_hub_name, cluster_name FROM managed_clusters WHERE cluster_name IN ({placeholders})"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(clusters.iter()), |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    rows.collect()
}

#[async_trait]
impl ClusterInventory for SqliteInventory {
    async fn owning_hubs(&self, clusters: &[String]) -> Result<Vec<(String, String)>, Error> {
        if clusters.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn.clone();
        let clusters = clusters.to_vec();

        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| Error::internal_with_context("inventory", "connection lock poisoned"))?;
            query_owning_hubs(&conn, &clusters)
                .map_err(|e| Error::internal_with_context("inventory", format!("query failed: {e}")))
        })
        .await
        .map_err(|e| Error::internal_with_context("inventory", format!("query task failed: {e}")))?
    }
}

/// Resolve which hub each included cluster migrates away from
///
/// An explicit `spec.from` short-circuits the inventory. Otherwise every
/// included cluster must have an inventory row; a single unmapped cluster
/// fails the whole resolution.
pub async fn resolve_membership(
    migration: &ManagedClusterMigration,
    inventory: &dyn ClusterInventory,
) -> Result<Membership, Error> {
    let name = migration.name_any();
    let clusters = &migration.spec.included_managed_clusters;

    if let Some(from) = migration.spec.source_hub() {
        return Ok(BTreeMap::from([(from.to_string(), clusters.clone())]));
    }

    let rows = inventory.owning_hubs(clusters).await?;
    let mut owner: BTreeMap<&str, &str> = BTreeMap::new();
    for (hub, cluster) in &rows {
        if let Some(previous) = owner.insert(cluster.as_str(), hub.as_str()) {
            if previous != hub.as_str() {
                warn!(migration = %name, cluster = %cluster, first = %previous, second = %hub,
                    "Cluster has more than one owning hub in inventory, using the last");
            }
        }
    }

    let mut membership = Membership::new();
    for cluster in clusters {
        let hub = owner.get(cluster.as_str()).ok_or_else(|| {
            Error::resolution(&name, format!("cluster {cluster} has no owning hub in inventory"))
        })?;
        membership
            .entry(hub.to_string())
            .or_default()
            .push(cluster.clone());
    }

    debug!(migration = %name, hubs = membership.len(), "Resolved cluster membership");
    Ok(membership)
}
