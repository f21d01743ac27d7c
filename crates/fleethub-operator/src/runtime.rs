//! Process entry points for each subcommand

use std::sync::Arc;

use anyhow::Context as _;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client, CustomResourceExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use fleethub_agent::{build_dispatcher, HubClientImpl};
use fleethub_common::crd::ManagedClusterMigration;
use fleethub_common::FIELD_MANAGER;
use fleethub_manager::{Coordinator, SqliteInventory};
use fleethub_transport::{event_router, HttpProducer, HubRoutes};

use crate::config::{AgentArgs, ManagerArgs};
use crate::controller_runner::build_manager_controllers;

/// Install the ManagedClusterMigration CRD with server-side apply
///
/// Keeps the installed schema in step with the running binary.
pub async fn ensure_crds_installed(client: &Client) -> anyhow::Result<()> {
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(FIELD_MANAGER).force();

    info!("Installing ManagedClusterMigration CRD...");
    crds.patch(
        "managedclustermigrations.fleethub.dev",
        &params,
        &Patch::Apply(&ManagedClusterMigration::crd()),
    )
    .await
    .context("failed to install ManagedClusterMigration CRD")?;
    Ok(())
}

/// Run the migration coordinator until a shutdown signal
pub async fn run_manager(args: ManagerArgs) -> anyhow::Result<()> {
    let client = Client::try_default()
        .await
        .context("failed to create Kubernetes client")?;
    ensure_crds_installed(&client).await?;

    let inventory = SqliteInventory::open(&args.inventory_db)
        .with_context(|| format!("failed to open inventory {}", args.inventory_db.display()))?;
    let routes = HubRoutes::load(&args.routes)?;
    info!(hubs = routes.hubs.len(), "Loaded hub routes");
    let producer = HttpProducer::new(routes)?;

    let coordinator = Arc::new(Coordinator::with_client(
        client.clone(),
        Arc::new(inventory),
        Arc::new(producer),
        args.coordinator_config(),
    ));

    info!(namespace = %args.namespace, hosted = args.hosted_mode, "Starting migration controllers");
    futures::future::join_all(build_manager_controllers(client, coordinator)).await;
    info!("Migration controllers stopped");
    Ok(())
}

/// Run a hub agent until ctrl-c
pub async fn run_agent(args: AgentArgs) -> anyhow::Result<()> {
    let client = Client::try_default()
        .await
        .context("failed to create Kubernetes client")?;
    let config = args.agent_config();
    let lifecycle = CancellationToken::new();

    let (tx, rx) = mpsc::channel(args.queue_depth);
    let dispatcher = build_dispatcher(Arc::new(HubClientImpl::new(client)), &config, lifecycle.clone());
    let dispatching = tokio::spawn(dispatcher.run(rx, lifecycle.clone()));

    let listener = tokio::net::TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("failed to bind {}", args.listen))?;
    info!(hub = %config.hub, addr = %args.listen, "Agent listening for migration events");

    let shutdown = lifecycle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
        }
        shutdown.cancel();
    });

    axum::serve(listener, event_router(tx))
        .with_graceful_shutdown(lifecycle.clone().cancelled_owned())
        .await
        .context("event server failed")?;

    lifecycle.cancel();
    dispatching.await.context("dispatcher task panicked")?;
    info!("Agent stopped");
    Ok(())
}
