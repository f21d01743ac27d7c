//! Fleethub - move managed clusters between hubs

use clap::Parser;
use kube::CustomResourceExt;

use fleethub_common::crd::ManagedClusterMigration;
use fleethub_common::telemetry::{init_telemetry, TelemetryConfig};
use fleethub_operator::config::{Cli, Commands};
use fleethub_operator::runtime::{run_agent, run_manager};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.crd {
        let crd = serde_yaml::to_string(&ManagedClusterMigration::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
        println!("{crd}");
        return Ok(());
    }

    let Some(command) = cli.command else {
        anyhow::bail!("no subcommand given, expected `manager` or `agent`");
    };

    let service_name = match &command {
        Commands::Manager(_) => "fleethub-manager",
        Commands::Agent(_) => "fleethub-agent",
    };
    init_telemetry(TelemetryConfig {
        service_name: service_name.to_string(),
        format: cli.log_format,
    })?;

    match command {
        Commands::Manager(args) => run_manager(args).await,
        Commands::Agent(args) => run_agent(args).await,
    }
}
