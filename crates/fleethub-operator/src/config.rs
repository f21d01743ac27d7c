//! Command line and environment configuration

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use fleethub_agent::{AgentConfig, CutoverConfig};
use fleethub_common::telemetry::LogFormat;
use fleethub_common::FLEETHUB_SYSTEM_NAMESPACE;
use fleethub_manager::CoordinatorConfig;

/// Fleethub - move managed clusters between hubs
#[derive(Parser, Debug)]
#[command(name = "fleethub", version, about, long_about = None)]
pub struct Cli {
    /// Print the ManagedClusterMigration CRD and exit
    #[arg(long)]
    pub crd: bool,

    /// Log output format (json or pretty)
    #[arg(long, env = "FLEETHUB_LOG_FORMAT", default_value = "json")]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the migration coordinator on the global hub
    Manager(ManagerArgs),
    /// Run the migration agent on a regional hub
    Agent(AgentArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ManagerArgs {
    /// Namespace holding ManagedClusterMigration resources
    #[arg(long, env = "FLEETHUB_NAMESPACE", default_value = FLEETHUB_SYSTEM_NAMESPACE)]
    pub namespace: String,

    /// Clusters are imported in hosted mode
    #[arg(long, env = "FLEETHUB_HOSTED_MODE")]
    pub hosted_mode: bool,

    /// SQLite fleet inventory with a managed_clusters table
    #[arg(long, env = "FLEETHUB_INVENTORY_DB")]
    pub inventory_db: PathBuf,

    /// Sender identity stamped on outgoing messages
    #[arg(long, env = "FLEETHUB_IDENTITY", default_value = "fleethub-manager")]
    pub identity: String,

    /// YAML file mapping hub names to agent URLs
    #[arg(long, env = "FLEETHUB_ROUTES")]
    pub routes: PathBuf,
}

impl ManagerArgs {
    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            namespace: self.namespace.clone(),
            identity: self.identity.clone(),
            hosted_mode: self.hosted_mode,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct AgentArgs {
    /// Name of the hub this agent runs in
    #[arg(long, env = "FLEETHUB_HUB_NAME")]
    pub hub: String,

    /// Address the event endpoint listens on
    #[arg(long, env = "FLEETHUB_LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Seconds between pinning clusters and cutting them over
    #[arg(long, env = "FLEETHUB_SETTLE_WINDOW_SECS", default_value_t = 10)]
    pub settle_window_secs: u64,

    /// Seconds between detach passes
    #[arg(long, env = "FLEETHUB_DETACH_INTERVAL_SECS", default_value_t = 2)]
    pub detach_interval_secs: u64,

    /// Dead letters kept for inspection
    #[arg(long, env = "FLEETHUB_DEAD_LETTER_CAPACITY", default_value_t = fleethub_agent::DEFAULT_DEAD_LETTER_CAPACITY)]
    pub dead_letter_capacity: usize,

    /// Inbound event queue depth
    #[arg(long, env = "FLEETHUB_QUEUE_DEPTH", default_value_t = 64)]
    pub queue_depth: usize,
}

impl AgentArgs {
    pub fn agent_config(&self) -> AgentConfig {
        AgentConfig {
            hub: self.hub.clone(),
            cutover: CutoverConfig {
                settle_window: Duration::from_secs(self.settle_window_secs),
                detach_interval: Duration::from_secs(self.detach_interval_secs),
            },
            dead_letter_capacity: self.dead_letter_capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manager_defaults() {
        let cli = Cli::parse_from([
            "fleethub",
            "manager",
            "--inventory-db",
            "/data/inventory.db",
            "--routes",
            "/etc/fleethub/routes.yaml",
        ]);
        let Some(Commands::Manager(args)) = cli.command else {
            panic!("expected manager subcommand");
        };
        let config = args.coordinator_config();
        assert_eq!(config.namespace, "fleethub-system");
        assert_eq!(config.identity, "fleethub-manager");
        assert!(!config.hosted_mode);
        assert_eq!(cli.log_format, LogFormat::Json);
    }

    #[test]
    fn test_agent_timings() {
        let cli = Cli::parse_from([
            "fleethub",
            "--log-format",
            "pretty",
            "agent",
            "--hub",
            "hub-a",
            "--settle-window-secs",
            "30",
        ]);
        let Some(Commands::Agent(args)) = cli.command else {
            panic!("expected agent subcommand");
        };
        let config = args.agent_config();
        assert_eq!(config.hub, "hub-a");
        assert_eq!(config.cutover.settle_window, Duration::from_secs(30));
        assert_eq!(config.cutover.detach_interval, Duration::from_secs(2));
        assert_eq!(args.listen.port(), 8080);
        assert_eq!(cli.log_format, LogFormat::Pretty);
    }

    #[test]
    fn test_unknown_log_format_is_rejected() {
        assert!(Cli::try_parse_from(["fleethub", "--log-format", "xml", "--crd"]).is_err());
    }
}
