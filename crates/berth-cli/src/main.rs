//! berth — deploy a container cluster from a declarative spec.
//!
//! # Usage
//!
//! ```text
//! berth deploy -c cluster.json [--auto-generate] [--stop-on-failure]
//! berth plan -c cluster.json --node miner-1
//! berth validate -c cluster.json
//! berth status -c cluster.json
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

#[derive(Parser)]
#[command(
    name = "berth",
    about = "Berth: declarative container cluster deployment",
    version,
    propagate_version = true
)]
struct Cli {
    /// Engine configuration file. Missing file means defaults.
    #[arg(long, global = true, default_value = "berth.toml")]
    config: PathBuf,

    /// Emit log lines as JSON on stderr.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Deploy every node of a cluster.
    ///
    /// Checks the runtime, loads schemas and the cluster spec, makes the
    /// node image available, then deploys under the cluster's strategy.
    Deploy {
        /// Cluster spec (JSON, or TOML by extension).
        #[arg(short, long, default_value = "cluster.json")]
        cluster: PathBuf,
        /// Generate missing mining addresses instead of failing the node.
        /// Also enabled by AUTO_GENERATE_WALLET=true.
        #[arg(long)]
        auto_generate: bool,
        /// Skip remaining nodes after the first failure (sequential only).
        #[arg(long)]
        stop_on_failure: bool,
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
    /// Print the runtime command each node would be started with.
    Plan {
        #[arg(short, long, default_value = "cluster.json")]
        cluster: PathBuf,
        /// Only this node.
        #[arg(short, long)]
        node: Option<String>,
    },
    /// Validate every node and list security advisories.
    Validate {
        #[arg(short, long, default_value = "cluster.json")]
        cluster: PathBuf,
    },
    /// Show live container status and operator commands.
    Status {
        #[arg(short, long, default_value = "cluster.json")]
        cluster: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if cli.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    match cli.command {
        Command::Deploy {
            cluster,
            auto_generate,
            stop_on_failure,
            format,
        } => {
            let flags = commands::deploy::DeployFlags {
                auto_generate: auto_generate || commands::auto_generate_from_env(),
                stop_on_failure,
                json: format == "json",
            };
            commands::deploy::deploy(&cli.config, &cluster, flags).await
        }
        Command::Plan { cluster, node } => {
            commands::plan::plan(&cli.config, &cluster, node.as_deref())
        }
        Command::Validate { cluster } => commands::validate::validate(&cli.config, &cluster),
        Command::Status { cluster } => commands::status::status(&cli.config, &cluster).await,
    }
}
