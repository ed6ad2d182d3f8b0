//! Node process: loads configuration, brings up a node's default
//! container, and heartbeats to whatever control plane is driving this
//! host.

mod config;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use forge_engine::prelude::*;
use tracing::info;

use config::NodeConfig;

#[derive(Parser)]
#[command(name = "forge-node", about = "Runs a node hosting one or more simulation containers")]
struct Args {
    /// Path to a TOML node configuration file. Defaults are used if absent.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the container and hold it open, heartbeating on an interval
    /// until interrupted.
    Run {
        #[arg(long, default_value_t = 5)]
        heartbeat_interval_secs: u64,
    },
    /// Load the configuration and print it back out, without starting
    /// anything. Useful for validating a config file.
    CheckConfig,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => NodeConfig::load(path)?,
        None => NodeConfig::default(),
    };

    match args.command {
        Command::CheckConfig => {
            info!(node_id = config.node_id.as_str(), "configuration loaded");
            println!("{config:#?}");
            Ok(())
        }
        Command::Run { heartbeat_interval_secs } => run(config, Duration::from_secs(heartbeat_interval_secs)),
    }
}

fn run(config: NodeConfig, heartbeat_interval: Duration) -> anyhow::Result<()> {
    info!(node_id = config.node_id.as_str(), "starting node");

    let control_plane =
        ControlPlane::new(config.node_id.clone(), config.max_containers).with_poison_after(config.poison_after);
    control_plane.create_container("default").map_err(|e| anyhow::anyhow!(e))?;

    info!("node running, heartbeating until interrupted");
    loop {
        let status = control_plane.heartbeat();
        info!(
            node_id = status.node_id.as_str(),
            capacity = status.capacity,
            running_containers = status.metrics.running_container_count,
            active_matches = status.metrics.total_match_count,
            draining = control_plane.is_draining(),
            "heartbeat"
        );
        std::thread::sleep(heartbeat_interval);
    }
}
