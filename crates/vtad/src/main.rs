//! vtad - Vehicle Telemetry Agent Daemon
//!
//! Monitors vehicle buses, turns fault code changes into events and relays
//! them to a remote server over UDP.
//!
//! Usage:
//!   vtad [--config <file>] [--verbose]
//!
//! If no config file is provided, two mock buses are simulated for demo
//! purposes.

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod agent;
mod config;

use agent::Agent;
use config::AgentConfig;

#[derive(Parser, Debug)]
#[command(name = "vtad")]
#[command(about = "Vehicle telemetry agent: bus monitoring relayed over UDP")]
struct Args {
    /// Configuration file path (TOML format)
    #[arg(short, long)]
    config: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose {
        "vtad=debug,vta_bus=debug,vta_udp=debug"
    } else {
        "vtad=info,vta_bus=info,vta_udp=info"
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting vtad (Vehicle Telemetry Agent)");

    let config = match &args.config {
        Some(path) => {
            info!("Loading config from: {}", path);
            AgentConfig::load(path)?
        }
        None => {
            info!("No config file provided, using mock buses");
            AgentConfig::demo()
        }
    };

    info!(
        local_port = config.server.local_port,
        remote = %format!("{}:{}", config.server.remote_address, config.server.remote_port),
        buses = config.bus.len(),
        "Agent configured"
    );

    let agent = Agent::start(config);
    agent
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for ctrl-c");
            }
        })
        .await;

    Ok(())
}
