//! # cts
//!
//! Command-line driver for randomized cluster fault-injection runs.
//!
//! ## Commands
//!
//! - `run`: Drive the cluster through random tests and audit it after each
//! - `status`: Query every node's cluster manager and print the result
//! - `stop-all`: Stop the cluster manager everywhere
//!
//! ## Example
//!
//! ```bash
//! # Check which nodes are running
//! cts --config /etc/cts/heartbeat.toml status
//!
//! # Start from an empty log, push fresh configs, run 500 tests
//! cts run --iterations 500 --truncate-log --sync-configs --report run.json
//!
//! # Replay a run with the same random choices
//! cts run --iterations 500 --seed 1234
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cts_core::ClusterConfig;

mod commands;
mod logging;

use commands::{run, status, stop_all};

/// Randomized fault-injection harness for high-availability clusters.
#[derive(Parser, Debug)]
#[command(name = "cts")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Cluster configuration file
    #[arg(long, short, global = true, default_value = "cts.toml")]
    config: PathBuf,

    /// Log level filter (RUST_LOG takes precedence)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Skip the root check (for labs whose remote shell needs no privileges)
    #[arg(long, global = true)]
    allow_unprivileged: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run randomly chosen tests against the cluster
    Run {
        /// Number of tests to run
        #[arg(long, short, default_value = "100")]
        iterations: usize,

        /// Seed for the random choices (drawn at random if omitted)
        #[arg(long)]
        seed: Option<u64>,

        /// Empty the cluster log before starting
        #[arg(long)]
        truncate_log: bool,

        /// Copy the test configuration directory to every node first
        #[arg(long)]
        sync_configs: bool,

        /// Write the JSON run report to this file
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Show the cluster manager status on every node
    Status,

    /// Stop the cluster manager on every node
    StopAll,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    logging::init(&cli.log_level, cli.json_logs)?;

    if !cli.allow_unprivileged {
        cts_core::host::ensure_privileged().context("Remote administration needs root")?;
    }

    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Run {
            iterations,
            seed,
            truncate_log,
            sync_configs,
            report,
        } => {
            let options = run::RunOptions {
                iterations,
                seed,
                truncate_log,
                sync_configs,
                report,
            };
            run::run(config, options).await?;
        }
        Commands::Status => {
            status::run(config).await?;
        }
        Commands::StopAll => {
            stop_all::run(config).await?;
        }
    }

    Ok(())
}

/// Load and validate the cluster configuration.
fn load_config(path: &Path) -> Result<Arc<ClusterConfig>> {
    let config = ClusterConfig::from_file(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    tracing::info!(
        manager = %config.name,
        nodes = config.nodes.len(),
        local = %config.local_node,
        "Configuration loaded"
    );
    Ok(Arc::new(config))
}
