//! Put the cluster in a safe state.

use anyhow::{bail, Result};
use std::sync::Arc;

use cts_core::{ClusterConfig, ClusterState};

/// Run the stop-all command.
pub async fn run(config: Arc<ClusterConfig>) -> Result<()> {
    let mut cluster = super::connect(config);
    stop(&mut cluster).await
}

async fn stop(cluster: &mut ClusterState) -> Result<()> {
    cluster.prepare().await;
    let running: Vec<String> = cluster
        .nodes()
        .iter()
        .filter(|n| cluster.is_up(n))
        .cloned()
        .collect();

    if running.is_empty() {
        println!("All nodes already stopped.");
        return Ok(());
    }

    println!("Stopping {} on: {}", cluster.config().name, running.join(", "));
    if !cluster.stop_all(Some(&running)).await {
        let still_up: Vec<&str> = running
            .iter()
            .filter(|n| cluster.is_up(n))
            .map(String::as_str)
            .collect();
        bail!("Could not stop: {}", still_up.join(", "));
    }

    println!("All nodes stopped.");
    Ok(())
}
