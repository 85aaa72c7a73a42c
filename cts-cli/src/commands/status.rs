//! Show the cluster manager status on every node.

use anyhow::Result;
use std::collections::BTreeMap;
use std::sync::Arc;

use cts_core::{ClusterConfig, ClusterState, NodeStatus};

/// Run the status command.
pub async fn run(config: Arc<ClusterConfig>) -> Result<()> {
    let mut cluster = super::connect(config);
    print!("{}", show(&mut cluster).await);
    Ok(())
}

/// Query every node and render the result.
async fn show(cluster: &mut ClusterState) -> String {
    let statuses = cluster.status_all(None).await;
    render(&cluster.config().name, cluster.local_node(), &statuses)
}

fn render(manager: &str, local: &str, statuses: &BTreeMap<String, NodeStatus>) -> String {
    let width = statuses.keys().map(|n| n.len()).max().unwrap_or(0).max(4);
    let up = statuses.values().filter(|s| **s == NodeStatus::Up).count();

    let mut out = format!("=== {} status ===\n\n", manager);
    out.push_str(&format!("  {:<width$}  STATUS\n", "NODE"));
    for (node, status) in statuses {
        let marker = if node == local { "  (local)" } else { "" };
        out.push_str(&format!("  {:<width$}  {}{}\n", node, status, marker));
    }
    out.push_str(&format!("\n{} of {} nodes up\n", up, statuses.len()));
    out
}
