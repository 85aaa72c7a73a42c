//! The harness's picture of the cluster.
//!
//! [`ClusterState`] owns the intended status of every node: what the harness
//! believes each node's cluster manager is doing. It changes only through a
//! successful start or stop, a status observation, or an explicit
//! [`ClusterState::set_status`] (fencing). Every other component reads it.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::ClusterConfig;
use crate::error::{CtsError, Result};
use crate::remote::RemoteExec;
use crate::resource::{ResourceGroup, ResourceGroupProvider};

/// Intended or observed state of a node's cluster manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    /// Running.
    Up,
    /// Stopped.
    Down,
}

impl NodeStatus {
    fn from_up(up: bool) -> Self {
        if up {
            NodeStatus::Up
        } else {
            NodeStatus::Down
        }
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeStatus::Up => write!(f, "up"),
            NodeStatus::Down => write!(f, "down"),
        }
    }
}

/// Cluster manager driver and intended-status tracker.
pub struct ClusterState {
    config: Arc<ClusterConfig>,
    exec: Arc<dyn RemoteExec>,
    resources: Arc<dyn ResourceGroupProvider>,
    status: HashMap<String, NodeStatus>,
}

impl ClusterState {
    /// Create a tracker with every node's status unknown; call
    /// [`prepare`](Self::prepare) before running tests.
    pub fn new(
        config: Arc<ClusterConfig>,
        exec: Arc<dyn RemoteExec>,
        resources: Arc<dyn ResourceGroupProvider>,
    ) -> Self {
        Self {
            config,
            exec,
            resources,
            status: HashMap::new(),
        }
    }

    /// Configuration this tracker was built from.
    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    /// Every node, in configuration order.
    pub fn nodes(&self) -> &[String] {
        &self.config.nodes
    }

    /// Node the harness runs on.
    pub fn local_node(&self) -> &str {
        &self.config.local_node
    }

    /// Whether `node` is the node the harness runs on.
    pub fn is_local(&self, node: &str) -> bool {
        node == self.config.local_node
    }

    /// Executor used for every remote command.
    pub fn exec(&self) -> &Arc<dyn RemoteExec> {
        &self.exec
    }

    /// Resource groups the cluster is configured with.
    pub fn resource_groups(&self) -> Vec<ResourceGroup> {
        self.resources.resource_groups()
    }

    /// Observe every node and initialize the intended status from what is
    /// actually running.
    pub async fn prepare(&mut self) {
        self.status_all(None).await;
    }

    /// Intended status of `node`; `None` before it was ever observed.
    pub fn status_of(&self, node: &str) -> Option<NodeStatus> {
        self.status.get(node).copied()
    }

    /// Whether `node` is believed up.
    pub fn is_up(&self, node: &str) -> bool {
        self.status_of(node) == Some(NodeStatus::Up)
    }

    /// Whether `node` is believed down.
    pub fn is_down(&self, node: &str) -> bool {
        self.status_of(node) == Some(NodeStatus::Down)
    }

    /// Override the intended status of a node.
    ///
    /// # Errors
    ///
    /// [`CtsError::UnknownNode`] if `node` is not in the configuration.
    pub fn set_status(&mut self, node: &str, status: NodeStatus) -> Result<()> {
        if !self.config.nodes.iter().any(|n| n == node) {
            return Err(CtsError::UnknownNode(node.to_string()));
        }
        self.status.insert(node.to_string(), status);
        Ok(())
    }

    /// Number of nodes believed up.
    pub fn up_count(&self) -> usize {
        self.config.nodes.iter().filter(|n| self.is_up(n)).count()
    }

    /// Start the cluster manager on `node`.
    ///
    /// On success the node is believed up; on failure the failure is logged
    /// and the intended status is left alone.
    pub async fn start(&mut self, node: &str) -> bool {
        match self.exec.run_ok(node, &self.config.start_cmd).await {
            Ok(()) => {
                self.status.insert(node.to_string(), NodeStatus::Up);
                true
            }
            Err(e) => {
                tracing::warn!("Could not start {} on node {}: {}", self.config.name, node, e);
                false
            }
        }
    }

    /// Stop the cluster manager on `node`.
    pub async fn stop(&mut self, node: &str) -> bool {
        match self.exec.run_ok(node, &self.config.stop_cmd).await {
            Ok(()) => {
                self.status.insert(node.to_string(), NodeStatus::Down);
                true
            }
            Err(e) => {
                tracing::warn!("Could not stop {} on node {}: {}", self.config.name, node, e);
                false
            }
        }
    }

    /// Ask the cluster manager on `node` to reread its configuration.
    pub async fn reread(&mut self, node: &str) -> bool {
        match self.exec.run_ok(node, &self.config.reread_cmd).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    "Could not force {} on node {} to reread its config: {}",
                    self.config.name,
                    node,
                    e
                );
                false
            }
        }
    }

    /// Observe whether the cluster manager on `node` is running.
    ///
    /// The node is up unless the first line of the status command's output
    /// mentions `stopped`. A status query that cannot be sent counts as down.
    /// Disagreement with the intended status is logged, then the observation
    /// replaces it.
    pub async fn status(&mut self, node: &str) -> bool {
        let up = match self.exec.read_line(node, &self.config.status_cmd).await {
            Ok(line) => !line.contains("stopped"),
            Err(e) => {
                tracing::warn!("Status query failed on node {}: {}", node, e);
                false
            }
        };
        let observed = NodeStatus::from_up(up);

        if let Some(intended) = self.status_of(node) {
            if intended != observed {
                tracing::warn!(
                    "Node status for {} is {} but we think it should be {}",
                    node,
                    observed,
                    intended
                );
            }
        }
        self.status.insert(node.to_string(), observed);
        up
    }

    /// Start every node in `nodes` (default: all) that is believed down.
    ///
    /// Returns whether every attempted start succeeded.
    pub async fn start_all(&mut self, nodes: Option<&[String]>) -> bool {
        let config = Arc::clone(&self.config);
        let mut ok = true;
        for node in nodes.unwrap_or(config.nodes.as_slice()) {
            if self.is_down(node) {
                ok &= self.start(node).await;
            }
        }
        ok
    }

    /// Stop every node in `nodes` (default: all) that is believed up.
    pub async fn stop_all(&mut self, nodes: Option<&[String]>) -> bool {
        let config = Arc::clone(&self.config);
        let mut ok = true;
        for node in nodes.unwrap_or(config.nodes.as_slice()) {
            if self.is_up(node) {
                ok &= self.stop(node).await;
            }
        }
        ok
    }

    /// Have every node in `nodes` (default: all) that is believed up reread
    /// its configuration.
    pub async fn reread_all(&mut self, nodes: Option<&[String]>) -> bool {
        let config = Arc::clone(&self.config);
        let mut ok = true;
        for node in nodes.unwrap_or(config.nodes.as_slice()) {
            if self.is_up(node) {
                ok &= self.reread(node).await;
            }
        }
        ok
    }

    /// Observe every node in `nodes` (default: all).
    pub async fn status_all(&mut self, nodes: Option<&[String]>) -> BTreeMap<String, NodeStatus> {
        let config = Arc::clone(&self.config);
        let mut result = BTreeMap::new();
        for node in nodes.unwrap_or(config.nodes.as_slice()) {
            let up = self.status(node).await;
            result.insert(node.clone(), NodeStatus::from_up(up));
        }
        result
    }

    /// Empty the cluster manager's log so a run starts clean.
    pub async fn truncate_log(&self) -> Result<()> {
        let path = &self.config.log_file;
        tokio::fs::OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(path)
            .await
            .map_err(|source| CtsError::FileNotAccessible {
                path: path.clone(),
                source,
            })?;
        tracing::info!("Truncated {}", path.display());
        Ok(())
    }

    /// Copy the local test configuration directory to the same path on
    /// every other node.
    ///
    /// Returns the nodes the copy failed on.
    ///
    /// # Errors
    ///
    /// [`CtsError::DirectoryNotAccessible`] if the local directory is missing.
    pub async fn sync_test_configs(&self) -> Result<Vec<String>> {
        let dir: &PathBuf = &self.config.test_config_dir;
        let is_dir = tokio::fs::metadata(dir)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        if !is_dir {
            return Err(CtsError::DirectoryNotAccessible { path: dir.clone() });
        }

        let destination = dir.display().to_string();
        let mut failed = Vec::new();
        for node in self.nodes() {
            if self.is_local(node) {
                continue;
            }
            tracing::info!("Syncing test configurations on {}", node);
            let copied = self.exec.copy(std::slice::from_ref(dir), node, &destination).await?;
            if !copied {
                tracing::warn!("Could not sync test configurations to {}", node);
                failed.push(node.clone());
            }
        }
        Ok(failed)
    }
}
