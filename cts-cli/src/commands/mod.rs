//! CLI command implementations.

pub mod run;
pub mod status;
pub mod stop_all;

use std::sync::Arc;

use cts_core::{ClusterConfig, ClusterState, ConfiguredResources, RemoteExec, SshExecutor};

/// Cluster tracker driving the configured nodes over the remote shell.
///
/// Nothing is contacted until a command asks for status.
pub fn connect(config: Arc<ClusterConfig>) -> ClusterState {
    let exec: Arc<dyn RemoteExec> = Arc::new(SshExecutor::new(&config.remote));
    let resources = ConfiguredResources::from_config(&config.resource_groups, Arc::clone(&exec));
    ClusterState::new(config, exec, Arc::new(resources))
}
