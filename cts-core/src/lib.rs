//! # cts-core
//!
//! Randomized fault-injection harness for high-availability clusters.
//!
//! The harness drives a cluster through start, stop, restart and fencing
//! events in random order, confirms every expected transition by watching
//! the cluster manager's log, and audits cluster-wide invariants after each
//! step.
//!
//! ## Architecture
//!
//! ```text
//!   RandomRunner ──► ActionTest ──► ClusterState ──► RemoteExec ──► nodes
//!        │               │               ▲
//!        │               └── LogWatcher ◄┼──── cluster log
//!        └──► ClusterAudit ──────────────┘
//! ```
//!
//! Commands flow down through [`ClusterState`] and [`RemoteExec`]; evidence
//! flows back through [`LogWatcher`].
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use cts_core::*;
//!
//! let config = Arc::new(ClusterConfig::from_file("cts.toml".as_ref())?);
//! let exec: Arc<dyn RemoteExec> = Arc::new(SshExecutor::new(&config.remote));
//! let resources = ConfiguredResources::from_config(&config.resource_groups, exec.clone());
//! let mut cluster = ClusterState::new(config.clone(), exec, Arc::new(resources));
//! cluster.prepare().await;
//!
//! let fencer = Arc::new(CommandFencer::new(config.stonith_cmd.clone()));
//! let mut harness = Harness::new(cluster, Environment::new(None, fencer));
//! let tests = all_tests(&config, vec![]);
//! let audits: Vec<Box<dyn ClusterAudit>> = vec![Box::new(ResourceAudit::from_timing(&config.timing))];
//! let mut runner = RandomRunner::new(tests, audits, PlacementPolicy::FailAudit)?;
//! let report = runner.run(&mut harness, 100).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod actions;
pub mod audit;
pub mod cluster;
pub mod config;
pub mod error;
pub mod fence;
pub mod harness;
pub mod host;
pub mod remote;
pub mod resource;
pub mod runner;
pub mod stats;
pub mod watcher;

#[cfg(test)]
mod scenarios;
#[cfg(test)]
mod testkit;

pub use actions::{all_tests, ClusterTest, CtsTest, NodeTest, Outcome, ScheduledTest};
pub use audit::{AuditResult, ClusterAudit, ResourceAudit};
pub use cluster::{ClusterState, NodeStatus};
pub use config::{ClusterConfig, ConfigError, RawConfig, Timing};
pub use error::{CtsError, Result};
pub use fence::{CommandFencer, Fencer, MockFencer};
pub use harness::{Environment, Harness};
pub use remote::{MockExecutor, RemoteError, RemoteExec, SshExecutor};
pub use resource::{resources_of_kind, ConfiguredResources, Resource, ResourceGroupProvider, IPADDR_KIND};
pub use runner::{PlacementPolicy, RandomRunner, RunReport};
pub use stats::Stats;
pub use watcher::LogWatcher;
