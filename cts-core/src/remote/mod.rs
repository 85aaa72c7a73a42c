//! Remote execution on cluster nodes.
//!
//! The harness never talks to a node except through [`RemoteExec`]:
//! - `exec_once()` runs a command once and reports its exit status
//! - `run()` retries transient failures (non-zero exit) up to [`MAX_ATTEMPTS`]
//! - `read_line()` captures the first line a command prints
//! - `copy()` copies local paths to a node recursively
//!
//! [`SshExecutor`] is the production transport; [`MockExecutor`] records calls
//! and scripts replies for tests.

mod mock;
mod ssh;

pub use mock::{MockCall, MockExecutor, MockReply};
pub use ssh::SshExecutor;

use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;

/// Total attempts `run()` makes before giving up on a non-zero exit.
pub const MAX_ATTEMPTS: usize = 3;

/// Errors from remote execution.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The remote shell process could not be spawned.
    #[error("remote shell spawn error: {0}")]
    Spawn(#[from] std::io::Error),

    /// The command still returned non-zero after every attempt.
    #[error("command failed on {node}: exit={exit_code}, command={command}")]
    CommandFailed {
        /// Target node.
        node: String,
        /// Command that was run.
        command: String,
        /// Last exit code.
        exit_code: i32,
    },
}

/// Runs commands on named cluster nodes.
///
/// Remote commands are assumed idempotent: `run()` may execute a command up
/// to [`MAX_ATTEMPTS`] times.
#[async_trait]
pub trait RemoteExec: Send + Sync {
    /// Run `command` on `node` once and return its exit status.
    ///
    /// Fails only if the transport itself could not be started.
    async fn exec_once(&self, node: &str, command: &str) -> Result<i32, RemoteError>;

    /// Run `command` on `node` and return the first line of its standard
    /// output, without the line terminator. Empty if it printed nothing.
    ///
    /// Single attempt.
    async fn read_line(&self, node: &str, command: &str) -> Result<String, RemoteError>;

    /// Recursively copy local `sources` to `node:destination`.
    ///
    /// Single attempt. Returns whether the copy succeeded.
    async fn copy(
        &self,
        sources: &[PathBuf],
        node: &str,
        destination: &str,
    ) -> Result<bool, RemoteError>;

    /// Run `command` on `node`, retrying while it exits non-zero.
    ///
    /// Returns the exit status of the last attempt.
    async fn run(&self, node: &str, command: &str) -> Result<i32, RemoteError> {
        let mut status = -1;
        for _ in 0..MAX_ATTEMPTS {
            status = self.exec_once(node, command).await?;
            if status == 0 {
                break;
            }
        }
        Ok(status)
    }

    /// Like `run()`, but a non-zero final status becomes
    /// [`RemoteError::CommandFailed`].
    async fn run_ok(&self, node: &str, command: &str) -> Result<(), RemoteError> {
        let exit_code = self.run(node, command).await?;
        if exit_code != 0 {
            return Err(RemoteError::CommandFailed {
                node: node.to_string(),
                command: command.to_string(),
                exit_code,
            });
        }
        Ok(())
    }
}
