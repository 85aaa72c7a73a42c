//! Remote shell transport.
//!
//! Uses `tokio::process::Command` to shell out to `ssh` and `scp` (or
//! whatever programs the configuration names). Authentication is the remote
//! shell's business; keys must be pre-configured for batch use.

use async_trait::async_trait;
use std::path::PathBuf;
use tokio::process::Command;

use super::{RemoteError, RemoteExec};
use crate::config::RemoteConfig;

/// Executes commands through a remote shell program.
#[derive(Debug, Clone)]
pub struct SshExecutor {
    /// Remote shell program and its fixed arguments.
    shell: Vec<String>,
    /// Copy program and its fixed arguments.
    copy: Vec<String>,
}

impl SshExecutor {
    /// Create an executor from the `[remote]` configuration.
    pub fn new(config: &RemoteConfig) -> Self {
        Self {
            shell: config.shell.clone(),
            copy: config.copy.clone(),
        }
    }

    /// Build `<shell...> <node> <command>`.
    ///
    /// The remote command is one argument; the remote shell interprets it.
    fn shell_command(&self, node: &str, command: &str) -> Result<Command, RemoteError> {
        let (program, args) = split_program(&self.shell, "remote shell")?;
        let mut cmd = Command::new(program);
        cmd.args(args).arg(node).arg(command);
        Ok(cmd)
    }
}

fn split_program<'a>(
    argv: &'a [String],
    what: &str,
) -> Result<(&'a String, &'a [String]), RemoteError> {
    argv.split_first().ok_or_else(|| {
        RemoteError::Spawn(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("{what} program not configured"),
        ))
    })
}

#[async_trait]
impl RemoteExec for SshExecutor {
    async fn exec_once(&self, node: &str, command: &str) -> Result<i32, RemoteError> {
        let output = self
            .shell_command(node, command)?
            .stdin(std::process::Stdio::null())
            .output()
            .await?;

        Ok(output.status.code().unwrap_or(-1))
    }

    async fn read_line(&self, node: &str, command: &str) -> Result<String, RemoteError> {
        let output = self
            .shell_command(node, command)?
            .stdin(std::process::Stdio::null())
            .output()
            .await?;

        Ok(first_line(&String::from_utf8_lossy(&output.stdout)))
    }

    async fn copy(
        &self,
        sources: &[PathBuf],
        node: &str,
        destination: &str,
    ) -> Result<bool, RemoteError> {
        let (program, args) = split_program(&self.copy, "copy")?;
        let status = Command::new(program)
            .args(args)
            .args(sources)
            .arg(format!("{}:{}", node, destination))
            .stdin(std::process::Stdio::null())
            .status()
            .await?;

        Ok(status.success())
    }
}

/// First line of `text` without its terminator.
pub(crate) fn first_line(text: &str) -> String {
    text.lines().next().unwrap_or("").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_line_strips_terminator() {
        assert_eq!(first_line("heartbeat OK [pid 42]\nmore\n"), "heartbeat OK [pid 42]");
        assert_eq!(first_line("no newline"), "no newline");
        assert_eq!(first_line(""), "");
    }

    #[test]
    fn default_config_uses_batch_ssh() {
        let exec = SshExecutor::new(&RemoteConfig::default());
        assert_eq!(exec.shell[0], "ssh");
        assert!(exec.shell.contains(&"BatchMode=yes".to_string()));
        assert_eq!(exec.copy[0], "scp");
    }

    #[tokio::test]
    async fn empty_shell_is_spawn_error() {
        let exec = SshExecutor {
            shell: vec![],
            copy: vec![],
        };
        let err = exec.exec_once("alpha", "true").await.unwrap_err();
        assert!(matches!(err, RemoteError::Spawn(_)));
    }

    #[tokio::test]
    async fn missing_program_is_spawn_error() {
        let exec = SshExecutor {
            shell: vec!["/nonexistent/remote-shell".into()],
            copy: vec![],
        };
        let err = exec.exec_once("alpha", "true").await.unwrap_err();
        assert!(matches!(err, RemoteError::Spawn(_)));
    }

    #[tokio::test]
    async fn exec_once_reports_exit_status() {
        let exec = SshExecutor {
            shell: vec!["sh".into(), "-c".into()],
            copy: vec![],
        };
        // sh -c <node> <command>: the "node" argument is the script.
        assert_eq!(exec.exec_once("exit 0", "ignored").await.unwrap(), 0);
        assert_eq!(exec.exec_once("exit 3", "ignored").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn read_line_captures_first_stdout_line() {
        let exec = SshExecutor {
            shell: vec!["sh".into(), "-c".into()],
            copy: vec![],
        };
        let line = exec
            .read_line("printf 'stopped\\nsecond\\n'", "ignored")
            .await
            .unwrap();
        assert_eq!(line, "stopped");

        let empty = exec.read_line("true", "ignored").await.unwrap();
        assert_eq!(empty, "");
    }

    #[tokio::test]
    async fn copy_reports_failure_for_missing_source() {
        let exec = SshExecutor {
            shell: vec![],
            copy: vec!["cp".into(), "-r".into()],
        };
        let ok = exec
            .copy(&[PathBuf::from("/nonexistent/source")], "alpha", "/tmp")
            .await
            .unwrap();
        assert!(!ok);
    }
}
