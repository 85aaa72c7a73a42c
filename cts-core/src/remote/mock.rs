//! Mock executor for testing.
//!
//! Records every remote call and answers through an optional scripted
//! handler, so tests can model a whole cluster without a network.

use super::{RemoteError, RemoteExec};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Reply produced for one mocked command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MockReply {
    /// Exit status.
    pub exit_code: i32,
    /// Standard output.
    pub stdout: String,
}

impl MockReply {
    /// Successful reply with no output.
    pub fn ok() -> Self {
        Self::default()
    }

    /// Reply with the given exit status and no output.
    pub fn exit(code: i32) -> Self {
        Self {
            exit_code: code,
            stdout: String::new(),
        }
    }

    /// Successful reply printing `text`.
    pub fn stdout(text: &str) -> Self {
        Self {
            exit_code: 0,
            stdout: text.to_string(),
        }
    }
}

/// One recorded remote invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCall {
    /// Target node.
    pub node: String,
    /// Command, or `copy <sources> <destination>` for copies.
    pub command: String,
}

type Handler = Box<dyn FnMut(&str, &str) -> MockReply + Send>;

/// Mock executor for testing.
///
/// Clones share state, so a test can keep one handle for inspection while the
/// harness owns another.
#[derive(Default)]
pub struct MockExecutor {
    inner: Arc<Mutex<MockExecutorInner>>,
}

#[derive(Default)]
struct MockExecutorInner {
    calls: Vec<MockCall>,
    forced_failures: VecDeque<i32>,
    handler: Option<Handler>,
    copy_fails: bool,
}

impl MockExecutor {
    /// Create a mock where every command succeeds silently.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock that answers every command through `handler(node, command)`.
    pub fn with_handler<F>(handler: F) -> Self
    where
        F: FnMut(&str, &str) -> MockReply + Send + 'static,
    {
        let mock = Self::new();
        mock.inner.lock().unwrap().handler = Some(Box::new(handler));
        mock
    }

    /// Make the next `count` calls to `exec_once()` exit with `exit_code`
    /// without reaching the handler.
    pub fn fail_next(&self, count: usize, exit_code: i32) {
        let mut inner = self.inner.lock().unwrap();
        inner.forced_failures.extend(std::iter::repeat(exit_code).take(count));
    }

    /// Make every subsequent `copy()` report failure.
    pub fn fail_copies(&self) {
        self.inner.lock().unwrap().copy_fails = true;
    }

    /// Get every recorded call, oldest first.
    pub fn calls(&self) -> Vec<MockCall> {
        self.inner.lock().unwrap().calls.clone()
    }

    /// Count recorded calls on `node` whose command equals `command`.
    pub fn count(&self, node: &str, command: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| c.node == node && c.command == command)
            .count()
    }

    /// Forget recorded calls.
    pub fn clear_calls(&self) {
        self.inner.lock().unwrap().calls.clear();
    }

    fn reply(&self, node: &str, command: &str) -> MockReply {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(MockCall {
            node: node.to_string(),
            command: command.to_string(),
        });
        match inner.handler.as_mut() {
            Some(handler) => handler(node, command),
            None => MockReply::ok(),
        }
    }
}

impl Clone for MockExecutor {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl RemoteExec for MockExecutor {
    async fn exec_once(&self, node: &str, command: &str) -> Result<i32, RemoteError> {
        {
            let mut inner = self.inner.lock().unwrap();
            if let Some(code) = inner.forced_failures.pop_front() {
                inner.calls.push(MockCall {
                    node: node.to_string(),
                    command: command.to_string(),
                });
                return Ok(code);
            }
        }
        Ok(self.reply(node, command).exit_code)
    }

    async fn read_line(&self, node: &str, command: &str) -> Result<String, RemoteError> {
        let reply = self.reply(node, command);
        Ok(super::ssh::first_line(&reply.stdout))
    }

    async fn copy(
        &self,
        sources: &[PathBuf],
        node: &str,
        destination: &str,
    ) -> Result<bool, RemoteError> {
        let sources: Vec<String> = sources.iter().map(|p| p.display().to_string()).collect();
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(MockCall {
            node: node.to_string(),
            command: format!("copy {} {}", sources.join(" "), destination),
        });
        Ok(!inner.copy_fails)
    }
}
