//! Node fencing (STONITH: shoot the other node in the head).
//!
//! A fencer power-cycles a node out of band. The node is expected to come
//! back on its own with its cluster manager running.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::process::Command;

use crate::config::NODE_PLACEHOLDER;

/// Resets cluster nodes.
#[async_trait]
pub trait Fencer: Send + Sync {
    /// Power-cycle `node`. Returns whether the reset was carried out.
    async fn reset(&self, node: &str) -> bool;
}

/// Runs a fencing command template on the orchestrator through `sh -c`.
#[derive(Debug, Clone)]
pub struct CommandFencer {
    template: String,
}

impl CommandFencer {
    /// `template` has `%s` replaced by the node name.
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    /// Command that resets `node`.
    pub fn command_for(&self, node: &str) -> String {
        self.template.replace(NODE_PLACEHOLDER, node)
    }
}

#[async_trait]
impl Fencer for CommandFencer {
    async fn reset(&self, node: &str) -> bool {
        let command = self.command_for(node);
        tracing::info!("Resetting node {}", node);

        match Command::new("sh")
            .arg("-c")
            .arg(&command)
            .stdin(std::process::Stdio::null())
            .status()
            .await
        {
            Ok(status) if status.success() => true,
            Ok(status) => {
                tracing::warn!("Reset of {} failed: {} exited with {}", node, command, status);
                false
            }
            Err(e) => {
                tracing::warn!("Reset of {} failed: {}", node, e);
                false
            }
        }
    }
}

type ResetHook = Box<dyn Fn(&str) + Send + Sync>;

/// Test fencer that records resets and can simulate the node's reboot.
#[derive(Clone, Default)]
pub struct MockFencer {
    inner: Arc<MockFencerInner>,
}

#[derive(Default)]
struct MockFencerInner {
    resets: Mutex<Vec<String>>,
    fails: bool,
    hook: Option<ResetHook>,
}

impl MockFencer {
    /// Fencer whose resets always succeed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fencer whose resets always fail.
    pub fn failing() -> Self {
        Self {
            inner: Arc::new(MockFencerInner {
                fails: true,
                ..Default::default()
            }),
        }
    }

    /// Fencer that calls `hook(node)` on every successful reset, e.g. to
    /// write the reboot's log lines.
    pub fn with_hook<F>(hook: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(MockFencerInner {
                hook: Some(Box::new(hook)),
                ..Default::default()
            }),
        }
    }

    /// Nodes reset so far, oldest first.
    pub fn resets(&self) -> Vec<String> {
        self.inner.resets.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fencer for MockFencer {
    async fn reset(&self, node: &str) -> bool {
        self.inner.resets.lock().unwrap().push(node.to_string());
        if self.inner.fails {
            return false;
        }
        if let Some(hook) = &self.inner.hook {
            hook(node);
        }
        true
    }
}
