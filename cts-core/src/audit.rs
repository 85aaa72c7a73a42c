//! Cluster-wide invariant checks run after every test.
//!
//! The cluster manager gives no signal when resource acquisition has
//! finished, so [`ResourceAudit`] polls until placement is stable. A resource
//! active on two nodes at once is never tolerated and ends the polling at
//! once.

use async_trait::async_trait;
use std::time::Duration;

use crate::cluster::ClusterState;
use crate::config::Timing;

/// Verdict of one audit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditResult {
    /// Every invariant holds.
    Passed,
    /// Invariants still broken after every retry.
    Failed(Vec<String>),
    /// An invariant was broken in a way no retry can excuse.
    Fatal(Vec<String>),
}

impl AuditResult {
    /// Whether the audit passed.
    pub fn passed(&self) -> bool {
        matches!(self, AuditResult::Passed)
    }

    /// Findings behind a failure; empty when passed.
    pub fn findings(&self) -> &[String] {
        match self {
            AuditResult::Passed => &[],
            AuditResult::Failed(findings) | AuditResult::Fatal(findings) => findings,
        }
    }
}

/// A cluster-wide invariant check.
#[async_trait]
pub trait ClusterAudit: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Check the invariant against the cluster as the harness believes it is.
    async fn audit(&self, cluster: &ClusterState) -> AuditResult;
}

/// Every resource is active on exactly one up node.
#[derive(Debug, Clone)]
pub struct ResourceAudit {
    passes: u32,
    interval: Duration,
}

impl ResourceAudit {
    /// Audit polling at most `passes` times, `interval` apart.
    pub fn new(passes: u32, interval: Duration) -> Self {
        Self {
            passes: passes.max(1),
            interval,
        }
    }

    /// Audit using the configured retry count and interval.
    pub fn from_timing(timing: &Timing) -> Self {
        Self::new(timing.audit_retries, timing.audit_interval())
    }

    /// One pass over every resource. Returns findings and whether any is fatal.
    async fn check(&self, cluster: &ClusterState) -> (Vec<String>, bool) {
        let up: Vec<&String> = cluster.nodes().iter().filter(|n| cluster.is_up(n)).collect();
        let mut findings = Vec::new();
        let mut fatal = false;

        for group in cluster.resource_groups() {
            for resource in group {
                let mut serving = Vec::new();
                for node in &up {
                    if resource.is_running_on(node).await {
                        serving.push(node.as_str());
                    }
                }

                if serving.is_empty() && !up.is_empty() {
                    findings.push(format!("Resource {resource} not served anywhere."));
                } else if serving.len() > 1 {
                    let finding = format!("Resource {resource} served too many times: {serving:?}");
                    tracing::error!("{}", finding);
                    findings.push(finding);
                    fatal = true;
                }
            }
        }
        (findings, fatal)
    }
}

#[async_trait]
impl ClusterAudit for ResourceAudit {
    fn name(&self) -> &str {
        "ResourceAudit"
    }

    async fn audit(&self, cluster: &ClusterState) -> AuditResult {
        let mut findings = Vec::new();

        for pass in 1..=self.passes {
            let (found, fatal) = self.check(cluster).await;
            if fatal {
                tracing::warn!("Fatal Audit error: {:?}", found);
                return AuditResult::Fatal(found);
            }
            findings = found;
            if findings.is_empty() {
                return AuditResult::Passed;
            }
            if pass < self.passes {
                tokio::time::sleep(self.interval).await;
            }
        }

        tracing::warn!("Fatal Audit error: {:?}", findings);
        AuditResult::Failed(findings)
    }
}
