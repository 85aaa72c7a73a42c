//! End-to-end scenarios against the in-process fake cluster.
//!
//! Every scenario uses the real watcher, tracker, tests, audits and runner;
//! only the remote shell and the fencing device are simulated.

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;

use crate::actions::{all_tests, ClusterTest, CtsTest, FlipTest, NodeTest, Outcome, StartTest, StonithTest, StopTest, Tally};
use crate::audit::{AuditResult, ClusterAudit, ResourceAudit};
use crate::cluster::NodeStatus;
use crate::config::ClusterConfig;
use crate::error::CtsError;
use crate::harness::Harness;
use crate::resource::{resources_of_kind, IPADDR_KIND};
use crate::runner::{PlacementPolicy, RandomRunner, BAD_NEWS_POLLS};
use crate::stats::Stats;
use crate::testkit::{FakeCluster, START, STOP};

/// Writes `lines` copies of a bad-news line to the log, then succeeds.
struct LogSpew {
    tally: Tally,
    log: PathBuf,
    lines: usize,
    truncate: bool,
}

impl LogSpew {
    fn new(fake: &FakeCluster, lines: usize) -> Self {
        Self {
            tally: Tally::new("spew"),
            log: fake.log.clone(),
            lines,
            truncate: false,
        }
    }

    /// Empty the log before writing.
    fn truncating(mut self) -> Self {
        self.truncate = true;
        self
    }
}

impl CtsTest for LogSpew {
    fn name(&self) -> &str {
        self.tally.name()
    }

    fn stats(&self) -> &Stats {
        self.tally.stats()
    }

    fn stats_mut(&mut self) -> &mut Stats {
        self.tally.stats_mut()
    }
}

#[async_trait]
impl ClusterTest for LogSpew {
    async fn run(&mut self, harness: &mut Harness) -> Outcome {
        use std::io::Write;

        self.tally.call();
        if self.truncate {
            harness.cluster.truncate_log().await.unwrap();
        }
        let mut file = std::fs::OpenOptions::new().append(true).open(&self.log).unwrap();
        for i in 0..self.lines {
            writeln!(file, "alpha heartbeat[4242]: ERROR: Timer {i} for status expired").unwrap();
        }
        self.tally.finish(Outcome::Success)
    }
}

/// Config with a short poll interval and room for a fenced node to reboot.
fn rebooting_config(fake: &FakeCluster) -> ClusterConfig {
    let mut config = fake.config();
    config.timing.poll_interval_ms = 10;
    config.timing.stonith_timeout_secs = 5;
    config
}

#[tokio::test]
async fn prepare_mirrors_observed_status() {
    let fake = FakeCluster::new(&["alpha", "beta", "gamma"], "alpha", &["alpha", "gamma"]);
    let harness = fake.harness().await;

    for node in ["alpha", "beta", "gamma"] {
        let expected = if fake.is_up(node) {
            NodeStatus::Up
        } else {
            NodeStatus::Down
        };
        assert_eq!(harness.cluster.status_of(node), Some(expected), "node {node}");
    }
    assert_eq!(harness.cluster.up_count(), 2);
}

#[tokio::test]
async fn start_and_stop_skip_without_touching_cluster() {
    let fake = FakeCluster::new(&["alpha", "beta"], "alpha", &["alpha"]);
    let mut harness = fake.harness().await;

    let mut start = StartTest::new();
    let mut stop = StopTest::new();
    assert_eq!(start.run(&mut harness, "alpha").await, Outcome::Skipped);
    assert_eq!(stop.run(&mut harness, "beta").await, Outcome::Skipped);

    assert!(fake.mock.calls().is_empty());
    assert_eq!(harness.cluster.status_of("alpha"), Some(NodeStatus::Up));
    assert_eq!(harness.cluster.status_of("beta"), Some(NodeStatus::Down));
}

#[tokio::test]
async fn flip_negates_status_both_ways() {
    let fake = FakeCluster::new(&["alpha", "beta", "gamma"], "alpha", &["alpha", "beta", "gamma"]);
    let mut harness = fake.harness().await;
    let mut flip = FlipTest::new();

    for node in ["beta", "beta", "alpha", "alpha"] {
        let before = harness.cluster.status_of(node);
        assert_eq!(flip.run(&mut harness, node).await, Outcome::Success);
        assert_ne!(harness.cluster.status_of(node), before);
        assert_eq!(harness.cluster.is_up(node), fake.is_up(node));
    }
    assert_eq!(flip.stats().get("success"), 4);
    assert_eq!(flip.stats().get("up->down"), 2);
    assert_eq!(flip.stats().get("down->up"), 2);
}

#[tokio::test]
async fn bad_news_seen_after_log_truncation() {
    let fake = FakeCluster::new(&["alpha", "beta"], "alpha", &["alpha"]);
    for i in 0..50 {
        fake.append(&format!("alpha heartbeat[4242]: info: old entry {i}"));
    }
    let mut harness = fake.harness().await;
    let spew = LogSpew::new(&fake, 3).truncating();
    let mut runner = RandomRunner::new(
        vec![crate::actions::ScheduledTest::Unscoped(Box::new(spew))],
        vec![],
        PlacementPolicy::FailAudit,
    )
    .unwrap();

    let report = runner.run(&mut harness, 1).await.unwrap();

    assert_eq!(report.stats.get("BadNews"), 3);
}

#[tokio::test]
async fn evidence_found_after_log_truncation() {
    let fake = FakeCluster::new(&["alpha", "beta"], "alpha", &["alpha"]);
    fake.append("alpha heartbeat[4242]: info: stale entry");
    let mut harness = fake.harness().await;
    harness.cluster.truncate_log().await.unwrap();

    let mut start = StartTest::new();
    assert_eq!(start.run(&mut harness, "beta").await, Outcome::Success);
    let log = std::fs::read_to_string(&fake.log).unwrap();
    assert!(!log.contains("stale entry"));
}

#[tokio::test]
async fn audit_verdicts_in_one_pass() {
    let fake = FakeCluster::new(&["alpha", "beta"], "alpha", &["alpha", "beta"]).with_ip_resource();
    let harness = fake.harness().await;
    let audit = ResourceAudit::new(60, Duration::from_secs(3600));

    fake.serve_on(&["beta"]);
    assert_eq!(audit.audit(&harness.cluster).await, AuditResult::Passed);

    fake.serve_on(&["alpha", "beta"]);
    assert!(matches!(audit.audit(&harness.cluster).await, AuditResult::Fatal(_)));
}

#[tokio::test]
async fn sustained_bad_news_stops_cluster_and_aborts() {
    let fake = FakeCluster::new(&["alpha", "beta"], "alpha", &["alpha", "beta"]);
    let mut harness = fake.harness().await;
    let spew = LogSpew::new(&fake, BAD_NEWS_POLLS + 5);
    let mut runner = RandomRunner::new(
        vec![crate::actions::ScheduledTest::Unscoped(Box::new(spew))],
        vec![],
        PlacementPolicy::FailAudit,
    )
    .unwrap();

    let err = runner.run(&mut harness, 100).await.unwrap_err();

    assert!(matches!(err, CtsError::SustainedBadNews { polls } if polls == BAD_NEWS_POLLS));
    let report = runner.report();
    assert_eq!(report.iterations, 1);
    assert_eq!(report.stats.get("BadNews"), BAD_NEWS_POLLS as u64);
    assert_eq!(harness.cluster.up_count(), 0);
    assert_eq!(fake.mock.count("alpha", STOP), 1);
    assert_eq!(fake.mock.count("beta", STOP), 1);
}

#[tokio::test]
async fn brief_bad_news_is_counted_and_run_continues() {
    let fake = FakeCluster::new(&["alpha", "beta"], "alpha", &["alpha", "beta"]);
    let mut harness = fake.harness().await;
    let spew = LogSpew::new(&fake, 3);
    let mut runner = RandomRunner::new(
        vec![crate::actions::ScheduledTest::Unscoped(Box::new(spew))],
        vec![],
        PlacementPolicy::FailAudit,
    )
    .unwrap();

    let report = runner.run(&mut harness, 4).await.unwrap();

    assert_eq!(report.stats.get("BadNews"), 12);
    assert_eq!(report.stats.get("success"), 4);
    assert_eq!(harness.cluster.up_count(), 2);
}

#[tokio::test]
async fn stonith_peer_in_two_node_cluster() {
    let fake = FakeCluster::new(&["alpha", "beta"], "alpha", &["alpha", "beta"]);
    let mut harness = fake.harness_with(rebooting_config(&fake)).await;
    let mut stonith = StonithTest::new(Duration::from_secs(5));

    let outcome = stonith.run(&mut harness, "beta").await;

    assert_eq!(outcome, Outcome::Success);
    assert_eq!(fake.fencer.resets(), vec!["beta"]);
    assert_eq!(harness.cluster.status_of("beta"), Some(NodeStatus::Up));
    let log = std::fs::read_to_string(&fake.log).unwrap();
    assert!(log.contains("node beta: is dead"));
    assert!(log.contains("Status update for node beta: status active"));
}

#[tokio::test]
async fn stonith_only_node_watches_for_self_start() {
    let fake = FakeCluster::new(&["alpha"], "alpha", &["alpha"]);
    let mut harness = fake.harness_with(rebooting_config(&fake)).await;
    let mut stonith = StonithTest::new(Duration::from_secs(5));

    let outcome = stonith.run(&mut harness, "alpha").await;

    assert_eq!(outcome, Outcome::Success);
    assert_eq!(harness.cluster.status_of("alpha"), Some(NodeStatus::Up));
    let log = std::fs::read_to_string(&fake.log).unwrap();
    assert!(!log.contains("is dead"));
}

#[tokio::test]
async fn default_pool_runs_clean() {
    let fake = FakeCluster::new(&["alpha", "beta", "gamma"], "alpha", &["alpha", "beta"]).with_ip_resource();
    let config = rebooting_config(&fake);
    let mut harness = fake.harness_with(config.clone()).await;

    let addresses = resources_of_kind(&harness.cluster.resource_groups(), IPADDR_KIND);
    let tests = all_tests(&config, addresses);
    let audits: Vec<Box<dyn ClusterAudit>> = vec![Box::new(ResourceAudit::from_timing(&config.timing))];
    let mut runner = RandomRunner::new(tests, audits, PlacementPolicy::AbortRun).unwrap();

    let report = runner.run(&mut harness, 30).await.unwrap();

    assert_eq!(report.iterations, 30);
    assert_eq!(report.stats.get("success"), 30);
    assert_eq!(report.stats.get("failure"), 0);
    assert_eq!(report.stats.get("BadNews"), 0);
    assert_eq!(report.stats.get("auditfail"), 0);
    let calls: u64 = report.per_test.values().map(|s| s.get("calls")).sum();
    assert_eq!(calls, 30);
    assert_eq!(report.per_test.len(), 4);

    for node in ["alpha", "beta", "gamma"] {
        assert_eq!(harness.cluster.is_up(node), fake.is_up(node), "node {node}");
    }
    assert!(fake.mock.calls().iter().any(|c| c.command == START || c.command == STOP));
}
