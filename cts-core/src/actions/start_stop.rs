//! Single-node start and stop, the building blocks of every other test.

use async_trait::async_trait;

use super::{observed, watch_for, NodeTest, Outcome, Tally};
use crate::config::node_pattern;
use crate::harness::Harness;

/// Stop the cluster manager on a node and look for the departure.
#[derive(Debug, Clone)]
pub struct StopTest {
    tally: Tally,
}

impl StopTest {
    /// New test with zeroed counters.
    pub fn new() -> Self {
        Self {
            tally: Tally::new("stop"),
        }
    }
}

impl Default for StopTest {
    fn default() -> Self {
        Self::new()
    }
}

tallied!(StopTest);

#[async_trait]
impl NodeTest for StopTest {
    async fn run(&mut self, harness: &mut Harness, node: &str) -> Outcome {
        self.tally.call();
        let cluster = &mut harness.cluster;
        if !cluster.is_up(node) {
            return self.tally.finish(Outcome::Skipped);
        }

        let config = cluster.config().clone();
        let pattern = if cluster.is_local(node) {
            self.tally.incr("us");
            node_pattern(&config.patterns.we_stopped, node)
        } else if cluster.up_count() <= 1 {
            self.tally.incr("all");
            node_pattern(&config.patterns.all_stopped, node)
        } else {
            self.tally.incr("them");
            node_pattern(&config.patterns.they_stopped, node)
        };

        let mut watcher = match watch_for(&config, &pattern, config.timing.test_timeout()).await {
            Ok(watcher) => watcher,
            Err(e) => return self.tally.failure(e.to_string()),
        };
        cluster.stop(node).await;

        match observed(&mut watcher).await {
            Ok(true) => self.tally.finish(Outcome::Success),
            Ok(false) => self.tally.failure(format!("no match against {pattern}")),
            Err(e) => self.tally.failure(e.to_string()),
        }
    }
}

/// Start the cluster manager on a node and look for its arrival.
#[derive(Debug, Clone)]
pub struct StartTest {
    tally: Tally,
}

impl StartTest {
    /// New test with zeroed counters.
    pub fn new() -> Self {
        Self {
            tally: Tally::new("start"),
        }
    }
}

impl Default for StartTest {
    fn default() -> Self {
        Self::new()
    }
}

tallied!(StartTest);

#[async_trait]
impl NodeTest for StartTest {
    async fn run(&mut self, harness: &mut Harness, node: &str) -> Outcome {
        self.tally.call();
        let cluster = &mut harness.cluster;
        if !cluster.is_down(node) {
            return self.tally.finish(Outcome::Skipped);
        }

        let config = cluster.config().clone();
        let pattern = if cluster.is_local(node) || cluster.up_count() == 0 {
            self.tally.incr("us");
            node_pattern(&config.patterns.we_started, node)
        } else {
            self.tally.incr("them");
            node_pattern(&config.patterns.they_started, node)
        };

        let mut watcher = match watch_for(&config, &pattern, config.timing.test_timeout()).await {
            Ok(watcher) => watcher,
            Err(e) => return self.tally.failure(e.to_string()),
        };
        cluster.start(node).await;

        match observed(&mut watcher).await {
            Ok(true) => self.tally.finish(Outcome::Success),
            Ok(false) => self.tally.failure(format!("did not find pattern {pattern}")),
            Err(e) => self.tally.failure(e.to_string()),
        }
    }
}
