use async_trait::async_trait;
use std::time::Duration;

use super::{observed, watch_for, NodeTest, Outcome, Tally};
use crate::cluster::NodeStatus;
use crate::config::node_pattern;
use crate::harness::Harness;
use crate::watcher::LogWatcher;

/// Power-cycle a node through the fencer and watch it leave and rejoin.
#[derive(Debug, Clone)]
pub struct StonithTest {
    tally: Tally,
    timeout: Duration,
}

impl StonithTest {
    /// `timeout` bounds the wait for the node to come back.
    pub fn new(timeout: Duration) -> Self {
        Self {
            tally: Tally::new("Stonith"),
            timeout,
        }
    }
}

tallied!(StonithTest);

#[async_trait]
impl NodeTest for StonithTest {
    async fn run(&mut self, harness: &mut Harness, node: &str) -> Outcome {
        self.tally.call();
        let config = harness.cluster.config().clone();

        // A departure is only logged if someone else is left to see it.
        let stop_pattern = (harness.cluster.is_up(node) && harness.cluster.up_count() > 1)
            .then(|| node_pattern(&config.patterns.they_stopped, node));

        let others_up = harness.cluster.up_count() - usize::from(harness.cluster.is_up(node));
        let up_pattern = if others_up == 0 {
            node_pattern(&config.patterns.we_started, node)
        } else {
            node_pattern(&config.patterns.they_started, node)
        };

        let mut stop_watch: Option<LogWatcher> = match &stop_pattern {
            Some(pattern) => match watch_for(&config, pattern, config.settle_time()).await {
                Ok(watcher) => Some(watcher),
                Err(e) => return self.tally.failure(e.to_string()),
            },
            None => None,
        };

        if !harness.env.reset_node(node).await {
            return self.tally.failure("Stonith failure");
        }

        let mut up_watch = match watch_for(&config, &up_pattern, self.timeout).await {
            Ok(watcher) => watcher,
            Err(e) => return self.tally.failure(e.to_string()),
        };

        let mut reason = None;
        if let (Some(watcher), Some(pattern)) = (stop_watch.as_mut(), &stop_pattern) {
            match observed(watcher).await {
                Ok(true) => {}
                Ok(false) => reason = Some(format!("Did not find {pattern}")),
                Err(e) => reason = Some(e.to_string()),
            }
        }
        match observed(&mut up_watch).await {
            Ok(true) => {}
            Ok(false) => reason = Some(format!("Did not find {up_pattern}")),
            Err(e) => reason = Some(e.to_string()),
        }

        // The node reboots into the cluster whether or not we saw it happen.
        if let Err(e) = harness.cluster.set_status(node, NodeStatus::Up) {
            tracing::warn!("{}", e);
        }
        tokio::time::sleep(config.timing.stonith_grace()).await;

        match reason {
            None => self.tally.finish(Outcome::Success),
            Some(reason) => self.tally.failure(reason),
        }
    }
}
