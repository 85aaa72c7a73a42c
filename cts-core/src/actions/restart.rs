use async_trait::async_trait;

use super::{ClusterTest, NodeTest, Outcome, StartTest, StopTest, Tally};
use crate::harness::Harness;

/// Stop and restart a randomly chosen node.
#[derive(Debug, Clone)]
pub struct RestartTest {
    tally: Tally,
    start: StartTest,
    stop: StopTest,
}

impl RestartTest {
    /// New test with zeroed counters.
    pub fn new() -> Self {
        Self {
            tally: Tally::new("Restart"),
            start: StartTest::new(),
            stop: StopTest::new(),
        }
    }
}

impl Default for RestartTest {
    fn default() -> Self {
        Self::new()
    }
}

tallied!(RestartTest);

#[async_trait]
impl ClusterTest for RestartTest {
    async fn run(&mut self, harness: &mut Harness) -> Outcome {
        self.tally.call();

        let node = harness.random_node();
        self.tally.incr(&format!("node:{node}"));

        if harness.cluster.is_down(&node) {
            self.tally.incr("WasStopped");
            self.start.run(harness, &node).await;
        }

        let stopped = self.stop.run(harness, &node).await;
        tokio::time::sleep(harness.cluster.config().settle_time()).await;
        let started = self.start.run(harness, &node).await;

        if !stopped.passed() {
            return self.tally.failure("stop failure");
        }
        if !started.passed() {
            return self.tally.failure("start failure");
        }
        self.tally.finish(Outcome::Success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::CtsTest;
    use crate::testkit::{FakeCluster, START, STOP};

    #[tokio::test]
    async fn restart_cycles_chosen_node() {
        let fake = FakeCluster::new(&["alpha", "beta"], "alpha", &["alpha", "beta"]);
        let mut harness = fake.harness().await;
        let mut test = RestartTest::new();

        assert_eq!(test.run(&mut harness).await, Outcome::Success);

        let node = ["alpha", "beta"]
            .into_iter()
            .find(|n| test.stats().get(&format!("node:{n}")) == 1)
            .unwrap();
        assert_eq!(fake.mock.count(node, STOP), 1);
        assert_eq!(fake.mock.count(node, START), 1);
        assert!(harness.cluster.is_up(node));
        assert_eq!(test.stats().get("WasStopped"), 0);
    }

    #[tokio::test]
    async fn down_node_is_started_first() {
        let fake = FakeCluster::new(&["solo"], "solo", &[]);
        let mut harness = fake.harness().await;
        let mut test = RestartTest::new();

        assert_eq!(test.run(&mut harness).await, Outcome::Success);

        assert_eq!(test.stats().get("WasStopped"), 1);
        assert_eq!(test.stats().get("node:solo"), 1);
        assert_eq!(fake.mock.count("solo", START), 2);
        assert_eq!(fake.mock.count("solo", STOP), 1);
    }

    #[tokio::test]
    async fn stop_phase_failure_is_reported_first() {
        let fake = FakeCluster::new(&["solo"], "solo", &["solo"]);
        let mut harness = fake.harness().await;
        fake.mute();
        let mut test = RestartTest::new();

        assert_eq!(
            test.run(&mut harness).await,
            Outcome::Failure("stop failure".into())
        );
    }
}
