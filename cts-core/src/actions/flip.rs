use async_trait::async_trait;

use super::{NodeTest, Outcome, StartTest, StopTest, Tally};
use crate::harness::Harness;

/// Invert a node's state: stop it if up, start it if down.
#[derive(Debug, Clone)]
pub struct FlipTest {
    tally: Tally,
    start: StartTest,
    stop: StopTest,
}

impl FlipTest {
    /// New test with zeroed counters.
    pub fn new() -> Self {
        Self {
            tally: Tally::new("flip"),
            start: StartTest::new(),
            stop: StopTest::new(),
        }
    }
}

impl Default for FlipTest {
    fn default() -> Self {
        Self::new()
    }
}

tallied!(FlipTest);

#[async_trait]
impl NodeTest for FlipTest {
    async fn run(&mut self, harness: &mut Harness, node: &str) -> Outcome {
        self.tally.call();

        let (kind, result) = if harness.cluster.is_up(node) {
            self.tally.incr("stopped");
            let result = self.stop.run(harness, node).await;
            // Let the survivors notice the departure.
            tokio::time::sleep(harness.cluster.config().settle_time()).await;
            ("up->down", result)
        } else if harness.cluster.is_down(node) {
            self.tally.incr("started");
            ("down->up", self.start.run(harness, node).await)
        } else {
            return self.tally.finish(Outcome::Skipped);
        };

        match result {
            Outcome::Success => {
                self.tally.incr(kind);
                self.tally.finish(Outcome::Success)
            }
            Outcome::Skipped => self.tally.finish(Outcome::Skipped),
            Outcome::Failure(_) => self.tally.failure(format!("{kind} failure")),
        }
    }
}
