use async_trait::async_trait;
use std::sync::Arc;

use super::{ClusterTest, NodeTest, Outcome, StartTest, StopTest, Tally};
use crate::harness::Harness;
use crate::resource::Resource;

/// Knock down the node serving an IP address and bring it back, forcing
/// the address to move.
#[derive(Debug, Clone)]
pub struct IpAddrTest {
    tally: Tally,
    addresses: Vec<Arc<dyn Resource>>,
    start: StartTest,
    stop: StopTest,
}

impl IpAddrTest {
    /// Test over the given IP address resources.
    pub fn new(addresses: Vec<Arc<dyn Resource>>) -> Self {
        Self {
            tally: Tally::new("IPaddr"),
            addresses,
            start: StartTest::new(),
            stop: StopTest::new(),
        }
    }
}

tallied!(IpAddrTest);

/// First up node on which `resource` is active.
async fn serving_node(harness: &Harness, resource: &dyn Resource) -> Option<String> {
    for node in harness.cluster.nodes() {
        if harness.cluster.is_up(node) && resource.is_running_on(node).await {
            return Some(node.clone());
        }
    }
    None
}

#[async_trait]
impl ClusterTest for IpAddrTest {
    async fn run(&mut self, harness: &mut Harness) -> Outcome {
        self.tally.call();

        let Some(index) = harness.env.random_index(self.addresses.len()) else {
            return self.tally.failure("no IP address resources configured");
        };
        let address = Arc::clone(&self.addresses[index]);

        // Nothing can serve an address while the whole cluster is down.
        if harness.cluster.up_count() == 0 {
            return self.tally.finish(Outcome::Skipped);
        }

        let Some(node) = serving_node(harness, address.as_ref()).await else {
            return self.tally.failure(format!("{address} not served anywhere"));
        };
        self.tally.incr(&format!("node:{node}"));

        let stopped = self.stop.run(harness, &node).await;
        tokio::time::sleep(harness.cluster.config().settle_time()).await;
        let started = self.start.run(harness, &node).await;

        if !stopped.passed() {
            return self.tally.failure("Could not stop");
        }
        if !started.passed() {
            return self.tally.failure("Could not start");
        }
        self.tally.finish(Outcome::Success)
    }
}
