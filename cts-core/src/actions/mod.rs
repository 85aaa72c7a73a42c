//! Action tests: one fault or state change plus a check of its log evidence.
//!
//! Each test keeps its own counters ([`Tally`]). Node-scoped tests are handed
//! a node chosen by the runner; unscoped tests pick their own target. The
//! runner only sees [`ScheduledTest`], so a test of unknown shape cannot be
//! scheduled.
//!
//! All tests follow the same arm, act, wait shape: a [`LogWatcher`] is armed
//! at the end of the cluster log before the action, so only evidence written
//! after the action counts.

/// Implement [`CtsTest`] for a test type holding its counters in `tally`.
macro_rules! tallied {
    ($test:ty) => {
        impl crate::actions::CtsTest for $test {
            fn name(&self) -> &str {
                self.tally.name()
            }

            fn stats(&self) -> &crate::stats::Stats {
                self.tally.stats()
            }

            fn stats_mut(&mut self) -> &mut crate::stats::Stats {
                self.tally.stats_mut()
            }
        }
    };
}

mod flip;
mod ipaddr;
mod restart;
mod start_stop;
mod stonith;

pub use flip::FlipTest;
pub use ipaddr::IpAddrTest;
pub use restart::RestartTest;
pub use start_stop::{StartTest, StopTest};
pub use stonith::StonithTest;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::ClusterConfig;
use crate::error::Result;
use crate::harness::Harness;
use crate::resource::Resource;
use crate::stats::Stats;
use crate::watcher::LogWatcher;

/// Counters every test starts with.
pub const TEST_COUNTERS: &[&str] = &["calls", "success", "failure", "skipped"];

/// Result of one test invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The expected evidence was seen.
    Success,
    /// The test ran and something went wrong.
    Failure(String),
    /// The cluster was not in a state the test applies to.
    Skipped,
}

impl Outcome {
    /// Success and skip both pass.
    pub fn passed(&self) -> bool {
        !matches!(self, Outcome::Failure(_))
    }
}

/// Name and counters of one test.
#[derive(Debug, Clone)]
pub struct Tally {
    name: &'static str,
    stats: Stats,
}

impl Tally {
    /// Counters for the test called `name`.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            stats: Stats::with_counters(TEST_COUNTERS),
        }
    }

    /// Test name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Counters so far.
    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// Mutable counters.
    pub fn stats_mut(&mut self) -> &mut Stats {
        &mut self.stats
    }

    /// Count an invocation.
    pub fn call(&mut self) {
        self.stats.incr("calls");
    }

    /// Increment a test-specific counter.
    pub fn incr(&mut self, counter: &str) {
        self.stats.incr(counter);
    }

    /// Count `outcome` and log it if it is a failure.
    pub fn finish(&mut self, outcome: Outcome) -> Outcome {
        match &outcome {
            Outcome::Success => self.stats.incr("success"),
            Outcome::Skipped => self.stats.incr("skipped"),
            Outcome::Failure(reason) => {
                self.stats.incr("failure");
                tracing::warn!("Test {} failed [reason:{}]", self.name, reason);
            }
        }
        outcome
    }

    /// Shorthand for `finish(Outcome::Failure(reason))`.
    pub fn failure(&mut self, reason: impl Into<String>) -> Outcome {
        self.finish(Outcome::Failure(reason.into()))
    }
}

/// Behavior shared by every test.
pub trait CtsTest: Send {
    /// Name used in logs and reports.
    fn name(&self) -> &str;

    /// Counters so far.
    fn stats(&self) -> &Stats;

    /// Counters, for the runner's audit bookkeeping.
    fn stats_mut(&mut self) -> &mut Stats;
}

/// A test aimed at one node.
#[async_trait]
pub trait NodeTest: CtsTest {
    /// Run against `node`.
    async fn run(&mut self, harness: &mut Harness, node: &str) -> Outcome;
}

/// A test that picks its own target.
#[async_trait]
pub trait ClusterTest: CtsTest {
    /// Run once.
    async fn run(&mut self, harness: &mut Harness) -> Outcome;
}

/// A test as the runner schedules it.
pub enum ScheduledTest {
    /// Receives a uniformly random node.
    NodeScoped(Box<dyn NodeTest>),
    /// Chooses its own target.
    Unscoped(Box<dyn ClusterTest>),
}

impl ScheduledTest {
    /// Test name.
    pub fn name(&self) -> &str {
        match self {
            ScheduledTest::NodeScoped(t) => t.name(),
            ScheduledTest::Unscoped(t) => t.name(),
        }
    }

    /// Test counters.
    pub fn stats(&self) -> &Stats {
        match self {
            ScheduledTest::NodeScoped(t) => t.stats(),
            ScheduledTest::Unscoped(t) => t.stats(),
        }
    }

    /// Mutable test counters.
    pub fn stats_mut(&mut self) -> &mut Stats {
        match self {
            ScheduledTest::NodeScoped(t) => t.stats_mut(),
            ScheduledTest::Unscoped(t) => t.stats_mut(),
        }
    }

    /// Run the test once, choosing a node for node-scoped tests.
    pub async fn invoke(&mut self, harness: &mut Harness) -> Outcome {
        match self {
            ScheduledTest::NodeScoped(t) => {
                let node = harness.random_node();
                t.run(harness, &node).await
            }
            ScheduledTest::Unscoped(t) => t.run(harness).await,
        }
    }
}

/// The default test pool: flip, restart and stonith, plus the IP address
/// takeover test when IP resources are configured.
pub fn all_tests(config: &ClusterConfig, ip_resources: Vec<Arc<dyn Resource>>) -> Vec<ScheduledTest> {
    let mut tests = vec![
        ScheduledTest::NodeScoped(Box::new(FlipTest::new())),
        ScheduledTest::Unscoped(Box::new(RestartTest::new())),
        ScheduledTest::NodeScoped(Box::new(StonithTest::new(config.timing.stonith_timeout()))),
    ];
    if !ip_resources.is_empty() {
        tests.push(ScheduledTest::Unscoped(Box::new(IpAddrTest::new(ip_resources))));
    }
    tests
}

/// Watcher for `pattern` armed at the current end of the cluster log.
pub(crate) async fn watch_for(config: &ClusterConfig, pattern: &str, timeout: Duration) -> Result<LogWatcher> {
    let mut watcher = LogWatcher::new(&config.log_file, &[pattern], timeout)?
        .with_poll_interval(config.timing.poll_interval());
    watcher.arm(false).await?;
    Ok(watcher)
}

/// Whether the watcher sees its pattern before its timeout.
pub(crate) async fn observed(watcher: &mut LogWatcher) -> Result<bool> {
    Ok(watcher.wait(None).await?.is_some())
}
