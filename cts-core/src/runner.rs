//! Randomized test loop.
//!
//! Each iteration picks a test uniformly at random, runs it, checks the log
//! for bad news and runs every audit. A burst of bad news that does not
//! drain within [`BAD_NEWS_POLLS`] polls stops the cluster and ends the run.

use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use uuid::Uuid;

use crate::actions::ScheduledTest;
use crate::audit::{AuditResult, ClusterAudit};
use crate::error::{CtsError, Result};
use crate::harness::Harness;
use crate::stats::Stats;
use crate::watcher::LogWatcher;

/// Bad-news polls per iteration; all of them matching aborts the run.
pub const BAD_NEWS_POLLS: usize = 10;

/// Counters every run starts with.
pub const RUN_COUNTERS: &[&str] = &["success", "failure", "BadNews"];

/// What to do when an audit finds a resource active on several nodes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PlacementPolicy {
    /// Count the audit failure and keep going.
    #[default]
    FailAudit,
    /// Stop every node and end the run.
    AbortRun,
}

impl PlacementPolicy {
    /// Policy selected by `abort_on_duplicate_placement`.
    pub fn from_abort_flag(abort: bool) -> Self {
        if abort {
            PlacementPolicy::AbortRun
        } else {
            PlacementPolicy::FailAudit
        }
    }
}

/// Summary of a run, serializable for reports.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Unique id of this run.
    pub run_id: Uuid,
    /// Seed the random choices were drawn from.
    pub seed: u64,
    /// Iterations actually started.
    pub iterations: usize,
    /// Run-wide counters.
    pub stats: Stats,
    /// Counters of every test in the pool, by test name.
    pub per_test: BTreeMap<String, Stats>,
}

/// Runs tests from a pool in random order.
pub struct RandomRunner {
    run_id: Uuid,
    tests: Vec<ScheduledTest>,
    audits: Vec<Box<dyn ClusterAudit>>,
    policy: PlacementPolicy,
    stats: Stats,
    seed: u64,
    iterations: usize,
}

impl RandomRunner {
    /// Create a runner over `tests`, auditing with `audits`.
    ///
    /// # Errors
    ///
    /// [`CtsError::EmptyTestPool`] if `tests` is empty.
    pub fn new(
        tests: Vec<ScheduledTest>,
        audits: Vec<Box<dyn ClusterAudit>>,
        policy: PlacementPolicy,
    ) -> Result<Self> {
        if tests.is_empty() {
            return Err(CtsError::EmptyTestPool);
        }
        Ok(Self {
            run_id: Uuid::new_v4(),
            tests,
            audits,
            policy,
            stats: Stats::with_counters(RUN_COUNTERS),
            seed: 0,
            iterations: 0,
        })
    }

    /// Run-wide counters so far.
    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// The test pool.
    pub fn tests(&self) -> &[ScheduledTest] {
        &self.tests
    }

    /// Report of everything run so far, including an aborted run.
    pub fn report(&self) -> RunReport {
        RunReport {
            run_id: self.run_id,
            seed: self.seed,
            iterations: self.iterations,
            stats: self.stats.clone(),
            per_test: self
                .tests
                .iter()
                .map(|t| (t.name().to_string(), t.stats().clone()))
                .collect(),
        }
    }

    /// Run `iterations` randomly chosen tests.
    ///
    /// # Errors
    ///
    /// [`CtsError::SustainedBadNews`] or [`CtsError::PlacementViolation`]
    /// after stopping every node; watcher errors if the cluster log cannot
    /// be read.
    pub async fn run(&mut self, harness: &mut Harness, iterations: usize) -> Result<RunReport> {
        let config = harness.cluster.config().clone();
        let mut bad_news = LogWatcher::new(&config.log_file, &config.bad_regexes, Duration::ZERO)?
            .with_poll_interval(config.timing.poll_interval());
        bad_news.arm(false).await?;

        self.seed = harness.env.seed();
        tracing::info!(run_id = %self.run_id, seed = self.seed, iterations, "Starting random test run");

        for count in 1..=iterations {
            self.iterations = count;
            let index = harness.env.random_index(self.tests.len()).unwrap_or(0);

            let test = &mut self.tests[index];
            tracing::info!("Running test {} [{}]", test.name(), count);
            let outcome = test.invoke(harness).await;

            if outcome.passed() {
                self.stats.incr("success");
            } else {
                self.stats.incr("failure");
                harness.cluster.status_all(None).await;
            }

            self.drain_bad_news(&mut bad_news, harness).await?;
            self.run_audits(index, harness).await?;
        }

        tracing::info!(run_id = %self.run_id, "Run complete: {}", self.stats);
        Ok(self.report())
    }

    async fn drain_bad_news(&mut self, watcher: &mut LogWatcher, harness: &mut Harness) -> Result<()> {
        for _ in 0..BAD_NEWS_POLLS {
            match watcher.wait(Some(Duration::ZERO)).await? {
                Some(line) => {
                    tracing::warn!("{}", line);
                    self.stats.incr("BadNews");
                }
                None => return Ok(()),
            }
        }

        tracing::error!("Big problems.  Shutting down.");
        harness.cluster.stop_all(None).await;
        Err(CtsError::SustainedBadNews {
            polls: BAD_NEWS_POLLS,
        })
    }

    async fn run_audits(&mut self, index: usize, harness: &mut Harness) -> Result<()> {
        for audit in &self.audits {
            let result = audit.audit(&harness.cluster).await;
            if result.passed() {
                continue;
            }

            tracing::warn!("Audit {} Failed.", audit.name());
            self.tests[index].stats_mut().incr("auditfail");
            self.stats.incr("auditfail");

            if matches!(result, AuditResult::Fatal(_)) && self.policy == PlacementPolicy::AbortRun {
                tracing::error!("Audit {} found a fatal violation, stopping the cluster", audit.name());
                harness.cluster.stop_all(None).await;
                return Err(CtsError::PlacementViolation {
                    audit: audit.name().to_string(),
                });
            }
        }
        Ok(())
    }
}
