//! Run randomly chosen tests against the cluster.

use anyhow::{bail, Context, Result};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cts_core::{
    all_tests, resources_of_kind, ClusterAudit, ClusterConfig, CommandFencer, Environment, Harness,
    PlacementPolicy, RandomRunner, ResourceAudit, RunReport, IPADDR_KIND,
};

/// Options of the run command.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Number of tests to run.
    pub iterations: usize,
    /// Seed for the random choices.
    pub seed: Option<u64>,
    /// Empty the cluster log first.
    pub truncate_log: bool,
    /// Copy the test configuration directory to every node first.
    pub sync_configs: bool,
    /// Where to write the JSON report.
    pub report: Option<PathBuf>,
}

/// Run the run command.
pub async fn run(config: Arc<ClusterConfig>, options: RunOptions) -> Result<()> {
    let cluster = super::connect(Arc::clone(&config));
    let fencer = Arc::new(CommandFencer::new(config.stonith_cmd.clone()));
    let harness = Harness::new(cluster, Environment::new(options.seed, fencer));

    let report = execute(harness, &options).await?;
    print!("{}", summary(&report));
    Ok(())
}

/// Prepare the cluster, run the tests and write the report.
///
/// The report is written even when the run aborts, so the counters leading
/// up to the abort are kept.
async fn execute(mut harness: Harness, options: &RunOptions) -> Result<RunReport> {
    let config = harness.cluster.config().clone();

    if options.truncate_log {
        harness
            .cluster
            .truncate_log()
            .await
            .context("Failed to truncate the cluster log")?;
    }
    if options.sync_configs {
        let failed = harness
            .cluster
            .sync_test_configs()
            .await
            .context("Failed to sync test configurations")?;
        if !failed.is_empty() {
            bail!("Could not copy test configurations to: {}", failed.join(", "));
        }
    }

    harness.cluster.prepare().await;

    let addresses = resources_of_kind(&harness.cluster.resource_groups(), IPADDR_KIND);
    let tests = all_tests(&config, addresses);
    let audits: Vec<Box<dyn ClusterAudit>> = vec![Box::new(ResourceAudit::from_timing(&config.timing))];
    let policy = PlacementPolicy::from_abort_flag(config.abort_on_duplicate_placement);
    let mut runner = RandomRunner::new(tests, audits, policy)?;

    let result = runner.run(&mut harness, options.iterations).await;
    let report = match &result {
        Ok(report) => report.clone(),
        Err(_) => runner.report(),
    };

    if let Some(path) = &options.report {
        write_report(path, &report).await?;
    }
    if let Err(e) = result {
        print!("{}", summary(&report));
        return Err(e).context(format!("Run {} aborted", report.run_id));
    }
    Ok(report)
}

async fn write_report(path: &Path, report: &RunReport) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("Failed to serialize report")?;
    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("Failed to write report to {}", path.display()))?;
    tracing::info!("Report written to {}", path.display());
    Ok(())
}

/// Human-readable summary of a run.
fn summary(report: &RunReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== cts run {} ===", report.run_id);
    let _ = writeln!(out);
    let _ = writeln!(out, "Seed:       {}", report.seed);
    let _ = writeln!(out, "Iterations: {}", report.iterations);
    let _ = writeln!(out, "Overall:    {}", report.stats);
    let _ = writeln!(out);

    let width = report.per_test.keys().map(|n| n.len()).max().unwrap_or(0);
    for (name, stats) in &report.per_test {
        let _ = writeln!(out, "  {:<width$}  {}", name, stats);
    }
    out
}
