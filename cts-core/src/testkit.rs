//! In-process fake cluster for tests.
//!
//! The fake answers remote commands the way a heartbeat cluster would and
//! writes the matching lines into a shared log file, so the real watcher,
//! tracker, tests and runner can be exercised without any network.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::cluster::ClusterState;
use crate::config::{tests::FULL, ClusterConfig, RawConfig, ResourceConfig, ResourceGroupConfig, Timing};
use crate::fence::MockFencer;
use crate::harness::{Environment, Harness};
use crate::remote::{MockExecutor, MockReply};
use crate::resource::{ConfiguredResources, IPADDR_KIND};

pub(crate) const START: &str = "/etc/init.d/heartbeat start";
pub(crate) const STOP: &str = "/etc/init.d/heartbeat stop";
pub(crate) const STATUS: &str = "/etc/init.d/heartbeat status";
pub(crate) const SERVICE_IP: &str = "10.0.0.5";

const IP_PROBE: &str = "ip -o addr | grep -qw %s";

/// Delay before a fenced node's comeback lines hit the log.
pub(crate) const REBOOT_DELAY: Duration = Duration::from_millis(50);

#[derive(Default)]
struct FakeState {
    up: BTreeMap<String, bool>,
    serving: BTreeSet<String>,
    muted: bool,
}

pub(crate) struct FakeCluster {
    _dir: tempfile::TempDir,
    pub log: PathBuf,
    pub mock: MockExecutor,
    pub fencer: MockFencer,
    nodes: Vec<String>,
    local: String,
    with_ip: bool,
    state: Arc<Mutex<FakeState>>,
}

impl FakeCluster {
    /// Cluster of `nodes` run from `local`, with `up` nodes running.
    pub fn new(nodes: &[&str], local: &str, up: &[&str]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("ha-log");
        std::fs::write(&log, "").unwrap();

        let mut state = FakeState::default();
        for node in nodes {
            state.up.insert(node.to_string(), up.contains(node));
        }
        if let Some(first) = up.first() {
            state.serving.insert(first.to_string());
        }
        let state = Arc::new(Mutex::new(state));

        let mock = {
            let state = Arc::clone(&state);
            let log = log.clone();
            MockExecutor::with_handler(move |node, command| {
                handle(&mut state.lock().unwrap(), &log, node, command)
            })
        };

        let fencer = {
            let state = Arc::clone(&state);
            let log = log.clone();
            MockFencer::with_hook(move |node| reboot(&state, &log, node))
        };

        Self {
            _dir: dir,
            log,
            mock,
            fencer,
            nodes: nodes.iter().map(|n| n.to_string()).collect(),
            local: local.to_string(),
            with_ip: false,
            state,
        }
    }

    /// Configure an `IPaddr` resource for the service address.
    pub fn with_ip_resource(mut self) -> Self {
        self.with_ip = true;
        self
    }

    pub fn config(&self) -> ClusterConfig {
        let raw: RawConfig = toml::from_str(FULL).unwrap();
        let mut config = raw.validate().unwrap();
        config.nodes = self.nodes.clone();
        config.local_node = self.local.clone();
        config.log_file = self.log.clone();
        config.timing = Timing::immediate();
        config.dead_time = Duration::ZERO;
        if self.with_ip {
            config.resource_groups = vec![ResourceGroupConfig {
                resources: vec![ResourceConfig {
                    kind: IPADDR_KIND.into(),
                    instance: SERVICE_IP.into(),
                    status_cmd: IP_PROBE.into(),
                }],
            }];
        }
        config
    }

    /// Harness with the intended status not yet observed.
    pub fn unprepared_with(&self, config: ClusterConfig) -> Harness {
        let exec = Arc::new(self.mock.clone());
        let resources = ConfiguredResources::from_config(&config.resource_groups, exec.clone());
        let cluster = ClusterState::new(Arc::new(config), exec, Arc::new(resources));
        Harness::new(cluster, Environment::new(Some(42), Arc::new(self.fencer.clone())))
    }

    /// Prepared harness using [`config`](Self::config).
    pub async fn harness(&self) -> Harness {
        self.harness_with(self.config()).await
    }

    pub async fn harness_with(&self, config: ClusterConfig) -> Harness {
        let mut harness = self.unprepared_with(config);
        harness.cluster.prepare().await;
        self.mock.clear_calls();
        harness
    }

    pub fn is_up(&self, node: &str) -> bool {
        self.state.lock().unwrap().up.get(node).copied().unwrap_or(false)
    }

    /// Stop writing evidence; commands still take effect.
    pub fn mute(&self) {
        self.state.lock().unwrap().muted = true;
    }

    /// Make the service address active on exactly `nodes`.
    pub fn serve_on(&self, nodes: &[&str]) {
        self.state.lock().unwrap().serving = nodes.iter().map(|n| n.to_string()).collect();
    }

    pub fn append(&self, line: &str) {
        write_lines(&self.log, &[line.to_string()]);
    }
}

fn handle(state: &mut FakeState, log: &Path, node: &str, command: &str) -> MockReply {
    let ip_probe = IP_PROBE.replace("%s", SERVICE_IP);
    let was_up = state.up.get(node).copied().unwrap_or(false);

    if command == STATUS {
        return if was_up {
            MockReply::stdout("heartbeat OK [pid 4242 et al] is running on node\n")
        } else {
            MockReply::stdout("heartbeat is stopped. No process\n")
        };
    }
    if command == ip_probe {
        return if was_up && state.serving.contains(node) {
            MockReply::ok()
        } else {
            MockReply::exit(1)
        };
    }

    let mut lines = Vec::new();
    if command == START && !was_up {
        state.up.insert(node.to_string(), true);
        lines.push(format!("{node} heartbeat[4242]: info: Local status now set to: 'active'"));
        for peer in up_peers(state, node) {
            lines.push(format!("{peer} heartbeat[4242]: info: Status update for node {node}: status active"));
        }
        if !state.serving.iter().any(|n| state.up.get(n) == Some(&true)) {
            state.serving = BTreeSet::from([node.to_string()]);
        }
    } else if command == STOP && was_up {
        state.up.insert(node.to_string(), false);
        for peer in up_peers(state, node) {
            lines.push(format!("{peer} heartbeat[4242]: WARN: node {node}: is dead"));
        }
        lines.push(format!("{node} heartbeat[4242]: info: Heartbeat shutdown complete."));
        if state.serving.remove(node) {
            if let Some(peer) = up_peers(state, node).into_iter().next() {
                state.serving.insert(peer);
            }
        }
    }

    if !state.muted {
        write_lines(log, &lines);
    }
    MockReply::ok()
}

/// A fenced node dies at once and comes back after [`REBOOT_DELAY`].
fn reboot(state: &Arc<Mutex<FakeState>>, log: &Path, node: &str) {
    let mut guard = state.lock().unwrap();
    let mut lines = Vec::new();
    if guard.up.get(node) == Some(&true) {
        for peer in up_peers(&guard, node) {
            lines.push(format!("{peer} heartbeat[4242]: WARN: node {node}: is dead"));
        }
    }
    guard.up.insert(node.to_string(), false);
    let muted = guard.muted;
    drop(guard);
    if !muted {
        write_lines(log, &lines);
    }

    let state = Arc::clone(state);
    let log = log.to_path_buf();
    let node = node.to_string();
    tokio::spawn(async move {
        tokio::time::sleep(REBOOT_DELAY).await;
        let mut guard = state.lock().unwrap();
        guard.up.insert(node.clone(), true);
        let mut lines = vec![format!("{node} heartbeat[4242]: info: Local status now set to: 'active'")];
        for peer in up_peers(&guard, &node) {
            lines.push(format!("{peer} heartbeat[4242]: info: Status update for node {node}: status active"));
        }
        if !guard.muted {
            write_lines(&log, &lines);
        }
    });
}

fn up_peers(state: &FakeState, node: &str) -> Vec<String> {
    state
        .up
        .iter()
        .filter(|(n, up)| **up && n.as_str() != node)
        .map(|(n, _)| n.clone())
        .collect()
}

fn write_lines(path: &Path, lines: &[String]) {
    let mut file = std::fs::OpenOptions::new().append(true).open(path).unwrap();
    for line in lines {
        writeln!(file, "{line}").unwrap();
    }
}
