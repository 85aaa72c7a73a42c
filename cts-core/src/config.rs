//! Configuration loading for the cluster test harness.
//!
//! Configuration is loaded from a TOML file (default: `cts.toml`). The file is
//! first parsed into [`RawConfig`], where every cluster-manager specific field
//! is optional, and then validated into an immutable [`ClusterConfig`]. The
//! validation step reports every missing required field at once.

use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::host;

/// Placeholder substituted with a node name in patterns and command templates.
pub const NODE_PLACEHOLDER: &str = "%s";

/// Parsed but not yet validated configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfig {
    /// Name of the cluster manager under test.
    #[serde(alias = "Name")]
    pub name: Option<String>,
    /// Every node in the cluster, in a stable order.
    #[serde(default)]
    pub nodes: Vec<String>,
    /// Name of the node the harness runs on (default: this host's name).
    pub local_node: Option<String>,
    /// Command that starts the cluster manager on a node.
    #[serde(alias = "StartCmd")]
    pub start_cmd: Option<String>,
    /// Command that stops the cluster manager on a node.
    #[serde(alias = "StopCmd")]
    pub stop_cmd: Option<String>,
    /// Command whose first output line reports the manager's status.
    #[serde(alias = "StatusCmd")]
    pub status_cmd: Option<String>,
    /// Command that makes the manager reread its configuration.
    #[serde(alias = "RereadCmd")]
    pub reread_cmd: Option<String>,
    /// Fencing command template, run on the orchestrator with `%s` = node.
    #[serde(alias = "StonithCmd", default = "default_stonith_cmd")]
    pub stonith_cmd: String,
    /// Local directory of test configurations to replicate to every node.
    #[serde(alias = "TestConfigDir")]
    pub test_config_dir: Option<PathBuf>,
    /// Cluster manager log file, readable from the orchestrator.
    #[serde(alias = "LogFileName")]
    pub log_file: Option<PathBuf>,
    /// Maximum time for the cluster to notice a node disappearing (seconds).
    #[serde(alias = "DeadTime", default = "default_dead_time")]
    pub dead_time_secs: u64,
    /// Log lines that indicate trouble whenever they appear.
    #[serde(alias = "BadRegexes")]
    pub bad_regexes: Option<Vec<String>>,
    /// State-transition evidence patterns.
    #[serde(default)]
    pub patterns: RawPatterns,
    /// Remote shell and copy programs.
    #[serde(default)]
    pub remote: RemoteConfig,
    /// Timeouts, grace periods and polling intervals.
    #[serde(default)]
    pub timing: Timing,
    /// Resource groups the placement audit checks.
    #[serde(default)]
    pub resource_groups: Vec<ResourceGroupConfig>,
    /// Abort the whole run when a resource is found active on two nodes.
    #[serde(default)]
    pub abort_on_duplicate_placement: bool,
}

/// State-transition patterns as they appear in the configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawPatterns {
    /// The local node's manager came up.
    #[serde(alias = "Pat:We_started")]
    pub we_started: Option<String>,
    /// Another node (`%s`) joined.
    #[serde(alias = "Pat:They_started")]
    pub they_started: Option<String>,
    /// The local node's manager went down.
    #[serde(alias = "Pat:We_stopped")]
    pub we_stopped: Option<String>,
    /// Another node (`%s`) left.
    #[serde(alias = "Pat:They_stopped")]
    pub they_stopped: Option<String>,
    /// The last node (`%s`) left.
    #[serde(alias = "Pat:All_stopped")]
    pub all_stopped: Option<String>,
}

/// Validated state-transition patterns.
#[derive(Debug, Clone)]
pub struct Patterns {
    /// The local node's manager came up.
    pub we_started: String,
    /// Another node (`%s`) joined.
    pub they_started: String,
    /// The local node's manager went down.
    pub we_stopped: String,
    /// Another node (`%s`) left.
    pub they_stopped: String,
    /// The last node (`%s`) left.
    pub all_stopped: String,
}

/// Remote shell configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
    /// Program and arguments used to run a command on a node.
    #[serde(default = "default_shell")]
    pub shell: Vec<String>,
    /// Program and arguments used to copy files to a node.
    #[serde(default = "default_copy")]
    pub copy: Vec<String>,
}

/// Harness timing parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct Timing {
    /// How long start/stop tests wait for log evidence (default: 30).
    #[serde(default = "default_test_timeout")]
    pub test_timeout_secs: u64,
    /// How long the stonith test waits for the node to come back (default: 300).
    #[serde(default = "default_stonith_timeout")]
    pub stonith_timeout_secs: u64,
    /// Pause after a stonith test before the next action (default: 10).
    #[serde(default = "default_stonith_grace")]
    pub stonith_grace_secs: u64,
    /// Log watcher poll interval while caught up (default: 1000).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Added to dead time when waiting for the cluster to converge (default: 1).
    #[serde(default = "default_settle_margin")]
    pub settle_margin_secs: u64,
    /// Maximum placement audit passes (default: 60).
    #[serde(default = "default_audit_retries")]
    pub audit_retries: u32,
    /// Pause between placement audit passes (default: 1000).
    #[serde(default = "default_audit_interval")]
    pub audit_interval_ms: u64,
}

/// One ordered resource group.
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceGroupConfig {
    /// Resources in start order.
    #[serde(default)]
    pub resources: Vec<ResourceConfig>,
}

/// A resource probed with a remote status command.
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceConfig {
    /// Resource type, e.g. `IPaddr`.
    #[serde(alias = "type")]
    pub kind: String,
    /// Resource instance, e.g. `10.10.10.50`.
    pub instance: String,
    /// Command run on a node; exit 0 means the resource is active there.
    /// `%s` is replaced with the instance.
    pub status_cmd: String,
}

/// Validated, immutable cluster configuration.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// Name of the cluster manager under test.
    pub name: String,
    /// Every node in the cluster.
    pub nodes: Vec<String>,
    /// Node the harness runs on.
    pub local_node: String,
    /// Start command.
    pub start_cmd: String,
    /// Stop command.
    pub stop_cmd: String,
    /// Status command.
    pub status_cmd: String,
    /// Reread command.
    pub reread_cmd: String,
    /// Fencing command template.
    pub stonith_cmd: String,
    /// Local test configuration directory.
    pub test_config_dir: PathBuf,
    /// Cluster manager log file.
    pub log_file: PathBuf,
    /// Maximum detection latency for a dead node.
    pub dead_time: Duration,
    /// Bad-news regexes.
    pub bad_regexes: Vec<String>,
    /// State-transition patterns.
    pub patterns: Patterns,
    /// Remote shell configuration.
    pub remote: RemoteConfig,
    /// Timing parameters.
    pub timing: Timing,
    /// Resource groups.
    pub resource_groups: Vec<ResourceGroupConfig>,
    /// Abort the run on duplicate placement.
    pub abort_on_duplicate_placement: bool,
}

// Default value functions
fn default_stonith_cmd() -> String {
    "/usr/sbin/stonith -t baytech -p '10.10.10.100 admin admin' %s".to_string()
}

fn default_dead_time() -> u64 {
    5
}

fn default_shell() -> Vec<String> {
    ["ssh", "-n", "-x", "-o", "BatchMode=yes"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_copy() -> Vec<String> {
    ["scp", "-B", "-q", "-r"].iter().map(|s| s.to_string()).collect()
}

fn default_test_timeout() -> u64 {
    30
}

fn default_stonith_timeout() -> u64 {
    300
}

fn default_stonith_grace() -> u64 {
    10
}

fn default_poll_interval() -> u64 {
    1000
}

fn default_settle_margin() -> u64 {
    1
}

fn default_audit_retries() -> u32 {
    60
}

fn default_audit_interval() -> u64 {
    1000
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            shell: default_shell(),
            copy: default_copy(),
        }
    }
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            test_timeout_secs: default_test_timeout(),
            stonith_timeout_secs: default_stonith_timeout(),
            stonith_grace_secs: default_stonith_grace(),
            poll_interval_ms: default_poll_interval(),
            settle_margin_secs: default_settle_margin(),
            audit_retries: default_audit_retries(),
            audit_interval_ms: default_audit_interval(),
        }
    }
}

impl Timing {
    /// Timing with every wait collapsed to zero.
    ///
    /// Watches become single non-blocking passes and no sleep is taken, which
    /// keeps harness tests fast and deterministic.
    pub fn immediate() -> Self {
        Self {
            test_timeout_secs: 0,
            stonith_timeout_secs: 0,
            stonith_grace_secs: 0,
            poll_interval_ms: 0,
            settle_margin_secs: 0,
            audit_retries: default_audit_retries(),
            audit_interval_ms: 0,
        }
    }

    /// Start/stop evidence timeout.
    pub fn test_timeout(&self) -> Duration {
        Duration::from_secs(self.test_timeout_secs)
    }

    /// Stonith comeback timeout.
    pub fn stonith_timeout(&self) -> Duration {
        Duration::from_secs(self.stonith_timeout_secs)
    }

    /// Pause after a stonith test.
    pub fn stonith_grace(&self) -> Duration {
        Duration::from_secs(self.stonith_grace_secs)
    }

    /// Log watcher poll interval.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Pause between audit passes.
    pub fn audit_interval(&self) -> Duration {
        Duration::from_millis(self.audit_interval_ms)
    }
}

impl RawConfig {
    /// Validate into a [`ClusterConfig`].
    ///
    /// # Errors
    ///
    /// [`ConfigError::Incomplete`] lists every required field left unset.
    /// [`ConfigError::InvalidRegex`] is returned for the first pattern that
    /// does not compile once a node name is substituted.
    pub fn validate(self) -> Result<ClusterConfig, ConfigError> {
        let mut missing = Vec::new();

        fn take<T>(value: Option<T>, field: &'static str, missing: &mut Vec<&'static str>) -> Option<T> {
            if value.is_none() {
                missing.push(field);
            }
            value
        }

        let name = take(self.name, "name", &mut missing);
        if self.nodes.is_empty() {
            missing.push("nodes");
        }
        let start_cmd = take(self.start_cmd, "start_cmd", &mut missing);
        let stop_cmd = take(self.stop_cmd, "stop_cmd", &mut missing);
        let status_cmd = take(self.status_cmd, "status_cmd", &mut missing);
        let reread_cmd = take(self.reread_cmd, "reread_cmd", &mut missing);
        let test_config_dir = take(self.test_config_dir, "test_config_dir", &mut missing);
        let log_file = take(self.log_file, "log_file", &mut missing);
        let bad_regexes = take(self.bad_regexes, "bad_regexes", &mut missing);
        let we_started = take(self.patterns.we_started, "patterns.we_started", &mut missing);
        let they_started = take(self.patterns.they_started, "patterns.they_started", &mut missing);
        let we_stopped = take(self.patterns.we_stopped, "patterns.we_stopped", &mut missing);
        let they_stopped = take(self.patterns.they_stopped, "patterns.they_stopped", &mut missing);
        let all_stopped = take(self.patterns.all_stopped, "patterns.all_stopped", &mut missing);

        let (
            Some(name),
            Some(start_cmd),
            Some(stop_cmd),
            Some(status_cmd),
            Some(reread_cmd),
            Some(test_config_dir),
            Some(log_file),
            Some(bad_regexes),
            Some(we_started),
            Some(they_started),
            Some(we_stopped),
            Some(they_stopped),
            Some(all_stopped),
        ) = (
            name,
            start_cmd,
            stop_cmd,
            status_cmd,
            reread_cmd,
            test_config_dir,
            log_file,
            bad_regexes,
            we_started,
            they_started,
            we_stopped,
            they_stopped,
            all_stopped,
        )
        else {
            return Err(ConfigError::Incomplete { missing });
        };
        if !missing.is_empty() {
            return Err(ConfigError::Incomplete { missing });
        }

        let patterns = Patterns {
            we_started,
            they_started,
            we_stopped,
            they_stopped,
            all_stopped,
        };

        for (field, pattern) in [
            ("patterns.we_started", &patterns.we_started),
            ("patterns.they_started", &patterns.they_started),
            ("patterns.we_stopped", &patterns.we_stopped),
            ("patterns.they_stopped", &patterns.they_stopped),
            ("patterns.all_stopped", &patterns.all_stopped),
        ] {
            check_regex(field, &node_pattern(pattern, "node"))?;
        }
        for regex in &bad_regexes {
            check_regex("bad_regexes", regex)?;
        }

        let local_node = self
            .local_node
            .unwrap_or_else(|| host::hostname().unwrap_or_default());

        Ok(ClusterConfig {
            name,
            nodes: self.nodes,
            local_node,
            start_cmd,
            stop_cmd,
            status_cmd,
            reread_cmd,
            stonith_cmd: self.stonith_cmd,
            test_config_dir,
            log_file,
            dead_time: Duration::from_secs(self.dead_time_secs),
            bad_regexes,
            patterns,
            remote: self.remote,
            timing: self.timing,
            resource_groups: self.resource_groups,
            abort_on_duplicate_placement: self.abort_on_duplicate_placement,
        })
    }
}

impl ClusterConfig {
    /// Load and validate configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let raw: RawConfig = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;

        raw.validate()
    }

    /// Time to let the cluster converge after a topology change.
    pub fn settle_time(&self) -> Duration {
        self.dead_time + Duration::from_secs(self.timing.settle_margin_secs)
    }

    /// Fencing command for a node.
    pub fn stonith_command(&self, node: &str) -> String {
        self.stonith_cmd.replace(NODE_PLACEHOLDER, node)
    }
}

/// Substitute a node name into a pattern template.
///
/// The name is regex-escaped so host names containing dots only match
/// themselves.
pub fn node_pattern(template: &str, node: &str) -> String {
    template.replace(NODE_PLACEHOLDER, &regex::escape(node))
}

fn check_regex(field: &'static str, pattern: &str) -> Result<(), ConfigError> {
    Regex::new(pattern)
        .map(|_| ())
        .map_err(|source| ConfigError::InvalidRegex {
            field,
            pattern: pattern.to_string(),
            source,
        })
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
    /// Required fields were left unset.
    #[error("incomplete configuration, missing: {}", missing.join(", "))]
    Incomplete {
        /// Every missing field, in declaration order.
        missing: Vec<&'static str>,
    },
    /// A configured pattern does not compile.
    #[error("invalid regex in {field}: {pattern:?}: {source}")]
    InvalidRegex {
        /// Configuration field holding the pattern.
        field: &'static str,
        /// The pattern as compiled.
        pattern: String,
        /// Regex compilation error.
        source: regex::Error,
    },
}
