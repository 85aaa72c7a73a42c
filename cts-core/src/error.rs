//! Error types for cts-core.

use std::path::PathBuf;

use crate::config::ConfigError;
use crate::remote::RemoteError;

/// Main error type for harness operations.
///
/// Test outcomes (a missing log pattern, a failed audit) are not errors; they
/// are recorded in statistics. Values of this type abort whatever is running.
#[derive(Debug, thiserror::Error)]
pub enum CtsError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Remote execution error.
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    /// A watched log file could not be opened for reading.
    #[error("file [{path}] not accessible (r): {source}")]
    FileNotAccessible {
        /// Path to the file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A directory that must be synced to the cluster is missing or unreadable.
    #[error("directory [{path}] not accessible (rwx)")]
    DirectoryNotAccessible {
        /// Path to the directory.
        path: PathBuf,
    },

    /// A watch pattern failed to compile.
    #[error("invalid pattern {pattern:?}: {source}")]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,
        /// Regex compilation error.
        source: regex::Error,
    },

    /// Every bad-news poll in a row returned a match.
    #[error("sustained bad news: {polls} consecutive log matches, cluster stopped")]
    SustainedBadNews {
        /// Number of consecutive matching polls.
        polls: usize,
    },

    /// A resource was active on more than one node and the run policy aborts on it.
    #[error("placement violation reported by audit {audit}")]
    PlacementViolation {
        /// Name of the audit that reported the violation.
        audit: String,
    },

    /// The orchestrator is not running with administrative privileges.
    #[error("must be root (effective uid {euid})")]
    PrivilegeRequired {
        /// Effective user id of this process.
        euid: u32,
    },

    /// The random runner was given no tests to choose from.
    #[error("test pool is empty")]
    EmptyTestPool,

    /// A node name that is not part of the configured cluster.
    #[error("unknown node: {0}")]
    UnknownNode(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for harness operations.
pub type Result<T> = std::result::Result<T, CtsError>;
