//! Log watcher: `tail -f` with truncation recovery and a bounded wait.
//!
//! A watcher is armed at a point in the cluster log (normally its current end)
//! and then waits for the first new line matching any of its patterns. The
//! cluster manager writes the log without coordinating with us, so the file
//! may grow or be truncated at any moment; the truncation check runs on every
//! poll.
//!
//! Each watcher owns its file description and read position. Two watchers on
//! the same file never affect each other. Because the watcher stays on the
//! description it opened, a log that is deleted and recreated under the same
//! name is not followed.

use regex::Regex;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tokio::time::Instant;

use crate::error::{CtsError, Result};

/// Default poll interval while caught up with the writer.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Watches one log file for lines matching a set of regexes.
#[derive(Debug)]
pub struct LogWatcher {
    path: PathBuf,
    patterns: Vec<String>,
    regexes: Vec<Regex>,
    timeout: Duration,
    poll_interval: Duration,
    debug: bool,
    cursor: Option<Cursor>,
}

#[derive(Debug)]
struct Cursor {
    reader: BufReader<File>,
    /// Offset of the next unread byte.
    position: u64,
    /// File size at the previous poll; a smaller size means truncation.
    baseline: u64,
    /// Bytes of a line the writer has not finished yet.
    partial: Vec<u8>,
}

impl LogWatcher {
    /// Create a watcher for `path`.
    ///
    /// # Errors
    ///
    /// [`CtsError::InvalidPattern`] if a pattern does not compile,
    /// [`CtsError::FileNotAccessible`] if the file cannot be opened for reading.
    pub fn new<S: AsRef<str>>(
        path: impl Into<PathBuf>,
        patterns: &[S],
        timeout: Duration,
    ) -> Result<Self> {
        let path = path.into();

        let mut regexes = Vec::with_capacity(patterns.len());
        for pattern in patterns {
            let pattern = pattern.as_ref();
            let regex = Regex::new(pattern).map_err(|source| CtsError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })?;
            regexes.push(regex);
        }

        std::fs::File::open(&path).map_err(|source| CtsError::FileNotAccessible {
            path: path.clone(),
            source,
        })?;

        Ok(Self {
            path,
            patterns: patterns.iter().map(|p| p.as_ref().to_string()).collect(),
            regexes,
            timeout,
            poll_interval: DEFAULT_POLL_INTERVAL,
            debug: false,
            cursor: None,
        })
    }

    /// Set the sleep between polls while caught up.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Trace every size check and comparison at debug level.
    pub fn with_debug(mut self, debug: bool) -> Self {
        if debug {
            tracing::debug!("Debug now on for log {}", self.path.display());
        }
        self.debug = debug;
        self
    }

    /// Watched file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Patterns in match order.
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Mark the place to start watching from.
    ///
    /// Records the current size as the truncation baseline and positions the
    /// read cursor at end-of-file, or at the start when `from_beginning`.
    pub async fn arm(&mut self, from_beginning: bool) -> Result<()> {
        let file = File::open(&self.path)
            .await
            .map_err(|source| CtsError::FileNotAccessible {
                path: self.path.clone(),
                source,
            })?;
        let baseline = file.metadata().await?.len();
        let mut reader = BufReader::new(file);
        let position = if from_beginning {
            0
        } else {
            reader.seek(SeekFrom::End(0)).await?
        };

        self.cursor = Some(Cursor {
            reader,
            position,
            baseline,
            partial: Vec::new(),
        });
        Ok(())
    }

    /// Wait for the next line matching any pattern.
    ///
    /// `None` uses the watcher's default timeout. A zero timeout makes a
    /// single pass over whatever is already written and never sleeps.
    /// Returns the matching line without its terminator, or `None` once the
    /// timeout expires with the reader caught up. An unarmed watcher is armed
    /// at end-of-file first.
    pub async fn wait(&mut self, timeout: Option<Duration>) -> Result<Option<String>> {
        let timeout = timeout.unwrap_or(self.timeout);
        let deadline = Instant::now() + timeout;

        if self.cursor.is_none() {
            self.arm(false).await?;
        }

        loop {
            let Some(cursor) = self.cursor.as_mut() else {
                return Ok(None);
            };

            let size = cursor.reader.get_ref().metadata().await?.len();
            if self.debug {
                tracing::debug!("{}: size={} position={}", self.path.display(), size, cursor.position);
            }

            if size < cursor.baseline || size < cursor.position {
                if self.debug {
                    tracing::debug!("{}: log truncated", self.path.display());
                }
                cursor.reader.seek(SeekFrom::Start(0)).await?;
                cursor.position = 0;
                cursor.baseline = size;
                cursor.partial.clear();
                continue;
            }
            cursor.baseline = size;

            if size > cursor.position {
                let mut chunk = Vec::new();
                let read = cursor.reader.read_until(b'\n', &mut chunk).await?;
                cursor.position += read as u64;

                if read > 0 {
                    cursor.partial.extend_from_slice(&chunk);
                    if cursor.partial.ends_with(b"\n") {
                        let bytes = std::mem::take(&mut cursor.partial);
                        let line = String::from_utf8_lossy(&bytes)
                            .trim_end_matches(['\n', '\r'])
                            .to_string();
                        if self.matches(&line) {
                            return Ok(Some(line));
                        }
                    }
                    continue;
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }

    /// True when `line` matches a pattern; patterns are tried in order.
    fn matches(&self, line: &str) -> bool {
        for (pattern, regex) in self.patterns.iter().zip(&self.regexes) {
            if self.debug {
                tracing::debug!("Comparing {:?} to {}", line, pattern);
            }
            if regex.is_match(line) {
                return true;
            }
        }
        false
    }
}
