//! Named event counters.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Ordered map of counter name to count.
///
/// Counters only grow. Incrementing an unknown counter creates it at zero
/// first, so tests can invent counters (`node:alpha`, `up->down`) on demand.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Stats(BTreeMap<String, u64>);

impl Stats {
    /// Counters pre-created at zero.
    pub fn with_counters(names: &[&str]) -> Self {
        Self(names.iter().map(|n| (n.to_string(), 0)).collect())
    }

    /// Increment `name` by one.
    pub fn incr(&mut self, name: &str) {
        *self.0.entry(name.to_string()).or_insert(0) += 1;
    }

    /// Current value of `name`; zero if never incremented.
    pub fn get(&self, name: &str) -> u64 {
        self.0.get(name).copied().unwrap_or(0)
    }

    /// Counters in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.iter().map(|(k, v)| format!("{k}={v}")).collect();
        write!(f, "{}", parts.join(" "))
    }
}
