#![deny(unsafe_code)]

//! Data types describing the daemon side of the supctl protocol.
//!
//! These are the record shapes the supervision daemon reports over its
//! XML-RPC interface. The client crate decodes wire replies into them; they
//! carry no protocol logic of their own.

use serde::{Deserialize, Serialize};

/// A managed process as reported by `getAllProcessInfo` and the
/// start/stop/signal-all replies.
///
/// Field names follow the daemon's struct member names on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub name: String,
    pub group: String,
    pub description: String,
    /// Unix timestamp of the last start, 0 if never started.
    pub start: i64,
    /// Unix timestamp of the last stop, 0 if still running.
    pub stop: i64,
    /// Daemon's current Unix timestamp when the record was built.
    pub now: i64,
    /// Numeric state code; `statename` is its human-readable form.
    pub state: i64,
    pub statename: String,
    pub spawnerr: String,
    pub exitstatus: i64,
    pub logfile: String,
    pub stdout_logfile: String,
    pub stderr_logfile: String,
    pub pid: i64,
}

impl ProcessInfo {
    /// Whether the daemon considers the process running.
    ///
    /// State code 20 is RUNNING in the supervisor state model.
    pub fn is_running(&self) -> bool {
        self.state == 20
    }
}

/// Result of a configuration reload: which process groups were added,
/// changed, or removed relative to the previously loaded configuration.
///
/// The wire format carries these as three unlabeled positional lists; the
/// client reconstructs the grouping from document structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReloadConfigResult {
    pub added_group: Vec<String>,
    pub changed_group: Vec<String>,
    pub removed_group: Vec<String>,
}

impl ReloadConfigResult {
    /// Total number of group names across all three lists.
    pub fn len(&self) -> usize {
        self.added_group.len() + self.changed_group.len() + self.removed_group.len()
    }

    /// True when the reload changed nothing.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
