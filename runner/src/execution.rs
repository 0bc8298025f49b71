mod version;

use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, fmt, path::PathBuf};

pub use version::{Version, VersionError};

/// main branch head
pub const SOURCE_CRON: &str = "cron";
/// head of a pull request carrying a trigger label
pub const SOURCE_PULL_REQUEST: &str = "cron_pr";
/// merge base of a pull request
pub const SOURCE_PULL_REQUEST_BASE: &str = "cron_pr_base";
/// release tag, followed by the release name
pub const SOURCE_TAG_PREFIX: &str = "cron_tags_";
/// release branch head, followed by the branch name
pub const SOURCE_RELEASE_BRANCH_PREFIX: &str = "cron_";

/// Identity of one prospective benchmark run.
///
/// Equality is structural over every field, the queue uses it as its map key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExecutionIdentifier {
    pub git_ref: String,
    pub source: String,
    pub workload: String,
    /// empty for micro benchmarks
    pub planner_version: String,
    /// 0 if this is not a pull request benchmark
    pub pull_number: u64,
    pub pull_base_ref: String,
    pub version: Version,
}

impl ExecutionIdentifier {
    pub fn is_pull_request(&self) -> bool {
        self.pull_number > 0
    }

    pub fn short_ref(&self) -> &str {
        short_sha(&self.git_ref)
    }
}

impl fmt::Display for ExecutionIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{} ({}", self.workload, self.short_ref(), self.source)?;
        if !self.planner_version.is_empty() {
            write!(f, ", {}", self.planner_version)?;
        }
        if self.is_pull_request() {
            write!(f, ", #{}", self.pull_number)?;
        }
        write!(f, ")")
    }
}

/// first 7 characters of a commit hash, shorter inputs are returned as is
pub fn short_sha(sha: &str) -> &str {
    sha.get(..7).unwrap_or(sha)
}

/// Workload configuration handed to the benchmark runner, the queue never looks inside.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ElementConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub params: Vec<String>,
}

/// Why an element sits in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Purpose {
    /// the benchmark still has to run
    Execute,
    /// a finished execution already exists, the element only completes the comparison graph
    CompareOnly,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueueElement {
    pub identifier: ExecutionIdentifier,
    pub config: ElementConfig,
    /// remaining retries, the element is abandoned once this goes negative
    pub retry: i32,
    pub executing: bool,
    pub compare_with: BTreeSet<ExecutionIdentifier>,
    pub notify_always: bool,
    /// the side that drives the comparison once executed
    pub primary: bool,
    pub purpose: Purpose,
}

impl QueueElement {
    pub fn new(identifier: ExecutionIdentifier, config: ElementConfig, retry: i32) -> Self {
        Self {
            identifier,
            config,
            retry,
            executing: false,
            compare_with: BTreeSet::new(),
            notify_always: false,
            primary: false,
            purpose: Purpose::Execute,
        }
    }

    pub fn with_notify_always(mut self, notify_always: bool) -> Self {
        self.notify_always = notify_always;
        self
    }

    pub fn with_primary(mut self, primary: bool) -> Self {
        self.primary = primary;
        self
    }

    /// record that `self` and `other` have to be compared once both are finished
    pub fn link(&mut self, other: &mut Self) {
        self.compare_with.insert(other.identifier.clone());
        other.compare_with.insert(self.identifier.clone());
    }

    pub fn needs_execution(&self) -> bool {
        self.purpose == Purpose::Execute
    }
}
