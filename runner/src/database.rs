pub mod memory;
#[cfg(feature = "rusqlite")]
pub mod sqlite;

use crate::{execution::ExecutionIdentifier, ingest::RunResults};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum StoreError {
    #[cfg(feature = "rusqlite")]
    #[error("SQLite query failed: {0}")]
    SQLite(#[from] rusqlite::Error),
    #[error("Failed to (de)serialize stored results: {0}")]
    Serialization(#[from] serde_yaml::Error),
    #[error("Stored execution id '{0}' is not a valid UUID")]
    InvalidUuid(String),
    #[error("Execution {0} does not exist")]
    UnknownExecution(Uuid),
    #[cfg(not(feature = "rusqlite"))]
    #[error("Result store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Started,
    Finished,
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Finished => "finished",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persistence of benchmark executions and their results.
///
/// Implementations have to be safe to call from the dispatcher, every execution thread and
/// every planner pass at the same time. Two concurrent `exists` checks may both miss a run
/// that is about to be recorded, callers tolerate that race.
pub trait ResultStore: Send + Sync {
    /// Whether an execution with the given status exists for (ref, source, workload) and,
    /// when the identifier has one, planner version.
    fn exists(
        &self,
        identifier: &ExecutionIdentifier,
        status: ExecutionStatus,
    ) -> Result<bool, StoreError>;

    /// latest finished execution matching (ref, source, workload, planner, pull request)
    fn finished_execution(
        &self,
        identifier: &ExecutionIdentifier,
    ) -> Result<Option<Uuid>, StoreError>;

    /// Most recently finished ref of a source other than `git_ref`, i.e. the previous head
    /// that was benchmarked for this (source, workload, planner).
    fn previous_from_source(
        &self,
        source: &str,
        workload: &str,
        planner_version: &str,
        git_ref: &str,
    ) -> Result<Option<String>, StoreError>;

    fn start_execution(&self, identifier: &ExecutionIdentifier) -> Result<Uuid, StoreError>;

    fn finish_execution(&self, execution: Uuid, results: &RunResults) -> Result<(), StoreError>;

    fn fail_execution(&self, execution: Uuid) -> Result<(), StoreError>;

    /// results of every finished execution of (ref, workload, planner), whatever the source
    fn results(
        &self,
        git_ref: &str,
        workload: &str,
        planner_version: &str,
    ) -> Result<Vec<RunResults>, StoreError>;
}
