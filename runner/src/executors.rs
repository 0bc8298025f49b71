pub mod local;

use crate::{
    execution::{ElementConfig, ExecutionIdentifier},
    ingest::{IngestError, RunResults},
};
use std::{io, time::Duration};
use thiserror::Error;

pub use local::LocalRunner;

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Failed to spawn benchmark: {0}")]
    Spawn(io::Error),
    #[error("Failed to wait for benchmark: {0}")]
    Wait(io::Error),
    #[error("Benchmark did not finish within {0:?}")]
    Timeout(Duration),
    #[error("Benchmark exited with status {status}: {stderr}")]
    Failed { status: i32, stderr: String },
    #[error("Benchmark output could not be ingested: {0}")]
    Ingest(#[from] IngestError),
}

/// Executes one benchmark for a queue element and hands back its ingested results.
///
/// Called concurrently from the execution pool, at most once at a time per identifier.
pub trait BenchmarkRunner: Send + Sync {
    fn run(
        &self,
        config: &ElementConfig,
        identifier: &ExecutionIdentifier,
    ) -> Result<RunResults, RunnerError>;
}
