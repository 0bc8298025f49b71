use perfwatch_analysis::{MacroResult, MicroSamples};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Failed to deserialize benchmark output")]
    Deserialize(#[from] serde_yaml::Error),
    #[error("Benchmark output contains neither macro nor micro results")]
    Empty,
}

#[derive(Debug, Clone, Default)]
/// container for information extracted from running a benchmark
/// supposed to be interpreted by `ingest`
pub struct RunOutput {
    pub runtime: u128,
    pub stdout: String,
    pub stderr: String,
    pub status: i32,
}

/// Numbers produced by one benchmark execution.
///
/// The benchmark prints this as YAML on stdout, either a list of macro iterations or a map
/// of micro benchmark name to ns/op samples.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RunResults {
    #[serde(default, rename = "macro", skip_serializing_if = "Vec::is_empty")]
    pub macro_results: Vec<MacroResult>,
    #[serde(default, skip_serializing_if = "MicroSamples::is_empty")]
    pub micro: MicroSamples,
}

impl RunResults {
    pub fn is_empty(&self) -> bool {
        self.macro_results.is_empty() && self.micro.is_empty()
    }

    /// merge the results of another execution of the same benchmark
    pub fn extend(&mut self, other: RunResults) {
        self.macro_results.extend(other.macro_results);

        for (name, values) in other.micro {
            self.micro.entry(name).or_default().extend(values);
        }
    }

    pub fn merged<I: IntoIterator<Item = RunResults>>(results: I) -> Self {
        results.into_iter().fold(Self::default(), |mut init, results| {
            init.extend(results);
            init
        })
    }
}

#[tracing::instrument(level = "debug", skip(output), fields(status = output.status))]
pub fn ingest(output: &RunOutput) -> Result<RunResults, IngestError> {
    match serde_yaml::from_str::<RunResults>(&output.stdout) {
        Ok(results) if results.is_empty() => Err(IngestError::Empty),
        Ok(results) => {
            debug!(
                iterations = results.macro_results.len(),
                micro = results.micro.len(),
                "Ingested benchmark output"
            );

            Ok(results)
        }
        Err(error) => {
            error!(error = ?error, "Failed to deserialize benchmark output");

            Err(IngestError::Deserialize(error))
        }
    }
}
