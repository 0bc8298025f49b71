use super::{BenchmarkRunner, RunnerError};
use crate::{
    config::RunnerConfig,
    execution::{ElementConfig, ExecutionIdentifier},
    ingest::{ingest, RunOutput, RunResults},
};
use std::{
    io::Read,
    path::PathBuf,
    process::{Command, Stdio},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};
use tracing::{debug, instrument, trace, warn};
use wait_timeout::ChildExt;

/// Runner that spawns the benchmark executable as a local child process
#[derive(Debug, Clone)]
pub struct LocalRunner {
    exec: PathBuf,
    params: Vec<String>,
    timeout: Duration,
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<String> {
    // NOTE: pipes are drained while the child runs, a full pipe would otherwise block it
    thread::spawn(move || {
        let mut output = String::new();

        if let Some(mut pipe) = pipe {
            if let Err(error) = pipe.read_to_string(&mut output) {
                warn!("Failed to read benchmark output: {error}");
            }
        }

        output
    })
}

impl LocalRunner {
    pub fn new(exec: PathBuf, params: Vec<String>, timeout: Duration) -> Self {
        Self {
            exec,
            params,
            timeout,
        }
    }

    pub fn load(config: &RunnerConfig) -> Self {
        Self::new(
            config.exec.clone(),
            config.params.clone(),
            Duration::from_secs(config.timeout),
        )
    }

    fn command(&self, config: &ElementConfig, identifier: &ExecutionIdentifier) -> Command {
        let mut command = Command::new(&self.exec);

        command
            .args(self.params.iter())
            .args(config.params.iter())
            .arg("--config")
            .arg(&config.path)
            .arg("--git-ref")
            .arg(&identifier.git_ref)
            .arg("--source")
            .arg(&identifier.source)
            .arg("--workload")
            .arg(&identifier.workload);

        if !identifier.planner_version.is_empty() {
            command
                .arg("--planner-version")
                .arg(&identifier.planner_version);
        }

        if identifier.is_pull_request() {
            command
                .arg("--pull-request")
                .arg(identifier.pull_number.to_string());
        }

        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        command
    }
}

impl BenchmarkRunner for LocalRunner {
    #[instrument(skip(self, config), fields(%identifier), level = "info")]
    fn run(
        &self,
        config: &ElementConfig,
        identifier: &ExecutionIdentifier,
    ) -> Result<RunResults, RunnerError> {
        let start = Instant::now();
        let mut child = self
            .command(config, identifier)
            .spawn()
            .map_err(RunnerError::Spawn)?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = match child.wait_timeout(self.timeout).map_err(RunnerError::Wait)? {
            Some(status) => status,
            None => {
                // child hasn't exited yet
                if let Err(error) = child.kill() {
                    warn!("Failed to kill timed out benchmark: {error}");
                }
                let _ = child.wait();

                return Err(RunnerError::Timeout(self.timeout));
            }
        };

        let output = RunOutput {
            runtime: start.elapsed().as_nanos(),
            stdout: stdout.join().unwrap_or_default(),
            stderr: stderr.join().unwrap_or_default(),
            status: status.code().unwrap_or(-1),
        };

        debug!(
            "Finished in {} ns | status: {}",
            output.runtime,
            status.success()
        );
        trace!("Output: {}", output.stdout);

        if !status.success() {
            return Err(RunnerError::Failed {
                status: output.status,
                stderr: output.stderr,
            });
        }

        Ok(ingest(&output)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::{Version, SOURCE_CRON};

    fn shell(script: &str, timeout: Duration) -> LocalRunner {
        // trailing arguments become positional parameters of the script and are ignored
        LocalRunner::new(
            PathBuf::from("/bin/sh"),
            vec!["-c".to_owned(), script.to_owned(), "benchmark".to_owned()],
            timeout,
        )
    }

    fn identifier() -> ExecutionIdentifier {
        ExecutionIdentifier {
            git_ref: "0123456789abcdef".to_owned(),
            source: SOURCE_CRON.to_owned(),
            workload: "micro".to_owned(),
            planner_version: String::new(),
            pull_number: 0,
            pull_base_ref: String::new(),
            version: Version::new(16, 0, 0),
        }
    }

    #[test]
    fn run_ingests_stdout() {
        let runner = shell(
            "echo 'micro: {pkg/BenchmarkParse: [10, 11]}'",
            Duration::from_secs(10),
        );

        let results = runner.run(&ElementConfig::default(), &identifier()).unwrap();
        assert_eq!(results.micro["pkg/BenchmarkParse"], vec![10.0, 11.0]);
    }

    #[test]
    fn run_reports_exit_status() {
        let runner = shell("echo broken >&2; exit 3", Duration::from_secs(10));

        match runner.run(&ElementConfig::default(), &identifier()) {
            Err(RunnerError::Failed { status, stderr }) => {
                assert_eq!(status, 3);
                assert_eq!(stderr.trim(), "broken");
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn run_kills_on_timeout() {
        let runner = shell("sleep 5", Duration::from_millis(100));
        let start = Instant::now();

        assert!(matches!(
            runner.run(&ElementConfig::default(), &identifier()),
            Err(RunnerError::Timeout(_))
        ));
        assert!(start.elapsed() < Duration::from_secs(4));
    }
}
