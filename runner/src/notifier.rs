
use crate::{
    config::NotifierConfig,
    database::{ResultStore, StoreError},
    execution::ExecutionIdentifier,
    ingest::RunResults,
};
use perfwatch_analysis::{
    Comparator, Comparison, MacroSamples, MicroComparison, StatisticalCompareResults,
};
use serde::{Deserialize, Serialize};
use std::{
    fmt::Write as _,
    io::{self, Write},
    path::PathBuf,
    process::{Command, Stdio},
    sync::Arc,
    time::Duration,
};
use thiserror::Error;
use tracing::{debug, info, info_span, instrument, warn, Span};
use wait_timeout::ChildExt;

#[derive(Error, Debug)]
pub enum NotifierError {
    #[error("Failed to load results: {0}")]
    Store(#[from] StoreError),
    #[error("No finished results for {0}")]
    MissingResults(String),
    #[error("Failed to deliver message: {0}")]
    Delivery(#[from] io::Error),
    #[error("Message command exited with status {0}")]
    Command(i32),
}

/// How two executions are compared before looking for regressions
#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CompareMethod {
    /// significance tested comparison of the full samples
    #[default]
    Statistical,
    /// plain comparison of the medians
    Median,
}

/// Sink for human readable notifications
pub trait Messenger: Send + Sync {
    fn send(&self, text: &str) -> Result<(), NotifierError>;
}

/// Messenger writing notifications to the log only
#[derive(Debug, Clone, Default)]
pub struct TracingMessenger;

impl Messenger for TracingMessenger {
    fn send(&self, text: &str) -> Result<(), NotifierError> {
        info!(target: "perfwatch::notification", "{text}");

        Ok(())
    }
}

/// Messenger piping every notification to the stdin of a command, e.g. a chat webhook script
#[derive(Debug, Clone)]
pub struct CommandMessenger {
    exec: PathBuf,
    params: Vec<String>,
    timeout: Duration,
}

impl CommandMessenger {
    pub fn new(exec: PathBuf, params: Vec<String>, timeout: Duration) -> Self {
        Self {
            exec,
            params,
            timeout,
        }
    }
}

impl Messenger for CommandMessenger {
    #[instrument(skip(self, text), level = "debug")]
    fn send(&self, text: &str) -> Result<(), NotifierError> {
        let mut handle = Command::new(&self.exec)
            .args(self.params.iter())
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        if let Some(mut stdin) = handle.stdin.take() {
            stdin.write_all(text.as_bytes())?;
            // Dropping stdin here will close the underlying file descriptor
        }

        match handle.wait_timeout(self.timeout)? {
            Some(status) if status.success() => Ok(()),
            Some(status) => Err(NotifierError::Command(status.code().unwrap_or(-1))),
            None => {
                handle.kill()?;
                let _ = handle.wait();

                Err(NotifierError::Delivery(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "message command timed out",
                )))
            }
        }
    }
}

/// Turns a finished pair of executions into a notification, if it deserves one.
pub struct RegressionNotifier {
    store: Arc<dyn ResultStore>,
    messenger: Arc<dyn Messenger>,
    comparator: Comparator,
    method: CompareMethod,
    repository_url: String,
    dashboard_url: String,
    span: Span,
}

impl RegressionNotifier {
    pub fn new(
        store: Arc<dyn ResultStore>,
        messenger: Arc<dyn Messenger>,
        comparator: Comparator,
        config: &NotifierConfig,
    ) -> Self {
        Self {
            store,
            messenger,
            comparator,
            method: config.method,
            repository_url: config.repository_url.trim_end_matches('/').to_owned(),
            dashboard_url: config.dashboard_url.trim_end_matches('/').to_owned(),
            span: info_span!("notifier", method = ?config.method),
        }
    }

    /// Compare `new` against `old` and send a message if a regression was found or
    /// `notify_always` is set. Returns the message that was sent.
    pub fn notify(
        &self,
        old: &ExecutionIdentifier,
        new: &ExecutionIdentifier,
        notify_always: bool,
    ) -> Result<Option<String>, NotifierError> {
        let _enter = self.span.enter();

        let old_results = self.load(old)?;
        let new_results = self.load(new)?;

        let regression = self.regression(&old_results, &new_results);
        if regression.is_empty() && !notify_always {
            debug!(%old, %new, "No regression");
            return Ok(None);
        }

        let message = self.message(old, new, &regression);
        if regression.is_empty() {
            info!(%old, %new, "Sending comparison");
        } else {
            warn!(%old, %new, "Regression detected");
        }
        self.messenger.send(&message)?;

        Ok(Some(message))
    }

    fn load(&self, identifier: &ExecutionIdentifier) -> Result<RunResults, NotifierError> {
        let results = RunResults::merged(self.store.results(
            &identifier.git_ref,
            &identifier.workload,
            &identifier.planner_version,
        )?);

        if results.is_empty() {
            Err(NotifierError::MissingResults(identifier.to_string()))
        } else {
            Ok(results)
        }
    }

    /// regression bullets of `new` over `old`, empty if there are none
    pub fn regression(&self, old: &RunResults, new: &RunResults) -> String {
        let mut report = String::new();

        if !old.macro_results.is_empty() || !new.macro_results.is_empty() {
            let comparison = match self.method {
                CompareMethod::Statistical => {
                    Comparison::from_statistics(&StatisticalCompareResults::analyze(
                        &self.comparator,
                        &MacroSamples::from_results(&old.macro_results),
                        &MacroSamples::from_results(&new.macro_results),
                    ))
                }
                CompareMethod::Median => {
                    Comparison::from_medians(&old.macro_results, &new.macro_results)
                }
            };

            report.push_str(&comparison.regression());
        }

        if !old.micro.is_empty() || !new.micro.is_empty() {
            let comparison = match self.method {
                CompareMethod::Statistical => MicroComparison::from_statistics(
                    &MicroComparison::analyze(&self.comparator, &old.micro, &new.micro),
                ),
                CompareMethod::Median => MicroComparison::from_medians(&old.micro, &new.micro),
            };

            report.push_str(&comparison.regression());
        }

        report
    }

    fn commit_link(&self, identifier: &ExecutionIdentifier) -> String {
        if self.repository_url.is_empty() {
            identifier.short_ref().to_owned()
        } else {
            format!(
                "<{}/commit/{}|{}>",
                self.repository_url,
                identifier.git_ref,
                identifier.short_ref()
            )
        }
    }

    fn pull_link(&self, number: u64) -> String {
        if self.repository_url.is_empty() {
            format!("#{number}")
        } else {
            format!("<{}/pull/{number}|#{number}>", self.repository_url)
        }
    }

    pub fn message(
        &self,
        old: &ExecutionIdentifier,
        new: &ExecutionIdentifier,
        regression: &str,
    ) -> String {
        let mut message = String::new();

        if !regression.is_empty() {
            message.push_str("*Observed a regression.*\n\n");
        }

        let planner = if new.planner_version.is_empty() {
            String::new()
        } else {
            format!(", planner version: {}", new.planner_version)
        };

        if new.is_pull_request() {
            let _ = writeln!(
                message,
                "Benchmarked PR {} at {} against its base {}. Benchmarked workload: {}{planner}.",
                self.pull_link(new.pull_number),
                self.commit_link(new),
                self.commit_link(old),
                new.workload,
            );
        } else {
            let _ = writeln!(
                message,
                "Comparing: recent commit {} [{}] with old commit {} [{}]. Benchmarked workload: {}{planner}.",
                self.commit_link(new),
                new.source,
                self.commit_link(old),
                old.source,
                new.workload,
            );
        }

        if !self.dashboard_url.is_empty() {
            let _ = writeln!(
                message,
                "Comparison can be seen at: {}/compare?r={}&c={}",
                self.dashboard_url, new.git_ref, old.git_ref
            );
        }

        if !regression.is_empty() {
            message.push('\n');
            message.push_str(regression);
        }

        message
    }
}
