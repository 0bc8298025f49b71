use crate::notifier::CompareMethod;
use itertools::Itertools;
use perfwatch_analysis::{Comparator, Thresholds, DEFAULT_COMPARE_ALPHA, DEFAULT_CONFIDENCE};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap, fs::File, io::Error, os::unix::fs::MetadataExt, path::Path,
    path::PathBuf,
};
use thiserror::Error;
use tracing::{error, warn};

// check if a file is executable
pub fn check_executable(path: &Path) -> Result<bool, ConfigErrors> {
    if !path.is_file() {
        Err(ConfigErrors::FileNotFound(path.to_path_buf()))
    } else {
        match File::open(path).map(|file| file.metadata()) {
            Ok(Ok(metadata)) => Ok((metadata.mode() & 0o111) != 0),
            Ok(Err(e)) | Err(e) => Err(ConfigErrors::MetadataNotFound(e)),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigErrors {
    #[error("Failed to read configuration: {0}")]
    Read(Error),
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Configuration failed the preflight checks")]
    Preflight,
    #[error("File {0:?} not found")]
    FileNotFound(PathBuf),
    #[error("Metadata not found")]
    MetadataNotFound(#[source] Error),
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default, alias = "db")]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    pub repository: RepositoryConfig,
    #[serde(default)]
    pub pull_requests: PullRequestConfig,
    // workload name -> how to benchmark it
    pub workloads: BTreeMap<String, WorkloadConfig>,
    #[serde(default = "default_planners")]
    pub planners: BTreeMap<String, PlannerConfig>,
    pub runner: RunnerConfig,
    #[serde(default)]
    pub statistics: StatisticsConfig,
    #[serde(default)]
    pub notifier: NotifierConfig,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct QueueConfig {
    /// maximum number of benchmarks executing at once
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// dispatcher tick in milliseconds
    #[serde(default = "default_tick")]
    pub tick: u64,
    #[serde(default = "default_retry_budget")]
    pub retry_budget: i32,
    /// base delay in seconds before a retry, doubled on every further attempt
    #[serde(default)]
    pub retry_backoff: u64,
    /// milliseconds between two looks at the store while waiting for a comparison partner
    #[serde(default = "default_tick")]
    pub comparison_poll: u64,
    /// seconds after which a comparison partner is given up on
    #[serde(default = "default_comparison_timeout")]
    pub comparison_timeout: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            tick: default_tick(),
            retry_budget: default_retry_budget(),
            retry_backoff: 0,
            comparison_poll: default_tick(),
            comparison_timeout: default_comparison_timeout(),
        }
    }
}

/// Seconds between two runs of each planning pass, 0 disables the pass
#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct ScheduleConfig {
    #[serde(default = "default_daily")]
    pub branches: u64,
    #[serde(default = "default_pull_request_interval")]
    pub pull_requests: u64,
    #[serde(default = "default_daily")]
    pub tags: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            branches: default_daily(),
            pull_requests: default_pull_request_interval(),
            tags: default_daily(),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct RepositoryConfig {
    /// local bare mirror, cloned on first fetch
    pub path: PathBuf,
    pub remote: String,
    #[serde(default = "default_main_branch")]
    pub main_branch: String,
    #[serde(default = "default_release_prefix")]
    pub release_branch_prefix: String,
    /// file inside the repository holding the version string
    pub version_file: PathBuf,
    #[serde(default = "default_git")]
    pub git: PathBuf,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct PullRequestConfig {
    /// `owner/name` on GitHub, the pass is skipped when empty
    #[serde(default)]
    pub repository: String,
    #[serde(default = "default_gh")]
    pub gh: PathBuf,
    #[serde(default = "default_labels")]
    pub labels: Vec<LabelPolicy>,
}

impl Default for PullRequestConfig {
    fn default() -> Self {
        Self {
            repository: String::new(),
            gh: default_gh(),
            labels: default_labels(),
        }
    }
}

/// A trigger label and the planner versions its pull requests are benchmarked with
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LabelPolicy {
    pub label: String,
    pub planners: Vec<String>,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WorkloadKind {
    Micro,
    Macro,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct WorkloadConfig {
    pub kind: WorkloadKind,
    /// workload configuration handed to the benchmark
    pub config: PathBuf,
    #[serde(default)]
    pub params: Vec<String>,
    /// major version the workload first exists in
    pub minimum_version: Option<u64>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PlannerConfig {
    pub minimum_version: Option<u64>,
    pub maximum_version: Option<u64>,
}

impl PlannerConfig {
    pub fn supports(&self, major: u64) -> bool {
        self.minimum_version.map_or(true, |minimum| major >= minimum)
            && self.maximum_version.map_or(true, |maximum| major <= maximum)
    }
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct RunnerConfig {
    pub exec: PathBuf,
    #[serde(default)]
    pub params: Vec<String>,
    /// seconds before a benchmark is killed
    #[serde(default = "default_runner_timeout")]
    pub timeout: u64,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug)]
#[serde(deny_unknown_fields)]
pub struct StatisticsConfig {
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default = "default_alpha")]
    pub alpha: f64,
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self {
            confidence: DEFAULT_CONFIDENCE,
            alpha: DEFAULT_COMPARE_ALPHA,
        }
    }
}

impl StatisticsConfig {
    pub fn comparator(&self) -> Comparator {
        Comparator::new(
            self.confidence,
            Thresholds {
                compare_alpha: self.alpha,
            },
        )
    }
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct NotifierConfig {
    /// web url of the repository, used to link commits and pull requests
    #[serde(default)]
    pub repository_url: String,
    #[serde(default)]
    pub dashboard_url: String,
    #[serde(default)]
    pub method: CompareMethod,
    /// command receiving every message on stdin, messages are only logged without one
    pub command: Option<PathBuf>,
    #[serde(default)]
    pub params: Vec<String>,
    /// seconds the message command may take
    #[serde(default = "default_message_timeout")]
    pub timeout: u64,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            repository_url: String::new(),
            dashboard_url: String::new(),
            method: CompareMethod::default(),
            command: None,
            params: Vec::new(),
            timeout: default_message_timeout(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigErrors> {
        let file = File::open(path).map_err(ConfigErrors::Read)?;

        Ok(serde_yaml::from_reader(file)?)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigErrors> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Validate the configuration, returns true if it contains an error.
    pub fn preflight_checks(&mut self) -> bool {
        // attempt to catch all errors instead of piece-by-piece to make debugging easier for users
        let mut contains_error = false;

        if self.workloads.is_empty() {
            error!("No workload was defined, there is nothing to benchmark");
            contains_error = true;
        }

        if self.planners.is_empty() {
            error!("No planner version was defined, macro workloads need at least one");
            contains_error = true;
        }

        for (name, workload) in self.workloads.iter() {
            if !workload.config.is_file() {
                warn!(
                    "workloads.{name}.config ({}) does not exist on this host, the benchmark has to provide it",
                    workload.config.to_string_lossy()
                );
            }
        }

        for (name, planner) in self.planners.iter() {
            if let (Some(minimum), Some(maximum)) =
                (planner.minimum_version, planner.maximum_version)
            {
                if minimum > maximum {
                    error!("planners.{name} has a minimum_version ({minimum}) above its maximum_version ({maximum})");
                    contains_error = true;
                }
            }
        }

        let known_planners = self.planners.keys().sorted().cloned().collect_vec();

        for policy in self.pull_requests.labels.iter() {
            if policy.planners.is_empty() {
                error!(
                    "pull_requests.labels '{}' does not select any planner",
                    policy.label
                );
                contains_error = true;
            }

            for planner in policy.planners.iter() {
                if known_planners.binary_search(planner).is_err() {
                    error!(
                        "pull_requests.labels '{}' references planner {planner} but {planner} is not defined",
                        policy.label
                    );
                    contains_error = true;
                }
            }
        }

        if self.queue.concurrency == 0 {
            error!("queue.concurrency cannot be 0, nothing would ever execute");
            contains_error = true;
        }

        if self.queue.tick == 0 || self.queue.comparison_poll == 0 {
            error!("queue.tick and queue.comparison_poll must be positive");
            contains_error = true;
        }

        if self.queue.retry_budget < 0 {
            warn!("queue.retry_budget is negative, failed benchmarks are not retried");
            self.queue.retry_budget = 0;
        }

        if !(self.statistics.confidence > 0.0 && self.statistics.confidence < 1.0) {
            error!(
                "statistics.confidence ({}) must be within (0, 1)",
                self.statistics.confidence
            );
            contains_error = true;
        }

        if !(self.statistics.alpha > 0.0 && self.statistics.alpha < 1.0) {
            error!(
                "statistics.alpha ({}) must be within (0, 1)",
                self.statistics.alpha
            );
            contains_error = true;
        }

        if self.runner.timeout == 0 {
            error!("runner.timeout cannot be 0");
            contains_error = true;
        }

        match check_executable(&self.runner.exec) {
            Ok(true) => (),
            Ok(false) => {
                error!(
                    "runner.exec ({}) is not executable",
                    self.runner.exec.to_string_lossy()
                );
                contains_error = true;
            }
            Err(e) => {
                error!(
                    "Failed to determine if runner.exec ({}) is an executable: {e}",
                    self.runner.exec.to_string_lossy()
                );
                contains_error = true;
            }
        }

        if let Some(command) = self.notifier.command.as_ref() {
            if !matches!(check_executable(command), Ok(true)) {
                error!(
                    "notifier.command ({}) must be an executable file",
                    command.to_string_lossy()
                );
                contains_error = true;
            }
        }

        if self.pull_requests.repository.is_empty() && self.schedule.pull_requests > 0 {
            warn!("pull_requests.repository is empty, the pull request pass is disabled");
            self.schedule.pull_requests = 0;
        }

        contains_error
    }
}

fn default_database_path() -> PathBuf {
    PathBuf::from("perfwatch.db")
}

fn default_concurrency() -> usize {
    5
}

fn default_tick() -> u64 {
    1000
}

fn default_retry_budget() -> i32 {
    1
}

fn default_comparison_timeout() -> u64 {
    6 * 60 * 60
}

fn default_daily() -> u64 {
    24 * 60 * 60
}

fn default_pull_request_interval() -> u64 {
    5 * 60
}

fn default_main_branch() -> String {
    "main".to_owned()
}

fn default_release_prefix() -> String {
    "release-".to_owned()
}

fn default_git() -> PathBuf {
    PathBuf::from("git")
}

fn default_gh() -> PathBuf {
    PathBuf::from("gh")
}

fn default_runner_timeout() -> u64 {
    2 * 60 * 60
}

fn default_message_timeout() -> u64 {
    30
}

fn default_confidence() -> f64 {
    DEFAULT_CONFIDENCE
}

fn default_alpha() -> f64 {
    DEFAULT_COMPARE_ALPHA
}

fn default_planners() -> BTreeMap<String, PlannerConfig> {
    BTreeMap::from([
        ("Gen4".to_owned(), PlannerConfig::default()),
        ("V3".to_owned(), PlannerConfig::default()),
    ])
}

fn default_labels() -> Vec<LabelPolicy> {
    vec![
        LabelPolicy {
            label: "Benchmark me".to_owned(),
            planners: vec!["V3".to_owned(), "Gen4".to_owned()],
        },
        LabelPolicy {
            label: "Benchmark me (V3)".to_owned(),
            planners: vec!["V3".to_owned()],
        },
    ]
}
