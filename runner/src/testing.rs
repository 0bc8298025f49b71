//! Fakes for the collaborators of the queue and the planner.

use crate::{
    execution::{ElementConfig, ExecutionIdentifier, Version},
    executors::{BenchmarkRunner, RunnerError},
    git::{MirrorError, Release, RepositoryMirror},
    github::{PullRequest, PullRequestError, PullRequestSource},
    ingest::RunResults,
    notifier::{Messenger, NotifierError},
};
use parking_lot::{Condvar, Mutex};
use perfwatch_analysis::{ExecutionMetrics, MacroResult, MicroSamples, Qps};
use std::{
    collections::BTreeMap,
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
    thread::{self, ThreadId},
    time::{Duration, Instant},
};

pub fn identifier(git_ref: &str, source: &str, workload: &str, planner: &str) -> ExecutionIdentifier {
    ExecutionIdentifier {
        git_ref: git_ref.to_owned(),
        source: source.to_owned(),
        workload: workload.to_owned(),
        planner_version: planner.to_owned(),
        pull_number: 0,
        pull_base_ref: String::new(),
        version: Version::new(16, 0, 0),
    }
}

/// poll `condition` until it holds or `timeout` passed, returns the last evaluation
pub fn wait_until<F: Fn() -> bool>(timeout: Duration, condition: F) -> bool {
    let deadline = Instant::now() + timeout;

    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }

    condition()
}

/// Macro results of 10 iterations with a little jitter around the given values
pub fn macro_results(tps: f64, latency: f64, cpu: f64) -> RunResults {
    let macro_results = (0..10)
        .map(|i| {
            let jitter = 1.0 + (i as f64 - 4.5) / 1000.0;

            MacroResult {
                qps: Qps {
                    total: tps * 20.0 * jitter,
                    reads: tps * 14.0 * jitter,
                    writes: tps * 4.0 * jitter,
                    other: tps * 2.0 * jitter,
                },
                tps: tps * jitter,
                latency: latency * jitter,
                errors: 0.0,
                metrics: ExecutionMetrics {
                    total_components_cpu_time: cpu * jitter,
                    components_cpu_time: BTreeMap::from([
                        ("vtgate".to_owned(), cpu / 2.0 * jitter),
                        ("vttablet".to_owned(), cpu / 2.0 * jitter),
                    ]),
                    ..Default::default()
                },
            }
        })
        .collect();

    RunResults {
        macro_results,
        micro: MicroSamples::new(),
    }
}

#[derive(Debug, Default)]
pub struct RecordingMessenger {
    pub messages: Mutex<Vec<String>>,
}

impl RecordingMessenger {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }
}

impl Messenger for RecordingMessenger {
    fn send(&self, text: &str) -> Result<(), NotifierError> {
        self.messages.lock().push(text.to_owned());

        Ok(())
    }
}

/// Runner answering with a fixed outcome and counting its calls
pub struct ScriptedRunner {
    results: Option<RunResults>,
    pub attempts: AtomicUsize,
}

impl ScriptedRunner {
    pub fn succeeding(results: RunResults) -> Self {
        Self {
            results: Some(results),
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            results: None,
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl BenchmarkRunner for ScriptedRunner {
    fn run(
        &self,
        _config: &ElementConfig,
        _identifier: &ExecutionIdentifier,
    ) -> Result<RunResults, RunnerError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        self.results
            .clone()
            .ok_or_else(|| RunnerError::Failed {
                status: 1,
                stderr: "scripted failure".to_owned(),
            })
    }
}

/// Runner that blocks every run until `release` is called, recording the peak concurrency
#[derive(Default)]
pub struct BlockingRunner {
    released: Mutex<bool>,
    condvar: Condvar,
    pub running: AtomicUsize,
    pub peak: AtomicUsize,
    pub completed: AtomicUsize,
}

impl BlockingRunner {
    pub fn release(&self) {
        *self.released.lock() = true;
        self.condvar.notify_all();
    }
}

impl BenchmarkRunner for BlockingRunner {
    fn run(
        &self,
        _config: &ElementConfig,
        _identifier: &ExecutionIdentifier,
    ) -> Result<RunResults, RunnerError> {
        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);

        let mut released = self.released.lock();
        while !*released {
            self.condvar.wait(&mut released);
        }
        drop(released);

        self.running.fetch_sub(1, Ordering::SeqCst);
        self.completed.fetch_add(1, Ordering::SeqCst);

        Ok(RunResults {
            micro: MicroSamples::from([("bench".to_owned(), vec![1.0])]),
            ..Default::default()
        })
    }
}

/// Repository with a fixed layout, the main head can be moved between passes
#[derive(Default)]
pub struct ScriptedMirror {
    pub main_head: Mutex<String>,
    pub release_branches: Vec<Release>,
    pub tags: Vec<Release>,
    /// commit -> version, unknown commits resolve to `default_version`
    pub versions: BTreeMap<String, Version>,
    pub default_version: Version,
    pub fail_fetch: AtomicBool,
    pub fetches: AtomicUsize,
    pub fetch_delay: Duration,
    /// every call with the thread that made it
    pub calls: Mutex<Vec<(ThreadId, &'static str)>>,
}

impl ScriptedMirror {
    fn record(&self, call: &'static str) {
        self.calls.lock().push((thread::current().id(), call));
    }
}

impl RepositoryMirror for ScriptedMirror {
    fn fetch(&self) -> Result<(), MirrorError> {
        self.record("fetch");
        self.fetches.fetch_add(1, Ordering::SeqCst);
        thread::sleep(self.fetch_delay);

        if self.fail_fetch.load(Ordering::SeqCst) {
            Err(MirrorError::Git {
                command: "fetch".to_owned(),
                stderr: "remote unreachable".to_owned(),
            })
        } else {
            Ok(())
        }
    }

    fn resolve_head_commit(&self, _branch: &str) -> Result<String, MirrorError> {
        self.record("head");
        Ok(self.main_head.lock().clone())
    }

    fn list_release_branch_heads(&self) -> Result<Vec<Release>, MirrorError> {
        self.record("branches");
        Ok(self.release_branches.clone())
    }

    fn list_release_tags(&self) -> Result<Vec<Release>, MirrorError> {
        self.record("tags");
        Ok(self.tags.clone())
    }

    fn resolve_version_at_commit(&self, sha: &str) -> Result<Version, MirrorError> {
        self.record("version");
        Ok(self
            .versions
            .get(sha)
            .copied()
            .unwrap_or(self.default_version))
    }
}

/// label -> open pull requests, replaceable between passes
#[derive(Default)]
pub struct ScriptedPulls {
    pub by_label: Mutex<BTreeMap<String, Vec<PullRequest>>>,
}

impl ScriptedPulls {
    pub fn set(&self, label: &str, pulls: Vec<PullRequest>) {
        self.by_label.lock().insert(label.to_owned(), pulls);
    }
}

impl PullRequestSource for ScriptedPulls {
    fn list_open_with_label(&self, label: &str) -> Result<Vec<PullRequest>, PullRequestError> {
        Ok(self
            .by_label
            .lock()
            .get(label)
            .cloned()
            .unwrap_or_default())
    }
}
