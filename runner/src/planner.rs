mod branch;
mod pull_request;
mod tags;

use crate::{
    config::{Config, LabelPolicy, PlannerConfig, WorkloadConfig, WorkloadKind},
    database::{ResultStore, StoreError},
    execution::{ElementConfig, ExecutionIdentifier, Purpose, QueueElement, Version},
    git::{MirrorError, RepositoryMirror},
    github::{PullRequestError, PullRequestSource},
    queue::ExecutionQueue,
    sync::Shutdown,
};
use parking_lot::Mutex;
use std::{collections::BTreeMap, sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{debug, error, info, info_span, Span};

#[derive(Error, Debug)]
pub enum PlannerError {
    #[error("Repository mirror failed: {0}")]
    Mirror(#[from] MirrorError),
    #[error("Listing pull requests failed: {0}")]
    PullRequests(#[from] PullRequestError),
    #[error("Result store failed: {0}")]
    Store(#[from] StoreError),
}

/// The three planning passes, each scheduled on its own
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    Branches,
    PullRequests,
    Tags,
}

impl Pass {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Branches => "branches",
            Self::PullRequests => "pull_requests",
            Self::Tags => "tags",
        }
    }
}

/// Turns the state of the repository and its pull requests into queue elements.
#[derive(Clone)]
pub struct CronPlanner {
    queue: ExecutionQueue,
    store: Arc<dyn ResultStore>,
    mirror: Arc<dyn RepositoryMirror>,
    pulls: Arc<dyn PullRequestSource>,
    workloads: BTreeMap<String, WorkloadConfig>,
    planners: BTreeMap<String, PlannerConfig>,
    labels: Vec<LabelPolicy>,
    main_branch: String,
    retry_budget: i32,
    /// passes share one working copy of the mirror, held for a whole pass
    mirror_lock: Arc<Mutex<()>>,
    span: Span,
}

impl CronPlanner {
    pub fn new(
        config: &Config,
        queue: ExecutionQueue,
        store: Arc<dyn ResultStore>,
        mirror: Arc<dyn RepositoryMirror>,
        pulls: Arc<dyn PullRequestSource>,
    ) -> Self {
        Self {
            queue,
            store,
            mirror,
            pulls,
            workloads: config.workloads.clone(),
            planners: config.planners.clone(),
            labels: config.pull_requests.labels.clone(),
            main_branch: config.repository.main_branch.clone(),
            retry_budget: config.queue.retry_budget,
            mirror_lock: Arc::new(Mutex::new(())),
            span: info_span!("planner"),
        }
    }

    /// Run one pass, returns the number of elements handed to the queue.
    pub fn run(&self, pass: Pass) -> Result<usize, PlannerError> {
        let span = info_span!(parent: &self.span, "pass", pass = pass.name());
        let _enter = span.enter();
        let _mirror = self.mirror_lock.lock();

        let queued = match pass {
            Pass::Branches => self.branch_pass(),
            Pass::PullRequests => self.pull_request_pass(),
            Pass::Tags => self.tag_pass(),
        }?;

        info!(queued, "Planning pass done");

        Ok(queued)
    }

    /// Run `pass` now and then every `interval` until shutdown. A failed pass is logged and
    /// the next one runs on schedule.
    pub fn schedule(&self, pass: Pass, interval: Duration, shutdown: &Shutdown) {
        loop {
            if let Err(error) = self.run(pass) {
                error!(parent: &self.span, pass = pass.name(), "Planning pass failed: {error}");
            }

            if shutdown.wait(interval) {
                break;
            }
        }
    }

    /// planner versions to benchmark a workload with at the given version, micro
    /// benchmarks run without planner
    fn planner_versions(&self, workload: &WorkloadConfig, version: Version) -> Vec<String> {
        match workload.kind {
            WorkloadKind::Micro => vec![String::new()],
            WorkloadKind::Macro => self
                .planners
                .iter()
                .filter(|(_, planner)| planner.supports(version.major))
                .map(|(name, _)| name.clone())
                .collect(),
        }
    }

    fn supports_planner(&self, planner: &str, version: Version) -> bool {
        planner.is_empty()
            || self
                .planners
                .get(planner)
                .map_or(false, |config| config.supports(version.major))
    }

    /// workloads that exist at `version`
    fn workloads_at(&self, version: Version) -> impl Iterator<Item = (&String, &WorkloadConfig)> {
        self.workloads.iter().filter(move |(name, workload)| {
            let supported = workload
                .minimum_version
                .map_or(true, |minimum| version.major >= minimum);

            if !supported {
                debug!(workload = %name, %version, "Workload does not exist at this version");
            }

            supported
        })
    }

    /// Element for `identifier`, marked compare-only if its results already exist.
    fn element(
        &self,
        identifier: ExecutionIdentifier,
        workload: &WorkloadConfig,
    ) -> Result<QueueElement, PlannerError> {
        let finished = self.store.finished_execution(&identifier)?.is_some();
        let mut element = QueueElement::new(
            identifier,
            ElementConfig {
                path: workload.config.clone(),
                params: workload.params.clone(),
            },
            self.retry_budget,
        );

        if finished {
            element.purpose = Purpose::CompareOnly;
        }

        Ok(element)
    }
}
