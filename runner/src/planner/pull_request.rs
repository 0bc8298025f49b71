use super::{CronPlanner, PlannerError};
use crate::{
    execution::{ExecutionIdentifier, QueueElement, SOURCE_PULL_REQUEST, SOURCE_PULL_REQUEST_BASE},
    github::PullRequest,
};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

impl CronPlanner {
    /// Benchmark the head of every labelled pull request against its base.
    ///
    /// Pull requests move under a stable number, so every waiting element of a planned pull
    /// request is dropped before the fresh ones are queued.
    pub fn pull_request_pass(&self) -> Result<usize, PlannerError> {
        self.mirror.fetch()?;

        // a pull request carrying several labels gets the union of their planners
        let mut labelled: BTreeMap<u64, (PullRequest, BTreeSet<String>)> = BTreeMap::new();

        for policy in self.labels.iter() {
            for pull in self.pulls.list_open_with_label(&policy.label)? {
                debug!(number = pull.number, label = %policy.label, "Found pull request");

                labelled
                    .entry(pull.number)
                    .or_insert_with(|| (pull, BTreeSet::new()))
                    .1
                    .extend(policy.planners.iter().cloned());
            }
        }

        let mut elements = Vec::new();
        for (pull, planners) in labelled.values() {
            match self.plan_pull_request(pull, planners) {
                Ok(planned) => elements.push((pull.number, pull.head.as_str(), planned)),
                Err(PlannerError::Mirror(error)) => {
                    warn!(number = pull.number, "Skipping pull request: {error}");
                }
                Err(error) => return Err(error),
            }
        }

        let mut queued = 0;
        for (number, head, planned) in elements {
            let stale = self.queue.remove_pull_request(number, head);
            if !stale.is_empty() {
                info!(number, removed = stale.len(), "Replacing queued pull request");
            }

            for element in planned {
                self.queue.enqueue(element);
                queued += 1;
            }
        }

        Ok(queued)
    }

    fn plan_pull_request(
        &self,
        pull: &PullRequest,
        planners: &BTreeSet<String>,
    ) -> Result<Vec<QueueElement>, PlannerError> {
        let version = self.mirror.resolve_version_at_commit(&pull.base)?;
        let mut elements = Vec::new();

        for (name, workload) in self.workloads_at(version) {
            let versions = self
                .planner_versions(workload, version)
                .into_iter()
                .filter(|planner| planner.is_empty() || planners.contains(planner));

            for planner in versions {
                let base = ExecutionIdentifier {
                    git_ref: pull.base.clone(),
                    source: SOURCE_PULL_REQUEST_BASE.to_owned(),
                    workload: name.clone(),
                    planner_version: planner,
                    pull_number: pull.number,
                    pull_base_ref: pull.base.clone(),
                    version,
                };
                let head = ExecutionIdentifier {
                    git_ref: pull.head.clone(),
                    source: SOURCE_PULL_REQUEST.to_owned(),
                    ..base.clone()
                };

                let mut head = self
                    .element(head, workload)?
                    .with_primary(true)
                    .with_notify_always(true);
                let mut base = self.element(base, workload)?;
                head.link(&mut base);

                elements.push(base);
                elements.push(head);
            }
        }

        Ok(elements)
    }
}
