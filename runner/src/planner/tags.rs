use super::{CronPlanner, PlannerError};
use crate::{
    database::ExecutionStatus,
    execution::{ExecutionIdentifier, SOURCE_TAG_PREFIX},
};
use tracing::debug;

impl CronPlanner {
    /// Benchmark every release tag once, without comparison.
    pub fn tag_pass(&self) -> Result<usize, PlannerError> {
        self.mirror.fetch()?;

        let mut queued = 0;
        for release in self.mirror.list_release_tags()? {
            for (name, workload) in self.workloads_at(release.version) {
                for planner in self.planner_versions(workload, release.version) {
                    let identifier = ExecutionIdentifier {
                        git_ref: release.git_ref.clone(),
                        source: format!("{SOURCE_TAG_PREFIX}{}", release.name),
                        workload: name.clone(),
                        planner_version: planner,
                        pull_number: 0,
                        pull_base_ref: String::new(),
                        version: release.version,
                    };

                    // nothing to compare with, finished tags have nothing left to do
                    if self.store.exists(&identifier, ExecutionStatus::Finished)? {
                        debug!(%identifier, "Already benchmarked");
                        continue;
                    }

                    self.queue
                        .enqueue(self.element(identifier, workload)?.with_notify_always(true));
                    queued += 1;
                }
            }
        }

        Ok(queued)
    }
}
