use super::{CronPlanner, PlannerError};
use crate::{
    execution::{
        ExecutionIdentifier, Version, SOURCE_CRON, SOURCE_RELEASE_BRANCH_PREFIX,
        SOURCE_TAG_PREFIX,
    },
    git::Release,
};
use tracing::{debug, info};

/// A branch head to benchmark and compare
#[derive(Debug, Clone)]
struct BranchHead {
    source: String,
    git_ref: String,
    version: Version,
    /// release branches compare against their own patch releases only
    release: bool,
}

/// Latest tag a branch head at `head` is compared with, if any.
///
/// The main branch takes the latest release of its major version or below, a release branch
/// the latest patch release of its own major version.
fn latest_release<'a>(tags: &'a [Release], head: &BranchHead) -> Option<&'a Release> {
    tags.iter()
        .filter(|tag| {
            if head.release {
                tag.version.major == head.version.major
            } else {
                tag.version.major <= head.version.major
            }
        })
        .max_by_key(|tag| tag.version)
}

impl CronPlanner {
    /// Benchmark the heads of the main and release branches, compared with the head benchmarked
    /// before them and with the latest compatible release.
    pub fn branch_pass(&self) -> Result<usize, PlannerError> {
        self.mirror.fetch()?;

        let tags = self.mirror.list_release_tags()?;
        let main_head = self.mirror.resolve_head_commit(&self.main_branch)?;
        let main_version = self.mirror.resolve_version_at_commit(&main_head)?;

        let mut heads = vec![BranchHead {
            source: SOURCE_CRON.to_owned(),
            git_ref: main_head,
            version: main_version,
            release: false,
        }];
        heads.extend(
            self.mirror
                .list_release_branch_heads()?
                .into_iter()
                .map(|branch| BranchHead {
                    source: format!("{SOURCE_RELEASE_BRANCH_PREFIX}{}", branch.name),
                    git_ref: branch.git_ref,
                    version: branch.version,
                    release: true,
                }),
        );

        let mut queued = 0;
        for head in heads.iter() {
            queued += self.plan_branch(head, latest_release(&tags, head))?;
        }

        Ok(queued)
    }

    fn plan_branch(
        &self,
        head: &BranchHead,
        release: Option<&Release>,
    ) -> Result<usize, PlannerError> {
        info!(source = %head.source, git_ref = %head.git_ref, version = %head.version, "Planning branch");

        let mut queued = 0;

        for (name, workload) in self.workloads_at(head.version) {
            for planner in self.planner_versions(workload, head.version) {
                let identifier = ExecutionIdentifier {
                    git_ref: head.git_ref.clone(),
                    source: head.source.clone(),
                    workload: name.clone(),
                    planner_version: planner.clone(),
                    pull_number: 0,
                    pull_base_ref: String::new(),
                    version: head.version,
                };
                let mut current = self.element(identifier, workload)?.with_primary(true);
                let mut partners = Vec::new();

                if let Some(previous) =
                    self.store
                        .previous_from_source(&head.source, name, &planner, &head.git_ref)?
                {
                    let version = self.mirror.resolve_version_at_commit(&previous)?;

                    partners.push(self.element(
                        ExecutionIdentifier {
                            git_ref: previous,
                            version,
                            ..current.identifier.clone()
                        },
                        workload,
                    )?);
                }

                match release {
                    Some(release)
                        if workload
                            .minimum_version
                            .map_or(true, |minimum| release.version.major >= minimum)
                            && self.supports_planner(&planner, release.version) =>
                    {
                        partners.push(self.element(
                            ExecutionIdentifier {
                                git_ref: release.git_ref.clone(),
                                source: format!("{SOURCE_TAG_PREFIX}{}", release.name),
                                version: release.version,
                                ..current.identifier.clone()
                            },
                            workload,
                        )?);
                    }
                    Some(release) => {
                        debug!(release = %release.name, workload = %name, planner = %planner, "Release not comparable");
                    }
                    None => (),
                }

                for mut partner in partners {
                    current.link(&mut partner);
                    self.queue.enqueue(partner);
                    queued += 1;
                }

                self.queue.enqueue(current);
                queued += 1;
            }
        }

        Ok(queued)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn release(name: &str, major: u64, minor: u64, patch: u64) -> Release {
        Release {
            name: name.to_owned(),
            git_ref: format!("{name}-sha"),
            version: Version::new(major, minor, patch),
        }
    }

    fn head(major: u64, release: bool) -> BranchHead {
        BranchHead {
            source: SOURCE_CRON.to_owned(),
            git_ref: "head".to_owned(),
            version: Version::new(major, 0, 0),
            release,
        }
    }

    #[test]
    fn release_selection() {
        let tags = vec![
            release("v15.0.3", 15, 0, 3),
            release("v16.0.1", 16, 0, 1),
            release("v15.0.10", 15, 0, 10),
            release("v17.0.0", 17, 0, 0),
        ];

        assert_eq!(latest_release(&tags, &head(16, false)).unwrap().name, "v16.0.1");
        assert_eq!(latest_release(&tags, &head(18, false)).unwrap().name, "v17.0.0");
        assert_eq!(latest_release(&tags, &head(15, true)).unwrap().name, "v15.0.10");
        assert_eq!(latest_release(&tags, &head(14, false)), None);
        assert_eq!(latest_release(&tags, &head(18, true)), None);
    }
}
