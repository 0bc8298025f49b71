use super::{ExecutionStatus, ResultStore, StoreError};
use crate::{execution::ExecutionIdentifier, ingest::RunResults};
use parking_lot::Mutex;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ExecutionRecord {
    pub uuid: Uuid,
    pub identifier: ExecutionIdentifier,
    pub status: ExecutionStatus,
    pub results: Option<RunResults>,
}

/// Store that lives and dies with the process, used for dry runs and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<Vec<ExecutionRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// insert a finished execution directly, e.g. results imported from elsewhere
    pub fn insert_finished(&self, identifier: ExecutionIdentifier, results: RunResults) -> Uuid {
        let uuid = Uuid::new_v4();

        self.records.lock().push(ExecutionRecord {
            uuid,
            identifier,
            status: ExecutionStatus::Finished,
            results: Some(results),
        });

        uuid
    }

    pub fn records(&self) -> Vec<ExecutionRecord> {
        self.records.lock().clone()
    }

    fn set_status(
        &self,
        execution: Uuid,
        status: ExecutionStatus,
        results: Option<RunResults>,
    ) -> Result<(), StoreError> {
        let mut records = self.records.lock();
        let record = records
            .iter_mut()
            .find(|record| record.uuid == execution)
            .ok_or(StoreError::UnknownExecution(execution))?;

        record.status = status;
        record.results = results;

        Ok(())
    }
}

impl ResultStore for MemoryStore {
    fn exists(
        &self,
        identifier: &ExecutionIdentifier,
        status: ExecutionStatus,
    ) -> Result<bool, StoreError> {
        Ok(self.records.lock().iter().any(|record| {
            record.status == status
                && record.identifier.git_ref == identifier.git_ref
                && record.identifier.source == identifier.source
                && record.identifier.workload == identifier.workload
                && (identifier.planner_version.is_empty()
                    || record.identifier.planner_version == identifier.planner_version)
        }))
    }

    fn finished_execution(
        &self,
        identifier: &ExecutionIdentifier,
    ) -> Result<Option<Uuid>, StoreError> {
        Ok(self
            .records
            .lock()
            .iter()
            .rev()
            .find(|record| {
                record.status == ExecutionStatus::Finished
                    && record.identifier.git_ref == identifier.git_ref
                    && record.identifier.source == identifier.source
                    && record.identifier.workload == identifier.workload
                    && record.identifier.planner_version == identifier.planner_version
                    && record.identifier.pull_number == identifier.pull_number
            })
            .map(|record| record.uuid))
    }

    fn previous_from_source(
        &self,
        source: &str,
        workload: &str,
        planner_version: &str,
        git_ref: &str,
    ) -> Result<Option<String>, StoreError> {
        Ok(self
            .records
            .lock()
            .iter()
            .rev()
            .find(|record| {
                record.status == ExecutionStatus::Finished
                    && record.identifier.source == source
                    && record.identifier.workload == workload
                    && record.identifier.planner_version == planner_version
                    && record.identifier.git_ref != git_ref
            })
            .map(|record| record.identifier.git_ref.clone()))
    }

    fn start_execution(&self, identifier: &ExecutionIdentifier) -> Result<Uuid, StoreError> {
        let uuid = Uuid::new_v4();
        debug!(%uuid, %identifier, "Recording started execution");

        self.records.lock().push(ExecutionRecord {
            uuid,
            identifier: identifier.clone(),
            status: ExecutionStatus::Started,
            results: None,
        });

        Ok(uuid)
    }

    fn finish_execution(&self, execution: Uuid, results: &RunResults) -> Result<(), StoreError> {
        self.set_status(execution, ExecutionStatus::Finished, Some(results.clone()))
    }

    fn fail_execution(&self, execution: Uuid) -> Result<(), StoreError> {
        self.set_status(execution, ExecutionStatus::Failed, None)
    }

    fn results(
        &self,
        git_ref: &str,
        workload: &str,
        planner_version: &str,
    ) -> Result<Vec<RunResults>, StoreError> {
        Ok(self
            .records
            .lock()
            .iter()
            .filter(|record| {
                record.status == ExecutionStatus::Finished
                    && record.identifier.git_ref == git_ref
                    && record.identifier.workload == workload
                    && record.identifier.planner_version == planner_version
            })
            .filter_map(|record| record.results.clone())
            .collect())
    }
}
