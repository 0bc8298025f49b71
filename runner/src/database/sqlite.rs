use super::{ExecutionStatus, ResultStore, StoreError};
use crate::{execution::ExecutionIdentifier, ingest::RunResults};
use parking_lot::{lock_api::ArcMutexGuard, FairMutex, RawFairMutex};
use rusqlite::{params, Connection, OptionalExtension};
use std::{path::Path, sync::Arc};
use tracing::{debug, error, info};
use uuid::Uuid;

#[derive(Debug, Clone)]
/// Transparent, thread safe wrapper over `InnerConnection`
pub struct SharedConnection(Arc<FairMutex<InnerConnection>>);

#[derive(Debug)]
pub struct InnerConnection {
    connection: Connection,
}

impl SharedConnection {
    pub fn new(inner_connection: InnerConnection) -> Self {
        Self(Arc::new(FairMutex::new(inner_connection)))
    }

    fn lock(&self) -> ArcMutexGuard<RawFairMutex, InnerConnection> {
        self.0.lock_arc()
    }

    /// open the database at `path` and apply the schema
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let mut inner = InnerConnection::new(Connection::open(path)?);
        inner.init()?;

        info!(path = ?path, "Opened SQLite result store");

        Ok(Self::new(inner))
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        let mut inner = InnerConnection::new(Connection::open_in_memory()?);
        inner.init()?;

        Ok(Self::new(inner))
    }
}

fn parse_uuid(value: String) -> Result<Uuid, StoreError> {
    Uuid::parse_str(&value).map_err(|_| StoreError::InvalidUuid(value))
}

impl InnerConnection {
    pub fn new(connection: Connection) -> Self {
        Self { connection }
    }

    pub fn init(&mut self) -> Result<(), StoreError> {
        let mut counter = 1;

        for table in SQL_SCHEMA {
            match self.connection.execute(table, []) {
                Ok(_) => debug!("Applied SQL schema ({counter}/{SQL_SCHEMA_NUMBER})"),
                Err(error) => {
                    error!(error = ?error, table = table, "Failed to apply SQL schema ({counter}/{SQL_SCHEMA_NUMBER}): {error}");

                    return Err(StoreError::SQLite(error));
                }
            };

            counter += 1;
        }

        Ok(())
    }

    fn exists(
        &self,
        identifier: &ExecutionIdentifier,
        status: ExecutionStatus,
    ) -> Result<bool, StoreError> {
        let count: i64 = self
            .connection
            .prepare_cached(
                "select count(*) from executions
                 where git_ref = ? and source = ? and workload = ? and status = ?
                 and (? = '' or planner_version = ?)",
            )?
            .query_row(
                params![
                    identifier.git_ref,
                    identifier.source,
                    identifier.workload,
                    status.as_str(),
                    identifier.planner_version,
                    identifier.planner_version
                ],
                |row| row.get(0),
            )?;

        Ok(count > 0)
    }

    fn finished_execution(
        &self,
        identifier: &ExecutionIdentifier,
    ) -> Result<Option<Uuid>, StoreError> {
        self.connection
            .prepare_cached(
                "select uuid from executions
                 where git_ref = ? and source = ? and workload = ? and planner_version = ?
                 and pull_number = ? and status = 'finished'
                 order by rowid desc limit 1",
            )?
            .query_row(
                params![
                    identifier.git_ref,
                    identifier.source,
                    identifier.workload,
                    identifier.planner_version,
                    identifier.pull_number
                ],
                |row| row.get::<_, String>(0),
            )
            .optional()?
            .map(parse_uuid)
            .transpose()
    }

    fn previous_from_source(
        &self,
        source: &str,
        workload: &str,
        planner_version: &str,
        git_ref: &str,
    ) -> Result<Option<String>, StoreError> {
        Ok(self
            .connection
            .prepare_cached(
                "select git_ref from executions
                 where source = ? and workload = ? and planner_version = ?
                 and git_ref != ? and status = 'finished'
                 order by rowid desc limit 1",
            )?
            .query_row(params![source, workload, planner_version, git_ref], |row| {
                row.get(0)
            })
            .optional()?)
    }

    fn start_execution(&self, identifier: &ExecutionIdentifier) -> Result<Uuid, StoreError> {
        let uuid = Uuid::new_v4();

        self.connection
            .prepare_cached(
                "insert into executions
                 (uuid, git_ref, source, workload, planner_version, pull_number,
                  pull_base_ref, version, status)
                 values (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )?
            .execute(params![
                uuid.to_string(),
                identifier.git_ref,
                identifier.source,
                identifier.workload,
                identifier.planner_version,
                identifier.pull_number,
                identifier.pull_base_ref,
                identifier.version.to_string(),
                ExecutionStatus::Started.as_str()
            ])?;

        debug!(%uuid, %identifier, "Inserted execution");

        Ok(uuid)
    }

    fn set_status(
        &self,
        execution: Uuid,
        status: ExecutionStatus,
        results: Option<String>,
    ) -> Result<(), StoreError> {
        let updated = self
            .connection
            .prepare_cached("update executions set status = ?, results = ? where uuid = ?")?
            .execute(params![status.as_str(), results, execution.to_string()])?;

        if updated == 0 {
            Err(StoreError::UnknownExecution(execution))
        } else {
            Ok(())
        }
    }

    fn results(
        &self,
        git_ref: &str,
        workload: &str,
        planner_version: &str,
    ) -> Result<Vec<RunResults>, StoreError> {
        self.connection
            .prepare_cached(
                "select results from executions
                 where git_ref = ? and workload = ? and planner_version = ?
                 and status = 'finished' and results is not null
                 order by rowid",
            )?
            .query_map(params![git_ref, workload, planner_version], |row| {
                row.get::<_, String>(0)
            })?
            .try_fold(Vec::new(), |mut init, result| {
                init.push(serde_yaml::from_str(&result?)?);

                Ok::<Vec<RunResults>, StoreError>(init)
            })
    }
}

impl ResultStore for SharedConnection {
    fn exists(
        &self,
        identifier: &ExecutionIdentifier,
        status: ExecutionStatus,
    ) -> Result<bool, StoreError> {
        self.lock().exists(identifier, status)
    }

    fn finished_execution(
        &self,
        identifier: &ExecutionIdentifier,
    ) -> Result<Option<Uuid>, StoreError> {
        self.lock().finished_execution(identifier)
    }

    fn previous_from_source(
        &self,
        source: &str,
        workload: &str,
        planner_version: &str,
        git_ref: &str,
    ) -> Result<Option<String>, StoreError> {
        self.lock()
            .previous_from_source(source, workload, planner_version, git_ref)
    }

    fn start_execution(&self, identifier: &ExecutionIdentifier) -> Result<Uuid, StoreError> {
        self.lock().start_execution(identifier)
    }

    fn finish_execution(&self, execution: Uuid, results: &RunResults) -> Result<(), StoreError> {
        let serialized = serde_yaml::to_string(results)?;

        self.lock()
            .set_status(execution, ExecutionStatus::Finished, Some(serialized))
    }

    fn fail_execution(&self, execution: Uuid) -> Result<(), StoreError> {
        self.lock()
            .set_status(execution, ExecutionStatus::Failed, None)
    }

    fn results(
        &self,
        git_ref: &str,
        workload: &str,
        planner_version: &str,
    ) -> Result<Vec<RunResults>, StoreError> {
        self.lock().results(git_ref, workload, planner_version)
    }
}

// ref: https://www.sqlite.org/lang_createtable.html
pub const SQL_SCHEMA: [&str; 2] = [
    "create table if not exists executions (
    uuid text primary key,
    git_ref text not null,
    source text not null,
    workload text not null,
    planner_version text not null,
    pull_number integer not null,
    pull_base_ref text not null,
    version text not null,
    status text not null,
    results text,
    created_at datetime not null default current_timestamp
);",
    "create index if not exists executions_lookup
    on executions (git_ref, workload, planner_version);",
];
pub const SQL_SCHEMA_NUMBER: usize = SQL_SCHEMA.len();
