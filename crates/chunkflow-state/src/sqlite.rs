//! `SQLite`-backed implementation of [`ExecutionStore`].
//!
//! Uses a single `Mutex<Connection>` for thread safety. Failure lists
//! and execution contexts are stored as JSON text columns; timestamps
//! use the `SQLite` datetime format in UTC.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, NaiveDateTime, Utc};
use chunkflow_types::{
    BatchStatus, ExecutionContext, ExecutionId, ExecutionPage, ExitStatus, JobExecution,
    JobInstanceId, JobParameters, StepExecution,
};
use rusqlite::Connection;

use crate::backend::ExecutionStore;
use crate::error::{self, StoreError};

/// `SQLite` datetime format (UTC, no timezone suffix).
const SQLITE_DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S";

/// Idempotent DDL for execution tables.
const CREATE_TABLES: &str = r"
CREATE TABLE IF NOT EXISTS job_instances (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    job_name TEXT NOT NULL,
    instance_key TEXT NOT NULL,
    parameters TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE (job_name, instance_key)
);

CREATE TABLE IF NOT EXISTS job_executions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    instance_id INTEGER NOT NULL REFERENCES job_instances(id),
    status TEXT NOT NULL,
    exit_code TEXT NOT NULL DEFAULT 'UNKNOWN',
    exit_description TEXT NOT NULL DEFAULT '',
    start_time TEXT,
    end_time TEXT,
    failures TEXT NOT NULL DEFAULT '[]',
    context TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS step_executions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    job_execution_id INTEGER NOT NULL REFERENCES job_executions(id),
    step_name TEXT NOT NULL,
    status TEXT NOT NULL,
    exit_code TEXT NOT NULL DEFAULT 'UNKNOWN',
    exit_description TEXT NOT NULL DEFAULT '',
    read_count INTEGER NOT NULL DEFAULT 0,
    write_count INTEGER NOT NULL DEFAULT 0,
    filter_count INTEGER NOT NULL DEFAULT 0,
    skip_count INTEGER NOT NULL DEFAULT 0,
    commit_count INTEGER NOT NULL DEFAULT 0,
    rollback_count INTEGER NOT NULL DEFAULT 0,
    start_time TEXT,
    end_time TEXT,
    failures TEXT NOT NULL DEFAULT '[]',
    context TEXT NOT NULL DEFAULT '{}'
);

CREATE INDEX IF NOT EXISTS idx_job_executions_instance ON job_executions (instance_id);
CREATE INDEX IF NOT EXISTS idx_step_executions_job ON step_executions (job_execution_id);
";

const JOB_EXECUTION_COLUMNS: &str = "e.id, e.instance_id, i.job_name, i.parameters, e.status, \
     e.exit_code, e.exit_description, e.start_time, e.end_time, e.failures, e.context";

/// Raw job execution row before JSON/timestamp decoding.
struct JobExecutionRow {
    id: i64,
    instance_id: i64,
    job_name: String,
    parameters: String,
    status: String,
    exit_code: String,
    exit_description: String,
    start_time: Option<String>,
    end_time: Option<String>,
    failures: String,
    context: String,
}

/// `SQLite`-backed execution storage.
///
/// Create with [`SqliteExecutionStore::open`] for file-backed
/// persistence or [`SqliteExecutionStore::in_memory`] for tests.
pub struct SqliteExecutionStore {
    conn: Mutex<Connection>,
}

impl SqliteExecutionStore {
    /// Open or create an execution database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the directory can't be created,
    /// or [`StoreError::Sqlite`] if the database can't be opened.
    pub fn open(path: &Path) -> error::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(CREATE_TABLES)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (for testing).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Sqlite`] if the in-memory database can't
    /// be initialized.
    pub fn in_memory() -> error::Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(CREATE_TABLES)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the connection lock.
    fn lock_conn(&self) -> error::Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    fn datetime_to_sqlite(value: Option<DateTime<Utc>>) -> Option<String> {
        value.map(|dt| dt.format(SQLITE_DATETIME_FMT).to_string())
    }

    fn sqlite_to_datetime(raw: Option<&str>) -> Option<DateTime<Utc>> {
        raw.and_then(|s| {
            NaiveDateTime::parse_from_str(s, SQLITE_DATETIME_FMT)
                .ok()
                .map(|ndt| ndt.and_utc())
        })
    }

    fn parse_status(raw: &str) -> error::Result<BatchStatus> {
        BatchStatus::parse(raw)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown status '{raw}'")))
    }

    /// Find or create the instance row for `(job_name, instance_key)`.
    fn find_or_create_instance(
        conn: &Connection,
        job_name: &str,
        parameters: &JobParameters,
    ) -> error::Result<JobInstanceId> {
        let key = parameters.instance_key();
        let existing: Option<i64> = conn
            .query_row(
                "SELECT id FROM job_instances WHERE job_name = ?1 AND instance_key = ?2",
                rusqlite::params![job_name, key],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;

        if let Some(id) = existing {
            return Ok(JobInstanceId::new(id));
        }

        conn.execute(
            "INSERT INTO job_instances (job_name, instance_key, parameters) VALUES (?1, ?2, ?3)",
            rusqlite::params![job_name, key, serde_json::to_string(parameters)?],
        )?;
        Ok(JobInstanceId::new(conn.last_insert_rowid()))
    }

    fn latest_execution_id(
        conn: &Connection,
        instance_id: JobInstanceId,
    ) -> error::Result<Option<(i64, String)>> {
        conn.query_row(
            "SELECT id, status FROM job_executions WHERE instance_id = ?1 \
             ORDER BY id DESC LIMIT 1",
            [instance_id.value()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(StoreError::Sqlite(other)),
        })
    }

    fn read_job_execution_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<JobExecutionRow> {
        Ok(JobExecutionRow {
            id: row.get(0)?,
            instance_id: row.get(1)?,
            job_name: row.get(2)?,
            parameters: row.get(3)?,
            status: row.get(4)?,
            exit_code: row.get(5)?,
            exit_description: row.get(6)?,
            start_time: row.get(7)?,
            end_time: row.get(8)?,
            failures: row.get(9)?,
            context: row.get(10)?,
        })
    }

    fn hydrate_job_execution(raw: JobExecutionRow) -> error::Result<JobExecution> {
        Ok(JobExecution {
            id: ExecutionId::new(raw.id),
            instance_id: JobInstanceId::new(raw.instance_id),
            job_name: raw.job_name,
            parameters: serde_json::from_str(&raw.parameters)?,
            status: Self::parse_status(&raw.status)?,
            exit_status: ExitStatus {
                code: raw.exit_code,
                description: raw.exit_description,
            },
            start_time: Self::sqlite_to_datetime(raw.start_time.as_deref()),
            end_time: Self::sqlite_to_datetime(raw.end_time.as_deref()),
            failures: serde_json::from_str(&raw.failures)?,
            context: serde_json::from_str(&raw.context)?,
            steps: Vec::new(),
        })
    }

    #[allow(clippy::cast_sign_loss)]
    fn load_step_executions(
        conn: &Connection,
        job_execution_id: i64,
    ) -> error::Result<Vec<StepExecution>> {
        let mut stmt = conn.prepare(
            "SELECT id, job_execution_id, step_name, status, exit_code, exit_description, \
             read_count, write_count, filter_count, skip_count, commit_count, rollback_count, \
             start_time, end_time, failures, context \
             FROM step_executions WHERE job_execution_id = ?1 ORDER BY id",
        )?;

        type StepRow = (
            i64,
            i64,
            String,
            String,
            String,
            String,
            i64,
            i64,
            i64,
            i64,
            i64,
            i64,
            Option<String>,
            Option<String>,
            String,
            String,
        );

        let rows = stmt.query_map([job_execution_id], |row| {
            Ok::<StepRow, rusqlite::Error>((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
                row.get(6)?,
                row.get(7)?,
                row.get(8)?,
                row.get(9)?,
                row.get(10)?,
                row.get(11)?,
                row.get(12)?,
                row.get(13)?,
                row.get(14)?,
                row.get(15)?,
            ))
        })?;

        let mut steps = Vec::new();
        for row in rows {
            let (
                id,
                job_id,
                step_name,
                status,
                exit_code,
                exit_description,
                read_count,
                write_count,
                filter_count,
                skip_count,
                commit_count,
                rollback_count,
                start_time,
                end_time,
                failures,
                context,
            ) = row?;
            steps.push(StepExecution {
                id: ExecutionId::new(id),
                job_execution_id: ExecutionId::new(job_id),
                step_name,
                status: Self::parse_status(&status)?,
                exit_status: ExitStatus {
                    code: exit_code,
                    description: exit_description,
                },
                read_count: read_count as u64,
                write_count: write_count as u64,
                filter_count: filter_count as u64,
                skip_count: skip_count as u64,
                commit_count: commit_count as u64,
                rollback_count: rollback_count as u64,
                start_time: Self::sqlite_to_datetime(start_time.as_deref()),
                end_time: Self::sqlite_to_datetime(end_time.as_deref()),
                failures: serde_json::from_str(&failures)?,
                context: serde_json::from_str(&context)?,
            });
        }
        Ok(steps)
    }

    fn find_execution_locked(
        conn: &Connection,
        id: ExecutionId,
    ) -> error::Result<Option<JobExecution>> {
        let raw = conn
            .query_row(
                &format!(
                    "SELECT {JOB_EXECUTION_COLUMNS} FROM job_executions e \
                     JOIN job_instances i ON i.id = e.instance_id WHERE e.id = ?1"
                ),
                [id.value()],
                Self::read_job_execution_row,
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(StoreError::Sqlite(other)),
            })?;

        let Some(raw) = raw else { return Ok(None) };
        let mut execution = Self::hydrate_job_execution(raw)?;
        execution.steps = Self::load_step_executions(conn, execution.id.value())?;
        Ok(Some(execution))
    }
}

impl ExecutionStore for SqliteExecutionStore {
    fn create_job_execution(
        &self,
        job_name: &str,
        parameters: &JobParameters,
        allow_restart: bool,
    ) -> error::Result<JobExecution> {
        let conn = self.lock_conn()?;
        let instance_id = Self::find_or_create_instance(&conn, job_name, parameters)?;

        if let Some((_, status)) = Self::latest_execution_id(&conn, instance_id)? {
            if status == BatchStatus::Completed.as_str() && !allow_restart {
                return Err(StoreError::DuplicateInstance {
                    job_name: job_name.to_string(),
                });
            }
        }

        conn.execute(
            "INSERT INTO job_executions (instance_id, status) VALUES (?1, ?2)",
            rusqlite::params![instance_id.value(), BatchStatus::Starting.as_str()],
        )?;

        Ok(JobExecution {
            id: ExecutionId::new(conn.last_insert_rowid()),
            instance_id,
            job_name: job_name.to_string(),
            parameters: parameters.clone(),
            status: BatchStatus::Starting,
            exit_status: ExitStatus::unknown(),
            start_time: None,
            end_time: None,
            failures: Vec::new(),
            context: ExecutionContext::new(),
            steps: Vec::new(),
        })
    }

    fn create_step_execution(
        &self,
        job_execution_id: ExecutionId,
        step_name: &str,
    ) -> error::Result<StepExecution> {
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO step_executions (job_execution_id, step_name, status) \
             VALUES (?1, ?2, ?3)",
            rusqlite::params![
                job_execution_id.value(),
                step_name,
                BatchStatus::Starting.as_str()
            ],
        )?;

        Ok(StepExecution {
            id: ExecutionId::new(conn.last_insert_rowid()),
            job_execution_id,
            step_name: step_name.to_string(),
            status: BatchStatus::Starting,
            exit_status: ExitStatus::unknown(),
            read_count: 0,
            write_count: 0,
            filter_count: 0,
            skip_count: 0,
            commit_count: 0,
            rollback_count: 0,
            start_time: None,
            end_time: None,
            failures: Vec::new(),
            context: ExecutionContext::new(),
        })
    }

    fn update_job_execution(&self, execution: &JobExecution) -> error::Result<()> {
        let conn = self.lock_conn()?;
        conn.execute(
            "UPDATE job_executions SET status = ?1, exit_code = ?2, exit_description = ?3, \
             start_time = ?4, end_time = ?5, failures = ?6, context = ?7 WHERE id = ?8",
            rusqlite::params![
                execution.status.as_str(),
                execution.exit_status.code,
                execution.exit_status.description,
                Self::datetime_to_sqlite(execution.start_time),
                Self::datetime_to_sqlite(execution.end_time),
                serde_json::to_string(&execution.failures)?,
                serde_json::to_string(&execution.context)?,
                execution.id.value(),
            ],
        )?;
        Ok(())
    }

    #[allow(clippy::cast_possible_wrap)]
    fn update_step_execution(&self, execution: &StepExecution) -> error::Result<()> {
        let conn = self.lock_conn()?;
        conn.execute(
            "UPDATE step_executions SET status = ?1, exit_code = ?2, exit_description = ?3, \
             read_count = ?4, write_count = ?5, filter_count = ?6, skip_count = ?7, \
             commit_count = ?8, rollback_count = ?9, start_time = ?10, end_time = ?11, \
             failures = ?12, context = ?13 WHERE id = ?14",
            rusqlite::params![
                execution.status.as_str(),
                execution.exit_status.code,
                execution.exit_status.description,
                execution.read_count as i64,
                execution.write_count as i64,
                execution.filter_count as i64,
                execution.skip_count as i64,
                execution.commit_count as i64,
                execution.rollback_count as i64,
                Self::datetime_to_sqlite(execution.start_time),
                Self::datetime_to_sqlite(execution.end_time),
                serde_json::to_string(&execution.failures)?,
                serde_json::to_string(&execution.context)?,
                execution.id.value(),
            ],
        )?;
        Ok(())
    }

    fn find_execution(&self, id: ExecutionId) -> error::Result<Option<JobExecution>> {
        let conn = self.lock_conn()?;
        Self::find_execution_locked(&conn, id)
    }

    fn last_execution(
        &self,
        job_name: &str,
        parameters: &JobParameters,
    ) -> error::Result<Option<JobExecution>> {
        let conn = self.lock_conn()?;
        let key = parameters.instance_key();
        let instance_id: Option<i64> = conn
            .query_row(
                "SELECT id FROM job_instances WHERE job_name = ?1 AND instance_key = ?2",
                rusqlite::params![job_name, key],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(StoreError::Sqlite(other)),
            })?;

        let Some(instance_id) = instance_id else {
            return Ok(None);
        };
        match Self::latest_execution_id(&conn, JobInstanceId::new(instance_id))? {
            Some((execution_id, _)) => {
                Self::find_execution_locked(&conn, ExecutionId::new(execution_id))
            }
            None => Ok(None),
        }
    }

    fn list_executions(
        &self,
        job_name: Option<&str>,
        page: u64,
        size: u64,
    ) -> error::Result<ExecutionPage> {
        let conn = self.lock_conn()?;
        let size = size.max(1);

        #[allow(clippy::cast_sign_loss)]
        let total_elements: u64 = match job_name {
            Some(name) => conn.query_row(
                "SELECT COUNT(*) FROM job_executions e \
                 JOIN job_instances i ON i.id = e.instance_id WHERE i.job_name = ?1",
                [name],
                |row| row.get::<_, i64>(0),
            )? as u64,
            None => {
                conn.query_row("SELECT COUNT(*) FROM job_executions", [], |row| {
                    row.get::<_, i64>(0)
                })? as u64
            }
        };

        let offset = page.saturating_mul(size);
        let mut raw_rows = Vec::new();
        match job_name {
            Some(name) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {JOB_EXECUTION_COLUMNS} FROM job_executions e \
                     JOIN job_instances i ON i.id = e.instance_id \
                     WHERE i.job_name = ?1 ORDER BY e.id DESC LIMIT ?2 OFFSET ?3"
                ))?;
                let rows = stmt.query_map(
                    rusqlite::params![name, size, offset],
                    Self::read_job_execution_row,
                )?;
                for row in rows {
                    raw_rows.push(row?);
                }
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {JOB_EXECUTION_COLUMNS} FROM job_executions e \
                     JOIN job_instances i ON i.id = e.instance_id \
                     ORDER BY e.id DESC LIMIT ?1 OFFSET ?2"
                ))?;
                let rows = stmt.query_map(
                    rusqlite::params![size, offset],
                    Self::read_job_execution_row,
                )?;
                for row in rows {
                    raw_rows.push(row?);
                }
            }
        }

        let mut content = Vec::with_capacity(raw_rows.len());
        for raw in raw_rows {
            let mut execution = Self::hydrate_job_execution(raw)?;
            execution.steps = Self::load_step_executions(&conn, execution.id.value())?;
            content.push(execution);
        }

        Ok(ExecutionPage {
            content,
            total_elements,
            total_pages: total_elements.div_ceil(size),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chunkflow_types::BatchFailure;

    fn params(pairs: &[(&str, &str)]) -> JobParameters {
        let mut p = JobParameters::new();
        for (k, v) in pairs {
            p.insert(*k, *v);
        }
        p
    }

    // -----------------------------------------------------------------------
    // Instance identity
    // -----------------------------------------------------------------------

    #[test]
    fn same_parameters_share_an_instance() {
        let store = SqliteExecutionStore::in_memory().unwrap();
        let p = params(&[("file", "a.csv")]);

        let first = store.create_job_execution("import", &p, false).unwrap();
        let second = store.create_job_execution("import", &p, false).unwrap();
        assert_eq!(first.instance_id, second.instance_id);
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn different_parameters_create_new_instance() {
        let store = SqliteExecutionStore::in_memory().unwrap();
        let first = store
            .create_job_execution("import", &params(&[("file", "a.csv")]), false)
            .unwrap();
        let second = store
            .create_job_execution(
                "import",
                &params(&[("file", "a.csv"), ("timestamp", "t1")]),
                false,
            )
            .unwrap();
        assert_ne!(first.instance_id, second.instance_id);
    }

    #[test]
    fn same_parameters_different_job_are_independent() {
        let store = SqliteExecutionStore::in_memory().unwrap();
        let p = params(&[("file", "a.csv")]);
        let a = store.create_job_execution("import", &p, false).unwrap();
        let b = store.create_job_execution("export", &p, false).unwrap();
        assert_ne!(a.instance_id, b.instance_id);
    }

    // -----------------------------------------------------------------------
    // Restart rule
    // -----------------------------------------------------------------------

    #[test]
    fn completed_instance_rejects_relaunch() {
        let store = SqliteExecutionStore::in_memory().unwrap();
        let p = params(&[("file", "a.csv")]);

        let mut execution = store.create_job_execution("import", &p, false).unwrap();
        execution.transition(BatchStatus::Completed);
        store.update_job_execution(&execution).unwrap();

        let err = store
            .create_job_execution("import", &p, false)
            .expect_err("completed instance must reject relaunch");
        assert!(matches!(err, StoreError::DuplicateInstance { .. }));
    }

    #[test]
    fn completed_instance_allows_relaunch_with_override() {
        let store = SqliteExecutionStore::in_memory().unwrap();
        let p = params(&[("file", "a.csv")]);

        let mut execution = store.create_job_execution("import", &p, false).unwrap();
        execution.transition(BatchStatus::Completed);
        store.update_job_execution(&execution).unwrap();

        let restarted = store.create_job_execution("import", &p, true).unwrap();
        assert_eq!(restarted.instance_id, execution.instance_id);
    }

    #[test]
    fn failed_instance_allows_relaunch() {
        let store = SqliteExecutionStore::in_memory().unwrap();
        let p = params(&[("file", "a.csv")]);

        let mut execution = store.create_job_execution("import", &p, false).unwrap();
        execution.transition(BatchStatus::Failed);
        store.update_job_execution(&execution).unwrap();

        let retried = store.create_job_execution("import", &p, false).unwrap();
        assert_eq!(retried.instance_id, execution.instance_id);
    }

    // -----------------------------------------------------------------------
    // Persist and hydrate
    // -----------------------------------------------------------------------

    #[test]
    fn step_counters_and_context_roundtrip() {
        let store = SqliteExecutionStore::in_memory().unwrap();
        let job = store
            .create_job_execution("import", &params(&[]), false)
            .unwrap();
        let mut step = store.create_step_execution(job.id, "load").unwrap();

        step.transition(BatchStatus::Started);
        step.read_count = 25;
        step.write_count = 22;
        step.skip_count = 3;
        step.commit_count = 3;
        step.context.put_int("read.count", 25);
        step.record_failure(BatchFailure::new("skippable", "bad row 7"));
        store.update_step_execution(&step).unwrap();

        let loaded = store.find_execution(job.id).unwrap().unwrap();
        assert_eq!(loaded.steps.len(), 1);
        let loaded_step = &loaded.steps[0];
        assert_eq!(loaded_step.read_count, 25);
        assert_eq!(loaded_step.write_count, 22);
        assert_eq!(loaded_step.skip_count, 3);
        assert_eq!(loaded_step.commit_count, 3);
        assert_eq!(loaded_step.context.get_int("read.count"), Some(25));
        assert_eq!(loaded_step.failures.len(), 1);
        assert_eq!(loaded_step.failures[0].kind, "skippable");
    }

    #[test]
    fn counter_updates_visible_before_step_finishes() {
        let store = SqliteExecutionStore::in_memory().unwrap();
        let job = store
            .create_job_execution("import", &params(&[]), false)
            .unwrap();
        let mut step = store.create_step_execution(job.id, "load").unwrap();

        step.transition(BatchStatus::Started);
        step.read_count = 10;
        step.commit_count = 1;
        store.update_step_execution(&step).unwrap();

        // A concurrent query sees the in-flight counters.
        let seen = store.find_execution(job.id).unwrap().unwrap();
        assert_eq!(seen.steps[0].status, BatchStatus::Started);
        assert_eq!(seen.steps[0].read_count, 10);
    }

    #[test]
    fn find_execution_unknown_id_is_none() {
        let store = SqliteExecutionStore::in_memory().unwrap();
        assert!(store
            .find_execution(ExecutionId::new(999))
            .unwrap()
            .is_none());
    }

    #[test]
    fn job_failures_and_exit_roundtrip() {
        let store = SqliteExecutionStore::in_memory().unwrap();
        let mut job = store
            .create_job_execution("import", &params(&[]), false)
            .unwrap();
        job.transition(BatchStatus::Started);
        job.transition(BatchStatus::Failed);
        job.exit_status = ExitStatus::failed("sink unavailable");
        job.record_failure(BatchFailure::new("fatal", "sink unavailable"));
        job.start_time = Some(Utc::now());
        job.end_time = Some(Utc::now());
        store.update_job_execution(&job).unwrap();

        let loaded = store.find_execution(job.id).unwrap().unwrap();
        assert_eq!(loaded.status, BatchStatus::Failed);
        assert_eq!(loaded.exit_status.code, "FAILED");
        assert_eq!(loaded.exit_status.description, "sink unavailable");
        assert_eq!(loaded.failures.len(), 1);
        assert!(loaded.start_time.is_some());
        assert!(loaded.end_time.is_some());
    }

    // -----------------------------------------------------------------------
    // last_execution / listing
    // -----------------------------------------------------------------------

    #[test]
    fn last_execution_returns_latest() {
        let store = SqliteExecutionStore::in_memory().unwrap();
        let p = params(&[("file", "a.csv")]);

        let first = store.create_job_execution("import", &p, false).unwrap();
        let mut failed = first.clone();
        failed.transition(BatchStatus::Failed);
        store.update_job_execution(&failed).unwrap();

        let second = store.create_job_execution("import", &p, false).unwrap();
        let last = store.last_execution("import", &p).unwrap().unwrap();
        assert_eq!(last.id, second.id);
    }

    #[test]
    fn last_execution_unknown_instance_is_none() {
        let store = SqliteExecutionStore::in_memory().unwrap();
        assert!(store
            .last_execution("import", &params(&[("x", "y")]))
            .unwrap()
            .is_none());
    }

    #[test]
    fn list_executions_pages_newest_first() {
        let store = SqliteExecutionStore::in_memory().unwrap();
        for i in 0..5 {
            store
                .create_job_execution("import", &params(&[("run", &i.to_string())]), false)
                .unwrap();
        }

        let page = store.list_executions(None, 0, 2).unwrap();
        assert_eq!(page.total_elements, 5);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.content.len(), 2);
        assert!(page.content[0].id.value() > page.content[1].id.value());

        let last_page = store.list_executions(None, 2, 2).unwrap();
        assert_eq!(last_page.content.len(), 1);
    }

    #[test]
    fn list_executions_filters_by_job_name() {
        let store = SqliteExecutionStore::in_memory().unwrap();
        store
            .create_job_execution("import", &params(&[("a", "1")]), false)
            .unwrap();
        store
            .create_job_execution("export", &params(&[("b", "2")]), false)
            .unwrap();

        let page = store.list_executions(Some("import"), 0, 10).unwrap();
        assert_eq!(page.total_elements, 1);
        assert_eq!(page.content[0].job_name, "import");
    }

    #[test]
    fn datetime_conversion_roundtrip() {
        let formatted = SqliteExecutionStore::datetime_to_sqlite(Some(
            DateTime::parse_from_rfc3339("2026-01-15T10:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        ))
        .unwrap();
        assert_eq!(formatted, "2026-01-15 10:00:00");

        let back = SqliteExecutionStore::sqlite_to_datetime(Some(&formatted)).unwrap();
        assert_eq!(back.to_rfc3339(), "2026-01-15T10:00:00+00:00");
    }
}
