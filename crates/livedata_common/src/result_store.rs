//! Job result store - SQLite-backed job records and job registry
//!
//! Schema:
//! - job_results: one row per submitted job, updated as it runs
//! - job_registry: job types known to the service and whether they are enabled
//!
//! The retention sweeper only ever sees the `ResultStore` trait, so tests can
//! run it against an in-memory database.

use crate::error::{JobFailure, LivedataError, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;
use uuid::Uuid;

/// Default result database path
pub const RESULT_DB_PATH: &str = "/var/lib/livedata/results.db";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Success,
    Failure,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Success => "success",
            JobStatus::Failure => "failure",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "running" => Some(JobStatus::Running),
            "success" => Some(JobStatus::Success),
            "failure" => Some(JobStatus::Failure),
            _ => None,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, JobStatus::Success | JobStatus::Failure)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One job as seen by callers polling for results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResultRecord {
    pub id: Uuid,
    pub job_type: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Short human-readable outcome
    pub summary: Option<String>,
    /// Job-specific payload, set on success
    pub result: Option<Value>,
    pub failure: Option<JobFailure>,
}

impl JobResultRecord {
    pub fn pending(job_type: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_type: job_type.to_string(),
            status: JobStatus::Pending,
            created_at: now,
            completed_at: None,
            summary: None,
            result: None,
            failure: None,
        }
    }
}

/// Final state written when a job finishes
#[derive(Debug, Clone, PartialEq)]
pub enum JobCompletion {
    Success { summary: String, result: Value },
    Failure(JobFailure),
}

/// Storage contract used by the queue and the retention sweeper
pub trait ResultStore: Send + Sync {
    fn insert(&self, record: &JobResultRecord) -> Result<()>;

    fn mark_running(&self, id: &Uuid) -> Result<()>;

    fn complete(&self, id: &Uuid, completion: &JobCompletion, completed_at: DateTime<Utc>) -> Result<()>;

    fn get(&self, id: &Uuid) -> Result<Option<JobResultRecord>>;

    /// Successful records of `job_type` completed before `cutoff`
    fn count_expired(&self, job_type: &str, cutoff: DateTime<Utc>) -> Result<u64>;

    /// Delete expired records for every job type in one transaction.
    /// Returns deleted counts in the order of `job_types`.
    fn delete_expired(&self, job_types: &[&str], cutoff: DateTime<Utc>) -> Result<Vec<u64>>;
}

/// Job types known to the service
pub trait JobRegistry: Send + Sync {
    /// Returns true if the job type was newly registered
    fn register_job(&self, name: &str) -> Result<bool>;

    /// Returns true if the job type was newly enabled
    fn enable_job(&self, name: &str) -> Result<bool>;

    fn is_enabled(&self, name: &str) -> Result<bool>;
}

/// SQLite-backed result store
pub struct SqliteResultStore {
    conn: Mutex<Connection>,
}

impl SqliteResultStore {
    /// Open or create the database at its default location
    pub fn open() -> Result<Self> {
        Self::open_at(RESULT_DB_PATH)
    }

    /// Open at a specific path (for testing or daemon)
    pub fn open_at<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    LivedataError::Config(format!("cannot create {}: {}", parent.display(), e))
                })?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS job_results (
                id TEXT PRIMARY KEY,
                job_type TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                completed_at TEXT,
                summary TEXT,
                result TEXT,
                failure TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_results_type_status_done
                ON job_results(job_type, status, completed_at);

            CREATE TABLE IF NOT EXISTS job_registry (
                name TEXT PRIMARY KEY,
                enabled INTEGER NOT NULL DEFAULT 0
            );
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panic while holding the lock leaves the connection itself usable
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Total number of stored records
    pub fn count_all(&self) -> Result<u64> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM job_results", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<JobResultRecord> {
    let id: String = row.get(0)?;
    let status: String = row.get(2)?;
    let result: Option<String> = row.get(6)?;
    let failure: Option<String> = row.get(7)?;

    Ok(JobResultRecord {
        id: Uuid::parse_str(&id).map_err(|e| conversion_error(0, e))?,
        job_type: row.get(1)?,
        status: JobStatus::parse(&status).ok_or_else(|| {
            conversion_error(2, LivedataError::Config(format!("unknown job status '{}'", status)))
        })?,
        created_at: row.get(3)?,
        completed_at: row.get(4)?,
        summary: row.get(5)?,
        result: result
            .map(|s| serde_json::from_str(&s))
            .transpose()
            .map_err(|e| conversion_error(6, e))?,
        failure: failure
            .map(|s| serde_json::from_str(&s))
            .transpose()
            .map_err(|e| conversion_error(7, e))?,
    })
}

fn conversion_error<E>(column: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(err))
}

impl ResultStore for SqliteResultStore {
    fn insert(&self, record: &JobResultRecord) -> Result<()> {
        let result = record.result.as_ref().map(serde_json::to_string).transpose()?;
        let failure = record.failure.as_ref().map(serde_json::to_string).transpose()?;
        self.conn().execute(
            "INSERT INTO job_results (id, job_type, status, created_at, completed_at, summary, result, failure)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.id.to_string(),
                &record.job_type,
                record.status.as_str(),
                record.created_at,
                record.completed_at,
                &record.summary,
                result,
                failure
            ],
        )?;
        Ok(())
    }

    fn mark_running(&self, id: &Uuid) -> Result<()> {
        self.conn().execute(
            "UPDATE job_results SET status = ?2 WHERE id = ?1",
            params![id.to_string(), JobStatus::Running.as_str()],
        )?;
        Ok(())
    }

    fn complete(&self, id: &Uuid, completion: &JobCompletion, completed_at: DateTime<Utc>) -> Result<()> {
        let (status, summary, result, failure) = match completion {
            JobCompletion::Success { summary, result } => (
                JobStatus::Success,
                Some(summary.clone()),
                Some(serde_json::to_string(result)?),
                None,
            ),
            JobCompletion::Failure(failure) => (
                JobStatus::Failure,
                Some(failure.message.clone()),
                None,
                Some(serde_json::to_string(failure)?),
            ),
        };
        let updated = self.conn().execute(
            "UPDATE job_results
             SET status = ?2, completed_at = ?3, summary = ?4, result = ?5, failure = ?6
             WHERE id = ?1",
            params![id.to_string(), status.as_str(), completed_at, summary, result, failure],
        )?;
        if updated == 0 {
            return Err(LivedataError::NotFound {
                kind: "Job",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    fn get(&self, id: &Uuid) -> Result<Option<JobResultRecord>> {
        let record = self
            .conn()
            .query_row(
                "SELECT id, job_type, status, created_at, completed_at, summary, result, failure
                 FROM job_results WHERE id = ?1",
                params![id.to_string()],
                record_from_row,
            )
            .optional()?;
        Ok(record)
    }

    fn count_expired(&self, job_type: &str, cutoff: DateTime<Utc>) -> Result<u64> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM job_results
             WHERE job_type = ?1 AND status = ?2 AND completed_at < ?3",
            params![job_type, JobStatus::Success.as_str(), cutoff],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn delete_expired(&self, job_types: &[&str], cutoff: DateTime<Utc>) -> Result<Vec<u64>> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let mut deleted = Vec::with_capacity(job_types.len());
        {
            let mut stmt = tx.prepare(
                "DELETE FROM job_results
                 WHERE job_type = ?1 AND status = ?2 AND completed_at < ?3",
            )?;
            for job_type in job_types {
                let n = stmt.execute(params![job_type, JobStatus::Success.as_str(), cutoff])?;
                debug!("Deleted {} expired '{}' results", n, job_type);
                deleted.push(n as u64);
            }
        }
        tx.commit()?;
        Ok(deleted)
    }
}

impl JobRegistry for SqliteResultStore {
    fn register_job(&self, name: &str) -> Result<bool> {
        let inserted = self.conn().execute(
            "INSERT OR IGNORE INTO job_registry (name, enabled) VALUES (?1, 0)",
            params![name],
        )?;
        Ok(inserted > 0)
    }

    fn enable_job(&self, name: &str) -> Result<bool> {
        let updated = self.conn().execute(
            "UPDATE job_registry SET enabled = 1 WHERE name = ?1 AND enabled = 0",
            params![name],
        )?;
        Ok(updated > 0)
    }

    fn is_enabled(&self, name: &str) -> Result<bool> {
        let enabled: Option<bool> = self
            .conn()
            .query_row(
                "SELECT enabled FROM job_registry WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(enabled.unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;
    use tempfile::TempDir;

    fn finished(store: &SqliteResultStore, job_type: &str, completed_at: DateTime<Utc>) -> Uuid {
        let record = JobResultRecord::pending(job_type, completed_at);
        store.insert(&record).unwrap();
        store
            .complete(
                &record.id,
                &JobCompletion::Success {
                    summary: "ok".to_string(),
                    result: json!([]),
                },
                completed_at,
            )
            .unwrap();
        record.id
    }

    #[test]
    fn test_record_lifecycle() {
        let store = SqliteResultStore::open_in_memory().unwrap();
        let now = Utc::now();
        let record = JobResultRecord::pending("query", now);
        store.insert(&record).unwrap();
        assert_eq!(store.get(&record.id).unwrap().unwrap().status, JobStatus::Pending);

        store.mark_running(&record.id).unwrap();
        assert_eq!(store.get(&record.id).unwrap().unwrap().status, JobStatus::Running);

        let failure = LivedataError::ConnectionError {
            address: "10.0.0.1".to_string(),
            reason: "timed out".to_string(),
        }
        .to_failure();
        store
            .complete(&record.id, &JobCompletion::Failure(failure.clone()), now)
            .unwrap();
        let stored = store.get(&record.id).unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failure);
        assert_eq!(stored.failure, Some(failure));
        assert!(stored.result.is_none());
        assert!(stored.completed_at.is_some());
    }

    #[test]
    fn test_get_unknown_is_none() {
        let store = SqliteResultStore::open_in_memory().unwrap();
        assert!(store.get(&Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn test_complete_unknown_is_not_found() {
        let store = SqliteResultStore::open_in_memory().unwrap();
        let err = store
            .complete(
                &Uuid::new_v4(),
                &JobCompletion::Success {
                    summary: String::new(),
                    result: Value::Null,
                },
                Utc::now(),
            )
            .unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[test]
    fn test_expiry_only_counts_old_successes() {
        let store = SqliteResultStore::open_in_memory().unwrap();
        let now = Utc::now();
        let cutoff = now - Duration::days(30);

        finished(&store, "query", now - Duration::days(40));
        finished(&store, "query", now - Duration::days(1));
        finished(&store, "cleanup", now - Duration::days(31));
        // Old but failed, must survive
        let failed = JobResultRecord::pending("query", now - Duration::days(60));
        store.insert(&failed).unwrap();
        store
            .complete(
                &failed.id,
                &JobCompletion::Failure(LivedataError::TimeLimitExceeded(60).to_failure()),
                now - Duration::days(60),
            )
            .unwrap();

        assert_eq!(store.count_expired("query", cutoff).unwrap(), 1);
        assert_eq!(store.count_expired("cleanup", cutoff).unwrap(), 1);

        let deleted = store.delete_expired(&["query", "cleanup"], cutoff).unwrap();
        assert_eq!(deleted, vec![1, 1]);
        assert_eq!(store.count_all().unwrap(), 2);
        assert!(store.get(&failed.id).unwrap().is_some());
    }

    #[test]
    fn test_registry() {
        let store = SqliteResultStore::open_in_memory().unwrap();
        assert!(!store.is_enabled("query").unwrap());
        assert!(store.register_job("query").unwrap());
        assert!(!store.register_job("query").unwrap());
        assert!(!store.is_enabled("query").unwrap());
        assert!(store.enable_job("query").unwrap());
        assert!(!store.enable_job("query").unwrap());
        assert!(store.is_enabled("query").unwrap());
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("results.db");
        let id = {
            let store = SqliteResultStore::open_at(&path).unwrap();
            finished(&store, "query", Utc::now())
        };
        let store = SqliteResultStore::open_at(&path).unwrap();
        let record = store.get(&id).unwrap().unwrap();
        assert_eq!(record.status, JobStatus::Success);
        assert_eq!(record.summary.as_deref(), Some("ok"));
    }
}
