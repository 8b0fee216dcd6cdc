//! SQLite job store.
//!
//! Several worker processes may share one database file. The claim runs in a
//! `BEGIN IMMEDIATE` transaction, so the write lock is taken before the
//! candidate row is selected and no two connections can claim the same job.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{OptionalExtension, Row, TransactionBehavior, params};
use serde_json::{Map, Value};
use uuid::Uuid;

use socialhands_state::Database;

use crate::error::QueueError;
use crate::job::{Job, JobCounts, JobError, JobFilter, JobOutcome, JobResult, JobStatus, SlotRef};
use crate::store::JobStore;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS jobs (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    job_type TEXT NOT NULL,
    data TEXT NOT NULL,
    status TEXT NOT NULL,
    priority INTEGER NOT NULL,
    attempts INTEGER NOT NULL,
    max_attempts INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    slot_date TEXT,
    slot_id TEXT,
    result TEXT,
    error TEXT
);

CREATE INDEX IF NOT EXISTS idx_jobs_claim ON jobs(status, priority DESC, created_at, seq);
"#;

const COLUMNS: &str = "id, job_type, data, status, priority, attempts, max_attempts, \
                       created_at, updated_at, slot_date, slot_id, result, error";

/// Outcome of a status-guarded update, resolved into a `QueueError` outside
/// the connection thread.
enum Guarded<T> {
    Done(T),
    Missing,
    WrongStatus(JobStatus),
}

/// SQLite-backed job store.
pub struct SqliteJobStore {
    db: Database,
}

impl SqliteJobStore {
    /// Create the store, initializing its table if needed.
    pub async fn new(db: Database) -> Result<Self, QueueError> {
        db.connection()
            .call(|conn| {
                conn.execute_batch(SCHEMA)?;
                Ok(())
            })
            .await?;
        Ok(Self { db })
    }
}

/// Fixed-width UTC timestamps so text order equals time order.
fn timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn conversion_error<E>(idx: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn parse_timestamp(idx: usize, text: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn parse_json<T: serde::de::DeserializeOwned>(idx: usize, text: &str) -> rusqlite::Result<T> {
    serde_json::from_str(text).map_err(|e| conversion_error(idx, e))
}

fn parse_status(idx: usize, text: &str) -> rusqlite::Result<JobStatus> {
    text.parse::<JobStatus>().map_err(|e| {
        conversion_error(
            idx,
            std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        )
    })
}

fn row_to_job(row: &Row<'_>) -> rusqlite::Result<Job> {
    let id: String = row.get(0)?;
    let data: String = row.get(2)?;
    let status: String = row.get(3)?;
    let created_at: String = row.get(7)?;
    let updated_at: String = row.get(8)?;
    let slot_date: Option<String> = row.get(9)?;
    let slot_id: Option<String> = row.get(10)?;
    let result: Option<String> = row.get(11)?;
    let error: Option<String> = row.get(12)?;

    let slot = match (slot_date, slot_id) {
        (Some(date), Some(slot_id)) => Some(SlotRef {
            date: NaiveDate::parse_from_str(&date, "%Y-%m-%d")
                .map_err(|e| conversion_error(9, e))?,
            slot_id,
        }),
        _ => None,
    };

    Ok(Job {
        id: Uuid::parse_str(&id).map_err(|e| conversion_error(0, e))?,
        job_type: row.get(1)?,
        data: parse_json(2, &data)?,
        status: parse_status(3, &status)?,
        priority: row.get(4)?,
        attempts: row.get(5)?,
        max_attempts: row.get(6)?,
        created_at: parse_timestamp(7, &created_at)?,
        updated_at: parse_timestamp(8, &updated_at)?,
        slot,
        result: result
            .map(|r| parse_json::<JobResult>(11, &r))
            .transpose()?,
        error: error.map(|e| parse_json::<JobError>(12, &e)).transpose()?,
    })
}

fn load_by_id(conn: &rusqlite::Connection, id: &str) -> rusqlite::Result<Option<Job>> {
    conn.query_row(
        &format!("SELECT {} FROM jobs WHERE id = ?1", COLUMNS),
        [id],
        row_to_job,
    )
    .optional()
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, QueueError> {
    serde_json::to_string(value).map_err(|e| QueueError::Database(e.to_string()))
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn insert(&self, job: &Job) -> Result<(), QueueError> {
        let id = job.id.to_string();
        let job_type = job.job_type.clone();
        let data = to_json(&job.data)?;
        let status = job.status.as_str();
        let priority = job.priority;
        let attempts = job.attempts;
        let max_attempts = job.max_attempts;
        let created_at = timestamp(&job.created_at);
        let updated_at = timestamp(&job.updated_at);
        let slot_date = job.slot.as_ref().map(|s| s.date.format("%Y-%m-%d").to_string());
        let slot_id = job.slot.as_ref().map(|s| s.slot_id.clone());
        let result = job.result.as_ref().map(to_json).transpose()?;
        let error = job.error.as_ref().map(to_json).transpose()?;

        self.db
            .connection()
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO jobs (id, job_type, data, status, priority, attempts, max_attempts,
                     created_at, updated_at, slot_date, slot_id, result, error)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                    params![
                        id, job_type, data, status, priority, attempts, max_attempts,
                        created_at, updated_at, slot_date, slot_id, result, error
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    async fn claim_next(&self) -> Result<Option<Job>, QueueError> {
        let now = timestamp(&Utc::now());
        let claimed = self
            .db
            .connection()
            .call(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let claimed = {
                    let seq: Option<i64> = tx
                        .query_row(
                            "SELECT seq FROM jobs WHERE status = 'pending'
                             ORDER BY priority DESC, created_at ASC, seq ASC LIMIT 1",
                            [],
                            |row| row.get(0),
                        )
                        .optional()?;
                    match seq {
                        Some(seq) => {
                            tx.execute(
                                "UPDATE jobs SET status = 'running', attempts = attempts + 1,
                                 updated_at = ?1 WHERE seq = ?2 AND status = 'pending'",
                                params![now, seq],
                            )?;
                            Some(tx.query_row(
                                &format!("SELECT {} FROM jobs WHERE seq = ?1", COLUMNS),
                                [seq],
                                row_to_job,
                            )?)
                        }
                        None => None,
                    }
                };
                tx.commit()?;
                Ok(claimed)
            })
            .await?;
        Ok(claimed)
    }

    async fn record_attempt(
        &self,
        id: Uuid,
        error: &JobError,
        pinned: &Map<String, Value>,
    ) -> Result<Job, QueueError> {
        let key = id.to_string();
        let error = to_json(error)?;
        let pinned = pinned.clone();
        let now = timestamp(&Utc::now());
        let guarded = self
            .db
            .connection()
            .call(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let outcome = match load_by_id(&tx, &key)? {
                    None => Guarded::Missing,
                    Some(job) if job.status != JobStatus::Running => {
                        Guarded::WrongStatus(job.status)
                    }
                    Some(mut job) => {
                        job.merge_data(&pinned);
                        let data =
                            serde_json::to_string(&job.data).map_err(|e| conversion_error(2, e))?;
                        tx.execute(
                            "UPDATE jobs SET attempts = attempts + 1, error = ?1, data = ?2,
                             updated_at = ?3 WHERE id = ?4 AND status = 'running'",
                            params![error, data, now, key],
                        )?;
                        match load_by_id(&tx, &key)? {
                            Some(job) => Guarded::Done(job),
                            None => Guarded::Missing,
                        }
                    }
                };
                tx.commit()?;
                Ok(outcome)
            })
            .await?;

        match guarded {
            Guarded::Done(job) => Ok(job),
            Guarded::Missing => Err(QueueError::JobNotFound(id)),
            Guarded::WrongStatus(from) => Err(QueueError::InvalidTransition {
                id,
                from,
                to: JobStatus::Running,
            }),
        }
    }

    async fn finish(&self, id: Uuid, outcome: &JobOutcome) -> Result<bool, QueueError> {
        let key = id.to_string();
        let to = outcome.status();
        let (result, error) = match outcome {
            JobOutcome::Completed(result) => (Some(to_json(result)?), None),
            JobOutcome::Failed(error) => (None, Some(to_json(error)?)),
        };
        let now = timestamp(&Utc::now());

        let guarded = self
            .db
            .connection()
            .call(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let current: Option<String> = tx
                    .query_row("SELECT status FROM jobs WHERE id = ?1", [&key], |row| {
                        row.get(0)
                    })
                    .optional()?;
                let outcome = match current {
                    None => Guarded::Missing,
                    Some(status) => match parse_status(0, &status)? {
                        JobStatus::Running => {
                            // Keep an earlier transient error on a completed job.
                            tx.execute(
                                "UPDATE jobs SET status = ?1, result = COALESCE(?2, result),
                                 error = COALESCE(?3, error), updated_at = ?4
                                 WHERE id = ?5 AND status = 'running'",
                                params![to.as_str(), result, error, now, key],
                            )?;
                            Guarded::Done(true)
                        }
                        s if s.is_terminal() => Guarded::Done(false),
                        s => Guarded::WrongStatus(s),
                    },
                };
                tx.commit()?;
                Ok(outcome)
            })
            .await?;

        match guarded {
            Guarded::Done(changed) => Ok(changed),
            Guarded::Missing => Err(QueueError::JobNotFound(id)),
            Guarded::WrongStatus(from) => Err(QueueError::InvalidTransition { id, from, to }),
        }
    }

    async fn get(&self, id: Uuid) -> Result<Option<Job>, QueueError> {
        let key = id.to_string();
        let job = self
            .db
            .connection()
            .call(move |conn| Ok(load_by_id(conn, &key)?))
            .await?;
        Ok(job)
    }

    async fn list(&self, filter: &JobFilter) -> Result<Vec<Job>, QueueError> {
        let status = filter.status.map(|s| s.as_str().to_string());
        let limit = filter.limit as i64;
        let jobs = self
            .db
            .connection()
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM jobs WHERE (?1 IS NULL OR status = ?1)
                     ORDER BY created_at DESC, seq DESC LIMIT ?2",
                    COLUMNS
                ))?;
                let jobs = stmt
                    .query_map(params![status, limit], row_to_job)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(jobs)
            })
            .await?;
        Ok(jobs)
    }

    async fn counts(&self) -> Result<JobCounts, QueueError> {
        let rows = self
            .db
            .connection()
            .call(|conn| {
                let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM jobs GROUP BY status")?;
                let rows = stmt
                    .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;

        let mut counts = JobCounts::default();
        for (status, n) in rows {
            let status = status
                .parse::<JobStatus>()
                .map_err(QueueError::Database)?;
            counts.add(status, n as u64);
        }
        Ok(counts)
    }

    async fn purge_terminal(&self) -> Result<u64, QueueError> {
        let removed = self
            .db
            .connection()
            .call(|conn| {
                let n = conn.execute(
                    "DELETE FROM jobs WHERE status IN ('completed', 'failed')",
                    [],
                )?;
                Ok(n)
            })
            .await?;
        Ok(removed as u64)
    }

    async fn fail_stale(
        &self,
        updated_before: DateTime<Utc>,
        error: &JobError,
    ) -> Result<Vec<Uuid>, QueueError> {
        let cutoff = timestamp(&updated_before);
        let error = to_json(error)?;
        let now = timestamp(&Utc::now());
        let ids = self
            .db
            .connection()
            .call(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let ids = {
                    let mut stmt = tx.prepare(
                        "SELECT id FROM jobs WHERE status = 'running' AND updated_at < ?1",
                    )?;
                    stmt.query_map([&cutoff], |row| row.get::<_, String>(0))?
                        .collect::<rusqlite::Result<Vec<_>>>()?
                };
                tx.execute(
                    "UPDATE jobs SET status = 'failed', error = ?1, updated_at = ?2
                     WHERE status = 'running' AND updated_at < ?3",
                    params![error, now, cutoff],
                )?;
                tx.commit()?;
                ids.iter()
                    .map(|id| Uuid::parse_str(id).map_err(|e| conversion_error(0, e)))
                    .collect::<rusqlite::Result<Vec<_>>>()
                    .map_err(Into::into)
            })
            .await?;
        Ok(ids)
    }
}
