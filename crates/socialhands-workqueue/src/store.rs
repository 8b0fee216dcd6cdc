//! Job persistence store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::cmp::Reverse;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::QueueError;
use crate::job::{Job, JobCounts, JobError, JobFilter, JobOutcome, JobStatus};

/// Job store trait.
///
/// Every mutating method is a single atomic step against the backing store;
/// callers never read a job and write it back.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a new job.
    async fn insert(&self, job: &Job) -> Result<(), QueueError>;

    /// Move the best pending job to `running` and return it.
    ///
    /// Order: highest priority, then earliest `created_at`, then insertion
    /// order. Each pending job is handed to at most one caller.
    async fn claim_next(&self) -> Result<Option<Job>, QueueError>;

    /// Count another attempt on a running job, remember its error and merge
    /// `pinned` into its payload.
    async fn record_attempt(
        &self,
        id: Uuid,
        error: &JobError,
        pinned: &Map<String, Value>,
    ) -> Result<Job, QueueError>;

    /// Terminal transition from `running`.
    ///
    /// Returns `false` without changing anything when the job is already
    /// terminal.
    async fn finish(&self, id: Uuid, outcome: &JobOutcome) -> Result<bool, QueueError>;

    /// Load a job by ID.
    async fn get(&self, id: Uuid) -> Result<Option<Job>, QueueError>;

    /// List jobs, newest first.
    async fn list(&self, filter: &JobFilter) -> Result<Vec<Job>, QueueError>;

    /// Per-status totals.
    async fn counts(&self) -> Result<JobCounts, QueueError>;

    /// Delete completed and failed jobs. Returns the number removed.
    async fn purge_terminal(&self) -> Result<u64, QueueError>;

    /// Fail every `running` job last updated before `updated_before`.
    /// Returns the IDs of the jobs failed.
    async fn fail_stale(
        &self,
        updated_before: DateTime<Utc>,
        error: &JobError,
    ) -> Result<Vec<Uuid>, QueueError>;
}

/// In-memory job store for testing.
pub struct MemoryJobStore {
    // Kept in insertion order, which is the final claim tie-breaker.
    jobs: RwLock<Vec<Job>>,
    offline: AtomicBool,
}

impl MemoryJobStore {
    /// Create a new memory store.
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(Vec::new()),
            offline: AtomicBool::new(false),
        }
    }

    /// Simulate an unreachable store: every call fails until reset.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<(), QueueError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(QueueError::Database("job store offline".to_string()));
        }
        Ok(())
    }
}

impl Default for MemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert(&self, job: &Job) -> Result<(), QueueError> {
        self.check_online()?;
        let mut jobs = self.jobs.write().await;
        if jobs.iter().any(|j| j.id == job.id) {
            return Err(QueueError::InvalidJob(format!("duplicate job id {}", job.id)));
        }
        jobs.push(job.clone());
        Ok(())
    }

    async fn claim_next(&self) -> Result<Option<Job>, QueueError> {
        self.check_online()?;
        let mut jobs = self.jobs.write().await;
        let best = jobs
            .iter()
            .enumerate()
            .filter(|(_, j)| j.status == JobStatus::Pending)
            .max_by_key(|(idx, j)| (j.priority, Reverse(j.created_at), Reverse(*idx)))
            .map(|(idx, _)| idx);

        Ok(best.map(|idx| {
            let job = &mut jobs[idx];
            job.status = JobStatus::Running;
            job.attempts += 1;
            job.updated_at = Utc::now();
            job.clone()
        }))
    }

    async fn record_attempt(
        &self,
        id: Uuid,
        error: &JobError,
        pinned: &Map<String, Value>,
    ) -> Result<Job, QueueError> {
        self.check_online()?;
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .iter_mut()
            .find(|j| j.id == id)
            .ok_or(QueueError::JobNotFound(id))?;
        if job.status != JobStatus::Running {
            return Err(QueueError::InvalidTransition {
                id,
                from: job.status,
                to: JobStatus::Running,
            });
        }
        job.attempts += 1;
        job.error = Some(error.clone());
        job.merge_data(pinned);
        job.updated_at = Utc::now();
        Ok(job.clone())
    }

    async fn finish(&self, id: Uuid, outcome: &JobOutcome) -> Result<bool, QueueError> {
        self.check_online()?;
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .iter_mut()
            .find(|j| j.id == id)
            .ok_or(QueueError::JobNotFound(id))?;
        match job.status {
            JobStatus::Running => {}
            status if status.is_terminal() => return Ok(false),
            from => {
                return Err(QueueError::InvalidTransition {
                    id,
                    from,
                    to: outcome.status(),
                });
            }
        }
        job.status = outcome.status();
        match outcome {
            JobOutcome::Completed(result) => job.result = Some(result.clone()),
            JobOutcome::Failed(error) => job.error = Some(error.clone()),
        }
        job.updated_at = Utc::now();
        Ok(true)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Job>, QueueError> {
        self.check_online()?;
        let jobs = self.jobs.read().await;
        Ok(jobs.iter().find(|j| j.id == id).cloned())
    }

    async fn list(&self, filter: &JobFilter) -> Result<Vec<Job>, QueueError> {
        self.check_online()?;
        let jobs = self.jobs.read().await;
        Ok(jobs
            .iter()
            .rev()
            .filter(|j| filter.status.is_none_or(|s| j.status == s))
            .take(filter.limit)
            .cloned()
            .collect())
    }

    async fn counts(&self) -> Result<JobCounts, QueueError> {
        self.check_online()?;
        let jobs = self.jobs.read().await;
        let mut counts = JobCounts::default();
        for job in jobs.iter() {
            counts.add(job.status, 1);
        }
        Ok(counts)
    }

    async fn purge_terminal(&self) -> Result<u64, QueueError> {
        self.check_online()?;
        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|j| !j.status.is_terminal());
        Ok((before - jobs.len()) as u64)
    }

    async fn fail_stale(
        &self,
        updated_before: DateTime<Utc>,
        error: &JobError,
    ) -> Result<Vec<Uuid>, QueueError> {
        self.check_online()?;
        let mut jobs = self.jobs.write().await;
        let now = Utc::now();
        Ok(jobs
            .iter_mut()
            .filter(|j| j.status == JobStatus::Running && j.updated_at < updated_before)
            .map(|job| {
                job.status = JobStatus::Failed;
                job.error = Some(error.clone());
                job.updated_at = now;
                job.id
            })
            .collect())
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
