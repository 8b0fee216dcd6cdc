//! Job queue gated by the dispatcher flag.

use chrono::{TimeDelta, Utc};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use socialhands_config::QueueConfig;
use socialhands_state::ControlStore;

use crate::error::QueueError;
use crate::job::{Job, JobCounts, JobError, JobFilter, JobOutcome, JobResult, SlotRef};
use crate::store::JobStore;

/// Producer and consumer facade over a [`JobStore`].
pub struct JobQueue {
    store: Arc<dyn JobStore>,
    control: ControlStore,
    max_attempts: u32,
}

impl JobQueue {
    pub fn new(store: Arc<dyn JobStore>, control: ControlStore, config: &QueueConfig) -> Self {
        Self {
            store,
            control,
            max_attempts: config.max_attempts.max(1),
        }
    }

    pub fn control(&self) -> &ControlStore {
        &self.control
    }

    /// Create a pending job.
    pub async fn enqueue(
        &self,
        job_type: &str,
        data: Value,
        priority: i32,
    ) -> Result<Uuid, QueueError> {
        self.insert(self.build(job_type, data, priority)?).await
    }

    /// Create a pending job on behalf of a schedule slot.
    pub async fn enqueue_for_slot(
        &self,
        job_type: &str,
        data: Value,
        priority: i32,
        slot: SlotRef,
    ) -> Result<Uuid, QueueError> {
        self.insert(self.build(job_type, data, priority)?.with_slot(slot))
            .await
    }

    fn build(&self, job_type: &str, data: Value, priority: i32) -> Result<Job, QueueError> {
        let job_type = job_type.trim();
        if job_type.is_empty() {
            return Err(QueueError::InvalidJob("job type cannot be empty".to_string()));
        }
        Ok(Job::new(job_type, data, priority, self.max_attempts))
    }

    async fn insert(&self, job: Job) -> Result<Uuid, QueueError> {
        self.store.insert(&job).await?;
        info!(
            "Enqueued job {} (type={}, priority={})",
            job.id, job.job_type, job.priority
        );
        Ok(job.id)
    }

    /// Claim the next job, or `None` while the dispatcher is paused.
    pub async fn claim_next(&self) -> Result<Option<Job>, QueueError> {
        if !self.control.dispatcher_active().await? {
            debug!("Dispatcher paused, not claiming");
            return Ok(None);
        }
        self.store.claim_next().await
    }

    pub async fn record_attempt(
        &self,
        id: Uuid,
        error: &JobError,
        pinned: &Map<String, Value>,
    ) -> Result<Job, QueueError> {
        self.store.record_attempt(id, error, pinned).await
    }

    /// Mark a running job completed. `false` if it was already terminal.
    pub async fn complete(&self, id: Uuid, result: JobResult) -> Result<bool, QueueError> {
        self.store.finish(id, &JobOutcome::Completed(result)).await
    }

    /// Mark a running job failed. `false` if it was already terminal.
    pub async fn fail(&self, id: Uuid, error: JobError) -> Result<bool, QueueError> {
        self.store.finish(id, &JobOutcome::Failed(error)).await
    }

    pub async fn finish(&self, id: Uuid, outcome: &JobOutcome) -> Result<bool, QueueError> {
        self.store.finish(id, outcome).await
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Job>, QueueError> {
        self.store.get(id).await
    }

    pub async fn list(&self, filter: &JobFilter) -> Result<Vec<Job>, QueueError> {
        self.store.list(filter).await
    }

    pub async fn counts(&self) -> Result<JobCounts, QueueError> {
        self.store.counts().await
    }

    /// Delete completed and failed jobs.
    pub async fn purge_terminal(&self) -> Result<u64, QueueError> {
        let removed = self.store.purge_terminal().await?;
        info!("Purged {} terminal jobs", removed);
        Ok(removed)
    }

    /// Fail `running` jobs that saw no update for `older_than`. Their worker
    /// died or lost the store before it could record the outcome.
    pub async fn reap_stale(&self, older_than: Duration) -> Result<Vec<Uuid>, QueueError> {
        let Some(cutoff) = TimeDelta::from_std(older_than)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age))
        else {
            return Ok(Vec::new());
        };
        let error = JobError::transient(format!(
            "abandoned while running (no update for {}s)",
            older_than.as_secs()
        ));
        let reaped = self.store.fail_stale(cutoff, &error).await?;
        for id in &reaped {
            warn!("Job {} was stuck in running, marked failed", id);
        }
        Ok(reaped)
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
