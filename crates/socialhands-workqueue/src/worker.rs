//! Execution engine: claims jobs and runs their handlers.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use socialhands_config::QueueConfig;

use crate::error::QueueError;
use crate::handler::{HandlerError, HandlerRegistry, JobContext};
use crate::job::{Job, JobOutcome};
use crate::queue::JobQueue;

/// Tries per job-state write before the worker gives the job up to the reaper.
const STORE_WRITE_ATTEMPTS: u32 = 5;

/// Notified after a job reaches a terminal status.
#[async_trait]
pub trait JobListener: Send + Sync {
    async fn on_job_finished(&self, job: &Job);
}

/// Exponential backoff between attempts of one claim.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &QueueConfig) -> Self {
        Self {
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
            max_delay: Duration::from_millis(config.retry_max_delay_ms),
        }
    }

    /// Delay after attempt number `attempt` (1-based) failed.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exp)
            .min(self.max_delay)
    }
}

/// A worker polling the queue and executing claimed jobs one at a time.
pub struct Worker {
    id: String,
    queue: Arc<JobQueue>,
    registry: Arc<HandlerRegistry>,
    listeners: Vec<Arc<dyn JobListener>>,
    retry: RetryPolicy,
    poll_interval: Duration,
    job_timeout: Duration,
    stale_after: Duration,
    jobs_processed: Arc<AtomicU64>,
}

impl Worker {
    pub fn new(
        id: impl Into<String>,
        queue: Arc<JobQueue>,
        registry: Arc<HandlerRegistry>,
        config: &QueueConfig,
    ) -> Self {
        let retry = RetryPolicy::from_config(config);
        let job_timeout = Duration::from_secs(config.job_timeout_secs);
        // No live worker leaves a job without an update for this long.
        let stale_after = job_timeout
            .saturating_mul(config.max_attempts.max(1))
            .saturating_add(retry.max_delay);
        Self {
            id: id.into(),
            queue,
            registry,
            listeners: Vec::new(),
            retry,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            job_timeout,
            stale_after,
            jobs_processed: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Add a listener for terminal job transitions.
    pub fn with_listener(mut self, listener: Arc<dyn JobListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Shared counter of jobs this worker finished, read by the heartbeat.
    pub fn jobs_processed(&self) -> Arc<AtomicU64> {
        self.jobs_processed.clone()
    }

    /// Claim and execute at most one job. Returns whether a job was claimed.
    pub async fn run_once(&self) -> Result<bool, QueueError> {
        match self.queue.claim_next().await? {
            Some(job) => {
                self.execute(job).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Run a claimed job to a terminal status and return its final state.
    pub async fn execute(&self, mut job: Job) -> Result<Job, QueueError> {
        info!(
            "Worker {} running job {} (type={}, attempt {}/{})",
            self.id, job.id, job.job_type, job.attempts, job.max_attempts
        );

        let Some(handler) = self.registry.get(&job.job_type) else {
            let err = HandlerError::NoHandler(job.job_type.clone());
            return self.finish(job, JobOutcome::Failed(err.to_job_error())).await;
        };

        loop {
            let ctx = JobContext::new(job.clone());
            let attempt = match tokio::time::timeout(self.job_timeout, handler.handle(&ctx)).await {
                Ok(result) => result,
                Err(_) => Err(HandlerError::Transient(format!(
                    "attempt timed out after {}s",
                    self.job_timeout.as_secs()
                ))),
            };

            match attempt {
                Ok(result) => return self.finish(job, JobOutcome::Completed(result)).await,
                Err(e) if e.is_transient() && job.can_retry() => {
                    let delay = self.retry.delay_for(job.attempts);
                    warn!(
                        "Job {} attempt {} failed ({}), retrying in {:?}",
                        job.id, job.attempts, e, delay
                    );
                    tokio::time::sleep(delay).await;
                    let (id, error, pinned) = (job.id, e.to_job_error(), ctx.pinned());
                    job = self
                        .write_with_retry(id, "record attempt", || {
                            self.queue.record_attempt(id, &error, &pinned)
                        })
                        .await?;
                }
                Err(e) => {
                    if e.is_transient() {
                        error!("Job {} exhausted {} attempts: {}", job.id, job.attempts, e);
                    } else {
                        error!("Job {} failed terminally: {}", job.id, e);
                    }
                    return self.finish(job, JobOutcome::Failed(e.to_job_error())).await;
                }
            }
        }
    }

    async fn finish(&self, job: Job, outcome: JobOutcome) -> Result<Job, QueueError> {
        let id = job.id;
        let changed = self
            .write_with_retry(id, "finish", || self.queue.finish(id, &outcome))
            .await?;
        let finished = self
            .write_with_retry(id, "reload", || self.queue.get(id))
            .await?
            .ok_or(QueueError::JobNotFound(id))?;

        if changed {
            self.jobs_processed.fetch_add(1, Ordering::SeqCst);
            debug!("Job {} -> {}", finished.id, finished.status);
            for listener in &self.listeners {
                listener.on_job_finished(&finished).await;
            }
        } else {
            debug!("Job {} was already {}, result dropped", finished.id, finished.status);
        }
        Ok(finished)
    }

    /// Run a job-state write, retrying with backoff while the store is
    /// unreachable. A job whose write never lands stays `running` until
    /// [`JobQueue::reap_stale`] fails it.
    async fn write_with_retry<T, F, Fut>(
        &self,
        id: Uuid,
        what: &str,
        mut write: F,
    ) -> Result<T, QueueError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, QueueError>>,
    {
        let mut attempt = 1;
        loop {
            match write().await {
                Err(e) if e.is_unavailable() && attempt < STORE_WRITE_ATTEMPTS => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        "Worker {} could not {} job {} ({}), retrying in {:?}",
                        self.id, what, id, e, delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    /// Fail jobs left `running` by a worker that is gone.
    pub async fn reap_stale(&self) -> Result<Vec<Uuid>, QueueError> {
        self.queue.reap_stale(self.stale_after).await
    }

    /// Poll until shutdown. A claimed job always runs to completion before
    /// the shutdown signal is checked again.
    pub async fn run(self: Arc<Self>, mut cancel: watch::Receiver<bool>) {
        info!("Worker {} started", self.id);

        let mut next_reap = tokio::time::Instant::now();
        loop {
            if *cancel.borrow() {
                break;
            }

            if tokio::time::Instant::now() >= next_reap {
                if let Err(e) = self.reap_stale().await {
                    error!("Worker {} could not reap stale jobs: {}", self.id, e);
                }
                next_reap = tokio::time::Instant::now() + self.job_timeout;
            }

            match self.run_once().await {
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => error!("Worker {} poll failed: {}", self.id, e),
            }

            tokio::select! {
                changed = cancel.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        info!("Worker {} stopped", self.id);
    }
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
