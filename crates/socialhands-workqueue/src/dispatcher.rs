//! Dispatcher control: the persisted gate in front of `claim_next`.

use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::error::QueueError;
use crate::job::job_types;
use crate::queue::JobQueue;

/// Operator switch for job dispatch.
///
/// A plain persisted flag with last-write-wins semantics. Stopping only
/// prevents new claims; jobs already running finish normally.
#[derive(Clone)]
pub struct Dispatcher {
    queue: Arc<JobQueue>,
}

impl Dispatcher {
    pub fn new(queue: Arc<JobQueue>) -> Self {
        Self { queue }
    }

    /// Allow claims and record a `start-agent` job for the audit trail.
    pub async fn start(&self) -> Result<Uuid, QueueError> {
        self.queue.control().set_dispatcher_active(true).await?;
        let id = self
            .queue
            .enqueue(
                job_types::START_AGENT,
                json!({ "requested_at": Utc::now().to_rfc3339() }),
                0,
            )
            .await?;
        info!("Dispatcher started (audit job {})", id);
        Ok(id)
    }

    /// Stop handing out new claims.
    pub async fn stop(&self) -> Result<(), QueueError> {
        self.queue.control().set_dispatcher_active(false).await?;
        info!("Dispatcher stopped");
        Ok(())
    }

    pub async fn is_active(&self) -> Result<bool, QueueError> {
        Ok(self.queue.control().dispatcher_active().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobStatus;
    use crate::store::MemoryJobStore;
    use socialhands_config::QueueConfig;
    use socialhands_state::{ControlStore, MemorySettingsStore};

    fn dispatcher() -> (Arc<JobQueue>, Dispatcher) {
        let control = ControlStore::new(Arc::new(MemorySettingsStore::new()));
        let queue = Arc::new(JobQueue::new(
            Arc::new(MemoryJobStore::new()),
            control,
            &QueueConfig::default(),
        ));
        (queue.clone(), Dispatcher::new(queue))
    }

    #[tokio::test]
    async fn test_start_sets_flag_and_records_job() {
        let (queue, dispatcher) = dispatcher();
        assert!(!dispatcher.is_active().await.unwrap());

        let audit = dispatcher.start().await.unwrap();
        assert!(dispatcher.is_active().await.unwrap());

        let job = queue.get(audit).await.unwrap().unwrap();
        assert_eq!(job.job_type, job_types::START_AGENT);
        assert_eq!(job.status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn test_stop_enqueue_claim_start() {
        let (queue, dispatcher) = dispatcher();
        dispatcher.stop().await.unwrap();

        let id = queue
            .enqueue(job_types::TEST_JOB, json!({}), 0)
            .await
            .unwrap();
        assert!(queue.claim_next().await.unwrap().is_none());

        dispatcher.start().await.unwrap();
        // Same priority as the audit job, but enqueued earlier.
        let claimed = queue.claim_next().await.unwrap().unwrap();
        assert_eq!(claimed.id, id);
    }

    #[tokio::test]
    async fn test_stop_does_not_revoke_running_job() {
        let (queue, dispatcher) = dispatcher();
        dispatcher.start().await.unwrap();
        let claimed = queue.claim_next().await.unwrap().unwrap();

        dispatcher.stop().await.unwrap();
        let job = queue.get(claimed.id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Running);
        assert!(
            queue
                .complete(claimed.id, crate::job::JobResult::ok("done"))
                .await
                .unwrap()
        );
    }
}
