use super::*;
use crate::job::{JobStatus, job_types};
use crate::store::MemoryJobStore;
use serde_json::json;
use socialhands_state::{MemorySettingsStore, SettingsStore};

fn memory_queue() -> (Arc<MemorySettingsStore>, JobQueue) {
    let settings = Arc::new(MemorySettingsStore::new());
    let control = ControlStore::new(settings.clone());
    let queue = JobQueue::new(
        Arc::new(MemoryJobStore::new()),
        control,
        &QueueConfig::default(),
    );
    (settings, queue)
}

#[tokio::test]
async fn test_enqueue_creates_pending_job() {
    let (_, queue) = memory_queue();
    let id = queue
        .enqueue(job_types::TEST_JOB, json!({}), 0)
        .await
        .unwrap();
    let job = queue.get(id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.attempts, 0);
    assert_eq!(job.max_attempts, 3);
}

#[tokio::test]
async fn test_enqueue_rejects_empty_type() {
    let (_, queue) = memory_queue();
    let err = queue.enqueue("  ", json!({}), 0).await.unwrap_err();
    assert!(matches!(err, QueueError::InvalidJob(_)));
}

#[tokio::test]
async fn test_claim_returns_none_while_paused() {
    let (_, queue) = memory_queue();
    queue.enqueue(job_types::TEST_JOB, json!({}), 0).await.unwrap();
    assert!(queue.claim_next().await.unwrap().is_none());

    queue.control().set_dispatcher_active(false).await.unwrap();
    assert!(queue.claim_next().await.unwrap().is_none());
}

#[tokio::test]
async fn test_claim_propagates_unreadable_flag() {
    let (settings, queue) = memory_queue();
    queue.enqueue(job_types::TEST_JOB, json!({}), 0).await.unwrap();
    settings.set_offline(true);
    assert!(matches!(queue.claim_next().await, Err(QueueError::State(_))));
}

#[tokio::test]
async fn test_single_claim_then_complete() {
    let (_, queue) = memory_queue();
    queue.control().set_dispatcher_active(true).await.unwrap();
    let id = queue
        .enqueue(job_types::TEST_JOB, json!({}), 0)
        .await
        .unwrap();

    let job = queue.claim_next().await.unwrap().unwrap();
    assert_eq!(job.id, id);
    assert!(queue.claim_next().await.unwrap().is_none());

    assert!(queue.complete(id, JobResult::ok("pong")).await.unwrap());
    let pending = queue
        .list(&JobFilter {
            status: Some(JobStatus::Pending),
            limit: 10,
        })
        .await
        .unwrap();
    assert!(pending.is_empty());
    assert_eq!(queue.counts().await.unwrap().completed, 1);
}

#[tokio::test]
async fn test_fail_twice_keeps_first_error() {
    let (_, queue) = memory_queue();
    queue.control().set_dispatcher_active(true).await.unwrap();
    let id = queue.enqueue("scrape", json!({}), 0).await.unwrap();
    queue.claim_next().await.unwrap();

    assert!(queue.fail(id, JobError::terminal("first")).await.unwrap());
    assert!(!queue.fail(id, JobError::terminal("second")).await.unwrap());
    let job = queue.get(id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error.unwrap().message, "first");
}

#[tokio::test]
async fn test_enqueue_for_slot() {
    let (settings, queue) = memory_queue();
    let slot = SlotRef {
        date: chrono::NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
        slot_id: "s1".to_string(),
    };
    let id = queue
        .enqueue_for_slot(job_types::TWITTER_POST, json!({}), 8, slot.clone())
        .await
        .unwrap();
    assert_eq!(queue.get(id).await.unwrap().unwrap().slot, Some(slot));
    assert!(settings.get("dispatcher:active").await.unwrap().is_none());
}
