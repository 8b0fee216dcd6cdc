//! Aggregated control-plane status.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::warn;

use socialhands_scheduler::{ScheduleProgress, ScheduleService};
use socialhands_state::{AgentMode, ControlStore, WorkerHeartbeat};
use socialhands_workqueue::{JobCounts, JobQueue};

use crate::health::{ComponentHealth, HealthStatus};
use crate::heartbeat::HeartbeatMonitor;

/// Progress of today's plan.
#[derive(Debug, Clone, Serialize)]
pub struct ScheduleSummary {
    pub date: NaiveDate,
    #[serde(flatten)]
    pub progress: ScheduleProgress,
}

/// Point-in-time status snapshot.
///
/// When the store is unreachable every field read from it is `None`, never
/// a default that could be mistaken for real state.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub database_reachable: bool,
    pub worker_alive: Option<bool>,
    pub last_heartbeat: Option<WorkerHeartbeat>,
    pub dispatcher_active: Option<bool>,
    pub active_mode: Option<AgentMode>,
    pub jobs: Option<JobCounts>,
    pub schedule: Option<ScheduleSummary>,
    pub health: HealthStatus,
    pub components: BTreeMap<String, ComponentHealth>,
    pub generated_at: DateTime<Utc>,
}

impl StatusReport {
    fn unreachable(reason: String, now: DateTime<Utc>) -> Self {
        let mut components = BTreeMap::new();
        components.insert("database".to_string(), ComponentHealth::unhealthy(reason));
        Self {
            database_reachable: false,
            worker_alive: None,
            last_heartbeat: None,
            dispatcher_active: None,
            active_mode: None,
            jobs: None,
            schedule: None,
            health: HealthStatus::Unhealthy,
            components,
            generated_at: now,
        }
    }
}

/// Builds [`StatusReport`]s from the stores.
#[derive(Clone)]
pub struct StatusCollector {
    control: ControlStore,
    queue: Arc<JobQueue>,
    schedule: Arc<ScheduleService>,
    heartbeat: HeartbeatMonitor,
}

impl StatusCollector {
    pub fn new(
        control: ControlStore,
        queue: Arc<JobQueue>,
        schedule: Arc<ScheduleService>,
        heartbeat: HeartbeatMonitor,
    ) -> Self {
        Self {
            control,
            queue,
            schedule,
            heartbeat,
        }
    }

    /// Snapshot at `now`. Never fails; unreadable parts are `None`.
    pub async fn collect(&self, now: DateTime<Utc>) -> StatusReport {
        if let Err(e) = self.control.ping().await {
            warn!("Status: store unreachable: {}", e);
            return StatusReport::unreachable(e.to_string(), now);
        }

        let mut components = BTreeMap::new();
        components.insert("database".to_string(), ComponentHealth::healthy());

        let last_heartbeat = match self.heartbeat.last_heartbeat().await {
            Ok(beat) => Some(beat),
            Err(e) => {
                warn!("Status: failed to read heartbeat: {}", e);
                None
            }
        };
        let worker_alive = last_heartbeat
            .as_ref()
            .map(|beat| beat.as_ref().is_some_and(|b| self.heartbeat.is_fresh(b, now)));
        let worker_health = match (&last_heartbeat, worker_alive) {
            (_, Some(true)) => ComponentHealth::healthy(),
            (Some(Some(beat)), _) => ComponentHealth::degraded(format!(
                "last heartbeat from {} at {}",
                beat.worker_id,
                beat.last_seen.to_rfc3339()
            )),
            (Some(None), _) => ComponentHealth::degraded("no heartbeat recorded"),
            (None, _) => ComponentHealth::degraded("heartbeat unreadable"),
        };
        components.insert("worker".to_string(), worker_health);

        let dispatcher_active = self
            .control
            .dispatcher_active()
            .await
            .map_err(|e| warn!("Status: failed to read dispatcher flag: {}", e))
            .ok();
        let active_mode = self
            .control
            .agent_mode()
            .await
            .map_err(|e| warn!("Status: failed to read agent mode: {}", e))
            .ok();
        let jobs = self
            .queue
            .counts()
            .await
            .map_err(|e| warn!("Status: failed to count jobs: {}", e))
            .ok();

        let today = self.schedule.local_date(now);
        let schedule = match self.schedule.schedule_for(today).await {
            Ok(plan) => {
                components.insert("scheduler".to_string(), ComponentHealth::healthy());
                Some(ScheduleSummary {
                    date: today,
                    progress: plan.progress(),
                })
            }
            Err(e) => {
                warn!("Status: failed to load schedule for {}: {}", today, e);
                components.insert(
                    "scheduler".to_string(),
                    ComponentHealth::degraded(e.to_string()),
                );
                None
            }
        };

        StatusReport {
            database_reachable: true,
            worker_alive,
            last_heartbeat: last_heartbeat.flatten(),
            dispatcher_active,
            active_mode,
            jobs,
            schedule,
            health: HealthStatus::overall(&components),
            components,
            generated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use socialhands_config::{HeartbeatConfig, QueueConfig, SchedulerConfig};
    use socialhands_state::MemorySettingsStore;
    use socialhands_workqueue::MemoryJobStore;

    async fn collector() -> (Arc<MemorySettingsStore>, Arc<JobQueue>, StatusCollector) {
        let settings = Arc::new(MemorySettingsStore::new());
        let control = ControlStore::new(settings.clone());
        let queue = Arc::new(JobQueue::new(
            Arc::new(MemoryJobStore::new()),
            control.clone(),
            &QueueConfig::default(),
        ));
        let schedule = Arc::new(
            ScheduleService::new(control.clone(), queue.clone(), &SchedulerConfig::default())
                .unwrap(),
        );
        let heartbeat = HeartbeatMonitor::new(control.clone(), &HeartbeatConfig::default());
        let collector = StatusCollector::new(control, queue.clone(), schedule, heartbeat);
        (settings, queue, collector)
    }

    #[tokio::test]
    async fn test_fresh_system_status() {
        let (_, queue, collector) = collector().await;
        queue.enqueue("test-job", serde_json::json!({}), 0).await.unwrap();

        let report = collector.collect(Utc::now()).await;
        assert!(report.database_reachable);
        assert_eq!(report.worker_alive, Some(false));
        assert!(report.last_heartbeat.is_none());
        assert_eq!(report.dispatcher_active, Some(false));
        assert_eq!(report.active_mode, Some(AgentMode::Autonomous));
        assert_eq!(report.jobs.unwrap().pending, 1);
        assert!(report.schedule.unwrap().progress.total > 0);
        assert_eq!(report.health, HealthStatus::Degraded);
    }

    #[tokio::test]
    async fn test_alive_worker_is_healthy() {
        let (_, _, collector) = collector().await;
        collector.heartbeat.beat("worker-1", 2).await.unwrap();

        let report = collector.collect(Utc::now()).await;
        assert_eq!(report.worker_alive, Some(true));
        assert_eq!(report.last_heartbeat.unwrap().jobs_processed, 2);
        assert_eq!(report.health, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn test_stale_worker_reported_dead() {
        let (_, _, collector) = collector().await;
        let beat = collector.heartbeat.beat("worker-1", 0).await.unwrap();

        let later = beat.last_seen + chrono::Duration::seconds(31);
        let report = collector.collect(later).await;
        assert_eq!(report.worker_alive, Some(false));
        assert!(report.last_heartbeat.is_some());
        assert_eq!(report.components["worker"].status, HealthStatus::Degraded);
    }

    #[tokio::test]
    async fn test_unreachable_store_reports_nulls() {
        let (settings, _, collector) = collector().await;
        settings.set_offline(true);

        let report = collector.collect(Utc::now()).await;
        assert!(!report.database_reachable);
        assert_eq!(report.health, HealthStatus::Unhealthy);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["database_reachable"], serde_json::json!(false));
        for field in [
            "worker_alive",
            "last_heartbeat",
            "dispatcher_active",
            "active_mode",
            "jobs",
            "schedule",
        ] {
            assert!(json[field].is_null(), "{} should be null", field);
        }
    }

    #[tokio::test]
    async fn test_schedule_summary_shape() {
        let (_, _, collector) = collector().await;
        let report = collector.collect(Utc::now()).await;
        let json = serde_json::to_value(&report).unwrap();
        let schedule = &json["schedule"];
        for field in ["date", "total", "scheduled", "in_progress", "completed", "failed", "skipped"] {
            assert!(!schedule[field].is_null(), "{} missing", field);
        }
    }
}
