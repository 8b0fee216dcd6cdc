//! Worker heartbeats.
//!
//! A worker writes `worker:heartbeat` on a fixed interval, independent of
//! job execution. Readers judge liveness against one stale threshold.
//! Heartbeats are advisory and never gate dispatch.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use socialhands_config::HeartbeatConfig;
use socialhands_state::{ControlStore, WorkerHeartbeat};

use crate::error::MonitorError;

/// Reads and writes the shared worker heartbeat.
#[derive(Clone)]
pub struct HeartbeatMonitor {
    control: ControlStore,
    stale_after: chrono::Duration,
}

impl HeartbeatMonitor {
    pub fn new(control: ControlStore, config: &HeartbeatConfig) -> Self {
        let stale_after = chrono::Duration::seconds(config.stale_after_secs as i64);
        Self {
            control,
            stale_after,
        }
    }

    pub fn stale_after(&self) -> chrono::Duration {
        self.stale_after
    }

    /// Record that `worker_id` is alive now.
    pub async fn beat(
        &self,
        worker_id: &str,
        jobs_processed: u64,
    ) -> Result<WorkerHeartbeat, MonitorError> {
        let beat = self.control.record_heartbeat(worker_id, jobs_processed).await?;
        debug!("Heartbeat from {} ({} jobs processed)", worker_id, jobs_processed);
        Ok(beat)
    }

    /// The most recent heartbeat, if any worker ever beat.
    pub async fn last_heartbeat(&self) -> Result<Option<WorkerHeartbeat>, MonitorError> {
        Ok(self.control.heartbeat().await?)
    }

    pub async fn is_alive(&self) -> Result<bool, MonitorError> {
        self.is_alive_at(Utc::now()).await
    }

    /// `false` when no heartbeat was ever recorded.
    pub async fn is_alive_at(&self, now: DateTime<Utc>) -> Result<bool, MonitorError> {
        Ok(self
            .last_heartbeat()
            .await?
            .is_some_and(|beat| self.is_fresh(&beat, now)))
    }

    /// Whether `beat` is younger than the stale threshold at `now`.
    pub fn is_fresh(&self, beat: &WorkerHeartbeat, now: DateTime<Utc>) -> bool {
        now - beat.last_seen < self.stale_after
    }
}

/// Background heartbeat writer for one worker.
pub struct Heartbeater {
    monitor: HeartbeatMonitor,
    worker_id: String,
    jobs_processed: Arc<AtomicU64>,
    interval: Duration,
}

impl Heartbeater {
    pub fn new(
        monitor: HeartbeatMonitor,
        worker_id: impl Into<String>,
        jobs_processed: Arc<AtomicU64>,
        config: &HeartbeatConfig,
    ) -> Self {
        Self {
            monitor,
            worker_id: worker_id.into(),
            jobs_processed,
            interval: Duration::from_secs(config.interval_secs.max(1)),
        }
    }

    /// Beat until `cancel` flips. Store errors are logged, never fatal.
    pub async fn run(self, mut cancel: watch::Receiver<bool>) {
        info!(
            "Heartbeat started for {} (interval: {:?})",
            self.worker_id, self.interval
        );

        let mut interval = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let processed = self.jobs_processed.load(Ordering::Relaxed);
                    if let Err(e) = self.monitor.beat(&self.worker_id, processed).await {
                        warn!("Failed to write heartbeat for {}: {}", self.worker_id, e);
                    }
                }
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        info!("Heartbeat stopped for {}", self.worker_id);
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use socialhands_state::MemorySettingsStore;

    fn monitor() -> (Arc<MemorySettingsStore>, HeartbeatMonitor) {
        let settings = Arc::new(MemorySettingsStore::new());
        let control = ControlStore::new(settings.clone());
        (settings, HeartbeatMonitor::new(control, &HeartbeatConfig::default()))
    }

    #[tokio::test]
    async fn test_no_heartbeat_is_not_alive() {
        let (_, monitor) = monitor();
        assert!(monitor.last_heartbeat().await.unwrap().is_none());
        assert!(!monitor.is_alive().await.unwrap());
    }

    #[tokio::test]
    async fn test_beat_makes_alive() {
        let (_, monitor) = monitor();
        let beat = monitor.beat("worker-1", 7).await.unwrap();
        assert_eq!(beat.worker_id, "worker-1");
        assert_eq!(beat.jobs_processed, 7);
        assert!(monitor.is_alive().await.unwrap());
    }

    #[tokio::test]
    async fn test_stale_threshold_boundary() {
        let (_, monitor) = monitor();
        let beat = monitor.beat("worker-1", 0).await.unwrap();
        let threshold = monitor.stale_after();

        let just_inside = beat.last_seen + threshold - chrono::Duration::seconds(1);
        let at_threshold = beat.last_seen + threshold;
        let just_outside = beat.last_seen + threshold + chrono::Duration::seconds(1);

        assert!(monitor.is_alive_at(just_inside).await.unwrap());
        assert!(!monitor.is_alive_at(at_threshold).await.unwrap());
        assert!(!monitor.is_alive_at(just_outside).await.unwrap());
    }

    #[tokio::test]
    async fn test_store_errors_propagate() {
        let (settings, monitor) = monitor();
        settings.set_offline(true);
        assert!(monitor.is_alive().await.is_err());
        assert!(monitor.beat("worker-1", 0).await.is_err());
    }

    #[tokio::test]
    async fn test_heartbeater_reports_processed_count() {
        let (_, monitor) = monitor();
        let processed = Arc::new(AtomicU64::new(3));
        let heartbeater = Heartbeater::new(
            monitor.clone(),
            "worker-9",
            processed.clone(),
            &HeartbeatConfig::default(),
        );

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(heartbeater.run(rx));

        // The first tick fires immediately.
        for _ in 0..50 {
            if monitor.last_heartbeat().await.unwrap().is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let beat = monitor.last_heartbeat().await.unwrap().unwrap();
        assert_eq!(beat.worker_id, "worker-9");
        assert_eq!(beat.jobs_processed, 3);

        tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_heartbeater_survives_store_outage() {
        let (settings, monitor) = monitor();
        settings.set_offline(true);
        let heartbeater = Heartbeater::new(
            monitor,
            "worker-1",
            Arc::new(AtomicU64::new(0)),
            &HeartbeatConfig::default(),
        );

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(heartbeater.run(rx));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished());

        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
