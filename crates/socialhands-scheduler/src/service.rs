//! Schedule service: cached daily plans, task toggles and slot promotion.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{Mutex, RwLock, watch};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use socialhands_config::SchedulerConfig;
use socialhands_state::{AgentMode, ControlStore, Snapshot, StateKey, TaskConfiguration};
use socialhands_workqueue::{Job, JobListener, JobQueue, JobStatus, SlotRef};

use crate::activity::{ActivityType, StrategyFocus};
use crate::error::SchedulerError;
use crate::generator::{ScheduleWindow, local_date, materialize, offset_from_config, place_slots};
use crate::slot::{DailySchedule, ScheduleSlot, SlotStatus};
use crate::tasks::default_task_configuration;
use crate::template::DEFAULT_TEMPLATE;

const MANUAL_TASK_ID: &str = "MANUAL";
const MAX_WRITE_ATTEMPTS: usize = 8;

fn schedule_key(date: NaiveDate) -> StateKey<DailySchedule> {
    StateKey::dynamic(format!("schedule:daily_plan:{}", date.format("%Y-%m-%d")))
}

/// Operator request for an extra, inflexible slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotSpec {
    #[serde(default)]
    pub task_id: Option<String>,
    pub activity_type: ActivityType,
    /// Local start time.
    pub start: NaiveTime,
    pub duration_minutes: i64,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub activity_config: Value,
}

/// What one promotion pass did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PromotionReport {
    pub date: Option<NaiveDate>,
    /// `(slot_id, job_id)` per promoted slot, in start order.
    pub promoted: Vec<(String, Uuid)>,
    /// Slots whose whole window passed before they could be promoted.
    pub missed: usize,
    /// In-progress slots updated from their finished job.
    pub reconciled: usize,
}

/// Owns the daily schedules.
///
/// Several processes may share one store, so every write to a plan is a
/// compare-and-swap against the version that was read. A writer that loses
/// re-reads and applies its change again. The local lock only keeps passes
/// within one process from racing each other.
pub struct ScheduleService {
    control: ControlStore,
    queue: Arc<JobQueue>,
    config: SchedulerConfig,
    strategy: StrategyFocus,
    offset: FixedOffset,
    cache: RwLock<HashMap<NaiveDate, DailySchedule>>,
    write_lock: Mutex<()>,
}

/// A plan and the stored form it was read from. `raw` is `None` until the
/// plan has been written once.
struct Loaded {
    schedule: DailySchedule,
    raw: Option<Value>,
}

impl From<Snapshot<DailySchedule>> for Loaded {
    fn from(snapshot: Snapshot<DailySchedule>) -> Self {
        Self {
            schedule: snapshot.value,
            raw: Some(snapshot.raw),
        }
    }
}

impl ScheduleService {
    pub fn new(
        control: ControlStore,
        queue: Arc<JobQueue>,
        config: &SchedulerConfig,
    ) -> Result<Self, SchedulerError> {
        let strategy = config
            .strategy
            .parse::<StrategyFocus>()
            .map_err(SchedulerError::InvalidConfig)?;
        let offset = offset_from_config(config)?;
        // Fail at startup rather than on first read.
        ScheduleWindow::from_config(Utc::now().date_naive(), config)?;

        Ok(Self {
            control,
            queue,
            config: config.clone(),
            strategy,
            offset,
            cache: RwLock::new(HashMap::new()),
            write_lock: Mutex::new(()),
        })
    }

    /// Local calendar date of `now`.
    pub fn local_date(&self, now: DateTime<Utc>) -> NaiveDate {
        local_date(now, self.offset)
    }

    fn window(&self, date: NaiveDate) -> Result<ScheduleWindow, SchedulerError> {
        ScheduleWindow::from_config(date, &self.config)
    }

    /// Effective task configuration, seeding the defaults on first read.
    pub async fn task_configuration(&self) -> Result<TaskConfiguration, SchedulerError> {
        match self.control.task_configuration().await? {
            Some(tasks) => Ok(tasks),
            None => {
                let tasks = default_task_configuration();
                self.control.set_task_configuration(&tasks).await?;
                debug!("Seeded default task configuration");
                Ok(tasks)
            }
        }
    }

    /// Flip a task's enabled flag and return the new value.
    ///
    /// Unknown identifiers start from `false` and are stored, but never
    /// produce slots. Stored schedules keep their started and elapsed slots
    /// and regenerate the rest.
    pub async fn toggle_task(&self, task_id: &str) -> Result<bool, SchedulerError> {
        let _guard = self.write_lock.lock().await;

        let mut tasks = self.task_configuration().await?;
        let enabled = !tasks.get(task_id).copied().unwrap_or(false);
        tasks.insert(task_id.to_string(), enabled);
        self.control.set_task_configuration(&tasks).await?;
        info!("Task {} {}", task_id, if enabled { "enabled" } else { "disabled" });

        let now = Utc::now();
        let mut dates: HashSet<NaiveDate> = self.cache.read().await.keys().copied().collect();
        dates.insert(self.local_date(now));
        for date in dates {
            self.regenerate_stored(date, &tasks, now).await?;
        }

        Ok(enabled)
    }

    /// The plan for `date`, generated and persisted on first read.
    pub async fn schedule_for(&self, date: NaiveDate) -> Result<DailySchedule, SchedulerError> {
        if let Some(schedule) = self.cache.read().await.get(&date) {
            return Ok(schedule.clone());
        }
        let _guard = self.write_lock.lock().await;
        Ok(self.load_fresh(date).await?.schedule)
    }

    /// One slot of the plan for `date`.
    pub async fn slot(&self, date: NaiveDate, slot_id: &str) -> Result<ScheduleSlot, SchedulerError> {
        self.schedule_for(date)
            .await?
            .slot(slot_id)
            .cloned()
            .ok_or_else(|| SchedulerError::SlotNotFound {
                date,
                slot_id: slot_id.to_string(),
            })
    }

    /// Drop the cached and persisted plan for `date`.
    pub async fn invalidate(&self, date: NaiveDate) -> Result<(), SchedulerError> {
        let _guard = self.write_lock.lock().await;
        self.control.remove(&schedule_key(date)).await?;
        self.cache.write().await.remove(&date);
        info!("Invalidated schedule for {}", date);
        Ok(())
    }

    /// Insert an inflexible slot, reflowing lower-priority flexible slots it
    /// collides with.
    ///
    /// A slot that collides with a slot that cannot move, or with a flexible
    /// slot of equal or higher priority, is stored as `skipped` and returned
    /// as such.
    pub async fn insert_slot(
        &self,
        date: NaiveDate,
        spec: SlotSpec,
    ) -> Result<ScheduleSlot, SchedulerError> {
        if spec.duration_minutes <= 0 {
            return Err(SchedulerError::InvalidSlot(
                "duration_minutes must be positive".to_string(),
            ));
        }
        let window = self.window(date)?;
        let start = window.at(spec.start);
        let end = start + chrono::Duration::minutes(spec.duration_minutes);
        if start < window.start() || end > window.end() {
            return Err(SchedulerError::InvalidSlot(format!(
                "{}-{} is outside the daily window",
                window.label(start),
                window.label(end)
            )));
        }

        let task_id = spec
            .task_id
            .clone()
            .unwrap_or_else(|| MANUAL_TASK_ID.to_string());
        let priority = spec.priority;
        let movable = move |s: &ScheduleSlot| {
            s.status == SlotStatus::Scheduled && s.is_flexible && s.priority < priority
        };

        let _guard = self.write_lock.lock().await;
        self.update(date, |schedule| {
            let mut slot = ScheduleSlot::new(
                task_id.clone(),
                spec.activity_type,
                start,
                end,
                priority,
                false,
            );
            if !spec.activity_config.is_null() {
                slot.activity_config = spec.activity_config.clone();
            }
            slot.log("inserted by operator");

            let blocker = schedule
                .slots
                .iter()
                .filter(|s| s.occupies_time() && !movable(*s))
                .find(|s| s.overlaps(&slot))
                .map(|s| s.task_id.clone());

            if let Some(other) = blocker {
                warn!("Inserted slot at {} conflicts with {}", window.label(start), other);
                slot.skip(format!("conflicts with {}", other));
                schedule.slots.push(slot.clone());
            } else {
                let (displaced, mut kept): (Vec<_>, Vec<_>) = schedule
                    .slots
                    .drain(..)
                    .partition(|s| movable(s) && s.overlaps(&slot));
                kept.push(slot.clone());
                let reflowed = place_slots(displaced, &kept, &window);
                kept.extend(reflowed);
                schedule.slots = kept;
            }
            schedule.sort();
            (true, slot)
        })
        .await
    }

    /// Promote every due `scheduled` slot of today into a job.
    ///
    /// Due slots are written as `in_progress` in one guarded write before
    /// any job is enqueued. A pass that loses that write starts over from a
    /// fresh read, so a slot is never promoted twice, even across processes.
    pub async fn promote_due(&self, now: DateTime<Utc>) -> Result<PromotionReport, SchedulerError> {
        let _guard = self.write_lock.lock().await;

        let date = self.local_date(now);
        let mut report = PromotionReport {
            date: Some(date),
            ..Default::default()
        };
        let claimed = self.claim_due(date, now, &mut report).await?;

        for slot in claimed {
            let job_type = slot.activity_type.job_type();
            let slot_ref = SlotRef {
                date,
                slot_id: slot.slot_id.clone(),
            };
            let enqueued = self
                .queue
                .enqueue_for_slot(job_type, slot.activity_config.clone(), slot.priority, slot_ref)
                .await;

            let line = match &enqueued {
                Ok(job_id) => {
                    info!("Promoted slot {} ({}) to job {}", slot.slot_id, job_type, job_id);
                    report.promoted.push((slot.slot_id.clone(), *job_id));
                    format!("enqueued job {}", job_id)
                }
                Err(e) => {
                    error!("Failed to enqueue job for slot {}: {}", slot.slot_id, e);
                    format!("enqueue failed: {}", e)
                }
            };

            let recorded = self
                .update(date, |schedule| {
                    let Some(stored) = schedule.slot_mut(&slot.slot_id) else {
                        return (false, ());
                    };
                    match &enqueued {
                        // The worker may already have recorded the outcome.
                        Ok(_) if stored.job_id.is_some() => return (false, ()),
                        Ok(job_id) => stored.job_id = Some(*job_id),
                        Err(_) if stored.status != SlotStatus::InProgress => return (false, ()),
                        Err(_) => stored.status = SlotStatus::Failed,
                    }
                    stored.log(&line);
                    (true, ())
                })
                .await;
            if let Err(e) = recorded {
                warn!("Slot {} promoted but its job was not recorded: {}", slot.slot_id, e);
            }
        }

        Ok(report)
    }

    /// Reconcile finished jobs, skip elapsed slots and mark due slots
    /// `in_progress`, all in one write. Returns the slots to enqueue.
    async fn claim_due(
        &self,
        date: NaiveDate,
        now: DateTime<Utc>,
        report: &mut PromotionReport,
    ) -> Result<Vec<ScheduleSlot>, SchedulerError> {
        for _ in 0..MAX_WRITE_ATTEMPTS {
            let mut loaded = self.load_fresh(date).await?;
            let reconciled = self.reconcile(&mut loaded.schedule).await?;

            let mut missed = 0;
            let mut claimed = Vec::new();
            if self.control.agent_mode().await? == AgentMode::Manual {
                debug!("Manual mode, not promoting slots");
            } else {
                // Slots are kept in start order.
                for slot in loaded
                    .schedule
                    .slots
                    .iter_mut()
                    .filter(|s| s.status == SlotStatus::Scheduled && s.start_time <= now)
                {
                    if slot.end_time <= now {
                        slot.skip("window passed before promotion");
                        missed += 1;
                        continue;
                    }
                    slot.status = SlotStatus::InProgress;
                    slot.log("promoted");
                    claimed.push(slot.clone());
                }
            }

            if reconciled == 0 && missed == 0 && claimed.is_empty() {
                return Ok(claimed);
            }
            if self.commit(&mut loaded).await? {
                report.reconciled = reconciled;
                report.missed = missed;
                return Ok(claimed);
            }
            debug!("Schedule for {} changed during promotion, retrying", date);
        }
        Err(SchedulerError::Contended(date))
    }

    /// Apply a finished job's outcome to its originating slot.
    ///
    /// Returns whether a slot changed.
    pub async fn record_outcome(&self, job: &Job) -> Result<bool, SchedulerError> {
        let Some(slot_ref) = &job.slot else {
            return Ok(false);
        };
        if !job.status.is_terminal() {
            return Ok(false);
        }

        let _guard = self.write_lock.lock().await;
        let key = schedule_key(slot_ref.date);
        for _ in 0..MAX_WRITE_ATTEMPTS {
            let Some(snapshot) = self.control.load_snapshot(&key).await? else {
                warn!(
                    "Schedule for {} is gone, dropping outcome of job {}",
                    slot_ref.date, job.id
                );
                return Ok(false);
            };
            let mut loaded = Loaded::from(snapshot);
            let Some(slot) = loaded.schedule.slot_mut(&slot_ref.slot_id) else {
                warn!("Slot {} no longer exists, dropping outcome of job {}", slot_ref.slot_id, job.id);
                return Ok(false);
            };
            if !apply_outcome(slot, job) {
                return Ok(false);
            }
            if self.commit(&mut loaded).await? {
                return Ok(true);
            }
            debug!("Schedule for {} changed while recording job {}, retrying", slot_ref.date, job.id);
        }
        Err(SchedulerError::Contended(slot_ref.date))
    }

    /// Clear the task configuration and today's plan.
    pub async fn reset(&self, now: DateTime<Utc>) -> Result<(), SchedulerError> {
        let _guard = self.write_lock.lock().await;
        self.control.clear_task_configuration().await?;
        self.control
            .remove(&schedule_key(self.local_date(now)))
            .await?;
        self.cache.write().await.clear();
        info!("Scheduler state reset");
        Ok(())
    }

    /// Promotion loop, run until `cancel` flips.
    pub async fn run(self: Arc<Self>, mut cancel: watch::Receiver<bool>) {
        let period = Duration::from_secs(self.config.check_interval_secs.max(1));
        info!("Scheduler started (check interval: {:?})", period);

        let mut interval = tokio::time::interval(period);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.promote_due(Utc::now()).await {
                        Ok(report) if !report.promoted.is_empty() => {
                            info!("Promoted {} slot(s)", report.promoted.len());
                        }
                        Ok(_) => {}
                        Err(e) => error!("Promotion pass failed: {}", e),
                    }
                }
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        info!("Scheduler shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Read the persisted plan, generating it if absent. Caller holds the lock.
    async fn load_fresh(&self, date: NaiveDate) -> Result<Loaded, SchedulerError> {
        for _ in 0..MAX_WRITE_ATTEMPTS {
            if let Some(snapshot) = self.control.load_snapshot(&schedule_key(date)).await? {
                self.cache.write().await.insert(date, snapshot.value.clone());
                return Ok(snapshot.into());
            }

            let tasks = self.task_configuration().await?;
            let window = self.window(date)?;
            let candidates =
                materialize(DEFAULT_TEMPLATE, &tasks, self.strategy, &window, &HashSet::new());
            let mut loaded = Loaded {
                schedule: DailySchedule::new(date, self.strategy, place_slots(candidates, &[], &window)),
                raw: None,
            };
            if self.commit(&mut loaded).await? {
                info!(
                    "Generated schedule for {}: {} slot(s), {} skipped",
                    date,
                    loaded.schedule.slots.len(),
                    loaded.schedule.progress().skipped
                );
                return Ok(loaded);
            }
            debug!("Schedule for {} was generated elsewhere, re-reading", date);
        }
        Err(SchedulerError::Contended(date))
    }

    /// Apply `change` to the plan for `date` and write it back, starting over
    /// from a fresh read when another writer got in first. `change` returns
    /// whether it modified the plan.
    async fn update<R>(
        &self,
        date: NaiveDate,
        mut change: impl FnMut(&mut DailySchedule) -> (bool, R),
    ) -> Result<R, SchedulerError> {
        for _ in 0..MAX_WRITE_ATTEMPTS {
            let mut loaded = self.load_fresh(date).await?;
            let (changed, out) = change(&mut loaded.schedule);
            if !changed || self.commit(&mut loaded).await? {
                return Ok(out);
            }
            debug!("Schedule for {} changed concurrently, retrying", date);
        }
        Err(SchedulerError::Contended(date))
    }

    /// Regenerate a stored plan from `tasks`. Absent plans are left alone.
    async fn regenerate_stored(
        &self,
        date: NaiveDate,
        tasks: &TaskConfiguration,
        now: DateTime<Utc>,
    ) -> Result<(), SchedulerError> {
        for _ in 0..MAX_WRITE_ATTEMPTS {
            let Some(snapshot) = self.control.load_snapshot(&schedule_key(date)).await? else {
                self.cache.write().await.remove(&date);
                return Ok(());
            };
            let mut loaded = Loaded {
                schedule: self.regenerate(snapshot.value, tasks, now)?,
                raw: Some(snapshot.raw),
            };
            if self.commit(&mut loaded).await? {
                return Ok(());
            }
            debug!("Schedule for {} changed during regeneration, retrying", date);
        }
        Err(SchedulerError::Contended(date))
    }

    /// Rebuild the not-yet-started template slots from `tasks`.
    ///
    /// Started slots and skipped slots whose window is over stay as they are.
    fn regenerate(
        &self,
        schedule: DailySchedule,
        tasks: &TaskConfiguration,
        now: DateTime<Utc>,
    ) -> Result<DailySchedule, SchedulerError> {
        let window = self.window(schedule.date)?;
        let kept: Vec<ScheduleSlot> = schedule
            .slots
            .into_iter()
            .filter(|s| {
                s.template_key.is_none()
                    || match s.status {
                        SlotStatus::InProgress | SlotStatus::Completed | SlotStatus::Failed => true,
                        SlotStatus::Skipped => s.end_time <= now,
                        SlotStatus::Scheduled => false,
                    }
            })
            .collect();
        let exclude: HashSet<String> = kept.iter().filter_map(|s| s.template_key.clone()).collect();

        let candidates = materialize(DEFAULT_TEMPLATE, tasks, self.strategy, &window, &exclude);
        let placed = place_slots(candidates, &kept, &window);

        let mut slots = kept;
        slots.extend(placed);
        Ok(DailySchedule::new(schedule.date, self.strategy, slots))
    }

    /// Update in-progress slots whose job already finished.
    async fn reconcile(&self, schedule: &mut DailySchedule) -> Result<usize, SchedulerError> {
        let mut changed = 0;
        for slot in schedule
            .slots
            .iter_mut()
            .filter(|s| s.status == SlotStatus::InProgress)
        {
            let Some(job_id) = slot.job_id else {
                continue;
            };
            match self.queue.get(job_id).await? {
                Some(job) if job.status.is_terminal() => {
                    if apply_outcome(slot, &job) {
                        changed += 1;
                    }
                }
                Some(_) => {}
                None => {
                    slot.status = SlotStatus::Failed;
                    slot.log(format!("job {} no longer exists", job_id));
                    changed += 1;
                }
            }
        }
        Ok(changed)
    }

    /// Write `loaded` unless the stored plan changed since it was read.
    async fn commit(&self, loaded: &mut Loaded) -> Result<bool, SchedulerError> {
        let key = schedule_key(loaded.schedule.date);
        let Some(raw) = self
            .control
            .save_if(&key, loaded.raw.as_ref(), &loaded.schedule)
            .await?
        else {
            return Ok(false);
        };
        loaded.raw = Some(raw);
        self.cache
            .write()
            .await
            .insert(loaded.schedule.date, loaded.schedule.clone());
        Ok(true)
    }
}

/// Move a slot to its job's terminal status. `false` if nothing changed.
fn apply_outcome(slot: &mut ScheduleSlot, job: &Job) -> bool {
    if !matches!(slot.status, SlotStatus::InProgress | SlotStatus::Scheduled) {
        return false;
    }
    match job.status {
        JobStatus::Completed => {
            slot.status = SlotStatus::Completed;
            let message = job.result.as_ref().map(|r| r.message.as_str()).unwrap_or("");
            slot.log(format!("job {} completed: {}", job.id, message));
        }
        JobStatus::Failed => {
            slot.status = SlotStatus::Failed;
            let line = match &job.error {
                Some(e) => format!("job {} failed ({:?}): {}", job.id, e.kind, e.message),
                None => format!("job {} failed", job.id),
            };
            slot.log(line);
        }
        _ => return false,
    }
    if slot.job_id.is_none() {
        slot.job_id = Some(job.id);
    }
    true
}

/// Worker listener writing job outcomes back to schedule slots.
pub struct SlotOutcomeRecorder {
    service: Arc<ScheduleService>,
}

impl SlotOutcomeRecorder {
    pub fn new(service: Arc<ScheduleService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl JobListener for SlotOutcomeRecorder {
    async fn on_job_finished(&self, job: &Job) {
        if let Err(e) = self.service.record_outcome(job).await {
            warn!("Failed to record outcome of job {} on its slot: {}", job.id, e);
        }
    }
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
