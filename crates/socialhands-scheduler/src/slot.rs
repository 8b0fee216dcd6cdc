//! Schedule slots and the daily schedule aggregate.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::activity::{ActivityType, StrategyFocus};

/// Slot lifecycle: `scheduled -> in_progress -> completed | failed`, or
/// `scheduled -> skipped` when it cannot be placed or its window passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotStatus {
    Scheduled,
    InProgress,
    Completed,
    Failed,
    Skipped,
}

/// A time window bound to an activity, owned by its [`DailySchedule`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleSlot {
    pub slot_id: String,
    /// Task identifier that produced this slot.
    pub task_id: String,
    /// Set for slots materialized from the default template.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_key: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub activity_type: ActivityType,
    #[serde(default)]
    pub activity_config: Value,
    pub priority: i32,
    pub is_flexible: bool,
    pub status: SlotStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<Uuid>,
    #[serde(default)]
    pub execution_log: Vec<String>,
}

impl ScheduleSlot {
    pub fn new(
        task_id: impl Into<String>,
        activity_type: ActivityType,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        priority: i32,
        is_flexible: bool,
    ) -> Self {
        Self {
            slot_id: Uuid::new_v4().to_string(),
            task_id: task_id.into(),
            template_key: None,
            start_time,
            end_time,
            activity_type,
            activity_config: Value::Object(Default::default()),
            priority,
            is_flexible,
            status: SlotStatus::Scheduled,
            job_id: None,
            execution_log: Vec::new(),
        }
    }

    pub fn duration(&self) -> chrono::Duration {
        self.end_time - self.start_time
    }

    /// Half-open `[start, end)` overlap.
    pub fn overlaps(&self, other: &ScheduleSlot) -> bool {
        self.start_time < other.end_time && other.start_time < self.end_time
    }

    /// Whether the slot still occupies time in the plan.
    pub fn occupies_time(&self) -> bool {
        self.status != SlotStatus::Skipped
    }

    /// Append a timestamped line to the execution log.
    pub fn log(&mut self, line: impl AsRef<str>) {
        self.execution_log.push(format!(
            "{} {}",
            Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            line.as_ref()
        ));
    }

    pub fn skip(&mut self, reason: impl AsRef<str>) {
        self.status = SlotStatus::Skipped;
        self.log(format!("skipped: {}", reason.as_ref()));
    }
}

/// Slot counts per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleProgress {
    pub total: usize,
    pub scheduled: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// The plan for one calendar date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySchedule {
    pub date: NaiveDate,
    pub strategy: StrategyFocus,
    pub generated_at: DateTime<Utc>,
    /// Ordered by `start_time`.
    pub slots: Vec<ScheduleSlot>,
}

impl DailySchedule {
    pub fn new(date: NaiveDate, strategy: StrategyFocus, mut slots: Vec<ScheduleSlot>) -> Self {
        slots.sort_by_key(|s| s.start_time);
        Self {
            date,
            strategy,
            generated_at: Utc::now(),
            slots,
        }
    }

    pub fn slot(&self, slot_id: &str) -> Option<&ScheduleSlot> {
        self.slots.iter().find(|s| s.slot_id == slot_id)
    }

    pub fn slot_mut(&mut self, slot_id: &str) -> Option<&mut ScheduleSlot> {
        self.slots.iter_mut().find(|s| s.slot_id == slot_id)
    }

    pub fn sort(&mut self) {
        self.slots.sort_by_key(|s| s.start_time);
    }

    pub fn progress(&self) -> ScheduleProgress {
        let mut progress = ScheduleProgress {
            total: self.slots.len(),
            ..Default::default()
        };
        for slot in &self.slots {
            match slot.status {
                SlotStatus::Scheduled => progress.scheduled += 1,
                SlotStatus::InProgress => progress.in_progress += 1,
                SlotStatus::Completed => progress.completed += 1,
                SlotStatus::Failed => progress.failed += 1,
                SlotStatus::Skipped => progress.skipped += 1,
            }
        }
        progress
    }

    /// Pairs of placed slots whose time ranges overlap.
    pub fn conflicts(&self) -> Vec<(&ScheduleSlot, &ScheduleSlot)> {
        let placed: Vec<&ScheduleSlot> = self.slots.iter().filter(|s| s.occupies_time()).collect();
        let mut conflicts = Vec::new();
        for (i, a) in placed.iter().enumerate() {
            for b in &placed[i + 1..] {
                if a.overlaps(b) {
                    conflicts.push((*a, *b));
                }
            }
        }
        conflicts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, h, m, 0).unwrap()
    }

    fn slot(h: u32, m: u32, minutes: i64) -> ScheduleSlot {
        let start = at(h, m);
        ScheduleSlot::new(
            "T",
            ActivityType::TwitterPost,
            start,
            start + chrono::Duration::minutes(minutes),
            1,
            true,
        )
    }

    #[test]
    fn test_overlap_is_half_open() {
        let a = slot(10, 0, 15);
        let b = slot(10, 15, 15);
        let c = slot(10, 14, 5);
        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&c));
        assert!(c.overlaps(&b));
    }

    #[test]
    fn test_log_lines_are_timestamped() {
        let mut s = slot(9, 0, 10);
        s.skip("no room");
        assert_eq!(s.status, SlotStatus::Skipped);
        assert_eq!(s.execution_log.len(), 1);
        assert!(s.execution_log[0].ends_with("skipped: no room"));
        assert!(s.execution_log[0].contains('T'));
    }

    #[test]
    fn test_progress_and_conflicts() {
        let mut skipped = slot(10, 5, 10);
        skipped.status = SlotStatus::Skipped;
        let schedule = DailySchedule::new(
            NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            StrategyFocus::Balanced,
            vec![slot(11, 0, 30), slot(10, 0, 15), skipped],
        );
        assert_eq!(schedule.slots[0].start_time, at(10, 0));
        let progress = schedule.progress();
        assert_eq!(progress.total, 3);
        assert_eq!(progress.scheduled, 2);
        assert_eq!(progress.skipped, 1);
        assert!(schedule.conflicts().is_empty());
    }
}
