//! Slot placement.
//!
//! Inflexible slots are placed first, by priority, and never move; one that
//! collides with an already placed slot is skipped. Flexible slots are then
//! placed by priority at the free start closest to their preferred start
//! inside the daily window, or skipped when no such start exists.

use std::collections::HashSet;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use serde_json::json;
use tracing::{debug, warn};

use socialhands_config::SchedulerConfig;
use socialhands_state::TaskConfiguration;

use crate::activity::StrategyFocus;
use crate::error::SchedulerError;
use crate::slot::ScheduleSlot;
use crate::template::TemplateEntry;

/// The allowed time range of one local calendar day.
#[derive(Debug, Clone, Copy)]
pub struct ScheduleWindow {
    pub date: NaiveDate,
    pub day_start: NaiveTime,
    pub day_end: NaiveTime,
    pub offset: FixedOffset,
}

impl ScheduleWindow {
    pub fn new(date: NaiveDate, day_start: NaiveTime, day_end: NaiveTime, offset: FixedOffset) -> Self {
        Self {
            date,
            day_start,
            day_end,
            offset,
        }
    }

    /// Window for `date` from scheduler configuration.
    pub fn from_config(date: NaiveDate, config: &SchedulerConfig) -> Result<Self, SchedulerError> {
        let (day_start, day_end) = config
            .window()
            .map_err(|e| SchedulerError::InvalidConfig(e.to_string()))?;
        if day_end <= day_start {
            return Err(SchedulerError::InvalidConfig(
                "day_end must be after day_start".to_string(),
            ));
        }
        Ok(Self::new(date, day_start, day_end, offset_from_config(config)?))
    }

    /// UTC instant of a local time on this window's date.
    pub fn at(&self, time: NaiveTime) -> DateTime<Utc> {
        let local = self.date.and_time(time);
        let utc = local - Duration::seconds(i64::from(self.offset.local_minus_utc()));
        Utc.from_utc_datetime(&utc)
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.at(self.day_start)
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.at(self.day_end)
    }

    /// `HH:MM` in local time, for log lines.
    pub fn label(&self, instant: DateTime<Utc>) -> String {
        instant.with_timezone(&self.offset).format("%H:%M").to_string()
    }
}

/// Parse the configured UTC offset.
pub fn offset_from_config(config: &SchedulerConfig) -> Result<FixedOffset, SchedulerError> {
    FixedOffset::east_opt(config.utc_offset_minutes * 60).ok_or_else(|| {
        SchedulerError::InvalidConfig(format!(
            "utc_offset_minutes out of range: {}",
            config.utc_offset_minutes
        ))
    })
}

/// Local calendar date of an instant.
pub fn local_date(instant: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    instant.with_timezone(&offset).date_naive()
}

/// Build unplaced slots for every template entry whose task is enabled.
///
/// Entries whose key is in `exclude` are left out; they are already
/// represented by a slot that must not be regenerated.
pub fn materialize(
    template: &[TemplateEntry],
    tasks: &TaskConfiguration,
    strategy: StrategyFocus,
    window: &ScheduleWindow,
    exclude: &HashSet<String>,
) -> Vec<ScheduleSlot> {
    template
        .iter()
        .filter(|e| tasks.get(e.task_id).copied().unwrap_or(false))
        .filter(|e| !exclude.contains(&e.key()))
        .map(|e| {
            let start = window.at(e.preferred_start());
            let mut slot = ScheduleSlot::new(
                e.task_id,
                e.activity,
                start,
                start + Duration::minutes(e.minutes),
                e.priority + strategy.boost(e.activity),
                e.flexible,
            );
            slot.template_key = Some(e.key());
            slot.activity_config = json!({ "task_id": e.task_id, "source": "schedule" });
            slot
        })
        .collect()
}

/// Place `candidates` around `obstacles`, which never move.
///
/// Returns every candidate: placed ones keep `scheduled` status (possibly
/// with a new start), the rest come back `skipped` with a log line.
pub fn place_slots(
    candidates: Vec<ScheduleSlot>,
    obstacles: &[ScheduleSlot],
    window: &ScheduleWindow,
) -> Vec<ScheduleSlot> {
    let mut occupied: Vec<(DateTime<Utc>, DateTime<Utc>, String)> = obstacles
        .iter()
        .filter(|s| s.occupies_time())
        .map(|s| (s.start_time, s.end_time, s.task_id.clone()))
        .collect();

    let (mut fixed, mut flexible): (Vec<_>, Vec<_>) =
        candidates.into_iter().partition(|s| !s.is_flexible);
    let by_priority = |a: &ScheduleSlot, b: &ScheduleSlot| {
        b.priority
            .cmp(&a.priority)
            .then(a.start_time.cmp(&b.start_time))
    };
    fixed.sort_by(by_priority);
    flexible.sort_by(by_priority);

    let mut placed = Vec::with_capacity(fixed.len() + flexible.len());

    for mut slot in fixed {
        if slot.start_time < window.start() || slot.end_time > window.end() {
            warn!(
                "Inflexible {} slot at {} lies outside the daily window",
                slot.task_id,
                window.label(slot.start_time)
            );
            slot.skip("outside the daily window");
        } else if let Some((_, _, other)) = occupied
            .iter()
            .find(|(s, e, _)| slot.start_time < *e && *s < slot.end_time)
        {
            warn!(
                "Inflexible {} slot at {} conflicts with {}, skipping",
                slot.task_id,
                window.label(slot.start_time),
                other
            );
            let reason = format!("conflicts with {}", other);
            slot.skip(reason);
        } else {
            occupied.push((slot.start_time, slot.end_time, slot.task_id.clone()));
        }
        placed.push(slot);
    }

    for mut slot in flexible {
        match best_start(&slot, &occupied, window) {
            Some(start) => {
                if start != slot.start_time {
                    let from = window.label(slot.start_time);
                    let to = window.label(start);
                    debug!("Shifting {} slot from {} to {}", slot.task_id, from, to);
                    let duration = slot.duration();
                    slot.start_time = start;
                    slot.end_time = start + duration;
                    slot.log(format!("shifted from {} to {} to resolve a conflict", from, to));
                }
                occupied.push((slot.start_time, slot.end_time, slot.task_id.clone()));
            }
            None => {
                warn!(
                    "No free time for {} slot near {}, skipping",
                    slot.task_id,
                    window.label(slot.start_time)
                );
                slot.skip("no free time in the daily window");
            }
        }
        placed.push(slot);
    }

    placed
}

/// Free start closest to the slot's current start; earlier wins ties.
fn best_start(
    slot: &ScheduleSlot,
    occupied: &[(DateTime<Utc>, DateTime<Utc>, String)],
    window: &ScheduleWindow,
) -> Option<DateTime<Utc>> {
    let duration = slot.duration();
    let preferred = slot.start_time;
    let (lo, hi) = (window.start(), window.end());

    let mut starts = vec![preferred, lo, hi - duration];
    for (s, e, _) in occupied {
        starts.push(*e);
        starts.push(*s - duration);
    }

    starts
        .into_iter()
        .filter(|start| *start >= lo && *start + duration <= hi)
        .filter(|start| {
            let end = *start + duration;
            !occupied.iter().any(|(s, e, _)| *start < *e && *s < end)
        })
        .min_by_key(|start| ((*start - preferred).num_seconds().abs(), *start))
}

#[cfg(test)]
#[path = "generator_tests.rs"]
mod tests;
