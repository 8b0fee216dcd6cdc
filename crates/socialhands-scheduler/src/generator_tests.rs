use super::*;
use crate::activity::ActivityType;
use crate::slot::SlotStatus;
use crate::tasks::{default_task_configuration, task_ids};
use crate::template::DEFAULT_TEMPLATE;

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
}

fn hm(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

fn window() -> ScheduleWindow {
    ScheduleWindow::new(date(), hm(8, 0), hm(22, 0), FixedOffset::east_opt(0).unwrap())
}

fn slot(w: &ScheduleWindow, task: &str, start: NaiveTime, minutes: i64, priority: i32, flexible: bool) -> ScheduleSlot {
    let s = w.at(start);
    ScheduleSlot::new(task, ActivityType::TwitterReply, s, s + Duration::minutes(minutes), priority, flexible)
}

fn all_enabled() -> TaskConfiguration {
    default_task_configuration()
        .into_keys()
        .map(|k| (k, true))
        .collect()
}

fn generate(tasks: &TaskConfiguration, strategy: StrategyFocus) -> Vec<ScheduleSlot> {
    let w = window();
    let candidates = materialize(DEFAULT_TEMPLATE, tasks, strategy, &w, &HashSet::new());
    place_slots(candidates, &[], &w)
}

fn assert_no_overlap(slots: &[ScheduleSlot]) {
    let placed: Vec<_> = slots.iter().filter(|s| s.occupies_time()).collect();
    for (i, a) in placed.iter().enumerate() {
        for b in &placed[i + 1..] {
            assert!(!a.overlaps(b), "{} overlaps {}", a.task_id, b.task_id);
        }
    }
}

#[test]
fn test_window_offset() {
    let w = ScheduleWindow::new(date(), hm(8, 0), hm(22, 0), FixedOffset::east_opt(2 * 3600).unwrap());
    assert_eq!(w.start(), Utc.with_ymd_and_hms(2024, 5, 1, 6, 0, 0).unwrap());
    assert_eq!(w.label(w.start()), "08:00");
    assert_eq!(
        local_date(Utc.with_ymd_and_hms(2024, 5, 1, 23, 30, 0).unwrap(), w.offset),
        NaiveDate::from_ymd_opt(2024, 5, 2).unwrap()
    );
}

#[test]
fn test_default_generation_filters_disabled_tasks() {
    let slots = generate(&default_task_configuration(), StrategyFocus::Balanced);
    assert!(slots.iter().all(|s| s.task_id != task_ids::TWITTER_FOLLOW_TARGETS));
    assert!(slots.iter().all(|s| s.task_id != task_ids::WEB_SCRAPE_SOURCES));
    assert_eq!(
        slots.iter().filter(|s| s.task_id == task_ids::TWITTER_POST_CONTENT).count(),
        2
    );
    assert_no_overlap(&slots);
}

#[test]
fn test_unknown_tasks_are_ignored() {
    let mut tasks = default_task_configuration();
    tasks.insert("X".to_string(), true);
    let slots = generate(&tasks, StrategyFocus::Balanced);
    assert!(slots.iter().all(|s| s.task_id != "X"));
}

#[test]
fn test_flexible_reply_shifts_after_inflexible_post() {
    let slots = generate(&default_task_configuration(), StrategyFocus::Balanced);
    let w = window();
    let reply = slots
        .iter()
        .find(|s| s.template_key.as_deref() == Some("TWITTER_REPLY_MENTIONS@10:10"))
        .unwrap();
    assert_eq!(reply.status, SlotStatus::Scheduled);
    assert_eq!(reply.start_time, w.at(hm(10, 15)));
    assert_eq!(reply.end_time, w.at(hm(10, 45)));
    assert!(reply.execution_log[0].contains("shifted from 10:10 to 10:15"));

    let post = slots
        .iter()
        .find(|s| s.template_key.as_deref() == Some("TWITTER_POST_CONTENT@10:00"))
        .unwrap();
    assert_eq!(post.start_time, w.at(hm(10, 0)));
    assert!(post.execution_log.is_empty());
}

#[test]
fn test_every_strategy_yields_no_overlap() {
    for strategy in [
        StrategyFocus::Balanced,
        StrategyFocus::Growth,
        StrategyFocus::Engagement,
        StrategyFocus::Content,
    ] {
        let slots = generate(&all_enabled(), strategy);
        assert_eq!(slots.len(), DEFAULT_TEMPLATE.len());
        assert_no_overlap(&slots);
        assert!(slots.iter().all(|s| s.status == SlotStatus::Scheduled));
    }
}

#[test]
fn test_strategy_boosts_priority() {
    let slots = generate(&all_enabled(), StrategyFocus::Growth);
    let follow = slots
        .iter()
        .find(|s| s.task_id == task_ids::TWITTER_FOLLOW_TARGETS)
        .unwrap();
    assert_eq!(follow.priority, 8);
}

#[test]
fn test_inflexible_conflict_skips_lower_priority() {
    let w = window();
    let high = slot(&w, "HIGH", hm(12, 0), 30, 9, false);
    let low = slot(&w, "LOW", hm(12, 15), 30, 2, false);
    let placed = place_slots(vec![low, high], &[], &w);

    let high = placed.iter().find(|s| s.task_id == "HIGH").unwrap();
    let low = placed.iter().find(|s| s.task_id == "LOW").unwrap();
    assert_eq!(high.status, SlotStatus::Scheduled);
    assert_eq!(low.status, SlotStatus::Skipped);
    assert!(low.execution_log[0].contains("conflicts with HIGH"));
}

#[test]
fn test_flexible_picks_nearest_side() {
    let w = window();
    let blocker = slot(&w, "BLOCK", hm(12, 0), 60, 9, false);
    // Preferred 12:40 for 30 minutes: 13:00 is 20 minutes away, 11:30 is 70.
    let flex = slot(&w, "FLEX", hm(12, 40), 30, 1, true);
    let placed = place_slots(vec![flex], &[blocker], &w);
    assert_eq!(placed[0].start_time, w.at(hm(13, 0)));

    // Preferred 12:05: 11:30 is 35 minutes away, 13:00 is 55.
    let blocker = slot(&w, "BLOCK", hm(12, 0), 60, 9, false);
    let flex = slot(&w, "FLEX", hm(12, 5), 30, 1, true);
    let placed = place_slots(vec![flex], &[blocker], &w);
    assert_eq!(placed[0].start_time, w.at(hm(11, 30)));
}

#[test]
fn test_flexible_skipped_when_no_room() {
    let w = ScheduleWindow::new(date(), hm(9, 0), hm(10, 0), FixedOffset::east_opt(0).unwrap());
    let blocker = slot(&w, "BLOCK", hm(9, 0), 45, 9, false);
    let flex = slot(&w, "FLEX", hm(9, 10), 30, 1, true);
    let placed = place_slots(vec![flex], &[blocker], &w);

    assert_eq!(placed[0].status, SlotStatus::Skipped);
    assert!(placed[0].execution_log[0].contains("no free time"));
}

#[test]
fn test_flexible_moved_inside_window() {
    let w = window();
    let early = slot(&w, "EARLY", hm(7, 0), 30, 1, true);
    let placed = place_slots(vec![early], &[], &w);
    assert_eq!(placed[0].start_time, w.at(hm(8, 0)));
}

#[test]
fn test_inflexible_outside_window_skipped() {
    let w = ScheduleWindow::new(date(), hm(11, 0), hm(22, 0), FixedOffset::east_opt(0).unwrap());
    let post = slot(&w, "POST", hm(10, 0), 15, 8, false);
    let placed = place_slots(vec![post], &[], &w);
    assert_eq!(placed[0].status, SlotStatus::Skipped);
}

#[test]
fn test_skipped_obstacles_do_not_block() {
    let w = window();
    let mut ghost = slot(&w, "GHOST", hm(12, 0), 60, 9, false);
    ghost.status = SlotStatus::Skipped;
    let flex = slot(&w, "FLEX", hm(12, 0), 30, 1, true);
    let placed = place_slots(vec![flex], &[ghost], &w);
    assert_eq!(placed[0].start_time, w.at(hm(12, 0)));
}

#[test]
fn test_exclude_keys() {
    let w = window();
    let mut exclude = HashSet::new();
    exclude.insert("TWITTER_POST_CONTENT@10:00".to_string());
    let slots = materialize(
        DEFAULT_TEMPLATE,
        &default_task_configuration(),
        StrategyFocus::Balanced,
        &w,
        &exclude,
    );
    assert!(slots.iter().all(|s| s.template_key.as_deref() != Some("TWITTER_POST_CONTENT@10:00")));
    assert!(slots.iter().any(|s| s.template_key.as_deref() == Some("TWITTER_POST_CONTENT@18:00")));
}
