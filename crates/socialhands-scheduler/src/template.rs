//! Default daily template.
//!
//! Times are local to the operator (see `scheduler.utc_offset_minutes`).
//! Posting slots are inflexible; everything else may be shifted.

use chrono::NaiveTime;

use crate::activity::ActivityType;
use crate::tasks::task_ids;

/// One recurring slot of the daily plan.
#[derive(Debug, Clone, Copy)]
pub struct TemplateEntry {
    pub task_id: &'static str,
    pub activity: ActivityType,
    pub hour: u32,
    pub minute: u32,
    pub minutes: i64,
    pub priority: i32,
    pub flexible: bool,
}

impl TemplateEntry {
    /// Stable identity of the entry within a day.
    pub fn key(&self) -> String {
        format!("{}@{:02}:{:02}", self.task_id, self.hour, self.minute)
    }

    pub fn preferred_start(&self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.hour, self.minute, 0).unwrap_or_default()
    }
}

const fn entry(
    task_id: &'static str,
    activity: ActivityType,
    (hour, minute): (u32, u32),
    minutes: i64,
    priority: i32,
    flexible: bool,
) -> TemplateEntry {
    TemplateEntry {
        task_id,
        activity,
        hour,
        minute,
        minutes,
        priority,
        flexible,
    }
}

pub const DEFAULT_TEMPLATE: &[TemplateEntry] = &[
    entry(task_ids::INSTAGRAM_VIEW_STORIES, ActivityType::InstagramStories, (9, 0), 20, 3, true),
    entry(task_ids::TWITTER_POST_CONTENT, ActivityType::TwitterPost, (10, 0), 15, 8, false),
    entry(task_ids::TWITTER_REPLY_MENTIONS, ActivityType::TwitterReply, (10, 10), 30, 6, true),
    entry(task_ids::TWITTER_SEARCH_TRENDS, ActivityType::TwitterSearch, (12, 0), 20, 4, true),
    entry(task_ids::TWITTER_FOLLOW_TARGETS, ActivityType::TwitterFollow, (14, 0), 30, 5, true),
    entry(task_ids::INSTAGRAM_VIEW_REELS, ActivityType::InstagramReels, (16, 0), 30, 2, true),
    entry(task_ids::TWITTER_POST_CONTENT, ActivityType::TwitterPost, (18, 0), 15, 8, false),
    entry(task_ids::TWITTER_REPLY_MENTIONS, ActivityType::TwitterReply, (18, 10), 20, 6, true),
    entry(task_ids::WEB_SCRAPE_SOURCES, ActivityType::WebScrape, (20, 0), 30, 1, true),
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::is_known_task;
    use std::collections::HashSet;

    #[test]
    fn test_template_keys_unique() {
        let keys: HashSet<String> = DEFAULT_TEMPLATE.iter().map(|e| e.key()).collect();
        assert_eq!(keys.len(), DEFAULT_TEMPLATE.len());
    }

    #[test]
    fn test_template_tasks_are_known() {
        assert!(DEFAULT_TEMPLATE.iter().all(|e| is_known_task(e.task_id)));
    }

    #[test]
    fn test_posts_are_inflexible() {
        for e in DEFAULT_TEMPLATE {
            assert_eq!(e.flexible, e.activity != ActivityType::TwitterPost, "{}", e.key());
        }
    }
}
