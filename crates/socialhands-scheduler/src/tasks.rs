//! Task identifiers and their default enabled state.

use socialhands_state::TaskConfiguration;

/// Task identifiers the scheduler recognizes.
pub mod task_ids {
    pub const TWITTER_POST_CONTENT: &str = "TWITTER_POST_CONTENT";
    pub const TWITTER_REPLY_MENTIONS: &str = "TWITTER_REPLY_MENTIONS";
    pub const TWITTER_SEARCH_TRENDS: &str = "TWITTER_SEARCH_TRENDS";
    pub const TWITTER_FOLLOW_TARGETS: &str = "TWITTER_FOLLOW_TARGETS";
    pub const INSTAGRAM_VIEW_STORIES: &str = "INSTAGRAM_VIEW_STORIES";
    pub const INSTAGRAM_VIEW_REELS: &str = "INSTAGRAM_VIEW_REELS";
    pub const WEB_SCRAPE_SOURCES: &str = "WEB_SCRAPE_SOURCES";
}

const DEFAULTS: &[(&str, bool)] = &[
    (task_ids::TWITTER_POST_CONTENT, true),
    (task_ids::TWITTER_REPLY_MENTIONS, true),
    (task_ids::TWITTER_SEARCH_TRENDS, true),
    (task_ids::TWITTER_FOLLOW_TARGETS, false),
    (task_ids::INSTAGRAM_VIEW_STORIES, true),
    (task_ids::INSTAGRAM_VIEW_REELS, false),
    (task_ids::WEB_SCRAPE_SOURCES, false),
];

/// The configuration seeded on first read.
pub fn default_task_configuration() -> TaskConfiguration {
    DEFAULTS
        .iter()
        .map(|(id, enabled)| (id.to_string(), *enabled))
        .collect()
}

pub fn is_known_task(id: &str) -> bool {
    DEFAULTS.iter().any(|(known, _)| *known == id)
}
