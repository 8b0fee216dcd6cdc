//! Content sources for scheduled jobs that carry no explicit payload.

use std::sync::atomic::{AtomicUsize, Ordering};

use socialhands_config::ContentConfig;

/// Supplies text and targets for routines.
///
/// Generation is out of scope; implementations pick from prepared lists.
pub trait ContentProvider: Send + Sync {
    fn next_post(&self) -> Option<String>;
    fn next_reply(&self) -> Option<String>;
    fn next_follow_target(&self) -> Option<String>;
    fn next_search_query(&self) -> Option<String>;
    fn next_scrape_source(&self) -> Option<String>;
}

/// Rotates through the lists of the `[content]` config section.
pub struct ConfigContentProvider {
    config: ContentConfig,
    cursors: [AtomicUsize; 5],
}

impl ConfigContentProvider {
    pub fn new(config: ContentConfig) -> Self {
        Self {
            config,
            cursors: Default::default(),
        }
    }

    fn rotate(&self, list: &[String], cursor: usize) -> Option<String> {
        if list.is_empty() {
            return None;
        }
        let i = self.cursors[cursor].fetch_add(1, Ordering::Relaxed);
        Some(list[i % list.len()].clone())
    }
}

impl ContentProvider for ConfigContentProvider {
    fn next_post(&self) -> Option<String> {
        self.rotate(&self.config.drafts, 0)
    }

    fn next_reply(&self) -> Option<String> {
        self.rotate(&self.config.reply_templates, 1)
    }

    fn next_follow_target(&self) -> Option<String> {
        self.rotate(&self.config.follow_targets, 2)
    }

    fn next_search_query(&self) -> Option<String> {
        self.rotate(&self.config.search_queries, 3)
    }

    fn next_scrape_source(&self) -> Option<String> {
        self.rotate(&self.config.scrape_sources, 4)
    }
}
