//! Browser, content and API configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::data_dir;

/// Browser automation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Chrome remote debugging port.
    #[serde(default = "default_debug_port")]
    pub debug_port: u16,

    #[serde(default)]
    pub headless: bool,

    /// Chrome profile holding the logged-in platform sessions.
    #[serde(default = "default_profile_dir")]
    pub profile_dir: PathBuf,

    #[serde(default = "default_navigation_timeout")]
    pub navigation_timeout_secs: u64,

    /// Where diagnostic screenshots are written.
    #[serde(default = "default_screenshot_dir")]
    pub screenshot_dir: PathBuf,

    /// Window in which identical content counts as already posted.
    #[serde(default = "default_dedupe_window")]
    pub dedupe_window_minutes: i64,

    #[serde(default = "default_twitter_url")]
    pub twitter_base_url: String,

    #[serde(default = "default_instagram_url")]
    pub instagram_base_url: String,
}

fn default_debug_port() -> u16 {
    9222
}

fn default_profile_dir() -> PathBuf {
    data_dir().join("browser-profile")
}

fn default_navigation_timeout() -> u64 {
    30
}

fn default_screenshot_dir() -> PathBuf {
    data_dir().join("screenshots")
}

fn default_dedupe_window() -> i64 {
    60
}

fn default_twitter_url() -> String {
    "https://x.com".to_string()
}

fn default_instagram_url() -> String {
    "https://www.instagram.com".to_string()
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            debug_port: default_debug_port(),
            headless: false,
            profile_dir: default_profile_dir(),
            navigation_timeout_secs: default_navigation_timeout(),
            screenshot_dir: default_screenshot_dir(),
            dedupe_window_minutes: default_dedupe_window(),
            twitter_base_url: default_twitter_url(),
            instagram_base_url: default_instagram_url(),
        }
    }
}

/// Content source for scheduled posts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContentConfig {
    /// Draft posts, used in rotation.
    #[serde(default)]
    pub drafts: Vec<String>,

    /// Reply text for mentions.
    #[serde(default)]
    pub reply_templates: Vec<String>,

    /// Accounts followed by the follow routine.
    #[serde(default)]
    pub follow_targets: Vec<String>,

    /// Queries used by the search routine.
    #[serde(default)]
    pub search_queries: Vec<String>,

    /// Pages visited by the scrape routine.
    #[serde(default)]
    pub scrape_sources: Vec<String>,
}

/// HTTP API configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default)]
    pub users: Vec<ApiUser>,
}

/// A bearer token bound to an operator identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiUser {
    pub token: String,
    pub user_id: String,
    #[serde(default)]
    pub permissions: Vec<String>,
}
