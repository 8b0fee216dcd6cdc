//! Instagram viewing routines.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use socialhands_browser::{BrowserPage, Platform};
use socialhands_workqueue::{HandlerError, JobContext, JobHandler, JobResult, job_types};

use crate::env::{ActionEnv, browser_error};

const STORY_TRAY_ITEM: &str = "div[role='menu'] li div[role='button']";
const STORY_VIEWER: &str = "section div[role='dialog']";
const REEL_VIDEO: &str = "main video";

const DEFAULT_ITEMS: u64 = 5;
const MAX_ITEMS: u64 = 50;
const DEFAULT_DWELL_SECS: u64 = 3;
const MAX_DWELL_SECS: u64 = 30;

fn bounded(ctx: &JobContext, field: &str, default: u64, max: u64) -> u64 {
    ctx.data()
        .get(field)
        .and_then(serde_json::Value::as_u64)
        .unwrap_or(default)
        .clamp(1, max)
}

fn dwell(ctx: &JobContext) -> Duration {
    Duration::from_secs(bounded(ctx, "dwell_secs", DEFAULT_DWELL_SECS, MAX_DWELL_SECS))
}

/// Watches stories from the home tray.
pub struct StoriesHandler {
    env: Arc<ActionEnv>,
}

impl StoriesHandler {
    pub fn new(env: Arc<ActionEnv>) -> Self {
        Self { env }
    }
}

#[async_trait]
impl JobHandler for StoriesHandler {
    fn job_type(&self) -> &str {
        job_types::INSTAGRAM_VIEW_STORIES
    }

    async fn handle(&self, ctx: &JobContext) -> Result<JobResult, HandlerError> {
        let env = &self.env;
        let max = bounded(ctx, "max_stories", DEFAULT_ITEMS, MAX_ITEMS);
        let dwell = dwell(ctx);

        let lease = env.lease(Platform::Instagram).await?;
        let page = lease.page();
        env.open(page, Platform::Instagram, &env.instagram_url(""))
            .await?;

        if !page
            .wait_for_selector(STORY_TRAY_ITEM, env.wait_timeout())
            .await
            .map_err(browser_error)?
        {
            return Ok(JobResult::ok("no stories to view"));
        }
        page.click(STORY_TRAY_ITEM).await.map_err(browser_error)?;
        if !page
            .wait_for_selector(STORY_VIEWER, env.wait_timeout())
            .await
            .map_err(browser_error)?
        {
            return Err(HandlerError::Transient("story viewer did not open".to_string()));
        }

        let viewed = watch(page, STORY_VIEWER, "ArrowRight", max, dwell).await?;
        // Closing is cosmetic; the viewer may already be gone.
        if let Err(e) = page.press_key("Escape").await {
            debug!("Closing story viewer failed: {}", e);
        }

        info!("Viewed {} stories", viewed);
        let result = JobResult::ok(format!("viewed {} stories", viewed));
        Ok(env.with_screenshot(ctx, page, result).await)
    }
}

/// Scrolls through the reels feed.
pub struct ReelsHandler {
    env: Arc<ActionEnv>,
}

impl ReelsHandler {
    pub fn new(env: Arc<ActionEnv>) -> Self {
        Self { env }
    }
}

#[async_trait]
impl JobHandler for ReelsHandler {
    fn job_type(&self) -> &str {
        job_types::INSTAGRAM_VIEW_REELS
    }

    async fn handle(&self, ctx: &JobContext) -> Result<JobResult, HandlerError> {
        let env = &self.env;
        let count = bounded(ctx, "count", DEFAULT_ITEMS, MAX_ITEMS);
        let dwell = dwell(ctx);

        let lease = env.lease(Platform::Instagram).await?;
        let page = lease.page();
        env.open(page, Platform::Instagram, &env.instagram_url("reels/"))
            .await?;

        if !page
            .wait_for_selector(REEL_VIDEO, env.wait_timeout())
            .await
            .map_err(browser_error)?
        {
            return Err(HandlerError::Transient("reels feed did not load".to_string()));
        }

        let viewed = watch(page, REEL_VIDEO, "ArrowDown", count, dwell).await?;

        info!("Viewed {} reels", viewed);
        let result = JobResult::ok(format!("viewed {} reels", viewed));
        Ok(env.with_screenshot(ctx, page, result).await)
    }
}

/// Dwell on up to `max` items, advancing with `advance_key` while `present`
/// still matches.
async fn watch(
    page: &dyn BrowserPage,
    present: &str,
    advance_key: &str,
    max: u64,
    dwell: Duration,
) -> Result<u64, HandlerError> {
    let mut viewed = 0;
    while viewed < max {
        if !page.exists(present).await.map_err(browser_error)? {
            break;
        }
        tokio::time::sleep(dwell).await;
        viewed += 1;
        if viewed < max {
            page.press_key(advance_key).await.map_err(browser_error)?;
        }
    }
    Ok(viewed)
}
