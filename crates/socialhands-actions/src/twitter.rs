//! Twitter/X routines.

use std::collections::BTreeSet;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use tracing::{info, warn};

use socialhands_browser::{BrowserPage, Platform};
use socialhands_workqueue::{HandlerError, JobContext, JobHandler, JobResult, job_types};

use crate::env::{ActionEnv, browser_error, ledger_error};
use crate::ledger::{content_hash, normalize};

pub(crate) mod selectors {
    pub const TWEET: &str = "article[data-testid='tweet']";
    pub const TWEET_TEXT: &str = "article div[data-testid='tweetText']";
    pub const COMPOSE_TEXTAREA: &str = "div[data-testid='tweetTextarea_0']";
    pub const POST_BUTTON: &str = "button[data-testid='tweetButton']";
    pub const REPLY_BUTTON: &str = "button[data-testid='reply']";
    pub const PROFILE_LINK: &str = "a[data-testid='AppTabBar_Profile_Link']";
    pub const FOLLOW_BUTTON: &str = "button[data-testid$='-follow']";
    pub const UNFOLLOW_BUTTON: &str = "button[data-testid$='-unfollow']";
    pub const STATUS_LINKS: &str = "article a[href*='/status/']";
}

use selectors::*;

const MAX_POST_CHARS: usize = 280;
const DEFAULT_SEARCH_LIMIT: u64 = 10;
const GONE_POLL: Duration = Duration::from_millis(250);

fn status_url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(https?://[^/\s]+/[A-Za-z0-9_]+/status/\d+)").expect("valid status url regex")
    })
}

fn username_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_]{1,15}$").expect("valid username regex"))
}

fn preview(text: &str) -> String {
    let mut out: String = text.chars().take(40).collect();
    if text.chars().count() > 40 {
        out.push_str("...");
    }
    out
}

/// Canonical status URLs linked from the page, in page order.
async fn status_links(page: &dyn BrowserPage) -> Result<Vec<String>, HandlerError> {
    let expression = format!(
        "Array.from(document.querySelectorAll({})).map(a => a.href)",
        socialhands_browser::page::js_string(STATUS_LINKS)
    );
    let value = page.evaluate(&expression).await.map_err(browser_error)?;
    let mut seen = BTreeSet::new();
    Ok(value
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|v| v.as_str())
        .filter_map(|href| status_url_re().captures(href).map(|c| c[1].to_string()))
        .filter(|url| seen.insert(url.clone()))
        .collect())
}

/// Whether a tweet with the same normalized text is rendered on the page.
async fn text_visible(page: &dyn BrowserPage, text: &str) -> Result<bool, HandlerError> {
    let wanted = normalize(text);
    let texts = page.texts(TWEET_TEXT).await.map_err(browser_error)?;
    Ok(texts.iter().any(|t| normalize(t) == wanted))
}

/// Wait until `selector` no longer matches. `false` on timeout.
async fn wait_until_gone(
    page: &dyn BrowserPage,
    selector: &str,
    timeout: Duration,
) -> Result<bool, HandlerError> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if !page.exists(selector).await.map_err(browser_error)? {
            return Ok(true);
        }
        if tokio::time::Instant::now() >= deadline {
            return Ok(false);
        }
        tokio::time::sleep(GONE_POLL).await;
    }
}

/// Type into the open composer and submit, waiting for it to close.
async fn compose_and_submit(
    env: &ActionEnv,
    page: &dyn BrowserPage,
    text: &str,
) -> Result<(), HandlerError> {
    let timeout = env.wait_timeout();
    if !page
        .wait_for_selector(COMPOSE_TEXTAREA, timeout)
        .await
        .map_err(browser_error)?
    {
        return Err(HandlerError::Transient("compose box did not appear".to_string()));
    }
    page.type_into(COMPOSE_TEXTAREA, text)
        .await
        .map_err(browser_error)?;
    page.click(POST_BUTTON).await.map_err(browser_error)?;

    if !wait_until_gone(page, COMPOSE_TEXTAREA, timeout).await? {
        return Err(HandlerError::Transient("submission was not confirmed".to_string()));
    }
    Ok(())
}

fn required_text(
    ctx: &JobContext,
    field: &str,
    fallback: impl FnOnce() -> Option<String>,
    what: &str,
) -> Result<String, HandlerError> {
    let text = ctx.str_or_pin(field, fallback).ok_or_else(|| {
        HandlerError::InvalidInput(format!("no '{}' in payload and no {} configured", field, what))
    })?;
    if text.chars().count() > MAX_POST_CHARS {
        return Err(HandlerError::InvalidInput(format!(
            "text exceeds {} characters",
            MAX_POST_CHARS
        )));
    }
    Ok(text)
}

/// Publishes a post, at most once per dedupe window.
pub struct PostHandler {
    env: Arc<ActionEnv>,
}

impl PostHandler {
    pub fn new(env: Arc<ActionEnv>) -> Self {
        Self { env }
    }
}

#[async_trait]
impl JobHandler for PostHandler {
    fn job_type(&self) -> &str {
        job_types::TWITTER_POST
    }

    async fn handle(&self, ctx: &JobContext) -> Result<JobResult, HandlerError> {
        let env = &self.env;
        let text = required_text(ctx, "content", || env.content.next_post(), "drafts")?;

        let hash = content_hash(job_types::TWITTER_POST, "", &text);
        if env.ledger.contains(&hash, Utc::now()).await.map_err(ledger_error)? {
            info!("Post '{}' is in the ledger, skipping", preview(&text));
            return Ok(JobResult::ok("already posted"));
        }

        let lease = env.lease(Platform::Twitter).await?;
        let page = lease.page();

        // A previous attempt may have posted without recording it.
        env.open(page, Platform::Twitter, &env.twitter_url("home")).await?;
        if page.exists(PROFILE_LINK).await.map_err(browser_error)? {
            page.click(PROFILE_LINK).await.map_err(browser_error)?;
            page.wait_for_selector(TWEET_TEXT, env.wait_timeout())
                .await
                .map_err(browser_error)?;
        }
        if text_visible(page, &text).await? {
            info!("Post '{}' already on the timeline", preview(&text));
            if let Err(e) = env.ledger.record(&hash, job_types::TWITTER_POST, Utc::now()).await {
                warn!("Failed to record post in ledger: {}", e);
            }
            return Ok(JobResult::ok("already posted"));
        }

        env.open(page, Platform::Twitter, &env.twitter_url("compose/post"))
            .await?;
        compose_and_submit(env, page, &text).await?;
        if let Err(e) = env.ledger.record(&hash, job_types::TWITTER_POST, Utc::now()).await {
            warn!("Posted but failed to record in ledger: {}", e);
        }

        info!("Posted '{}'", preview(&text));
        let result = JobResult::ok(format!("posted: {}", preview(&text)));
        Ok(env.with_screenshot(ctx, page, result).await)
    }
}

/// Replies to a given tweet, or to the latest mention.
pub struct ReplyHandler {
    env: Arc<ActionEnv>,
}

impl ReplyHandler {
    pub fn new(env: Arc<ActionEnv>) -> Self {
        Self { env }
    }

    async fn latest_mention(&self, page: &dyn BrowserPage) -> Result<Option<String>, HandlerError> {
        let env = &self.env;
        env.open(page, Platform::Twitter, &env.twitter_url("notifications/mentions"))
            .await?;
        if !page
            .wait_for_selector(TWEET, env.wait_timeout())
            .await
            .map_err(browser_error)?
        {
            return Ok(None);
        }
        Ok(status_links(page).await?.into_iter().next())
    }
}

#[async_trait]
impl JobHandler for ReplyHandler {
    fn job_type(&self) -> &str {
        job_types::TWITTER_REPLY
    }

    async fn handle(&self, ctx: &JobContext) -> Result<JobResult, HandlerError> {
        let env = &self.env;
        let explicit_target = match ctx.optional_str("tweet_url") {
            Some(url) => Some(
                status_url_re()
                    .captures(url)
                    .map(|c| c[1].to_string())
                    .ok_or_else(|| {
                        HandlerError::InvalidInput(format!("'{}' is not a status URL", url))
                    })?,
            ),
            None => None,
        };
        let text = required_text(ctx, "text", || env.content.next_reply(), "reply templates")?;

        let lease = env.lease(Platform::Twitter).await?;
        let page = lease.page();

        let target = match explicit_target {
            Some(target) => target,
            None => match self.latest_mention(page).await? {
                Some(target) => {
                    ctx.pin("tweet_url", target.clone());
                    target
                }
                None => return Ok(JobResult::ok("no mentions to reply to")),
            },
        };

        let hash = content_hash(job_types::TWITTER_REPLY, &target, &text);
        if env.ledger.contains(&hash, Utc::now()).await.map_err(ledger_error)? {
            info!("Reply to {} is in the ledger, skipping", target);
            return Ok(JobResult::ok(format!("already replied to {}", target)));
        }

        env.open(page, Platform::Twitter, &target).await?;
        if !page
            .wait_for_selector(TWEET, env.wait_timeout())
            .await
            .map_err(browser_error)?
        {
            return Err(HandlerError::Transient(format!("{} did not load", target)));
        }
        if text_visible(page, &text).await? {
            info!("Reply already visible in {}", target);
            if let Err(e) = env.ledger.record(&hash, job_types::TWITTER_REPLY, Utc::now()).await {
                warn!("Failed to record reply in ledger: {}", e);
            }
            return Ok(JobResult::ok(format!("already replied to {}", target)));
        }

        page.click(REPLY_BUTTON).await.map_err(browser_error)?;
        compose_and_submit(env, page, &text).await?;
        if let Err(e) = env.ledger.record(&hash, job_types::TWITTER_REPLY, Utc::now()).await {
            warn!("Replied but failed to record in ledger: {}", e);
        }

        info!("Replied to {}", target);
        let result = JobResult::ok(format!("replied to {}", target)).with_artifact(target);
        Ok(env.with_screenshot(ctx, page, result).await)
    }
}

/// Follows an account unless already following it.
pub struct FollowHandler {
    env: Arc<ActionEnv>,
}

impl FollowHandler {
    pub fn new(env: Arc<ActionEnv>) -> Self {
        Self { env }
    }
}

#[async_trait]
impl JobHandler for FollowHandler {
    fn job_type(&self) -> &str {
        job_types::TWITTER_FOLLOW
    }

    async fn handle(&self, ctx: &JobContext) -> Result<JobResult, HandlerError> {
        let env = &self.env;
        let raw = ctx
            .str_or_pin("username", || env.content.next_follow_target())
            .ok_or_else(|| {
                HandlerError::InvalidInput(
                    "no 'username' in payload and no follow targets configured".to_string(),
                )
            })?;
        let username = raw.trim().trim_start_matches('@').to_string();
        if !username_re().is_match(&username) {
            return Err(HandlerError::InvalidInput(format!(
                "'{}' is not a valid username",
                raw
            )));
        }

        let lease = env.lease(Platform::Twitter).await?;
        let page = lease.page();
        env.open(page, Platform::Twitter, &env.twitter_url(&username))
            .await?;

        if page.exists(UNFOLLOW_BUTTON).await.map_err(browser_error)? {
            return Ok(JobResult::ok(format!("already following @{}", username)));
        }
        if !page
            .wait_for_selector(FOLLOW_BUTTON, env.wait_timeout())
            .await
            .map_err(browser_error)?
        {
            return Err(HandlerError::Transient(format!(
                "follow button for @{} not found",
                username
            )));
        }

        page.click(FOLLOW_BUTTON).await.map_err(browser_error)?;
        if !page
            .wait_for_selector(UNFOLLOW_BUTTON, env.wait_timeout())
            .await
            .map_err(browser_error)?
        {
            return Err(HandlerError::Transient(format!(
                "follow of @{} was not confirmed",
                username
            )));
        }

        info!("Followed @{}", username);
        let result = JobResult::ok(format!("followed @{}", username));
        Ok(env.with_screenshot(ctx, page, result).await)
    }
}

/// Runs a search and reports the status URLs found.
pub struct SearchHandler {
    env: Arc<ActionEnv>,
}

impl SearchHandler {
    pub fn new(env: Arc<ActionEnv>) -> Self {
        Self { env }
    }
}

#[async_trait]
impl JobHandler for SearchHandler {
    fn job_type(&self) -> &str {
        job_types::TWITTER_SEARCH
    }

    async fn handle(&self, ctx: &JobContext) -> Result<JobResult, HandlerError> {
        let env = &self.env;
        let query = ctx
            .optional_str("query")
            .map(str::to_string)
            .or_else(|| env.content.next_search_query())
            .ok_or_else(|| {
                HandlerError::InvalidInput(
                    "no 'query' in payload and no search queries configured".to_string(),
                )
            })?;
        let limit = ctx
            .data()
            .get("limit")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(DEFAULT_SEARCH_LIMIT)
            .clamp(1, 50) as usize;

        let encoded: String = url::form_urlencoded::byte_serialize(query.as_bytes()).collect();
        let search_url = env.twitter_url(&format!("search?q={}&src=typed_query&f=live", encoded));

        let lease = env.lease(Platform::Twitter).await?;
        let page = lease.page();
        env.open(page, Platform::Twitter, &search_url).await?;

        if !page
            .wait_for_selector(TWEET, env.wait_timeout())
            .await
            .map_err(browser_error)?
        {
            return Ok(JobResult::ok(format!("no results for '{}'", query)));
        }

        let links: Vec<String> = status_links(page).await?.into_iter().take(limit).collect();
        info!("Search '{}' found {} result(s)", query, links.len());

        let mut result = JobResult::ok(format!("found {} results for '{}'", links.len(), query));
        for link in links {
            result = result.with_artifact(link);
        }
        Ok(env.with_screenshot(ctx, page, result).await)
    }
}

#[cfg(test)]
#[path = "twitter_tests.rs"]
mod tests;
