//! Generic page scraping.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use regex::Regex;
use tracing::info;
use url::Url;

use socialhands_browser::Platform;
use socialhands_workqueue::{HandlerError, JobContext, JobHandler, JobResult, job_types};

use crate::env::{ActionEnv, browser_error};

const EXCERPT_CHARS: usize = 200;

fn url_in_text_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"https?://[^\s<>"']+"#).expect("valid url regex"))
}

/// Loads a page and extracts its title and visible text.
///
/// The target comes from `url`, else the first URL inside a free-text
/// `command`, else the next configured scrape source.
pub struct ScrapeHandler {
    env: Arc<ActionEnv>,
}

impl ScrapeHandler {
    pub fn new(env: Arc<ActionEnv>) -> Self {
        Self { env }
    }

    fn target(&self, ctx: &JobContext) -> Result<Url, HandlerError> {
        let raw = ctx
            .optional_str("url")
            .map(str::to_string)
            .or_else(|| {
                ctx.optional_str("command")
                    .and_then(|c| url_in_text_re().find(c))
                    .map(|m| m.as_str().to_string())
            })
            .or_else(|| self.env.content.next_scrape_source())
            .ok_or_else(|| {
                HandlerError::InvalidInput("nothing to scrape: no URL in payload".to_string())
            })?;

        let url = Url::parse(&raw)
            .map_err(|e| HandlerError::InvalidInput(format!("invalid URL '{}': {}", raw, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(HandlerError::InvalidInput(format!(
                "unsupported scheme '{}'",
                url.scheme()
            )));
        }
        Ok(url)
    }
}

#[async_trait]
impl JobHandler for ScrapeHandler {
    fn job_type(&self) -> &str {
        job_types::SCRAPE
    }

    async fn handle(&self, ctx: &JobContext) -> Result<JobResult, HandlerError> {
        let url = self.target(ctx)?;

        let lease = self.env.lease(Platform::Web).await?;
        let page = lease.page();
        self.env.open(page, Platform::Web, url.as_str()).await?;

        let title = page
            .evaluate("document.title")
            .await
            .map_err(browser_error)?
            .as_str()
            .unwrap_or_default()
            .to_string();
        let text = page
            .evaluate("document.body ? document.body.innerText : ''")
            .await
            .map_err(browser_error)?
            .as_str()
            .unwrap_or_default()
            .to_string();
        let links = page.count("a[href]").await.map_err(browser_error)?;

        info!("Scraped {} ({} chars)", url, text.chars().count());
        let excerpt: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
        let excerpt: String = excerpt.chars().take(EXCERPT_CHARS).collect();

        let mut result = JobResult::ok(format!(
            "scraped '{}' from {} ({} chars, {} links)",
            title,
            url,
            text.chars().count(),
            links
        ))
        .with_artifact(url.to_string());
        if !excerpt.is_empty() {
            result = result.with_artifact(excerpt);
        }
        Ok(self.env.with_screenshot(ctx, page, result).await)
    }
}
