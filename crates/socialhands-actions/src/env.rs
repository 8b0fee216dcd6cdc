//! Shared environment of the automation routines.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use socialhands_browser::{BrowserPage, CdpError, Platform, SessionLease, SessionProvider};
use socialhands_config::BrowserConfig;
use socialhands_state::StateError;
use socialhands_workqueue::{HandlerError, JobContext, JobResult};

use crate::content::ContentProvider;
use crate::ledger::PostLedger;

/// URL fragments of the platforms' login flows.
const LOGIN_PATHS: &[&str] = &["/login", "/i/flow/login", "/accounts/login"];
const PASSWORD_INPUT: &str = "input[name='password'], input[type='password']";

/// Classify a browser failure.
pub fn browser_error(e: CdpError) -> HandlerError {
    if e.is_transient() {
        HandlerError::Transient(e.to_string())
    } else {
        HandlerError::Failed(e.to_string())
    }
}

/// The ledger could not be consulted, so dedupe cannot be guaranteed yet.
pub(crate) fn ledger_error(e: StateError) -> HandlerError {
    HandlerError::Transient(format!("post ledger unavailable: {}", e))
}

/// Everything a routine needs besides its payload.
pub struct ActionEnv {
    pub sessions: Arc<dyn SessionProvider>,
    pub content: Arc<dyn ContentProvider>,
    pub ledger: PostLedger,
    pub config: BrowserConfig,
}

impl ActionEnv {
    pub fn new(
        sessions: Arc<dyn SessionProvider>,
        content: Arc<dyn ContentProvider>,
        ledger: PostLedger,
        config: BrowserConfig,
    ) -> Self {
        Self {
            sessions,
            content,
            ledger,
            config,
        }
    }

    /// Upper bound for any single wait on page content.
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.config.navigation_timeout_secs.max(1))
    }

    pub fn twitter_url(&self, path: &str) -> String {
        join_url(&self.config.twitter_base_url, path)
    }

    pub fn instagram_url(&self, path: &str) -> String {
        join_url(&self.config.instagram_base_url, path)
    }

    pub async fn lease(&self, platform: Platform) -> Result<SessionLease, HandlerError> {
        self.sessions.acquire(platform).await.map_err(browser_error)
    }

    /// Navigate and fail with `NotAuthenticated` if the platform shows its
    /// login page instead of content.
    pub async fn open(
        &self,
        page: &dyn BrowserPage,
        platform: Platform,
        url: &str,
    ) -> Result<(), HandlerError> {
        page.navigate(url).await.map_err(browser_error)?;
        if platform != Platform::Web {
            ensure_authenticated(page, platform).await?;
        }
        Ok(())
    }

    /// Save a diagnostic screenshot when the payload asks for one and attach
    /// its path. Capture failures never fail the job.
    pub async fn with_screenshot(
        &self,
        ctx: &JobContext,
        page: &dyn BrowserPage,
        result: JobResult,
    ) -> JobResult {
        let wanted = ctx
            .data()
            .get("screenshot")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false);
        if !wanted {
            return result;
        }
        match self.capture(page, &format!("{}-{}", ctx.job.job_type, ctx.job.id)).await {
            Some(path) => result.with_artifact(path.display().to_string()),
            None => result,
        }
    }

    async fn capture(&self, page: &dyn BrowserPage, name: &str) -> Option<PathBuf> {
        let bytes = match page.screenshot().await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Screenshot failed: {}", e);
                return None;
            }
        };
        let dir = &self.config.screenshot_dir;
        if let Err(e) = tokio::fs::create_dir_all(dir).await {
            warn!("Cannot create screenshot directory {}: {}", dir.display(), e);
            return None;
        }
        let path = dir.join(format!("{}.png", name));
        match tokio::fs::write(&path, bytes).await {
            Ok(()) => {
                debug!("Saved screenshot to {}", path.display());
                Some(path)
            }
            Err(e) => {
                warn!("Failed to write screenshot {}: {}", path.display(), e);
                None
            }
        }
    }
}

/// `NotAuthenticated` if `page` shows a login flow.
pub async fn ensure_authenticated(
    page: &dyn BrowserPage,
    platform: Platform,
) -> Result<(), HandlerError> {
    let url = page.current_url().await.map_err(browser_error)?;
    let on_login_path = LOGIN_PATHS.iter().any(|p| url.contains(p));
    if on_login_path || page.exists(PASSWORD_INPUT).await.map_err(browser_error)? {
        warn!("{} session is logged out ({})", platform, url);
        return Err(HandlerError::NotAuthenticated(platform.to_string()));
    }
    Ok(())
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakePage, env, job};
    use serde_json::json;

    #[test]
    fn test_join_url() {
        assert_eq!(join_url("https://x.com/", "/home"), "https://x.com/home");
        assert_eq!(join_url("https://x.com", "search?q=a"), "https://x.com/search?q=a");
    }

    #[test]
    fn test_browser_error_classification() {
        assert!(browser_error(CdpError::Timeout("load".into())).is_transient());
        assert!(matches!(
            browser_error(CdpError::ChromeNotFound),
            HandlerError::Failed(_)
        ));
    }

    #[tokio::test]
    async fn test_login_redirect_is_not_authenticated() {
        let page = FakePage::new().redirect_to_login();
        let (env, _) = env(page.clone());
        let err = env
            .open(page.as_ref(), Platform::Twitter, "https://x.com/home")
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::NotAuthenticated(p) if p == "twitter"));
    }

    #[tokio::test]
    async fn test_password_form_is_not_authenticated() {
        let page = FakePage::new().with_elements(PASSWORD_INPUT, &[""]);
        assert!(matches!(
            ensure_authenticated(page.as_ref(), Platform::Instagram).await,
            Err(HandlerError::NotAuthenticated(_))
        ));
    }

    #[tokio::test]
    async fn test_screenshot_attached_on_request() {
        let dir = tempfile::tempdir().unwrap();
        let page = FakePage::new();
        let (env, _) = crate::testing::env_with(page.clone(), |config| {
            config.screenshot_dir = dir.path().join("shots");
        });

        let ctx = job("test-job", json!({"screenshot": true}));
        let result = env
            .with_screenshot(&ctx, page.as_ref(), JobResult::ok("done"))
            .await;
        assert_eq!(result.artifacts.len(), 1);
        assert!(std::path::Path::new(&result.artifacts[0]).exists());

        let ctx = job("test-job", json!({}));
        let result = env
            .with_screenshot(&ctx, page.as_ref(), JobResult::ok("done"))
            .await;
        assert!(result.artifacts.is_empty());
    }
}
