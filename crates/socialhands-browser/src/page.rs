//! The page abstraction automation routines are written against.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::CdpError;

const SELECTOR_POLL: Duration = Duration::from_millis(250);

/// Quote `s` as a JavaScript string literal.
pub fn js_string(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

/// One browser tab.
///
/// Implementors provide the primitive operations; the selector helpers are
/// built on [`BrowserPage::evaluate`] and may be overridden.
#[async_trait]
pub trait BrowserPage: Send + Sync {
    /// Load `url` and wait until the document is interactive.
    async fn navigate(&self, url: &str) -> Result<(), CdpError>;

    async fn current_url(&self) -> Result<String, CdpError>;

    /// Evaluate a JavaScript expression and return its JSON value.
    async fn evaluate(&self, expression: &str) -> Result<Value, CdpError>;

    /// Insert text at the focused element.
    async fn insert_text(&self, text: &str) -> Result<(), CdpError>;

    async fn press_key(&self, key: &str) -> Result<(), CdpError>;

    /// PNG bytes of the visible viewport.
    async fn screenshot(&self) -> Result<Vec<u8>, CdpError>;

    /// Number of elements matching `selector`.
    async fn count(&self, selector: &str) -> Result<usize, CdpError> {
        let expression = format!("document.querySelectorAll({}).length", js_string(selector));
        Ok(self.evaluate(&expression).await?.as_u64().unwrap_or(0) as usize)
    }

    async fn exists(&self, selector: &str) -> Result<bool, CdpError> {
        Ok(self.count(selector).await? > 0)
    }

    /// Visible text of every element matching `selector`.
    async fn texts(&self, selector: &str) -> Result<Vec<String>, CdpError> {
        let expression = format!(
            "Array.from(document.querySelectorAll({})).map(e => e.innerText || '')",
            js_string(selector)
        );
        let value = self.evaluate(&expression).await?;
        Ok(value
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn text_of(&self, selector: &str) -> Result<Option<String>, CdpError> {
        Ok(self.texts(selector).await?.into_iter().next())
    }

    /// Click the first element matching `selector`.
    async fn click(&self, selector: &str) -> Result<(), CdpError> {
        let expression = format!(
            "(() => {{ const el = document.querySelector({}); \
             if (!el) return false; \
             el.scrollIntoView({{block: 'center'}}); el.click(); return true; }})()",
            js_string(selector)
        );
        match self.evaluate(&expression).await?.as_bool() {
            Some(true) => Ok(()),
            _ => Err(CdpError::ElementNotFound(selector.to_string())),
        }
    }

    /// Focus the first element matching `selector` and type `text` into it.
    async fn type_into(&self, selector: &str, text: &str) -> Result<(), CdpError> {
        let expression = format!(
            "(() => {{ const el = document.querySelector({}); \
             if (!el) return false; el.focus(); return true; }})()",
            js_string(selector)
        );
        match self.evaluate(&expression).await?.as_bool() {
            Some(true) => self.insert_text(text).await,
            _ => Err(CdpError::ElementNotFound(selector.to_string())),
        }
    }

    /// Wait up to `timeout` for `selector` to match. `false` on timeout.
    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<bool, CdpError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.exists(selector).await? {
                return Ok(true);
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(SELECTOR_POLL).await;
        }
    }

    async fn scroll_by(&self, delta_y: i64) -> Result<(), CdpError> {
        self.evaluate(&format!("window.scrollBy(0, {})", delta_y)).await?;
        Ok(())
    }
}
