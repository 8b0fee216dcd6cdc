//! Scriptable page and environment for routine tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use socialhands_browser::{BrowserPage, CdpError, FixedSessionProvider, Platform};
use socialhands_config::{BrowserConfig, ContentConfig};
use socialhands_state::{ControlStore, MemorySettingsStore};
use socialhands_workqueue::{Job, JobContext};

use crate::content::ConfigContentProvider;
use crate::env::ActionEnv;
use crate::ledger::PostLedger;

pub(crate) const LOGIN_URL: &str = "https://x.com/i/flow/login";

#[derive(Default)]
struct FakeState {
    url: String,
    elements: HashMap<String, Vec<String>>,
    click_adds: HashMap<String, Vec<(String, Vec<String>)>>,
    click_removes: HashMap<String, Vec<String>>,
    evals: Vec<(String, Value)>,
    login_redirect: bool,
    fail_navigation: bool,
    navigations: Vec<String>,
    clicks: Vec<String>,
    typed: Vec<(String, String)>,
    keys: Vec<String>,
}

/// A page whose DOM is a map from selector to element texts.
#[derive(Default)]
pub(crate) struct FakePage {
    state: Mutex<FakeState>,
}

impl FakePage {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn redirect_to_login(self: Arc<Self>) -> Arc<Self> {
        self.state.lock().login_redirect = true;
        self
    }

    pub fn failing_navigation(self: Arc<Self>) -> Arc<Self> {
        self.state.lock().fail_navigation = true;
        self
    }

    pub fn with_elements(self: Arc<Self>, selector: &str, texts: &[&str]) -> Arc<Self> {
        self.state.lock().elements.insert(
            selector.to_string(),
            texts.iter().map(|t| t.to_string()).collect(),
        );
        self
    }

    /// Clicking `selector` makes `added` appear with `texts`.
    pub fn on_click_add(self: Arc<Self>, selector: &str, added: &str, texts: &[&str]) -> Arc<Self> {
        self.state
            .lock()
            .click_adds
            .entry(selector.to_string())
            .or_default()
            .push((added.to_string(), texts.iter().map(|t| t.to_string()).collect()));
        self
    }

    /// Clicking `selector` removes `removed`.
    pub fn on_click_remove(self: Arc<Self>, selector: &str, removed: &str) -> Arc<Self> {
        self.state
            .lock()
            .click_removes
            .entry(selector.to_string())
            .or_default()
            .push(removed.to_string());
        self
    }

    /// `evaluate` of any expression containing `fragment` returns `value`.
    pub fn with_eval(self: Arc<Self>, fragment: &str, value: Value) -> Arc<Self> {
        self.state.lock().evals.push((fragment.to_string(), value));
        self
    }

    pub fn navigations(&self) -> Vec<String> {
        self.state.lock().navigations.clone()
    }

    pub fn clicks(&self) -> Vec<String> {
        self.state.lock().clicks.clone()
    }

    pub fn typed(&self) -> Vec<(String, String)> {
        self.state.lock().typed.clone()
    }

    pub fn keys(&self) -> Vec<String> {
        self.state.lock().keys.clone()
    }
}

#[async_trait]
impl BrowserPage for FakePage {
    async fn navigate(&self, url: &str) -> Result<(), CdpError> {
        let mut state = self.state.lock();
        state.navigations.push(url.to_string());
        if state.fail_navigation {
            return Err(CdpError::Timeout("Page load timeout".to_string()));
        }
        state.url = if state.login_redirect {
            LOGIN_URL.to_string()
        } else {
            url.to_string()
        };
        Ok(())
    }

    async fn current_url(&self) -> Result<String, CdpError> {
        Ok(self.state.lock().url.clone())
    }

    async fn evaluate(&self, expression: &str) -> Result<Value, CdpError> {
        let state = self.state.lock();
        Ok(state
            .evals
            .iter()
            .find(|(fragment, _)| expression.contains(fragment.as_str()))
            .map(|(_, v)| v.clone())
            .unwrap_or(Value::Null))
    }

    async fn insert_text(&self, text: &str) -> Result<(), CdpError> {
        self.state
            .lock()
            .typed
            .push((String::new(), text.to_string()));
        Ok(())
    }

    async fn press_key(&self, key: &str) -> Result<(), CdpError> {
        self.state.lock().keys.push(key.to_string());
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>, CdpError> {
        Ok(vec![0x89, b'P', b'N', b'G'])
    }

    async fn count(&self, selector: &str) -> Result<usize, CdpError> {
        Ok(self
            .state
            .lock()
            .elements
            .get(selector)
            .map_or(0, Vec::len))
    }

    async fn texts(&self, selector: &str) -> Result<Vec<String>, CdpError> {
        Ok(self
            .state
            .lock()
            .elements
            .get(selector)
            .cloned()
            .unwrap_or_default())
    }

    async fn click(&self, selector: &str) -> Result<(), CdpError> {
        let mut state = self.state.lock();
        if state.elements.get(selector).is_none_or(Vec::is_empty) {
            return Err(CdpError::ElementNotFound(selector.to_string()));
        }
        state.clicks.push(selector.to_string());
        for removed in state.click_removes.get(selector).cloned().unwrap_or_default() {
            state.elements.remove(&removed);
        }
        for (added, texts) in state.click_adds.get(selector).cloned().unwrap_or_default() {
            state.elements.insert(added, texts);
        }
        Ok(())
    }

    async fn type_into(&self, selector: &str, text: &str) -> Result<(), CdpError> {
        let mut state = self.state.lock();
        if !state.elements.contains_key(selector) {
            return Err(CdpError::ElementNotFound(selector.to_string()));
        }
        state.typed.push((selector.to_string(), text.to_string()));
        Ok(())
    }

    async fn wait_for_selector(
        &self,
        selector: &str,
        _timeout: std::time::Duration,
    ) -> Result<bool, CdpError> {
        self.exists(selector).await
    }

    async fn scroll_by(&self, delta_y: i64) -> Result<(), CdpError> {
        self.state.lock().keys.push(format!("scroll:{}", delta_y));
        Ok(())
    }
}

pub(crate) fn content() -> ContentConfig {
    ContentConfig {
        drafts: vec!["gm builders".to_string()],
        reply_templates: vec!["thanks for the mention!".to_string()],
        follow_targets: vec!["rustlang".to_string()],
        search_queries: vec!["rust async".to_string()],
        scrape_sources: vec!["https://example.com/news".to_string()],
    }
}

/// Environment serving `page` for every platform.
pub(crate) fn env(page: Arc<FakePage>) -> (Arc<ActionEnv>, ControlStore) {
    env_with(page, |_| {})
}

pub(crate) fn env_with(
    page: Arc<FakePage>,
    configure: impl FnOnce(&mut BrowserConfig),
) -> (Arc<ActionEnv>, ControlStore) {
    env_with_content(page, content(), configure)
}

pub(crate) fn env_with_content(
    page: Arc<FakePage>,
    content: ContentConfig,
    configure: impl FnOnce(&mut BrowserConfig),
) -> (Arc<ActionEnv>, ControlStore) {
    let mut config = BrowserConfig::default();
    configure(&mut config);

    let control = ControlStore::new(Arc::new(MemorySettingsStore::new()));
    let sessions = FixedSessionProvider::new()
        .with_page(Platform::Twitter, page.clone())
        .with_page(Platform::Instagram, page.clone())
        .with_page(Platform::Web, page);
    let env = ActionEnv::new(
        Arc::new(sessions),
        Arc::new(ConfigContentProvider::new(content)),
        PostLedger::new(control.clone(), config.dedupe_window_minutes),
        config,
    );
    (Arc::new(env), control)
}

/// Context of a job on its first attempt.
pub(crate) fn job(job_type: &str, data: Value) -> JobContext {
    let mut job = Job::new(job_type, data, 0, 3);
    job.attempts = 1;
    JobContext::new(job)
}
