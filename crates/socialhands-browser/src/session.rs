//! Exclusive per-platform browser sessions.
//!
//! A platform account is driven by one job at a time: a lease holds an
//! owned lock for its platform until it is dropped.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};

use socialhands_config::BrowserConfig;

use crate::client::{CdpClient, CdpPage};
use crate::error::CdpError;
use crate::launcher::ChromeLauncher;
use crate::page::BrowserPage;

/// Account a browser session is logged into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Twitter,
    Instagram,
    /// Anonymous browsing for scraping.
    Web,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Twitter => "twitter",
            Platform::Instagram => "instagram",
            Platform::Web => "web",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exclusive use of a platform page until dropped.
pub struct SessionLease {
    platform: Platform,
    page: Arc<dyn BrowserPage>,
    _guard: OwnedMutexGuard<()>,
}

impl SessionLease {
    pub fn new(platform: Platform, page: Arc<dyn BrowserPage>, guard: OwnedMutexGuard<()>) -> Self {
        Self {
            platform,
            page,
            _guard: guard,
        }
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn page(&self) -> &dyn BrowserPage {
        self.page.as_ref()
    }
}

/// Hands out platform sessions.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Wait for exclusive use of `platform` and return its page.
    async fn acquire(&self, platform: Platform) -> Result<SessionLease, CdpError>;
}

#[derive(Default)]
struct PlatformLocks {
    locks: parking_lot::Mutex<HashMap<Platform, Arc<Mutex<()>>>>,
}

impl PlatformLocks {
    async fn lock(&self, platform: Platform) -> OwnedMutexGuard<()> {
        let lock = self.locks.lock().entry(platform).or_default().clone();
        lock.lock_owned().await
    }
}

/// Sessions backed by tabs of a real Chrome, one tab per platform.
pub struct CdpSessionProvider {
    launcher: ChromeLauncher,
    navigation_timeout: Duration,
    locks: PlatformLocks,
    client: Mutex<Option<Arc<CdpClient>>>,
    pages: Mutex<HashMap<Platform, Arc<CdpPage>>>,
}

impl CdpSessionProvider {
    pub fn new(config: &BrowserConfig) -> Self {
        Self {
            navigation_timeout: Duration::from_secs(config.navigation_timeout_secs.max(1)),
            launcher: ChromeLauncher::new(config.clone()),
            locks: PlatformLocks::default(),
            client: Mutex::new(None),
            pages: Mutex::new(HashMap::new()),
        }
    }

    async fn client(&self) -> Result<Arc<CdpClient>, CdpError> {
        let mut client = self.client.lock().await;
        if let Some(existing) = client.as_ref().filter(|c| c.is_connected()) {
            return Ok(existing.clone());
        }

        self.launcher.ensure_running().await?;
        let connected =
            Arc::new(CdpClient::connect(&self.launcher.endpoint(), self.navigation_timeout).await?);
        info!("Connected to Chrome at {}", self.launcher.endpoint());
        *client = Some(connected.clone());
        Ok(connected)
    }

    async fn page_for(&self, platform: Platform) -> Result<Arc<CdpPage>, CdpError> {
        let mut pages = self.pages.lock().await;
        if let Some(page) = pages.get(&platform).filter(|p| p.is_connected()) {
            return Ok(page.clone());
        }

        let page = Arc::new(self.client().await?.new_page().await?);
        debug!("Opened {} tab {}", platform, page.target_id());
        pages.insert(platform, page.clone());
        Ok(page)
    }

    /// Drop all tabs and the connection; kill Chrome if it was launched here.
    pub async fn shutdown(&self) {
        self.pages.lock().await.clear();
        self.client.lock().await.take();
        self.launcher.shutdown().await;
    }
}

#[async_trait]
impl SessionProvider for CdpSessionProvider {
    async fn acquire(&self, platform: Platform) -> Result<SessionLease, CdpError> {
        let guard = self.locks.lock(platform).await;
        let page = self.page_for(platform).await?;
        Ok(SessionLease::new(platform, page, guard))
    }
}

/// Sessions over pre-built pages, for dry runs and tests.
#[derive(Default)]
pub struct FixedSessionProvider {
    pages: HashMap<Platform, Arc<dyn BrowserPage>>,
    locks: PlatformLocks,
}

impl FixedSessionProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, platform: Platform, page: Arc<dyn BrowserPage>) -> Self {
        self.pages.insert(platform, page);
        self
    }
}

#[async_trait]
impl SessionProvider for FixedSessionProvider {
    async fn acquire(&self, platform: Platform) -> Result<SessionLease, CdpError> {
        let page = self
            .pages
            .get(&platform)
            .cloned()
            .ok_or_else(|| CdpError::PageNotFound(platform.to_string()))?;
        let guard = self.locks.lock(platform).await;
        Ok(SessionLease::new(platform, page, guard))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    struct BlankPage;

    #[async_trait]
    impl BrowserPage for BlankPage {
        async fn navigate(&self, _url: &str) -> Result<(), CdpError> {
            Ok(())
        }

        async fn current_url(&self) -> Result<String, CdpError> {
            Ok("about:blank".to_string())
        }

        async fn evaluate(&self, _expression: &str) -> Result<Value, CdpError> {
            Ok(Value::Null)
        }

        async fn insert_text(&self, _text: &str) -> Result<(), CdpError> {
            Ok(())
        }

        async fn press_key(&self, _key: &str) -> Result<(), CdpError> {
            Ok(())
        }

        async fn screenshot(&self) -> Result<Vec<u8>, CdpError> {
            Ok(Vec::new())
        }
    }

    fn provider() -> FixedSessionProvider {
        FixedSessionProvider::new()
            .with_page(Platform::Twitter, Arc::new(BlankPage))
            .with_page(Platform::Instagram, Arc::new(BlankPage))
    }

    #[test]
    fn test_platform_names() {
        assert_eq!(Platform::Twitter.to_string(), "twitter");
        assert_eq!(serde_json::to_string(&Platform::Instagram).unwrap(), "\"instagram\"");
    }

    #[tokio::test]
    async fn test_lease_is_exclusive_per_platform() {
        let provider = provider();
        let lease = provider.acquire(Platform::Twitter).await.unwrap();
        assert_eq!(lease.platform(), Platform::Twitter);

        let blocked =
            tokio::time::timeout(Duration::from_millis(50), provider.acquire(Platform::Twitter)).await;
        assert!(blocked.is_err());

        drop(lease);
        let again =
            tokio::time::timeout(Duration::from_millis(50), provider.acquire(Platform::Twitter)).await;
        assert!(again.is_ok());
    }

    #[tokio::test]
    async fn test_platforms_lease_independently() {
        let provider = provider();
        let _twitter = provider.acquire(Platform::Twitter).await.unwrap();
        let instagram =
            tokio::time::timeout(Duration::from_millis(50), provider.acquire(Platform::Instagram)).await;
        assert!(instagram.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_missing_platform_page() {
        let provider = provider();
        assert!(matches!(
            provider.acquire(Platform::Web).await,
            Err(CdpError::PageNotFound(p)) if p == "web"
        ));
    }
}
