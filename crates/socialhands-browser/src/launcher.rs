//! Chrome discovery and launch.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{info, warn};

use socialhands_config::BrowserConfig;

use crate::error::CdpError;

const LAUNCH_POLL: Duration = Duration::from_millis(200);
const LAUNCH_ATTEMPTS: u32 = 30;

/// Starts Chrome with remote debugging on the configured profile, unless
/// one is already listening.
pub struct ChromeLauncher {
    config: BrowserConfig,
    child: Mutex<Option<Child>>,
}

impl ChromeLauncher {
    pub fn new(config: BrowserConfig) -> Self {
        Self {
            config,
            child: Mutex::new(None),
        }
    }

    /// HTTP debugging endpoint.
    pub fn endpoint(&self) -> String {
        format!("http://127.0.0.1:{}", self.config.debug_port)
    }

    /// Find a Chrome executable.
    pub fn find_chrome() -> Option<PathBuf> {
        #[cfg(target_os = "macos")]
        let paths: &[&str] = &[
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
        ];
        #[cfg(target_os = "windows")]
        let paths: &[&str] = &[
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
        ];
        #[cfg(not(any(target_os = "macos", target_os = "windows")))]
        let paths: &[&str] = &[
            "/usr/bin/google-chrome",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/snap/bin/chromium",
        ];

        paths.iter().map(PathBuf::from).find(|p| p.exists())
    }

    pub async fn is_running(&self) -> bool {
        reqwest::get(format!("{}/json/version", self.endpoint()))
            .await
            .is_ok()
    }

    /// Make sure a debuggable Chrome answers on the endpoint.
    pub async fn ensure_running(&self) -> Result<(), CdpError> {
        if self.is_running().await {
            return Ok(());
        }

        let mut child = self.child.lock().await;
        if let Some(existing) = child.as_mut() {
            if let Ok(Some(status)) = existing.try_wait() {
                warn!("Previously launched Chrome exited with {}", status);
            }
        }

        info!(
            "Chrome not running on port {}, launching...",
            self.config.debug_port
        );
        *child = Some(self.launch()?);

        for _ in 0..LAUNCH_ATTEMPTS {
            tokio::time::sleep(LAUNCH_POLL).await;
            if self.is_running().await {
                return Ok(());
            }
        }
        Err(CdpError::LaunchFailed(
            "Chrome failed to start within timeout".to_string(),
        ))
    }

    fn launch(&self) -> Result<Child, CdpError> {
        let chrome_path = Self::find_chrome().ok_or(CdpError::ChromeNotFound)?;
        let profile_dir = &self.config.profile_dir;
        if let Err(e) = std::fs::create_dir_all(profile_dir) {
            warn!("Failed to create profile directory: {}", e);
        }

        info!("Launching Chrome with profile at: {}", profile_dir.display());
        let mut cmd = Command::new(&chrome_path);
        cmd.arg(format!("--remote-debugging-port={}", self.config.debug_port))
            .arg(format!("--user-data-dir={}", profile_dir.display()))
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-sync")
            .kill_on_drop(true)
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        if self.config.headless {
            cmd.arg("--headless=new");
        }

        let child = cmd
            .spawn()
            .map_err(|e| CdpError::LaunchFailed(e.to_string()))?;
        info!("Chrome launched with PID: {:?}", child.id());
        Ok(child)
    }

    /// Kill Chrome if this launcher started it.
    pub async fn shutdown(&self) {
        if let Some(mut child) = self.child.lock().await.take() {
            info!("Shutting down Chrome...");
            let _ = child.kill().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_uses_debug_port() {
        let launcher = ChromeLauncher::new(BrowserConfig {
            debug_port: 9333,
            ..Default::default()
        });
        assert_eq!(launcher.endpoint(), "http://127.0.0.1:9333");
    }
}
