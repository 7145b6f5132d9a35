//! Browser session host
//!
//! Lazily launches (or attaches to) the browser on first use, health-checks
//! the cached instance before reuse, and recovers from crashes by
//! relaunching. Holds the event-handler task so shutdown can stop it, and
//! removes the temporary profile directory afterwards.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use chromiumoxide::browser::Browser;
use chromiumoxide::cdp::browser_protocol::browser::{
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::page::Page;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::browser_setup;
use crate::config::ServerConfig;
use crate::envelope::error::ToolError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionMode {
    Launched,
    Attached,
}

impl ConnectionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Launched => "launched",
            Self::Attached => "attached",
        }
    }
}

struct HostSession {
    browser: Browser,
    handler: JoinHandle<()>,
    temp_profile: Option<PathBuf>,
    mode: ConnectionMode,
}

impl HostSession {
    async fn close(mut self) {
        if self.mode == ConnectionMode::Launched {
            if let Err(e) = self.browser.close().await {
                warn!("failed to close browser cleanly: {e}");
            }
            if let Err(e) = self.browser.wait().await {
                warn!("failed to wait for browser exit: {e}");
            }
        }
        self.handler.abort();
        if let Some(dir) = self.temp_profile.take() {
            info!("removing temp profile {}", dir.display());
            if let Err(e) = std::fs::remove_dir_all(&dir) {
                warn!("failed to remove temp profile {}: {e}", dir.display());
            }
        }
    }
}

/// Shared browser host. Clones share the same session slot.
#[derive(Clone)]
pub struct BrowserHost {
    inner: Arc<Mutex<Option<HostSession>>>,
    config: Arc<ServerConfig>,
}

impl BrowserHost {
    pub fn new(config: Arc<ServerConfig>) -> Self {
        Self { inner: Arc::new(Mutex::new(None)), config }
    }

    /// Whether a browser session is currently connected (no health check).
    pub async fn connected(&self) -> bool {
        self.inner.lock().await.is_some()
    }

    pub async fn mode(&self) -> Option<ConnectionMode> {
        self.inner.lock().await.as_ref().map(|s| s.mode)
    }

    /// Run `f` against a healthy browser, launching or attaching first when
    /// needed. A failed health check closes the crashed session and
    /// connects a fresh one.
    async fn with_browser<T>(
        &self,
        f: impl AsyncFnOnce(&Browser) -> Result<T>,
    ) -> Result<T, ToolError> {
        let mut guard = self.inner.lock().await;

        if let Some(session) = guard.as_ref() {
            if session.browser.version().await.is_err() {
                warn!("browser health check failed, reconnecting");
                if let Some(dead) = guard.take() {
                    dead.close().await;
                }
            }
        }

        if guard.is_none() {
            let session = self.connect().await.map_err(ToolError::Internal)?;
            *guard = Some(session);
        }

        match guard.as_ref() {
            Some(session) => f(&session.browser).await.map_err(ToolError::Internal),
            None => Err(ToolError::internal("browser session unavailable")),
        }
    }

    async fn connect(&self) -> Result<HostSession> {
        let use_attach =
            self.config.force_cdp || self.config.cdp_endpoint.is_some() || self.config.cdp_port.is_some();

        let session = if use_attach {
            let (browser, handler) = browser_setup::attach(&self.config).await?;
            HostSession { browser, handler, temp_profile: None, mode: ConnectionMode::Attached }
        } else {
            let (browser, handler, temp_profile) = browser_setup::launch(&self.config).await?;
            HostSession { browser, handler, temp_profile, mode: ConnectionMode::Launched }
        };

        // Route downloads into the session download directory so captured
        // records have bytes to copy from.
        let download_dir = self.config.downloads_dir();
        if let Err(e) = std::fs::create_dir_all(&download_dir) {
            warn!("cannot create download dir {}: {e}", download_dir.display());
        }
        let params = SetDownloadBehaviorParams::builder()
            .behavior(SetDownloadBehaviorBehavior::AllowAndName)
            .download_path(download_dir.display().to_string())
            .events_enabled(true)
            .build()
            .map_err(|e| anyhow::anyhow!("download behavior params: {e}"))?;
        if let Err(e) = session.browser.execute(params).await {
            warn!("Browser.setDownloadBehavior failed, download capture degraded: {e}");
        }

        info!(mode = session.mode.as_str(), "browser session ready");
        Ok(session)
    }

    /// Open a new page.
    pub async fn new_page(&self, url: &str) -> Result<Page, ToolError> {
        let url = url.to_string();
        self.with_browser(async move |browser| Ok(browser.new_page(url.as_str()).await?)).await
    }

    /// All pages currently open in the browser.
    pub async fn pages(&self) -> Result<Vec<Page>, ToolError> {
        self.with_browser(async |browser| Ok(browser.pages().await?)).await
    }

    /// Browser product string, for `browser.status`.
    pub async fn version_string(&self) -> Result<String, ToolError> {
        self.with_browser(async |browser| {
            let version = browser.version().await?;
            Ok(version.product)
        })
        .await
    }

    /// Close the current session. The next call reconnects with fresh
    /// state.
    pub async fn reset(&self) {
        let mut guard = self.inner.lock().await;
        if let Some(session) = guard.take() {
            info!("resetting browser session");
            session.close().await;
        }
    }

    /// Graceful shutdown on server exit. Safe to call repeatedly.
    pub async fn shutdown(&self) {
        let mut guard = self.inner.lock().await;
        if let Some(session) = guard.take() {
            info!("shutting down browser");
            session.close().await;
        }
    }
}
