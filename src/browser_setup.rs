//! Browser discovery, launch, and CDP attachment
//!
//! Finds a Chrome/Chromium binary (environment override first, then
//! platform path tables filtered by the configured channel), builds the
//! launch configuration, and either launches a fresh process or attaches to
//! an already-running instance over its remote-debugging endpoint.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use chromiumoxide::browser::{Browser, BrowserConfigBuilder, HeadlessMode};
use futures::StreamExt;
use tokio::task::{self, JoinHandle};
use tracing::{info, warn};

use crate::config::ServerConfig;

/// Find the browser executable.
///
/// Resolution order: explicit `executablePath` config, `CHROMIUM_PATH`
/// environment variable, then platform install locations (filtered to the
/// configured channel when one is set).
pub fn find_browser_executable(config: &ServerConfig) -> Result<PathBuf> {
    if let Some(path) = &config.executable_path {
        if path.exists() {
            return Ok(path.clone());
        }
        return Err(anyhow!("configured executablePath does not exist: {}", path.display()));
    }

    if let Ok(path) = std::env::var("CHROMIUM_PATH") {
        let path = PathBuf::from(path);
        if path.exists() {
            info!("Using browser from CHROMIUM_PATH: {}", path.display());
            return Ok(path);
        }
        warn!("CHROMIUM_PATH points to non-existent file: {}", path.display());
    }

    let candidates: Vec<&str> = if cfg!(target_os = "windows") {
        vec![
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files\Google\Chrome Beta\Application\chrome.exe",
            r"C:\Program Files\Chromium\Application\chrome.exe",
        ]
    } else if cfg!(target_os = "macos") {
        vec![
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Google Chrome Beta.app/Contents/MacOS/Google Chrome Beta",
            "/Applications/Google Chrome Canary.app/Contents/MacOS/Google Chrome Canary",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/opt/homebrew/bin/chromium",
        ]
    } else {
        vec![
            "/usr/bin/google-chrome",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/google-chrome-beta",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/snap/bin/chromium",
            "/usr/local/bin/chromium",
            "/opt/google/chrome/chrome",
        ]
    };

    let channel_needle = config.channel.as_deref().map(|c| c.to_lowercase());
    let matches_channel = |path: &str| -> bool {
        match channel_needle.as_deref() {
            None => true,
            Some("chrome") => path.to_lowercase().contains("chrome") && !path.to_lowercase().contains("beta") && !path.to_lowercase().contains("canary"),
            Some(other) => path.to_lowercase().contains(&other.replace('-', " "))
                || path.to_lowercase().contains(other),
        }
    };

    for candidate in candidates {
        if !matches_channel(candidate) {
            continue;
        }
        let path = PathBuf::from(candidate);
        if path.exists() {
            info!("Found browser executable: {}", path.display());
            return Ok(path);
        }
    }

    Err(anyhow!(
        "no Chrome/Chromium executable found; set EXECUTABLE_PATH or CHROMIUM_PATH"
    ))
}

/// Launch a browser process.
///
/// Returns the browser, the tracked event-handler task, and the temp
/// profile directory to delete on shutdown (None when a persistent profile
/// is configured).
pub async fn launch(config: &ServerConfig) -> Result<(Browser, JoinHandle<()>, Option<PathBuf>)> {
    if config.force_cdp {
        return Err(anyhow!("forceCdp is set but no CDP endpoint is configured"));
    }
    if config.require_profile && config.user_data_dir.is_none() {
        return Err(anyhow!("requireProfile is set but no userDataDir is configured"));
    }

    let executable = find_browser_executable(config)?;

    let (user_data_dir, temp_dir) = match &config.user_data_dir {
        Some(dir) => (dir.clone(), None),
        None => {
            let dir = std::env::temp_dir().join(format!("browser_relay_{}", std::process::id()));
            std::fs::create_dir_all(&dir).context("failed to create user data directory")?;
            (dir.clone(), Some(dir))
        }
    };

    let headless = if config.headless { HeadlessMode::New } else { HeadlessMode::False };

    let mut builder = BrowserConfigBuilder::default()
        .request_timeout(Duration::from_secs(30))
        .window_size(1280, 900)
        .user_data_dir(user_data_dir)
        .chrome_executable(executable)
        .headless_mode(headless)
        .arg("--disable-blink-features=AutomationControlled")
        .arg("--disable-infobars")
        .arg("--disable-notifications")
        .arg("--disable-background-networking")
        .arg("--disable-background-timer-throttling")
        .arg("--disable-backgrounding-occluded-windows")
        .arg("--disable-breakpad")
        .arg("--disable-hang-monitor")
        .arg("--disable-ipc-flooding-protection")
        .arg("--disable-prompt-on-repost")
        .arg("--disable-popup-blocking")
        .arg("--metrics-recording-only")
        .arg("--password-store=basic")
        .arg("--use-mock-keychain")
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--mute-audio");

    if let Some(profile) = &config.profile_directory {
        builder = builder.arg(format!("--profile-directory={profile}"));
    }

    let browser_config = builder
        .build()
        .map_err(|e| anyhow!("failed to build browser config: {e}"))?;

    info!(headless = config.headless, "launching browser");
    let (browser, mut handler) = Browser::launch(browser_config)
        .await
        .context("failed to launch browser")?;

    // The handler stream must be pumped for the lifetime of the browser;
    // keep the JoinHandle so shutdown can abort it.
    let handler_task = task::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(e) = event {
                tracing::error!("browser handler error: {e:?}");
            }
        }
        info!("browser event handler finished");
    });

    Ok((browser, handler_task, temp_dir))
}

/// Attach to an already-running browser over its debugging endpoint.
///
/// Accepts a websocket debugger URL directly, or an HTTP endpoint /
/// localhost port whose `/json/version` answer supplies the websocket URL.
pub async fn attach(config: &ServerConfig) -> Result<(Browser, JoinHandle<()>)> {
    let endpoint = match (&config.cdp_endpoint, config.cdp_port) {
        (Some(endpoint), _) => endpoint.clone(),
        (None, Some(port)) => format!("http://127.0.0.1:{port}"),
        (None, None) => return Err(anyhow!("no CDP endpoint or port configured")),
    };

    let ws_url = if endpoint.starts_with("ws://") || endpoint.starts_with("wss://") {
        endpoint
    } else {
        resolve_ws_url(&endpoint).await?
    };

    info!(url = %ws_url, "attaching to running browser");
    let (browser, mut handler) = Browser::connect(ws_url)
        .await
        .context("failed to connect to CDP endpoint")?;

    let handler_task = task::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(e) = event {
                tracing::error!("browser handler error: {e:?}");
            }
        }
    });

    Ok((browser, handler_task))
}

/// Query `<endpoint>/json/version` for the websocket debugger URL.
async fn resolve_ws_url(endpoint: &str) -> Result<String> {
    #[derive(serde::Deserialize)]
    struct VersionInfo {
        #[serde(rename = "webSocketDebuggerUrl")]
        web_socket_debugger_url: String,
    }

    let url = format!("{}/json/version", endpoint.trim_end_matches('/'));
    let info: VersionInfo = reqwest::Client::new()
        .get(&url)
        .timeout(Duration::from_secs(10))
        .send()
        .await
        .with_context(|| format!("failed to reach CDP endpoint {url}"))?
        .json()
        .await
        .context("malformed /json/version response")?;
    Ok(info.web_socket_debugger_url)
}
