//! Navigation tools.

use chromiumoxide::cdp::browser_protocol::page::{
    GetNavigationHistoryParams, NavigateToHistoryEntryParams, ReloadParams,
};
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::CallToolResult;
use rmcp::{ErrorData as McpError, schemars, tool, tool_router};
use serde::Deserialize;
use serde_json::json;

use super::RelayServer;
use super::support::internal;
use crate::envelope::error::ToolError;
use crate::relay::{
    DEFAULT_NAV_TIMEOUT_MS, DEFAULT_WAIT_TIMEOUT_MS, Relay, clamp_timeout, page_url_or_blank,
    with_timeout,
};

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GotoArgs {
    /// Absolute URL to navigate to.
    pub url: String,
    /// Navigation timeout in milliseconds (default 30000, capped at 300000).
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TimeoutArgs {
    /// Timeout in milliseconds.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WaitForUrlArgs {
    /// Substring the URL must contain (or regex with regex=true).
    pub pattern: String,
    /// Interpret pattern as a regular expression.
    #[serde(default)]
    pub regex: Option<bool>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WaitForSelectorArgs {
    /// CSS selector to wait for.
    pub selector: String,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SleepArgs {
    /// How long to pause, in milliseconds (capped at 300000).
    pub timeout_ms: u64,
}

/// Shared goto used by `browser.goto` and `expect_event` after-actions.
pub(crate) async fn goto_inner(relay: &Relay, url: &str, timeout_ms: u64) -> Result<String, ToolError> {
    let (page_id, page) = relay.ensure_page().await?;
    with_timeout(timeout_ms, "navigation", async {
        page.goto(url).await.map_err(internal)?;
        Ok(())
    })
    .await?;
    relay.invalidate_after_mutation(page_id);
    let url = page_url_or_blank(&page).await;
    relay.pages.note_url(page_id, &url);
    Ok(url)
}

pub(crate) async fn history_step(relay: &Relay, delta: i64, timeout_ms: u64) -> Result<String, ToolError> {
    let (page_id, page) = relay.ensure_page().await?;
    let history = page
        .execute(GetNavigationHistoryParams::default())
        .await
        .map_err(internal)?;
    let target_index = history.result.current_index + delta;
    let entry = history
        .result
        .entries
        .get(target_index as usize)
        .ok_or_else(|| {
            ToolError::not_found(format!(
                "no history entry in that direction (index {target_index})"
            ))
        })?;
    let entry_id = entry.id;
    with_timeout(timeout_ms, "history navigation", async {
        page.execute(NavigateToHistoryEntryParams::new(entry_id)).await.map_err(internal)?;
        let _ = page.wait_for_navigation().await;
        Ok(())
    })
    .await?;
    relay.invalidate_after_mutation(page_id);
    Ok(page_url_or_blank(&page).await)
}

pub(crate) async fn reload_inner(relay: &Relay, timeout_ms: u64) -> Result<String, ToolError> {
    let (page_id, page) = relay.ensure_page().await?;
    with_timeout(timeout_ms, "reload", async {
        page.execute(ReloadParams::default()).await.map_err(internal)?;
        let _ = page.wait_for_navigation().await;
        Ok(())
    })
    .await?;
    relay.invalidate_after_mutation(page_id);
    Ok(page_url_or_blank(&page).await)
}

#[tool_router(router = navigation_router, vis = "pub(crate)")]
impl RelayServer {
    #[tool(
        name = "browser.goto",
        description = "Navigate the active page to a URL. Invalidates cached elementIds and uids."
    )]
    pub async fn goto(
        &self,
        Parameters(args): Parameters<GotoArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.relay.run_tool("browser.goto", async |relay| {
            let timeout = args.timeout_ms.unwrap_or(DEFAULT_NAV_TIMEOUT_MS);
            let url = goto_inner(&relay, &args.url, timeout).await?;
            Ok(json!({ "status": "navigated", "finalUrl": url }))
        })
        .await
    }

    #[tool(name = "browser.reload", description = "Reload the active page.")]
    pub async fn reload(
        &self,
        Parameters(args): Parameters<TimeoutArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.relay.run_tool("browser.reload", async |relay| {
            let timeout = args.timeout_ms.unwrap_or(DEFAULT_NAV_TIMEOUT_MS);
            let url = reload_inner(&relay, timeout).await?;
            Ok(json!({ "status": "reloaded", "finalUrl": url }))
        })
        .await
    }

    #[tool(name = "browser.back", description = "Go back one entry in the page's history.")]
    pub async fn back(
        &self,
        Parameters(args): Parameters<TimeoutArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.relay.run_tool("browser.back", async |relay| {
            let timeout = args.timeout_ms.unwrap_or(DEFAULT_NAV_TIMEOUT_MS);
            let url = history_step(&relay, -1, timeout).await?;
            Ok(json!({ "status": "navigated", "finalUrl": url }))
        })
        .await
    }

    #[tool(name = "browser.forward", description = "Go forward one entry in the page's history.")]
    pub async fn forward(
        &self,
        Parameters(args): Parameters<TimeoutArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.relay.run_tool("browser.forward", async |relay| {
            let timeout = args.timeout_ms.unwrap_or(DEFAULT_NAV_TIMEOUT_MS);
            let url = history_step(&relay, 1, timeout).await?;
            Ok(json!({ "status": "navigated", "finalUrl": url }))
        })
        .await
    }

    #[tool(
        name = "browser.wait_for_url",
        description = "Wait until the active page's URL matches a substring (or regex with regex=true)."
    )]
    pub async fn wait_for_url(
        &self,
        Parameters(args): Parameters<WaitForUrlArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.relay.run_tool("browser.wait_for_url", async |relay| {
            let (_page_id, page) = relay.ensure_page().await?;
            let matcher: Box<dyn Fn(&str) -> bool + Send + Sync> = if args.regex.unwrap_or(false) {
                let re = regex::Regex::new(&args.pattern)
                    .map_err(|e| ToolError::internal(format!("invalid regex: {e}")))?;
                Box::new(move |url: &str| re.is_match(url))
            } else {
                let needle = args.pattern.clone();
                Box::new(move |url: &str| url.contains(&needle))
            };

            let timeout = args.timeout_ms.unwrap_or(DEFAULT_WAIT_TIMEOUT_MS);
            let url = with_timeout(timeout, "wait_for_url", async {
                loop {
                    let url = page_url_or_blank(&page).await;
                    if matcher(&url) {
                        return Ok(url);
                    }
                    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                }
            })
            .await?;
            Ok(json!({ "status": "matched", "finalUrl": url }))
        })
        .await
    }

    #[tool(
        name = "browser.wait_for_selector",
        description = "Wait until a CSS selector resolves on the active page."
    )]
    pub async fn wait_for_selector(
        &self,
        Parameters(args): Parameters<WaitForSelectorArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.relay.run_tool("browser.wait_for_selector", async |relay| {
            let (_page_id, page) = relay.ensure_page().await?;
            let timeout = args.timeout_ms.unwrap_or(DEFAULT_WAIT_TIMEOUT_MS);
            with_timeout(timeout, "wait_for_selector", async {
                loop {
                    if page.find_element(args.selector.as_str()).await.is_ok() {
                        return Ok(());
                    }
                    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                }
            })
            .await?;
            Ok(json!({ "status": "found", "selector": args.selector }))
        })
        .await
    }

    #[tool(
        name = "browser.wait_for_timeout",
        description = "Pause for a fixed interval (capped at 300 s). Prefer condition waits when possible."
    )]
    pub async fn wait_for_timeout(
        &self,
        Parameters(args): Parameters<SleepArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.relay.run_tool("browser.wait_for_timeout", async |_relay| {
            tokio::time::sleep(clamp_timeout(args.timeout_ms)).await;
            Ok(json!({ "status": "waited", "waitedMs": args.timeout_ms.min(crate::relay::MAX_TIMEOUT_MS) }))
        })
        .await
    }
}
