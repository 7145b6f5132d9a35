//! Session and page management tools.

use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::CallToolResult;
use rmcp::{ErrorData as McpError, schemars, tool, tool_router};
use serde::Deserialize;
use serde_json::{Value, json};

use super::RelayServer;
use super::support::internal;
use crate::capture::CaptureProfile;
use crate::envelope::error::ToolError;
use crate::relay::page_url_or_blank;

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PageIdArgs {
    /// Target page id from browser.list_pages.
    pub page_id: i64,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewPageArgs {
    /// URL to open; defaults to a blank page.
    #[serde(default)]
    pub url: Option<String>,
    /// Make the new page active (default true).
    #[serde(default)]
    pub select: Option<bool>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SetCaptureProfileArgs {
    /// Capture profile controlling per-tool default limits.
    pub profile: CaptureProfile,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DomContextArgs {
    /// Frame id (`main` or `f<n>`); defaults to the main frame.
    #[serde(default)]
    pub frame_id: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SetViewportArgs {
    pub width: u32,
    pub height: u32,
    /// Emulate a mobile device (default false).
    #[serde(default)]
    pub mobile: Option<bool>,
}

#[tool_router(router = session_router, vis = "pub(crate)")]
impl RelayServer {
    #[tool(
        name = "browser.status",
        description = "Session status: connection mode, page count, active capture profile, and configuration summary."
    )]
    pub async fn status(&self) -> Result<CallToolResult, McpError> {
        self.relay.run_tool("browser.status", async |relay| {
            let connected = relay.host.connected().await;
            let mode = relay.host.mode().await.map(|m| m.as_str());
            let version = if connected {
                relay.host.version_string().await.ok()
            } else {
                None
            };
            let entries = relay.pages.entries();
            Ok(json!({
                "connected": connected,
                "connectionMode": mode,
                "browserVersion": version,
                "pageCount": entries.iter().filter(|e| !e.closed).count(),
                "activePageId": relay.pages.active_id(),
                "captureProfile": relay.capture_profile().as_str(),
                "config": relay.config.summary(),
            }))
        })
        .await
    }

    #[tool(
        name = "browser.list_pages",
        description = "List pages with ids, URLs, and titles. Closed pages stay listed with closed=true."
    )]
    pub async fn list_pages(&self) -> Result<CallToolResult, McpError> {
        self.relay.run_tool("browser.list_pages", async |relay| {
            relay.sync_pages().await?;
            let active = relay.pages.active_id();
            let mut pages = Vec::new();
            for entry in relay.pages.entries() {
                let (url, title) = if entry.closed {
                    (entry.last_url.clone(), None)
                } else {
                    let url = page_url_or_blank(&entry.page).await;
                    let title = entry.page.get_title().await.ok().flatten();
                    relay.pages.note_url(entry.page_id, &url);
                    (url, title)
                };
                pages.push(json!({
                    "pageId": entry.page_id,
                    "url": url,
                    "title": title,
                    "active": active == Some(entry.page_id) && !entry.closed,
                    "closed": entry.closed,
                }));
            }
            Ok(json!({ "pages": pages, "count": pages.len() }))
        })
        .await
    }

    #[tool(
        name = "browser.new_page",
        description = "Open a new page (optionally at a URL) and make it active."
    )]
    pub async fn new_page(
        &self,
        Parameters(args): Parameters<NewPageArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.relay.run_tool("browser.new_page", async |relay| {
            let url = args.url.as_deref().unwrap_or("about:blank");
            let page = relay.host.new_page(url).await?;
            let page_id = relay.adopt_page(&page).await?;
            if args.select.unwrap_or(true) {
                relay.pages.select(page_id)?;
            }
            Ok(json!({ "pageId": page_id, "selected": args.select.unwrap_or(true) }))
        })
        .await
    }

    #[tool(name = "browser.select_page", description = "Make a page the active page.")]
    pub async fn select_page(
        &self,
        Parameters(args): Parameters<PageIdArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.relay.run_tool("browser.select_page", async |relay| {
            relay.sync_pages().await?;
            relay.pages.select(args.page_id)?;
            Ok(json!({ "pageId": args.page_id, "status": "selected" }))
        })
        .await
    }

    #[tool(
        name = "browser.close_page",
        description = "Close a page. If it was active, the best remaining page becomes active."
    )]
    pub async fn close_page(
        &self,
        Parameters(args): Parameters<PageIdArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.relay.run_tool("browser.close_page", async |relay| {
            let entry = relay.pages.get(args.page_id)?;
            if entry.closed {
                return Ok(json!({ "pageId": args.page_id, "status": "already-closed" }));
            }
            entry.page.clone().close().await.map_err(internal)?;
            relay.pages.mark_closed(args.page_id)?;
            if let Ok(tracker) = relay.tracker(args.page_id) {
                tracker.detach();
            }
            relay.uids.clear_page(args.page_id);
            relay.elements.clear();
            Ok(json!({
                "pageId": args.page_id,
                "status": "closed",
                "activePageId": relay.pages.active_id(),
            }))
        })
        .await
    }

    #[tool(
        name = "browser.reset_session",
        description = "Close the browser session and drop all cached state. The next call starts a fresh context."
    )]
    pub async fn reset_session(&self) -> Result<CallToolResult, McpError> {
        self.relay.run_tool("browser.reset_session", async |relay| {
            relay.reset_session().await;
            Ok(json!({ "status": "reset" }))
        })
        .await
    }

    #[tool(
        name = "browser.set_capture_profile",
        description = "Switch the active capture profile (light | balanced | full) controlling per-tool default limits."
    )]
    pub async fn set_capture_profile(
        &self,
        Parameters(args): Parameters<SetCaptureProfileArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.relay.run_tool("browser.set_capture_profile", async |relay| {
            let previous = relay.capture_profile();
            relay.set_capture_profile(args.profile);
            Ok(json!({
                "profile": args.profile.as_str(),
                "previous": previous.as_str(),
            }))
        })
        .await
    }

    #[tool(
        name = "browser.list_frames",
        description = "List frames of the active page with stable frame ids and DOM versions."
    )]
    pub async fn list_frames(&self) -> Result<CallToolResult, McpError> {
        self.relay.run_tool("browser.list_frames", async |relay| {
            let (page_id, _page) = relay.ensure_page().await?;
            let tracker = relay.tracker(page_id)?;
            let (page_dom_version, frames) = tracker.list_frames();
            let dom_version = tracker.dom_context(None)?.dom_version;
            Ok(json!({
                "pageDomVersion": page_dom_version,
                "domVersion": dom_version,
                "frames": frames,
            }))
        })
        .await
    }

    #[tool(
        name = "browser.dom_context",
        description = "Current DOM version coordinates for a frame of the active page."
    )]
    pub async fn dom_context(
        &self,
        Parameters(args): Parameters<DomContextArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.relay.run_tool("browser.dom_context", async |relay| {
            let (page_id, _page) = relay.ensure_page().await?;
            let cx = relay.dom_context(page_id, args.frame_id.as_deref())?;
            let mut payload = serde_json::to_value(&cx).map_err(internal)?;
            if let Value::Object(map) = &mut payload {
                map.insert("__meta".into(), json!({ "frameId": cx.frame_id }));
            }
            Ok(payload)
        })
        .await
    }

    #[tool(name = "browser.set_viewport", description = "Resize the active page's viewport.")]
    pub async fn set_viewport(
        &self,
        Parameters(args): Parameters<SetViewportArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.relay.run_tool("browser.set_viewport", async |relay| {
            if args.width == 0 || args.height == 0 {
                return Err(ToolError::not_found("viewport dimensions must be positive"));
            }
            let (_page_id, page) = relay.ensure_page().await?;
            let params =
                chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams::builder()
                    .width(args.width as i64)
                    .height(args.height as i64)
                    .device_scale_factor(1.0)
                    .mobile(args.mobile.unwrap_or(false))
                    .build()
                    .map_err(internal)?;
            page.execute(params).await.map_err(internal)?;
            Ok(json!({ "width": args.width, "height": args.height }))
        })
        .await
    }
}
