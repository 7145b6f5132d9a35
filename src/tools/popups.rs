//! Popup tools.
//!
//! `window.open` events are captured by the event plane; waiting for a
//! popup also attaches the new page to the page manager and can make it the
//! active page.

use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::CallToolResult;
use rmcp::{ErrorData as McpError, schemars, tool, tool_router};
use serde::Deserialize;
use serde_json::json;

use super::RelayServer;
use crate::envelope::error::ToolError;
use crate::events::PopupRecord;
use crate::relay::{DEFAULT_WAIT_TIMEOUT_MS, Relay};

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WaitForPopupArgs {
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Leave the record unconsumed for later waits.
    #[serde(default)]
    pub peek: Option<bool>,
    /// Make the popup the active page (default false).
    #[serde(default)]
    pub select: Option<bool>,
}

/// Attach the popup's page and record which page id it resolved to.
async fn bind_popup(relay: &Relay, record: &PopupRecord) -> Option<i64> {
    if let Some(page_id) = record.page_id {
        return Some(page_id);
    }
    if relay.sync_pages().await.is_err() {
        return None;
    }
    let entries = relay.pages.entries();
    // Prefer a URL match; otherwise the newest page attached after capture.
    let matched = entries
        .iter()
        .filter(|e| !e.closed)
        .find(|e| !record.url.is_empty() && e.last_url == record.url)
        .or_else(|| {
            entries
                .iter()
                .filter(|e| !e.closed && e.created_at >= record.captured_at)
                .max_by_key(|e| e.page_id)
        })?;
    relay.events.bind_popup_page(&record.popup_id, matched.page_id);
    Some(matched.page_id)
}

#[tool_router(router = popups_router, vis = "pub(crate)")]
impl RelayServer {
    #[tool(name = "browser.list_popups", description = "List captured popup windows.")]
    pub async fn list_popups(&self) -> Result<CallToolResult, McpError> {
        self.relay.run_tool("browser.list_popups", async |relay| {
            let popups = relay.events.list_popups();
            Ok(json!({ "count": popups.len(), "popups": popups }))
        })
        .await
    }

    #[tool(
        name = "browser.wait_for_popup",
        description = "Wait for the next popup, attach its page, and optionally make it active."
    )]
    pub async fn wait_for_popup(
        &self,
        Parameters(args): Parameters<WaitForPopupArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.relay.run_tool("browser.wait_for_popup", async |relay| {
            let timeout_ms = args.timeout_ms.unwrap_or(DEFAULT_WAIT_TIMEOUT_MS);
            let deadline = tokio::time::Instant::now() + crate::relay::clamp_timeout(timeout_ms);

            let record = loop {
                if let Some(record) = relay.events.next_popup(args.peek.unwrap_or(false)) {
                    break record;
                }
                if tokio::time::Instant::now() >= deadline {
                    return Err(ToolError::timeout(format!(
                        "no popup captured within {timeout_ms} ms"
                    )));
                }
                tokio::time::sleep(std::time::Duration::from_millis(150)).await;
            };

            let page_id = bind_popup(&relay, &record).await;
            let selected = match (args.select.unwrap_or(false), page_id) {
                (true, Some(page_id)) => {
                    relay.pages.select(page_id)?;
                    true
                }
                _ => false,
            };

            Ok(json!({
                "popup": record,
                "pageId": page_id,
                "selected": selected,
            }))
        })
        .await
    }
}
