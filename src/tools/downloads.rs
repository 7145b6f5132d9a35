//! Download tools.
//!
//! The browser writes captured downloads into the session download
//! directory (named by guid); `save_download` copies the bytes to a
//! caller-chosen path through the security gate.

use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::CallToolResult;
use rmcp::{ErrorData as McpError, schemars, tool, tool_router};
use serde::Deserialize;
use serde_json::json;

use super::RelayServer;
use super::support::internal;
use crate::relay::DEFAULT_WAIT_TIMEOUT_MS;

const SAVE_COMPLETION_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WaitForDownloadArgs {
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Leave the record unconsumed so a later wait still sees it.
    #[serde(default)]
    pub peek: Option<bool>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SaveDownloadArgs {
    /// Download id (`dl-<n>`).
    pub download_id: String,
    /// Destination path; must resolve inside the output directory.
    pub path: String,
}

#[tool_router(router = downloads_router, vis = "pub(crate)")]
impl RelayServer {
    #[tool(name = "browser.list_downloads", description = "List captured downloads.")]
    pub async fn list_downloads(&self) -> Result<CallToolResult, McpError> {
        self.relay.run_tool("browser.list_downloads", async |relay| {
            let downloads = relay.events.list_downloads();
            Ok(json!({ "count": downloads.len(), "downloads": downloads }))
        })
        .await
    }

    #[tool(
        name = "browser.wait_for_download",
        description = "Wait for the next unconsumed download. Without peek, the record is consumed and later waits skip it."
    )]
    pub async fn wait_for_download(
        &self,
        Parameters(args): Parameters<WaitForDownloadArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.relay.run_tool("browser.wait_for_download", async |relay| {
            let timeout = crate::relay::clamp_timeout(
                args.timeout_ms.unwrap_or(DEFAULT_WAIT_TIMEOUT_MS),
            );
            let record = relay.events.wait_for_download(timeout, args.peek.unwrap_or(false)).await?;
            Ok(json!({ "download": record }))
        })
        .await
    }

    #[tool(
        name = "browser.save_download",
        description = "Copy a captured download's bytes to a path inside the output directory."
    )]
    pub async fn save_download(
        &self,
        Parameters(args): Parameters<SaveDownloadArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.relay.run_tool("browser.save_download", async |relay| {
            let record = relay
                .events
                .wait_download_completed(
                    &args.download_id,
                    crate::relay::clamp_timeout(SAVE_COMPLETION_TIMEOUT_MS),
                )
                .await?;

            let target = relay.security.resolve_write(std::path::Path::new(&args.path))?;
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await.map_err(internal)?;
            }
            tokio::fs::copy(&record.temp_path, &target).await.map_err(|e| {
                crate::envelope::error::ToolError::internal(format!(
                    "could not copy download bytes from {}: {e}",
                    record.temp_path.display()
                ))
            })?;
            relay.events.mark_download_saved(&args.download_id, &target.display().to_string());

            Ok(json!({
                "downloadId": args.download_id,
                "savedPath": target.display().to_string(),
                "suggestedFilename": record.suggested_filename,
                "bytes": record.received_bytes,
            }))
        })
        .await
    }
}
