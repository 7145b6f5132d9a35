//! Script execution (origin-gated) and storage-state import/export.

use chromiumoxide::cdp::browser_protocol::network::CookieParam;
use chromiumoxide::cdp::browser_protocol::storage::GetCookiesParams;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::CallToolResult;
use rmcp::{ErrorData as McpError, schemars, tool, tool_router};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::RelayServer;
use super::support::{STORAGE_DUMP_JS, eval_json, internal};
use crate::envelope::error::ToolError;
use crate::relay::{page_url_or_blank, with_timeout};
use crate::security::{EVALUATE_OUTPUT_BUDGET_BYTES, EVALUATE_TIME_BUDGET_MS};

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EvaluateArgs {
    /// JavaScript expression to evaluate in the active page.
    pub script: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ExportStorageArgs {
    /// Write the document to this path (inside the output directory)
    /// instead of returning it inline.
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ImportStorageArgs {
    /// Storage-state JSON file to import (inside an allowed directory).
    pub path: String,
}

/// Cookie shape persisted in the storage-state document.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SavedCookie {
    name: String,
    value: String,
    domain: String,
    path: String,
    #[serde(default)]
    secure: bool,
    #[serde(default)]
    http_only: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires: Option<f64>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SavedOrigin {
    origin: String,
    #[serde(default)]
    local_storage: Vec<SavedItem>,
    #[serde(default)]
    session_storage: Vec<SavedItem>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SavedItem {
    name: String,
    value: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StorageState {
    cookies: Vec<SavedCookie>,
    origins: Vec<SavedOrigin>,
}

#[tool_router(router = scripting_router, vis = "pub(crate)")]
impl RelayServer {
    #[tool(
        name = "browser.evaluate",
        description = "Evaluate JavaScript in the active page. Disabled unless configured, and only for allowlisted origins; bounded in time and output size."
    )]
    pub async fn evaluate(
        &self,
        Parameters(args): Parameters<EvaluateArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.relay.run_tool("browser.evaluate", async |relay| {
            let (_page_id, page) = relay.ensure_page().await?;
            let url = page_url_or_blank(&page).await;
            relay.security.check_evaluate_origin(&url)?;

            let result = with_timeout(EVALUATE_TIME_BUDGET_MS, "script execution", async {
                eval_json(&page, &args.script).await
            })
            .await?;

            let bytes = serde_json::to_string(&result).map(|s| s.len()).unwrap_or(0);
            if bytes > EVALUATE_OUTPUT_BUDGET_BYTES {
                return Err(ToolError::permission(format!(
                    "script output of {bytes} bytes exceeds the {EVALUATE_OUTPUT_BUDGET_BYTES}-byte budget"
                )));
            }
            Ok(json!({ "result": result, "resultBytes": bytes }))
        })
        .await
    }

    #[tool(
        name = "browser.export_storage_state",
        description = "Export cookies and per-origin web storage as a JSON document, inline or to a file."
    )]
    pub async fn export_storage_state(
        &self,
        Parameters(args): Parameters<ExportStorageArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.relay.run_tool("browser.export_storage_state", async |relay| {
            let (_page_id, page) = relay.ensure_page().await?;

            let cookie_response =
                page.execute(GetCookiesParams::default()).await.map_err(internal)?;
            let cookies: Vec<SavedCookie> = cookie_response
                .result
                .cookies
                .iter()
                .map(|c| SavedCookie {
                    name: c.name.clone(),
                    value: c.value.clone(),
                    domain: c.domain.clone(),
                    path: c.path.clone(),
                    secure: c.secure,
                    http_only: c.http_only,
                    expires: Some(c.expires),
                })
                .collect();

            let mut origins: Vec<SavedOrigin> = Vec::new();
            relay.sync_pages().await?;
            for entry in relay.pages.entries() {
                if entry.closed {
                    continue;
                }
                let Ok(dump) = eval_json(&entry.page, STORAGE_DUMP_JS).await else {
                    continue;
                };
                let Ok(origin) = serde_json::from_value::<SavedOrigin>(dump) else {
                    continue;
                };
                if origin.origin.starts_with("http") && !origins.iter().any(|o| o.origin == origin.origin) {
                    origins.push(origin);
                }
            }

            let state = StorageState { cookies, origins };
            let cookie_count = state.cookies.len();
            let origin_count = state.origins.len();

            match &args.path {
                Some(path) => {
                    let target = relay.security.resolve_write(std::path::Path::new(path))?;
                    if let Some(parent) = target.parent() {
                        tokio::fs::create_dir_all(parent).await.map_err(internal)?;
                    }
                    let body = serde_json::to_vec_pretty(&state).map_err(internal)?;
                    tokio::fs::write(&target, body).await.map_err(internal)?;
                    Ok(json!({
                        "status": "exported",
                        "path": target.display().to_string(),
                        "cookies": cookie_count,
                        "origins": origin_count,
                    }))
                }
                None => Ok(json!({
                    "storageState": serde_json::to_value(&state).map_err(internal)?,
                    "cookies": cookie_count,
                    "origins": origin_count,
                })),
            }
        })
        .await
    }

    #[tool(
        name = "browser.import_storage_state",
        description = "Import a storage-state file: restores cookies and per-origin web storage into the current session."
    )]
    pub async fn import_storage_state(
        &self,
        Parameters(args): Parameters<ImportStorageArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.relay.run_tool("browser.import_storage_state", async |relay| {
            let source = relay.security.resolve_read(std::path::Path::new(&args.path))?;
            let body = tokio::fs::read_to_string(&source).await.map_err(internal)?;
            let state: StorageState = serde_json::from_str(&body)
                .map_err(|e| ToolError::internal(format!("malformed storage state: {e}")))?;

            let (_page_id, page) = relay.ensure_page().await?;

            let cookie_params: Vec<CookieParam> = state
                .cookies
                .iter()
                .filter_map(|c| {
                    let mut builder = CookieParam::builder()
                        .name(c.name.clone())
                        .value(c.value.clone())
                        .domain(c.domain.clone())
                        .path(c.path.clone())
                        .secure(c.secure)
                        .http_only(c.http_only);
                    if let Some(expires) = c.expires {
                        if expires > 0.0 {
                            builder = builder.expires(
                                chromiumoxide::cdp::browser_protocol::network::TimeSinceEpoch::new(
                                    expires,
                                ),
                            );
                        }
                    }
                    builder.build().ok()
                })
                .collect();
            let cookie_count = cookie_params.len();
            page.set_cookies(cookie_params).await.map_err(internal)?;

            // Web storage is origin-scoped; visit each origin briefly to
            // write its items back.
            let mut restored_origins = 0usize;
            for origin in &state.origins {
                if origin.local_storage.is_empty() && origin.session_storage.is_empty() {
                    continue;
                }
                let scratch = relay.host.new_page(origin.origin.as_str()).await?;
                let _ = scratch.wait_for_navigation().await;
                let script = format!(
                    r#"((items, sessionItems) => {{
                        for (const it of items) window.localStorage.setItem(it.name, it.value);
                        for (const it of sessionItems) window.sessionStorage.setItem(it.name, it.value);
                        return true;
                    }})({}, {})"#,
                    serde_json::to_string(&origin.local_storage).map_err(internal)?,
                    serde_json::to_string(&origin.session_storage).map_err(internal)?,
                );
                if eval_json(&scratch, &script).await.is_ok() {
                    restored_origins += 1;
                }
                let _ = scratch.close().await;
            }

            Ok(json!({
                "status": "imported",
                "cookies": cookie_count,
                "origins": restored_origins,
            }))
        })
        .await
    }
}
