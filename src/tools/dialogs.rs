//! Dialog tools.
//!
//! Dialogs are captured by the event plane as they open; unhandled ones
//! auto-dismiss after 15 s. Handling an already-resolved dialog returns its
//! recorded resolution instead of erroring.

use chromiumoxide::cdp::browser_protocol::page::HandleJavaScriptDialogParams;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::CallToolResult;
use rmcp::{ErrorData as McpError, schemars, tool, tool_router};
use serde::Deserialize;
use serde_json::json;

use super::RelayServer;
use super::support::internal;
use crate::envelope::error::ToolError;
use crate::events::DialogStatus;

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ListDialogsArgs {
    /// Only return dialogs still awaiting a decision (default true).
    #[serde(default)]
    pub pending_only: Option<bool>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct HandleDialogArgs {
    /// Dialog id (`dlg-<n>`) from browser.list_dialogs.
    pub dialog_id: String,
    /// accept | dismiss.
    pub action: String,
    /// Text to submit when accepting a prompt.
    #[serde(default)]
    pub prompt_text: Option<String>,
}

#[tool_router(router = dialogs_router, vis = "pub(crate)")]
impl RelayServer {
    #[tool(
        name = "browser.list_dialogs",
        description = "List captured JavaScript dialogs (pending only by default)."
    )]
    pub async fn list_dialogs(
        &self,
        Parameters(args): Parameters<ListDialogsArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.relay.run_tool("browser.list_dialogs", async |relay| {
            let dialogs = relay.events.list_dialogs(args.pending_only.unwrap_or(true));
            Ok(json!({ "count": dialogs.len(), "dialogs": dialogs }))
        })
        .await
    }

    #[tool(
        name = "browser.handle_dialog",
        description = "Accept or dismiss a captured dialog, optionally submitting prompt text. Idempotent for already-resolved dialogs."
    )]
    pub async fn handle_dialog(
        &self,
        Parameters(args): Parameters<HandleDialogArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.relay.run_tool("browser.handle_dialog", async |relay| {
            let accept = match args.action.as_str() {
                "accept" => true,
                "dismiss" => false,
                other => {
                    return Err(ToolError::not_found(format!(
                        "unknown action '{other}' (use accept or dismiss)"
                    )));
                }
            };

            let record = relay.events.get_dialog(&args.dialog_id)?;
            if record.status.is_terminal() {
                // Already resolved (possibly auto-dismissed); report the
                // recorded outcome without touching the browser.
                return Ok(json!({ "dialog": record, "alreadyResolved": true }));
            }

            let page = relay.pages.get(record.page_id)?.page;
            let mut builder = HandleJavaScriptDialogParams::builder().accept(accept);
            if accept {
                if let Some(text) = &args.prompt_text {
                    builder = builder.prompt_text(text.clone());
                }
            }
            if let Err(e) = page.execute(builder.build().map_err(internal)?).await {
                let _ = relay.events.resolve_dialog(&args.dialog_id, DialogStatus::Error, None);
                return Err(internal(e));
            }

            let status = if accept { DialogStatus::Accepted } else { DialogStatus::Dismissed };
            let resolved = relay.events.resolve_dialog(
                &args.dialog_id,
                status,
                if accept { args.prompt_text.clone() } else { None },
            )?;
            Ok(json!({ "dialog": resolved, "alreadyResolved": false }))
        })
        .await
    }
}
