//! Observability tools: console, network, and the generic event wait.

use chromiumoxide::cdp::browser_protocol::network::{GetResponseBodyParams, RequestId};
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::CallToolResult;
use rmcp::{ErrorData as McpError, schemars, tool, tool_router};
use serde::Deserialize;
use serde_json::{Map, Value, json};

use super::RelayServer;
use super::support::{clip_chars, internal, press_key};
use crate::capture::{Detail, opt_usize};
use crate::envelope::error::ToolError;
use crate::events::{EventKind, EventQuery};
use crate::relay::{DEFAULT_NAV_TIMEOUT_MS, DEFAULT_WAIT_TIMEOUT_MS, Relay};

/// Operations `expect_event` may run after arming the wait. Closed set; the
/// wait is armed before the action so fast events are not missed.
const AFTER_ACTIONS: &[&str] = &["click", "press", "goto", "reload", "back", "forward", "hover"];

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ConsoleMessagesArgs {
    #[serde(default)]
    pub detail: Option<Detail>,
    /// Only messages at this level (log, warn, error, ...).
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub limit: Option<u64>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NetworkRequestsArgs {
    #[serde(default)]
    pub detail: Option<Detail>,
    /// Only requests whose URL contains this substring.
    #[serde(default)]
    pub url_contains: Option<String>,
    #[serde(default)]
    pub limit: Option<u64>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GetRequestArgs {
    /// Network record id (`req-<n>`).
    pub request_id: String,
    /// Fetch the response body as well.
    #[serde(default)]
    pub include_body: Option<bool>,
    #[serde(default)]
    pub max_body_chars: Option<u64>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ExpectEventArgs {
    /// dialog | download | popup | console | network.
    pub event_type: String,
    /// Substring (or regex with regex=true) matched against the record's
    /// URL (message for dialogs, text for console).
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub regex: Option<bool>,
    /// Exact HTTP status (network only).
    #[serde(default)]
    pub status: Option<i64>,
    /// HTTP method (network only).
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Run this operation after arming the wait: click, press, goto,
    /// reload, back, forward, hover.
    #[serde(default)]
    pub after_action: Option<String>,
    /// Arguments for the after-action (url, selector, elementId, key).
    #[serde(default)]
    pub after_action_args: Option<Map<String, Value>>,
}

async fn run_after_action(
    relay: &Relay,
    action: &str,
    args: &Map<String, Value>,
) -> Result<(), ToolError> {
    let str_arg = |key: &str| args.get(key).and_then(Value::as_str);
    let element_id = args.get("elementId").and_then(Value::as_i64);

    match action {
        "click" => {
            super::interact::click_inner(relay, element_id, str_arg("selector")).await?;
        }
        "hover" => {
            super::interact::hover_inner(relay, element_id, str_arg("selector")).await?;
        }
        "press" => {
            let key = str_arg("key")
                .ok_or_else(|| ToolError::not_found("afterActionArgs.key is required for press"))?;
            let (page_id, page) = relay.ensure_page().await?;
            press_key(&page, key).await?;
            relay.invalidate_after_mutation(page_id);
        }
        "goto" => {
            let url = str_arg("url")
                .ok_or_else(|| ToolError::not_found("afterActionArgs.url is required for goto"))?;
            super::navigation::goto_inner(relay, url, DEFAULT_NAV_TIMEOUT_MS).await?;
        }
        "reload" => {
            super::navigation::reload_inner(relay, DEFAULT_NAV_TIMEOUT_MS).await?;
        }
        "back" => {
            super::navigation::history_step(relay, -1, DEFAULT_NAV_TIMEOUT_MS).await?;
        }
        "forward" => {
            super::navigation::history_step(relay, 1, DEFAULT_NAV_TIMEOUT_MS).await?;
        }
        other => {
            return Err(ToolError::permission(format!(
                "afterAction '{other}' is not allowed (allowed: {})",
                AFTER_ACTIONS.join(", ")
            )));
        }
    }
    Ok(())
}

#[tool_router(router = observe_router, vis = "pub(crate)")]
impl RelayServer {
    #[tool(
        name = "browser.console_messages",
        description = "Recent console messages and page exceptions from the bounded capture buffer."
    )]
    pub async fn console_messages(
        &self,
        Parameters(args): Parameters<ConsoleMessagesArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.relay.run_tool("browser.console_messages", async |relay| {
            let detail = args.detail.unwrap_or_default();
            let mut overrides = Map::new();
            if let Some(limit) = args.limit {
                overrides.insert("limit".into(), json!(limit));
            }
            let options = relay.options("console_messages", detail, &overrides);
            let limit = opt_usize(&options, "limit", 40);
            let max_text = opt_usize(&options, "maxTextChars", 200);

            let mut messages = relay.events.console_tail(limit, args.level.as_deref());
            for message in &mut messages {
                message.text = clip_chars(&message.text, max_text);
            }
            Ok(json!({ "count": messages.len(), "messages": messages }))
        })
        .await
    }

    #[tool(
        name = "browser.network_requests",
        description = "Recent network requests from the bounded capture buffer, optionally filtered by URL substring."
    )]
    pub async fn network_requests(
        &self,
        Parameters(args): Parameters<NetworkRequestsArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.relay.run_tool("browser.network_requests", async |relay| {
            let detail = args.detail.unwrap_or_default();
            let mut overrides = Map::new();
            if let Some(limit) = args.limit {
                overrides.insert("limit".into(), json!(limit));
            }
            let options = relay.options("network_requests", detail, &overrides);
            let limit = opt_usize(&options, "limit", 40);

            let requests = relay.events.network_tail(limit, args.url_contains.as_deref());
            Ok(json!({ "count": requests.len(), "requests": requests }))
        })
        .await
    }

    #[tool(
        name = "browser.get_request",
        description = "Details for one captured network request, optionally with its response body."
    )]
    pub async fn get_request(
        &self,
        Parameters(args): Parameters<GetRequestArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.relay.run_tool("browser.get_request", async |relay| {
            let record = relay.events.get_network(&args.request_id)?;
            let mut payload = Map::new();
            payload.insert("request".into(), serde_json::to_value(&record).map_err(internal)?);

            if args.include_body.unwrap_or(false) {
                let entry = relay.pages.get(record.page_id)?;
                let response = entry
                    .page
                    .execute(GetResponseBodyParams::new(RequestId::from(
                        record.cdp_request_id.clone(),
                    )))
                    .await
                    .map_err(|e| {
                        ToolError::not_found(format!(
                            "response body unavailable for {}: {e}",
                            args.request_id
                        ))
                    })?;
                let max_chars = args.max_body_chars.unwrap_or(4_000) as usize;
                payload.insert("bodyBase64Encoded".into(), json!(response.result.base64_encoded));
                payload.insert("body".into(), json!(clip_chars(&response.result.body, max_chars)));
            }
            Ok(Value::Object(payload))
        })
        .await
    }

    #[tool(
        name = "browser.expect_event",
        description = "Arm a wait for a browser event (dialog, download, popup, console, network), optionally triggering an action, and return the matching record."
    )]
    pub async fn expect_event(
        &self,
        Parameters(args): Parameters<ExpectEventArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.relay.run_tool("browser.expect_event", async |relay| {
            let kind = EventKind::parse(&args.event_type).ok_or_else(|| {
                ToolError::not_found(format!("unknown eventType '{}'", args.event_type))
            })?;

            let query = EventQuery {
                regex: match (args.regex.unwrap_or(false), &args.pattern) {
                    (true, Some(pattern)) => Some(
                        regex::Regex::new(pattern)
                            .map_err(|e| ToolError::internal(format!("invalid regex: {e}")))?,
                    ),
                    _ => None,
                },
                pattern: args.pattern.clone(),
                status: args.status,
                method: args.method.clone(),
            };

            // Arm before acting so fast events are not missed.
            let min_seq = relay.events.current_seq();

            if let Some(action) = &args.after_action {
                if !AFTER_ACTIONS.contains(&action.as_str()) {
                    return Err(ToolError::permission(format!(
                        "afterAction '{action}' is not allowed (allowed: {})",
                        AFTER_ACTIONS.join(", ")
                    )));
                }
                let action_args = args.after_action_args.clone().unwrap_or_default();
                run_after_action(&relay, action, &action_args).await?;
            } else {
                // Without an action the relay still needs a page so the
                // event listeners are attached.
                relay.ensure_page().await?;
            }

            let timeout_ms = args.timeout_ms.unwrap_or(DEFAULT_WAIT_TIMEOUT_MS);
            let deadline = tokio::time::Instant::now() + crate::relay::clamp_timeout(timeout_ms);
            loop {
                if let Some(record) = relay.events.find_event_since(kind, min_seq, &query) {
                    return Ok(json!({ "eventType": args.event_type, "event": record }));
                }
                if tokio::time::Instant::now() >= deadline {
                    return Err(ToolError::timeout(format!(
                        "no matching {} event within {timeout_ms} ms",
                        args.event_type
                    )));
                }
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            }
        })
        .await
    }

    #[tool(
        name = "browser.clear_events",
        description = "Clear the console, network, dialog, download, and popup capture buffers."
    )]
    pub async fn clear_events(&self) -> Result<CallToolResult, McpError> {
        self.relay.run_tool("browser.clear_events", async |relay| {
            relay.events.clear_buffers();
            Ok(json!({ "status": "cleared" }))
        })
        .await
    }
}
