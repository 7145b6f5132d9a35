//! Accessibility-tree snapshot and uid-addressed interactions.
//!
//! `browser.take_snapshot` consumes CDP `Accessibility.getFullAXTree`,
//! assigns `ax-<nodeId>` uids, and records the frame's DOM version at
//! capture. Uid interactions resolve through the uid map and fail with
//! `STALE_REF` once the frame has advanced.

use std::collections::HashMap;

use chromiumoxide::cdp::browser_protocol::accessibility::{AxNode, GetFullAxTreeParams};
use chromiumoxide::cdp::browser_protocol::dom::BackendNodeId;
use chromiumoxide::cdp::browser_protocol::page::FrameId;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::CallToolResult;
use rmcp::{ErrorData as McpError, schemars, tool, tool_router};
use serde::Deserialize;
use serde_json::{Map, Value, json};

use super::RelayServer;
use super::support::{clip_chars, fill_node, internal};
use crate::capture::{Detail, opt_bool, opt_usize};
use crate::envelope::error::ToolError;
use crate::relay::{DEFAULT_WAIT_TIMEOUT_MS, with_timeout};
use crate::tracker::MAIN_FRAME_ID;

/// Roles always kept in a snapshot, per the interaction surface the
/// assistant actually drives.
const INTERESTING_ROLES: &[&str] = &[
    "button", "link", "textbox", "searchbox", "combobox", "listbox", "option", "checkbox",
    "radio", "tab", "menuitem", "switch", "heading", "spinbutton", "slider",
];

const GENERIC_ROLES: &[&str] = &["generic", "none", "InlineTextBox", "LineBreak", "StaticText"];

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TakeSnapshotArgs {
    #[serde(default)]
    pub detail: Option<Detail>,
    /// Frame to snapshot (`main` or `f<n>`); defaults to the main frame.
    #[serde(default)]
    pub frame_id: Option<String>,
    #[serde(default)]
    pub max_nodes: Option<u64>,
    #[serde(default)]
    pub interesting_only: Option<bool>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UidArgs {
    /// Accessibility uid (`ax-<n>`) from browser.take_snapshot.
    pub uid: String,
    /// Frame the uid was captured on; defaults to the main frame.
    #[serde(default)]
    pub frame_id: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FillUidArgs {
    pub uid: String,
    #[serde(default)]
    pub frame_id: Option<String>,
    /// Value to type into the node.
    pub value: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WaitForArgs {
    /// Wait until this text appears in the page's rendered text.
    #[serde(default)]
    pub text: Option<String>,
    /// Wait until this uid resolves under current frame versions.
    #[serde(default)]
    pub uid: Option<String>,
    #[serde(default)]
    pub frame_id: Option<String>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

fn ax_string(value: &Option<chromiumoxide::cdp::browser_protocol::accessibility::AxValue>) -> Option<String> {
    value.as_ref().and_then(|v| v.value.as_ref()).and_then(|v| v.as_str()).map(String::from)
}

fn is_interesting(role: Option<&str>, name: Option<&str>) -> bool {
    match role {
        Some(role) if INTERESTING_ROLES.contains(&role) => true,
        Some(role) if !GENERIC_ROLES.contains(&role) => {
            name.map(|n| !n.is_empty()).unwrap_or(false)
        }
        _ => false,
    }
}

struct SnapshotWalk<'a> {
    node_map: HashMap<&'a str, &'a AxNode>,
    uids: HashMap<String, BackendNodeId>,
    rows: Vec<Value>,
    interesting_only: bool,
    max_nodes: usize,
    max_depth: usize,
    max_name_chars: usize,
}

impl<'a> SnapshotWalk<'a> {
    fn visit(&mut self, node: &'a AxNode, depth: usize) {
        if self.rows.len() >= self.max_nodes || depth > self.max_depth {
            return;
        }

        let role = ax_string(&node.role);
        let name = ax_string(&node.name);
        let keep = !node.ignored
            && (!self.interesting_only || is_interesting(role.as_deref(), name.as_deref()));

        if keep {
            let uid = format!("ax-{}", node.node_id.inner());
            if let Some(backend_id) = node.backend_dom_node_id {
                self.uids.insert(uid.clone(), backend_id);
            }
            let mut row = Map::new();
            row.insert("uid".into(), json!(uid));
            row.insert("depth".into(), json!(depth));
            if let Some(role) = &role {
                row.insert("role".into(), json!(role));
            }
            if let Some(name) = &name {
                if !name.is_empty() {
                    row.insert("name".into(), json!(clip_chars(name, self.max_name_chars)));
                }
            }
            if let Some(value) = ax_string(&node.value) {
                if !value.is_empty() {
                    row.insert("value".into(), json!(clip_chars(&value, self.max_name_chars)));
                }
            }
            self.rows.push(Value::Object(row));
        }

        if let Some(child_ids) = &node.child_ids {
            let next_depth = if keep { depth + 1 } else { depth };
            for child_id in child_ids {
                // Copy the node reference out so the map borrow ends before
                // the recursive call.
                if let Some(child) = self.node_map.get(child_id.inner().as_str()).copied() {
                    self.visit(child, next_depth);
                }
            }
        }
    }
}

#[tool_router(router = ax_router, vis = "pub(crate)")]
impl RelayServer {
    #[tool(
        name = "browser.take_snapshot",
        description = "Accessibility-tree snapshot with ax-<n> uids for interaction. Uids go stale when the frame navigates or mutates."
    )]
    pub async fn take_snapshot(
        &self,
        Parameters(args): Parameters<TakeSnapshotArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.relay.run_tool("browser.take_snapshot", async |relay| {
            let detail = args.detail.unwrap_or_default();
            let mut overrides = Map::new();
            if let Some(v) = args.max_nodes {
                overrides.insert("maxNodes".into(), json!(v));
            }
            if let Some(v) = args.interesting_only {
                overrides.insert("interestingOnly".into(), json!(v));
            }
            let options = relay.options("take_snapshot", detail, &overrides);

            let (page_id, page) = relay.ensure_page().await?;
            let frame_id = args.frame_id.as_deref().unwrap_or(MAIN_FRAME_ID).to_string();
            let frame_cx = relay.dom_context(page_id, Some(&frame_id))?;

            let mut builder = GetFullAxTreeParams::builder();
            if frame_id != MAIN_FRAME_ID {
                let cdp_id = relay
                    .tracker(page_id)?
                    .cdp_frame_id(&frame_id)
                    .ok_or_else(|| ToolError::not_found(format!("frame '{frame_id}' not found")))?;
                builder = builder.frame_id(FrameId::from(cdp_id));
            }
            let response = page.execute(builder.build()).await.map_err(internal)?;
            let nodes = &response.result.nodes;

            let mut walk = SnapshotWalk {
                node_map: nodes.iter().map(|n| (n.node_id.inner().as_str(), n)).collect(),
                uids: HashMap::new(),
                rows: Vec::new(),
                interesting_only: opt_bool(&options, "interestingOnly", true),
                max_nodes: opt_usize(&options, "maxNodes", 400),
                max_depth: opt_usize(&options, "maxDepth", 16),
                max_name_chars: opt_usize(&options, "maxNameChars", 80),
            };
            let root = nodes.iter().find(|n| n.parent_id.is_none());
            if let Some(root) = root {
                walk.visit(root, 0);
            }

            let node_count = walk.rows.len();
            relay.uids.store(page_id, &frame_id, frame_cx.frame_dom_version, walk.uids);

            Ok(json!({
                "detail": detail.as_str(),
                "nodeCount": node_count,
                "totalNodes": nodes.len(),
                "nodes": walk.rows,
                "__meta": { "frameId": frame_id },
            }))
        })
        .await
    }

    #[tool(name = "browser.click_uid", description = "Click an accessibility node by uid.")]
    pub async fn click_uid(
        &self,
        Parameters(args): Parameters<UidArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.relay.run_tool("browser.click_uid", async |relay| {
            let (page_id, page) = relay.ensure_page().await?;
            let node = relay.resolve_uid(page_id, args.frame_id.as_deref(), &args.uid)?;
            super::support::click_node(&page, node).await?;
            relay.invalidate_after_mutation(page_id);
            Ok(json!({ "status": "clicked", "uid": args.uid }))
        })
        .await
    }

    #[tool(name = "browser.hover_uid", description = "Hover over an accessibility node by uid.")]
    pub async fn hover_uid(
        &self,
        Parameters(args): Parameters<UidArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.relay.run_tool("browser.hover_uid", async |relay| {
            let (page_id, page) = relay.ensure_page().await?;
            let node = relay.resolve_uid(page_id, args.frame_id.as_deref(), &args.uid)?;
            super::support::hover_node(&page, node).await?;
            Ok(json!({ "status": "hovered", "uid": args.uid }))
        })
        .await
    }

    #[tool(
        name = "browser.fill_uid",
        description = "Focus an accessibility node by uid, clear it, and type a value."
    )]
    pub async fn fill_uid(
        &self,
        Parameters(args): Parameters<FillUidArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.relay.run_tool("browser.fill_uid", async |relay| {
            let (page_id, page) = relay.ensure_page().await?;
            let node = relay.resolve_uid(page_id, args.frame_id.as_deref(), &args.uid)?;
            fill_node(&page, node, &args.value).await?;
            relay.invalidate_after_mutation(page_id);
            Ok(json!({ "status": "filled", "uid": args.uid }))
        })
        .await
    }

    #[tool(name = "browser.scroll_to_uid", description = "Scroll an accessibility node into view.")]
    pub async fn scroll_to_uid(
        &self,
        Parameters(args): Parameters<UidArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.relay.run_tool("browser.scroll_to_uid", async |relay| {
            let (page_id, page) = relay.ensure_page().await?;
            let node = relay.resolve_uid(page_id, args.frame_id.as_deref(), &args.uid)?;
            super::support::node_center(&page, node).await?;
            relay.invalidate_after_mutation(page_id);
            Ok(json!({ "status": "scrolled", "uid": args.uid }))
        })
        .await
    }

    #[tool(
        name = "browser.wait_for",
        description = "Wait until text appears on the page or a captured uid becomes resolvable."
    )]
    pub async fn wait_for(
        &self,
        Parameters(args): Parameters<WaitForArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.relay.run_tool("browser.wait_for", async |relay| {
            let (page_id, page) = relay.ensure_page().await?;
            let timeout = args.timeout_ms.unwrap_or(DEFAULT_WAIT_TIMEOUT_MS);

            match (&args.text, &args.uid) {
                (Some(text), _) => {
                    let needle = serde_json::to_string(text).map_err(internal)?;
                    with_timeout(timeout, "wait_for text", async {
                        loop {
                            let script = format!(
                                "(document.body ? document.body.innerText : '').includes({needle})"
                            );
                            if super::support::eval_json(&page, &script).await? == Value::Bool(true) {
                                return Ok(());
                            }
                            tokio::time::sleep(std::time::Duration::from_millis(150)).await;
                        }
                    })
                    .await?;
                    Ok(json!({ "status": "found", "text": text }))
                }
                (None, Some(uid)) => {
                    with_timeout(timeout, "wait_for uid", async {
                        loop {
                            match relay.resolve_uid(page_id, args.frame_id.as_deref(), uid) {
                                Ok(_) => return Ok(()),
                                Err(e) if e.code() == crate::envelope::error::ErrorCode::StaleRef => {
                                    return Err(e);
                                }
                                Err(_) => {}
                            }
                            tokio::time::sleep(std::time::Duration::from_millis(150)).await;
                        }
                    })
                    .await?;
                    Ok(json!({ "status": "found", "uid": uid }))
                }
                (None, None) => Err(ToolError::not_found("provide text or uid to wait for")),
            }
        })
        .await
    }
}
