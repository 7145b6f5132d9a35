//! Page capture tools: text snapshots, element listings, screenshots, and
//! raw content excerpts. `browser.list` and `browser.visual_snapshot` are
//! the only fillers of the element cache.

use base64::Engine;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::{Page, ScreenshotParams};
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::CallToolResult;
use rmcp::{ErrorData as McpError, schemars, tool, tool_router};
use serde::Deserialize;
use serde_json::{Map, Value, json};

use super::RelayServer;
use super::support::{
    FIND_TEXT_JS, LIST_ELEMENTS_JS, SNAPSHOT_JS, clip_chars, eval_json, internal,
    script_with_options,
};
use crate::capture::{Detail, opt_bool, opt_usize};
use crate::elements::ElementEntry;
use crate::envelope::error::ToolError;
use crate::relay::Relay;

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SnapshotArgs {
    /// Detail level within the active capture profile.
    #[serde(default)]
    pub detail: Option<Detail>,
    #[serde(default)]
    pub max_chars: Option<u64>,
    #[serde(default)]
    pub max_links: Option<u64>,
    #[serde(default)]
    pub include_headings: Option<bool>,
    #[serde(default)]
    pub include_forms_summary: Option<bool>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ListArgs {
    #[serde(default)]
    pub detail: Option<Detail>,
    #[serde(default)]
    pub max_items: Option<u64>,
    #[serde(default)]
    pub interactive_only: Option<bool>,
    #[serde(default)]
    pub visible_only: Option<bool>,
    #[serde(default)]
    pub viewport_only: Option<bool>,
    #[serde(default)]
    pub include_selectors: Option<bool>,
    #[serde(default)]
    pub include_text: Option<bool>,
    #[serde(default)]
    pub include_b_box: Option<bool>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct VisualSnapshotArgs {
    #[serde(default)]
    pub detail: Option<Detail>,
    #[serde(default)]
    pub full_page: Option<bool>,
    #[serde(default)]
    pub max_items: Option<u64>,
    #[serde(default)]
    pub quality: Option<u64>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ScreenshotArgs {
    /// Capture the full scrollable page instead of the viewport.
    #[serde(default)]
    pub full_page: Option<bool>,
    /// png | jpeg (default jpeg).
    #[serde(default)]
    pub format: Option<String>,
    /// JPEG quality 1-100.
    #[serde(default)]
    pub quality: Option<u64>,
    /// Save to this path (inside the output directory) instead of
    /// returning base64 bytes.
    #[serde(default)]
    pub save_path: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ContentArgs {
    #[serde(default)]
    pub detail: Option<Detail>,
    /// Restrict to the first element matching this CSS selector.
    #[serde(default)]
    pub selector: Option<String>,
    #[serde(default)]
    pub max_chars: Option<u64>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FindTextArgs {
    /// Text to look for in the page's rendered text.
    pub query: String,
    #[serde(default)]
    pub detail: Option<Detail>,
    #[serde(default)]
    pub case_sensitive: Option<bool>,
    #[serde(default)]
    pub max_matches: Option<u64>,
}

fn override_u64(map: &mut Map<String, Value>, key: &str, value: Option<u64>) {
    if let Some(v) = value {
        map.insert(key.to_string(), json!(v));
    }
}

fn override_bool(map: &mut Map<String, Value>, key: &str, value: Option<bool>) {
    if let Some(v) = value {
        map.insert(key.to_string(), json!(v));
    }
}

/// Run the element collection script and fill the element cache.
/// Shared by `browser.list` and `browser.visual_snapshot`.
pub(crate) async fn capture_elements(
    relay: &Relay,
    page: &Page,
    page_id: i64,
    options: &Map<String, Value>,
) -> Result<(Vec<ElementEntry>, Vec<Value>), ToolError> {
    let script_opts = json!({
        "interactiveOnly": opt_bool(options, "interactiveOnly", true),
        "visibleOnly": opt_bool(options, "visibleOnly", true),
        "viewportOnly": opt_bool(options, "viewportOnly", false),
        "maxItems": opt_usize(options, "maxItems", 120),
    });
    let raw = eval_json(page, &script_with_options(LIST_ELEMENTS_JS, &script_opts)).await?;
    let items = raw.as_array().cloned().unwrap_or_default();

    let entries: Vec<ElementEntry> = items
        .iter()
        .map(|item| ElementEntry {
            element_id: 0,
            selector: item["selector"].as_str().map(String::from),
            tag: item["tag"].as_str().unwrap_or("").to_string(),
            input_type: item["type"].as_str().map(String::from),
            role: item["role"].as_str().map(String::from),
            text: item["text"].as_str().map(String::from),
            href: item["href"].as_str().map(String::from),
            aria_label: item["ariaLabel"].as_str().map(String::from),
            context_key: String::new(),
        })
        .collect();

    let context_key = relay.main_context_key(page_id)?;
    Ok((relay.elements.fill(&context_key, entries), items))
}

fn entry_row(
    entry: &ElementEntry,
    raw: Option<&Value>,
    include_selectors: bool,
    include_text: bool,
    include_bbox: bool,
    max_text_chars: usize,
) -> Value {
    let mut row = Map::new();
    row.insert("elementId".into(), json!(entry.element_id));
    row.insert("tag".into(), json!(entry.tag));
    if let Some(t) = &entry.input_type {
        row.insert("type".into(), json!(t));
    }
    if let Some(role) = &entry.role {
        row.insert("role".into(), json!(role));
    }
    if include_text {
        if let Some(text) = &entry.text {
            if !text.is_empty() {
                row.insert("text".into(), json!(clip_chars(text, max_text_chars)));
            }
        }
    }
    if let Some(href) = &entry.href {
        row.insert("href".into(), json!(href));
    }
    if let Some(label) = &entry.aria_label {
        row.insert("ariaLabel".into(), json!(label));
    }
    if include_selectors {
        if let Some(selector) = &entry.selector {
            row.insert("selector".into(), json!(selector));
        }
    }
    if include_bbox {
        if let Some(bbox) = raw.and_then(|r| r.get("bbox")) {
            row.insert("bbox".into(), bbox.clone());
        }
    }
    Value::Object(row)
}

#[tool_router(router = capture_router, vis = "pub(crate)")]
impl RelayServer {
    #[tool(
        name = "browser.snapshot",
        description = "Readable digest of the active page: text, links, and optionally headings and a forms summary. Limits follow the active capture profile."
    )]
    pub async fn snapshot(
        &self,
        Parameters(args): Parameters<SnapshotArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.relay.run_tool("browser.snapshot", async |relay| {
            let detail = args.detail.unwrap_or_default();
            let mut overrides = Map::new();
            override_u64(&mut overrides, "maxChars", args.max_chars);
            override_u64(&mut overrides, "maxLinks", args.max_links);
            override_bool(&mut overrides, "includeHeadings", args.include_headings);
            override_bool(&mut overrides, "includeFormsSummary", args.include_forms_summary);
            let options = relay.options("snapshot", detail, &overrides);

            let (_page_id, page) = relay.ensure_page().await?;
            let script_opts = json!({
                "maxLinks": opt_usize(&options, "maxLinks", 30),
                "includeHeadings": opt_bool(&options, "includeHeadings", false),
                "includeFormsSummary": opt_bool(&options, "includeFormsSummary", false),
            });
            let raw = eval_json(&page, &script_with_options(SNAPSHOT_JS, &script_opts)).await?;

            let max_chars = opt_usize(&options, "maxChars", 6_000);
            let text = raw["text"].as_str().unwrap_or("");
            let mut payload = Map::new();
            payload.insert("detail".into(), json!(detail.as_str()));
            payload.insert("text".into(), json!(clip_chars(text, max_chars)));
            payload.insert("links".into(), raw["links"].clone());
            if opt_bool(&options, "includeHeadings", false) {
                payload.insert("headings".into(), raw["headings"].clone());
            }
            if opt_bool(&options, "includeFormsSummary", false) {
                payload.insert("forms".into(), raw["forms"].clone());
            }
            Ok(Value::Object(payload))
        })
        .await
    }

    #[tool(
        name = "browser.list",
        description = "List page elements with fresh elementIds for interaction. Re-run after any navigation or mutation; stale ids fail with STALE_REF."
    )]
    pub async fn list(
        &self,
        Parameters(args): Parameters<ListArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.relay.run_tool("browser.list", async |relay| {
            let detail = args.detail.unwrap_or_default();
            let mut overrides = Map::new();
            override_u64(&mut overrides, "maxItems", args.max_items);
            override_bool(&mut overrides, "interactiveOnly", args.interactive_only);
            override_bool(&mut overrides, "visibleOnly", args.visible_only);
            override_bool(&mut overrides, "viewportOnly", args.viewport_only);
            override_bool(&mut overrides, "includeSelectors", args.include_selectors);
            let options = relay.options("list", detail, &overrides);

            let (page_id, page) = relay.ensure_page().await?;
            let (entries, raw) = capture_elements(&relay, &page, page_id, &options).await?;

            let include_selectors = opt_bool(&options, "includeSelectors", false);
            let include_text = args.include_text.unwrap_or(true);
            let include_bbox = args.include_b_box.unwrap_or(false);
            let max_text_chars = opt_usize(&options, "maxTextChars", 80);
            let items: Vec<Value> = entries
                .iter()
                .zip(raw.iter())
                .map(|(e, r)| {
                    entry_row(e, Some(r), include_selectors, include_text, include_bbox, max_text_chars)
                })
                .collect();

            Ok(json!({
                "detail": detail.as_str(),
                "count": items.len(),
                "items": items,
            }))
        })
        .await
    }

    #[tool(
        name = "browser.visual_snapshot",
        description = "Screenshot plus the element inventory with bounding boxes; fills the element cache like browser.list."
    )]
    pub async fn visual_snapshot(
        &self,
        Parameters(args): Parameters<VisualSnapshotArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.relay.run_tool("browser.visual_snapshot", async |relay| {
            let detail = args.detail.unwrap_or_default();
            let mut overrides = Map::new();
            override_u64(&mut overrides, "maxItems", args.max_items);
            override_bool(&mut overrides, "fullPage", args.full_page);
            override_u64(&mut overrides, "quality", args.quality);
            let options = relay.options("visual_snapshot", detail, &overrides);

            let (page_id, page) = relay.ensure_page().await?;

            let full_page = opt_bool(&options, "fullPage", false);
            let quality = opt_usize(&options, "quality", 50) as i64;
            let params = ScreenshotParams::builder()
                .format(CaptureScreenshotFormat::Jpeg)
                .quality(quality)
                .full_page(full_page)
                .build();
            let bytes = page.screenshot(params).await.map_err(internal)?;
            let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);

            // Element pass mirrors browser.list so the screenshot and the
            // cache describe the same DOM state.
            let mut element_options = options.clone();
            element_options.insert("visibleOnly".into(), json!(true));
            element_options.insert("viewportOnly".into(), json!(!full_page));
            let (entries, raw) = capture_elements(&relay, &page, page_id, &element_options).await?;
            let include_text = opt_bool(&options, "includeText", false);
            let include_bbox = opt_bool(&options, "includeBBox", true);
            let max_text_chars = opt_usize(&options, "maxTextChars", 60);
            let items: Vec<Value> = entries
                .iter()
                .zip(raw.iter())
                .map(|(e, r)| entry_row(e, Some(r), false, include_text, include_bbox, max_text_chars))
                .collect();

            Ok(json!({
                "detail": detail.as_str(),
                "format": "jpeg",
                "fullPage": full_page,
                "screenshotBase64": encoded,
                "count": items.len(),
                "items": items,
            }))
        })
        .await
    }

    #[tool(
        name = "browser.screenshot",
        description = "Capture a screenshot. With savePath the image is written inside the output directory and only the path is returned."
    )]
    pub async fn screenshot(
        &self,
        Parameters(args): Parameters<ScreenshotArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.relay.run_tool("browser.screenshot", async |relay| {
            let (_page_id, page) = relay.ensure_page().await?;
            let format = match args.format.as_deref() {
                None | Some("jpeg") => CaptureScreenshotFormat::Jpeg,
                Some("png") => CaptureScreenshotFormat::Png,
                Some(other) => {
                    return Err(ToolError::not_found(format!("unknown format '{other}'")));
                }
            };
            let mut builder = ScreenshotParams::builder()
                .format(format.clone())
                .full_page(args.full_page.unwrap_or(false));
            if matches!(format, CaptureScreenshotFormat::Jpeg) {
                builder = builder.quality(args.quality.unwrap_or(70) as i64);
            }
            let bytes = page.screenshot(builder.build()).await.map_err(internal)?;

            match &args.save_path {
                Some(path) => {
                    let target = relay.security.resolve_write(std::path::Path::new(path))?;
                    if let Some(parent) = target.parent() {
                        tokio::fs::create_dir_all(parent).await.map_err(internal)?;
                    }
                    tokio::fs::write(&target, &bytes).await.map_err(internal)?;
                    Ok(json!({
                        "status": "saved",
                        "path": target.display().to_string(),
                        "bytes": bytes.len(),
                    }))
                }
                None => Ok(json!({
                    "format": match format {
                        CaptureScreenshotFormat::Png => "png",
                        _ => "jpeg",
                    },
                    "screenshotBase64": base64::engine::general_purpose::STANDARD.encode(&bytes),
                })),
            }
        })
        .await
    }

    #[tool(
        name = "browser.html",
        description = "HTML excerpt of the page or of the first element matching a selector."
    )]
    pub async fn html(
        &self,
        Parameters(args): Parameters<ContentArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.relay.run_tool("browser.html", async |relay| {
            let detail = args.detail.unwrap_or_default();
            let mut overrides = Map::new();
            override_u64(&mut overrides, "maxChars", args.max_chars);
            let options = relay.options("html", detail, &overrides);
            let max_chars = opt_usize(&options, "maxChars", 4_000);

            let (_page_id, page) = relay.ensure_page().await?;
            let html = match &args.selector {
                Some(selector) => {
                    let script = format!(
                        "(sel => {{ const el = document.querySelector(sel); return el ? el.outerHTML : null; }})({})",
                        serde_json::to_string(selector).map_err(internal)?
                    );
                    match eval_json(&page, &script).await? {
                        Value::String(s) => s,
                        _ => {
                            return Err(ToolError::not_found(format!(
                                "no element found for selector '{selector}'"
                            )));
                        }
                    }
                }
                None => page.content().await.map_err(internal)?,
            };
            Ok(json!({
                "detail": detail.as_str(),
                "totalChars": html.chars().count(),
                "html": clip_chars(&html, max_chars),
            }))
        })
        .await
    }

    #[tool(
        name = "browser.text",
        description = "Rendered text of the page or of the first element matching a selector."
    )]
    pub async fn text(
        &self,
        Parameters(args): Parameters<ContentArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.relay.run_tool("browser.text", async |relay| {
            let detail = args.detail.unwrap_or_default();
            let mut overrides = Map::new();
            override_u64(&mut overrides, "maxChars", args.max_chars);
            let options = relay.options("text", detail, &overrides);
            let max_chars = opt_usize(&options, "maxChars", 6_000);

            let (_page_id, page) = relay.ensure_page().await?;
            let script = match &args.selector {
                Some(selector) => format!(
                    "(sel => {{ const el = document.querySelector(sel); return el ? el.innerText : null; }})({})",
                    serde_json::to_string(selector).map_err(internal)?
                ),
                None => "document.body ? document.body.innerText : ''".to_string(),
            };
            let text = match eval_json(&page, &script).await? {
                Value::String(s) => s,
                Value::Null if args.selector.is_some() => {
                    return Err(ToolError::not_found(format!(
                        "no element found for selector '{}'",
                        args.selector.as_deref().unwrap_or_default()
                    )));
                }
                _ => String::new(),
            };
            Ok(json!({
                "detail": detail.as_str(),
                "totalChars": text.chars().count(),
                "text": clip_chars(&text, max_chars),
            }))
        })
        .await
    }

    #[tool(
        name = "browser.find_text",
        description = "Search the page's rendered text and return matches with surrounding context."
    )]
    pub async fn find_text(
        &self,
        Parameters(args): Parameters<FindTextArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.relay.run_tool("browser.find_text", async |relay| {
            let detail = args.detail.unwrap_or_default();
            let mut overrides = Map::new();
            override_u64(&mut overrides, "maxMatches", args.max_matches);
            let options = relay.options("find_text", detail, &overrides);

            let (_page_id, page) = relay.ensure_page().await?;
            let script_opts = json!({
                "query": args.query.clone(),
                "caseSensitive": args.case_sensitive.unwrap_or(false),
                "maxMatches": opt_usize(&options, "maxMatches", 20),
                "contextChars": opt_usize(&options, "contextChars", 60),
            });
            let raw = eval_json(&page, &script_with_options(FIND_TEXT_JS, &script_opts)).await?;
            Ok(json!({
                "detail": detail.as_str(),
                "query": args.query,
                "totalMatches": raw["totalMatches"],
                "matches": raw["matches"],
            }))
        })
        .await
    }
}
