//! Selector- and elementId-addressed interaction tools.
//!
//! Every interaction re-resolves its target from the cached selector plan;
//! nothing holds a live element handle across tool calls. Mutating
//! operations clear the element cache and uid maps afterwards.

use chromiumoxide::element::Element;
use chromiumoxide::page::Page;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::CallToolResult;
use rmcp::{ErrorData as McpError, schemars, tool, tool_router};
use serde::Deserialize;
use serde_json::{Value, json};

use super::RelayServer;
use super::support::{eval_json, internal, press_key};
use crate::envelope::error::ToolError;
use crate::relay::Relay;

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TargetArgs {
    /// Element id from browser.list (preferred).
    #[serde(default)]
    pub element_id: Option<i64>,
    /// CSS selector, used when no elementId is given.
    #[serde(default)]
    pub selector: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TypeArgs {
    #[serde(default)]
    pub element_id: Option<i64>,
    #[serde(default)]
    pub selector: Option<String>,
    /// Text to type with synthetic key events.
    pub text: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FillArgs {
    #[serde(default)]
    pub element_id: Option<i64>,
    #[serde(default)]
    pub selector: Option<String>,
    /// Value to set on the control.
    pub value: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PressArgs {
    /// Key name (Enter, Tab, Escape, ArrowDown, ...) or a literal character.
    pub key: String,
    /// Focus this target first.
    #[serde(default)]
    pub element_id: Option<i64>,
    #[serde(default)]
    pub selector: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SelectOptionArgs {
    #[serde(default)]
    pub element_id: Option<i64>,
    #[serde(default)]
    pub selector: Option<String>,
    /// Option value to select.
    #[serde(default)]
    pub value: Option<String>,
    /// Visible option label, used when no value is given.
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CheckArgs {
    #[serde(default)]
    pub element_id: Option<i64>,
    #[serde(default)]
    pub selector: Option<String>,
    /// Desired checked state (default true).
    #[serde(default)]
    pub checked: Option<bool>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ScrollArgs {
    /// up | down | left | right.
    #[serde(default)]
    pub direction: Option<String>,
    /// Pixels to scroll (default 600).
    #[serde(default)]
    pub amount: Option<i64>,
    /// Explicit deltas, overriding direction/amount.
    #[serde(default)]
    pub dx: Option<i64>,
    #[serde(default)]
    pub dy: Option<i64>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GetAttributeArgs {
    #[serde(default)]
    pub element_id: Option<i64>,
    #[serde(default)]
    pub selector: Option<String>,
    /// Attribute name to read.
    pub name: String,
}

/// Resolve a target to a live element, enforcing element-cache staleness
/// rules for elementId references.
pub(crate) async fn resolve_target(
    relay: &Relay,
    page: &Page,
    page_id: i64,
    element_id: Option<i64>,
    selector: Option<&str>,
) -> Result<(Element, String), ToolError> {
    let selector = match (element_id, selector) {
        (Some(id), _) => {
            let current = relay.main_context_key(page_id)?;
            let entry = relay.elements.resolve(id, &current)?;
            entry.selector.ok_or_else(|| {
                ToolError::not_found(format!("elementId {id} has no selector plan"))
            })?
        }
        (None, Some(selector)) => selector.to_string(),
        (None, None) => {
            return Err(ToolError::not_found("provide elementId or selector"));
        }
    };
    let element = page.find_element(selector.as_str()).await.map_err(|e| {
        ToolError::not_found(format!("no element found for selector '{selector}': {e}"))
    })?;
    Ok((element, selector))
}

/// Set a control's value through the DOM, firing input/change events.
async fn set_value_js(page: &Page, selector: &str, value: &str) -> Result<bool, ToolError> {
    let script = format!(
        r#"((sel, value) => {{
            const el = document.querySelector(sel);
            if (!el) return false;
            el.focus();
            if (el.isContentEditable) {{
                el.innerText = value;
            }} else {{
                el.value = value;
            }}
            el.dispatchEvent(new Event('input', {{ bubbles: true }}));
            el.dispatchEvent(new Event('change', {{ bubbles: true }}));
            return true;
        }})({}, {})"#,
        serde_json::to_string(selector).map_err(internal)?,
        serde_json::to_string(value).map_err(internal)?,
    );
    Ok(eval_json(page, &script).await? == Value::Bool(true))
}

/// Shared click path, also used by `expect_event` after-actions.
pub(crate) async fn click_inner(
    relay: &Relay,
    element_id: Option<i64>,
    selector: Option<&str>,
) -> Result<String, ToolError> {
    let (page_id, page) = relay.ensure_page().await?;
    let (element, selector) = resolve_target(relay, &page, page_id, element_id, selector).await?;
    element.scroll_into_view().await.map_err(internal)?;
    element.click().await.map_err(internal)?;
    relay.invalidate_after_mutation(page_id);
    Ok(selector)
}

pub(crate) async fn hover_inner(
    relay: &Relay,
    element_id: Option<i64>,
    selector: Option<&str>,
) -> Result<String, ToolError> {
    let (page_id, page) = relay.ensure_page().await?;
    let (element, selector) = resolve_target(relay, &page, page_id, element_id, selector).await?;
    element.scroll_into_view().await.map_err(internal)?;
    let point = element.clickable_point().await.map_err(internal)?;
    super::support::hover_at(&page, point.x, point.y).await?;
    Ok(selector)
}

#[tool_router(router = interact_router, vis = "pub(crate)")]
impl RelayServer {
    #[tool(
        name = "browser.click",
        description = "Click an element by elementId or CSS selector. Clears cached references afterwards."
    )]
    pub async fn click(
        &self,
        Parameters(args): Parameters<TargetArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.relay.run_tool("browser.click", async |relay| {
            let selector = click_inner(&relay, args.element_id, args.selector.as_deref()).await?;
            Ok(json!({ "status": "clicked", "selector": selector }))
        })
        .await
    }

    #[tool(name = "browser.hover", description = "Hover over an element by elementId or CSS selector.")]
    pub async fn hover(
        &self,
        Parameters(args): Parameters<TargetArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.relay.run_tool("browser.hover", async |relay| {
            let selector = hover_inner(&relay, args.element_id, args.selector.as_deref()).await?;
            Ok(json!({ "status": "hovered", "selector": selector }))
        })
        .await
    }

    #[tool(
        name = "browser.type",
        description = "Type text into an element with synthetic keystrokes (appends to existing content)."
    )]
    pub async fn type_text(
        &self,
        Parameters(args): Parameters<TypeArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.relay.run_tool("browser.type", async |relay| {
            let (page_id, page) = relay.ensure_page().await?;
            let (element, selector) =
                resolve_target(&relay, &page, page_id, args.element_id, args.selector.as_deref())
                    .await?;
            element.focus().await.map_err(internal)?;
            element.type_str(&args.text).await.map_err(internal)?;
            relay.invalidate_after_mutation(page_id);
            Ok(json!({ "status": "typed", "selector": selector, "chars": args.text.chars().count() }))
        })
        .await
    }

    #[tool(
        name = "browser.fill",
        description = "Replace an element's value, firing input and change events."
    )]
    pub async fn fill(
        &self,
        Parameters(args): Parameters<FillArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.relay.run_tool("browser.fill", async |relay| {
            let (page_id, page) = relay.ensure_page().await?;
            let (_element, selector) =
                resolve_target(&relay, &page, page_id, args.element_id, args.selector.as_deref())
                    .await?;
            if !set_value_js(&page, &selector, &args.value).await? {
                return Err(ToolError::not_found(format!(
                    "no element found for selector '{selector}'"
                )));
            }
            relay.invalidate_after_mutation(page_id);
            Ok(json!({ "status": "filled", "selector": selector }))
        })
        .await
    }

    #[tool(
        name = "browser.press",
        description = "Press a key (Enter, Tab, ArrowDown, ...) on the focused element, optionally focusing a target first."
    )]
    pub async fn press(
        &self,
        Parameters(args): Parameters<PressArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.relay.run_tool("browser.press", async |relay| {
            let (page_id, page) = relay.ensure_page().await?;
            if args.element_id.is_some() || args.selector.is_some() {
                let (element, _selector) =
                    resolve_target(&relay, &page, page_id, args.element_id, args.selector.as_deref())
                        .await?;
                element.focus().await.map_err(internal)?;
            }
            press_key(&page, &args.key).await?;
            relay.invalidate_after_mutation(page_id);
            Ok(json!({ "status": "pressed", "key": args.key }))
        })
        .await
    }

    #[tool(
        name = "browser.select_option",
        description = "Select an option of a <select> element by value or visible label."
    )]
    pub async fn select_option(
        &self,
        Parameters(args): Parameters<SelectOptionArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.relay.run_tool("browser.select_option", async |relay| {
            let (page_id, page) = relay.ensure_page().await?;
            let (_element, selector) =
                resolve_target(&relay, &page, page_id, args.element_id, args.selector.as_deref())
                    .await?;
            let (by_value, needle) = match (&args.value, &args.label) {
                (Some(value), _) => (true, value.clone()),
                (None, Some(label)) => (false, label.clone()),
                (None, None) => {
                    return Err(ToolError::not_found("provide value or label"));
                }
            };
            let script = format!(
                r#"((sel, needle, byValue) => {{
                    const el = document.querySelector(sel);
                    if (!el || el.tagName !== 'SELECT') return 'not-select';
                    const opt = Array.from(el.options).find(o =>
                        byValue ? o.value === needle : o.text.trim() === needle);
                    if (!opt) return 'no-option';
                    el.value = opt.value;
                    el.dispatchEvent(new Event('input', {{ bubbles: true }}));
                    el.dispatchEvent(new Event('change', {{ bubbles: true }}));
                    return 'ok';
                }})({}, {}, {})"#,
                serde_json::to_string(&selector).map_err(internal)?,
                serde_json::to_string(&needle).map_err(internal)?,
                by_value,
            );
            match eval_json(&page, &script).await? {
                Value::String(s) if s == "ok" => {}
                Value::String(s) if s == "not-select" => {
                    return Err(ToolError::not_found(format!(
                        "'{selector}' is not a <select> element"
                    )));
                }
                _ => {
                    return Err(ToolError::not_found(format!(
                        "no option matching '{needle}' in '{selector}'"
                    )));
                }
            }
            relay.invalidate_after_mutation(page_id);
            Ok(json!({ "status": "selected", "selector": selector, "option": needle }))
        })
        .await
    }

    #[tool(
        name = "browser.check",
        description = "Set a checkbox or radio button to the desired checked state."
    )]
    pub async fn check(
        &self,
        Parameters(args): Parameters<CheckArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.relay.run_tool("browser.check", async |relay| {
            let (page_id, page) = relay.ensure_page().await?;
            let (_element, selector) =
                resolve_target(&relay, &page, page_id, args.element_id, args.selector.as_deref())
                    .await?;
            let desired = args.checked.unwrap_or(true);
            let script = format!(
                r#"((sel, desired) => {{
                    const el = document.querySelector(sel);
                    if (!el) return false;
                    if (el.checked !== desired) {{
                        el.click();
                        if (el.checked !== desired) {{
                            el.checked = desired;
                            el.dispatchEvent(new Event('change', {{ bubbles: true }}));
                        }}
                    }}
                    return el.checked === desired;
                }})({}, {})"#,
                serde_json::to_string(&selector).map_err(internal)?,
                desired,
            );
            if eval_json(&page, &script).await? != Value::Bool(true) {
                return Err(ToolError::not_found(format!(
                    "could not set checked state on '{selector}'"
                )));
            }
            relay.invalidate_after_mutation(page_id);
            Ok(json!({ "status": "checked", "selector": selector, "checked": desired }))
        })
        .await
    }

    #[tool(name = "browser.focus", description = "Focus an element.")]
    pub async fn focus(
        &self,
        Parameters(args): Parameters<TargetArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.relay.run_tool("browser.focus", async |relay| {
            let (page_id, page) = relay.ensure_page().await?;
            let (element, selector) =
                resolve_target(&relay, &page, page_id, args.element_id, args.selector.as_deref())
                    .await?;
            element.focus().await.map_err(internal)?;
            Ok(json!({ "status": "focused", "selector": selector }))
        })
        .await
    }

    #[tool(name = "browser.clear", description = "Clear an input's value.")]
    pub async fn clear(
        &self,
        Parameters(args): Parameters<TargetArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.relay.run_tool("browser.clear", async |relay| {
            let (page_id, page) = relay.ensure_page().await?;
            let (_element, selector) =
                resolve_target(&relay, &page, page_id, args.element_id, args.selector.as_deref())
                    .await?;
            if !set_value_js(&page, &selector, "").await? {
                return Err(ToolError::not_found(format!(
                    "no element found for selector '{selector}'"
                )));
            }
            relay.invalidate_after_mutation(page_id);
            Ok(json!({ "status": "cleared", "selector": selector }))
        })
        .await
    }

    #[tool(name = "browser.scroll", description = "Scroll the page by direction or explicit deltas.")]
    pub async fn scroll(
        &self,
        Parameters(args): Parameters<ScrollArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.relay.run_tool("browser.scroll", async |relay| {
            let (page_id, page) = relay.ensure_page().await?;
            let (dx, dy) = match (args.dx, args.dy) {
                (None, None) => {
                    let amount = args.amount.unwrap_or(600);
                    match args.direction.as_deref().unwrap_or("down") {
                        "up" => (0, -amount),
                        "down" => (0, amount),
                        "left" => (-amount, 0),
                        "right" => (amount, 0),
                        other => {
                            return Err(ToolError::not_found(format!(
                                "unknown scroll direction '{other}'"
                            )));
                        }
                    }
                }
                (dx, dy) => (dx.unwrap_or(0), dy.unwrap_or(0)),
            };
            eval_json(&page, &format!("window.scrollBy({dx}, {dy})")).await?;
            relay.invalidate_after_mutation(page_id);
            Ok(json!({ "status": "scrolled", "dx": dx, "dy": dy }))
        })
        .await
    }

    #[tool(name = "browser.scroll_to", description = "Scroll an element into view.")]
    pub async fn scroll_to(
        &self,
        Parameters(args): Parameters<TargetArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.relay.run_tool("browser.scroll_to", async |relay| {
            let (page_id, page) = relay.ensure_page().await?;
            let (element, selector) =
                resolve_target(&relay, &page, page_id, args.element_id, args.selector.as_deref())
                    .await?;
            element.scroll_into_view().await.map_err(internal)?;
            relay.invalidate_after_mutation(page_id);
            Ok(json!({ "status": "scrolled", "selector": selector }))
        })
        .await
    }

    #[tool(name = "browser.get_attribute", description = "Read an attribute from an element.")]
    pub async fn get_attribute(
        &self,
        Parameters(args): Parameters<GetAttributeArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.relay.run_tool("browser.get_attribute", async |relay| {
            let (page_id, page) = relay.ensure_page().await?;
            let (element, selector) =
                resolve_target(&relay, &page, page_id, args.element_id, args.selector.as_deref())
                    .await?;
            let value = element.attribute(&args.name).await.map_err(internal)?;
            Ok(json!({ "selector": selector, "name": args.name, "value": value }))
        })
        .await
    }

    #[tool(name = "browser.get_text", description = "Read an element's rendered text.")]
    pub async fn get_text(
        &self,
        Parameters(args): Parameters<TargetArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.relay.run_tool("browser.get_text", async |relay| {
            let (page_id, page) = relay.ensure_page().await?;
            let (element, selector) =
                resolve_target(&relay, &page, page_id, args.element_id, args.selector.as_deref())
                    .await?;
            let text = element.inner_text().await.map_err(internal)?.unwrap_or_default();
            Ok(json!({ "selector": selector, "text": text }))
        })
        .await
    }

    #[tool(name = "browser.get_value", description = "Read a form control's current value.")]
    pub async fn get_value(
        &self,
        Parameters(args): Parameters<TargetArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.relay.run_tool("browser.get_value", async |relay| {
            let (page_id, page) = relay.ensure_page().await?;
            let (_element, selector) =
                resolve_target(&relay, &page, page_id, args.element_id, args.selector.as_deref())
                    .await?;
            let script = format!(
                "(sel => {{ const el = document.querySelector(sel); return el ? (el.isContentEditable ? el.innerText : el.value ?? null) : null; }})({})",
                serde_json::to_string(&selector).map_err(internal)?
            );
            let value = eval_json(&page, &script).await?;
            Ok(json!({ "selector": selector, "value": value }))
        })
        .await
    }
}
