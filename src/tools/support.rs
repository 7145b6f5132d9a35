//! Shared helpers for tool handlers: in-page scripts and CDP node
//! operations used by both selector- and uid-addressed interactions.

use chromiumoxide::cdp::browser_protocol::dom::{
    BackendNodeId, FocusParams, GetBoxModelParams, ScrollIntoViewIfNeededParams,
};
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchKeyEventParams, DispatchKeyEventType, DispatchMouseEventParams,
    DispatchMouseEventType, InsertTextParams, MouseButton,
};
use chromiumoxide::page::Page;
use serde_json::Value;

use crate::envelope::error::ToolError;

/// Truncate to a character budget, marking the cut.
pub fn clip_chars(s: &str, cap: usize) -> String {
    if s.chars().count() <= cap {
        return s.to_string();
    }
    let mut out: String = s.chars().take(cap.saturating_sub(1)).collect();
    out.push('\u{2026}');
    out
}

pub fn internal(e: impl std::fmt::Display) -> ToolError {
    ToolError::Internal(anyhow::anyhow!("{e}"))
}

/// Evaluate a script and deserialize its JSON result.
pub async fn eval_json(page: &Page, script: &str) -> Result<Value, ToolError> {
    let result = page.evaluate(script).await.map_err(internal)?;
    Ok(result.value().cloned().unwrap_or(Value::Null))
}

// --------------------------------------------------------------- node ops

/// Scroll a backend node into view and return its content-box center.
pub async fn node_center(page: &Page, node: BackendNodeId) -> Result<(f64, f64), ToolError> {
    page.execute(ScrollIntoViewIfNeededParams::builder().backend_node_id(node).build())
        .await
        .map_err(internal)?;

    let box_model = page
        .execute(GetBoxModelParams::builder().backend_node_id(node).build())
        .await
        .map_err(internal)?;

    let content = box_model.result.model.content.inner();
    if content.len() < 8 {
        return Err(ToolError::not_found("node has no usable bounding box"));
    }
    let x = (content[0] + content[2] + content[4] + content[6]) / 4.0;
    let y = (content[1] + content[3] + content[5] + content[7]) / 4.0;
    Ok((x, y))
}

pub async fn click_at(page: &Page, x: f64, y: f64) -> Result<(), ToolError> {
    let press = DispatchMouseEventParams::builder()
        .r#type(DispatchMouseEventType::MousePressed)
        .x(x)
        .y(y)
        .button(MouseButton::Left)
        .click_count(1)
        .build()
        .map_err(internal)?;
    page.execute(press).await.map_err(internal)?;

    let release = DispatchMouseEventParams::builder()
        .r#type(DispatchMouseEventType::MouseReleased)
        .x(x)
        .y(y)
        .button(MouseButton::Left)
        .click_count(1)
        .build()
        .map_err(internal)?;
    page.execute(release).await.map_err(internal)?;
    Ok(())
}

pub async fn hover_at(page: &Page, x: f64, y: f64) -> Result<(), ToolError> {
    let moved = DispatchMouseEventParams::builder()
        .r#type(DispatchMouseEventType::MouseMoved)
        .x(x)
        .y(y)
        .build()
        .map_err(internal)?;
    page.execute(moved).await.map_err(internal)?;
    Ok(())
}

pub async fn click_node(page: &Page, node: BackendNodeId) -> Result<(), ToolError> {
    let (x, y) = node_center(page, node).await?;
    click_at(page, x, y).await
}

pub async fn hover_node(page: &Page, node: BackendNodeId) -> Result<(), ToolError> {
    let (x, y) = node_center(page, node).await?;
    hover_at(page, x, y).await
}

/// Focus a backend node, clear its current value, and type `text`.
pub async fn fill_node(page: &Page, node: BackendNodeId, text: &str) -> Result<(), ToolError> {
    page.execute(FocusParams::builder().backend_node_id(node).build())
        .await
        .map_err(internal)?;
    select_all(page).await?;
    page.execute(InsertTextParams::new(text)).await.map_err(internal)?;
    Ok(())
}

async fn select_all(page: &Page) -> Result<(), ToolError> {
    let down = DispatchKeyEventParams::builder()
        .r#type(DispatchKeyEventType::KeyDown)
        .key("a".to_string())
        .code("KeyA".to_string())
        .modifiers(2) // ctrl
        .build()
        .map_err(internal)?;
    page.execute(down).await.map_err(internal)?;
    let up = DispatchKeyEventParams::builder()
        .r#type(DispatchKeyEventType::KeyUp)
        .key("a".to_string())
        .code("KeyA".to_string())
        .modifiers(2)
        .build()
        .map_err(internal)?;
    page.execute(up).await.map_err(internal)?;
    Ok(())
}

/// Named-key table: key -> (code, windows virtual key, char payload).
fn key_info(key: &str) -> Option<(&'static str, i64, Option<&'static str>)> {
    Some(match key {
        "Enter" => ("Enter", 13, Some("\r")),
        "Tab" => ("Tab", 9, None),
        "Escape" => ("Escape", 27, None),
        "Backspace" => ("Backspace", 8, None),
        "Delete" => ("Delete", 46, None),
        "ArrowLeft" => ("ArrowLeft", 37, None),
        "ArrowUp" => ("ArrowUp", 38, None),
        "ArrowRight" => ("ArrowRight", 39, None),
        "ArrowDown" => ("ArrowDown", 40, None),
        "Home" => ("Home", 36, None),
        "End" => ("End", 35, None),
        "PageUp" => ("PageUp", 33, None),
        "PageDown" => ("PageDown", 34, None),
        " " | "Space" => ("Space", 32, Some(" ")),
        _ => return None,
    })
}

/// Dispatch a full key press. Named keys use down/char/up events; anything
/// else is typed as raw text.
pub async fn press_key(page: &Page, key: &str) -> Result<(), ToolError> {
    let Some((code, vk, text)) = key_info(key) else {
        page.execute(InsertTextParams::new(key)).await.map_err(internal)?;
        return Ok(());
    };

    let down = DispatchKeyEventParams::builder()
        .r#type(DispatchKeyEventType::RawKeyDown)
        .key(key.to_string())
        .code(code.to_string())
        .windows_virtual_key_code(vk)
        .native_virtual_key_code(vk)
        .build()
        .map_err(internal)?;
    page.execute(down).await.map_err(internal)?;

    if let Some(text) = text {
        let ch = DispatchKeyEventParams::builder()
            .r#type(DispatchKeyEventType::Char)
            .key(key.to_string())
            .code(code.to_string())
            .text(text.to_string())
            .build()
            .map_err(internal)?;
        page.execute(ch).await.map_err(internal)?;
    }

    let up = DispatchKeyEventParams::builder()
        .r#type(DispatchKeyEventType::KeyUp)
        .key(key.to_string())
        .code(code.to_string())
        .windows_virtual_key_code(vk)
        .native_virtual_key_code(vk)
        .build()
        .map_err(internal)?;
    page.execute(up).await.map_err(internal)?;
    Ok(())
}

// ------------------------------------------------------------- page scripts

/// Collect interactive (or all) elements with stable selector plans.
/// Options: interactiveOnly, visibleOnly, viewportOnly, maxItems.
pub const LIST_ELEMENTS_JS: &str = r#"
(opts) => {
  const interactiveSel = 'a[href], button, input, select, textarea, summary, ' +
    '[role="button"], [role="link"], [role="checkbox"], [role="radio"], ' +
    '[role="tab"], [role="menuitem"], [role="combobox"], [onclick], [contenteditable="true"]';
  const nodes = Array.from(document.querySelectorAll(opts.interactiveOnly ? interactiveSel : '*'));

  const cssEscape = (s) => (window.CSS && CSS.escape) ? CSS.escape(s) : s.replace(/[^a-zA-Z0-9_-]/g, '\\$&');
  const selectorFor = (el) => {
    if (el.id) return '#' + cssEscape(el.id);
    const parts = [];
    let cur = el;
    while (cur && cur.nodeType === 1 && parts.length < 6) {
      let part = cur.tagName.toLowerCase();
      if (cur.id) { parts.unshift('#' + cssEscape(cur.id)); break; }
      const parent = cur.parentElement;
      if (parent) {
        const siblings = Array.from(parent.children).filter(c => c.tagName === cur.tagName);
        if (siblings.length > 1) part += `:nth-of-type(${siblings.indexOf(cur) + 1})`;
      }
      parts.unshift(part);
      cur = parent;
    }
    return parts.join(' > ');
  };

  const vh = window.innerHeight, vw = window.innerWidth;
  const out = [];
  for (const el of nodes) {
    if (out.length >= opts.maxItems) break;
    const rect = el.getBoundingClientRect();
    const style = window.getComputedStyle(el);
    const visible = rect.width > 0 && rect.height > 0 &&
      style.visibility !== 'hidden' && style.display !== 'none';
    if (opts.visibleOnly && !visible) continue;
    const inViewport = rect.bottom > 0 && rect.top < vh && rect.right > 0 && rect.left < vw;
    if (opts.viewportOnly && !inViewport) continue;
    out.push({
      selector: selectorFor(el),
      tag: el.tagName.toLowerCase(),
      type: el.getAttribute('type'),
      role: el.getAttribute('role'),
      text: (el.innerText || el.value || '').trim().slice(0, 300),
      href: el.getAttribute('href'),
      ariaLabel: el.getAttribute('aria-label'),
      visible,
      inViewport,
      bbox: { x: Math.round(rect.x), y: Math.round(rect.y),
              width: Math.round(rect.width), height: Math.round(rect.height) },
    });
  }
  return out;
}
"#;

/// Page digest: text, headings, links, and a forms summary.
pub const SNAPSHOT_JS: &str = r#"
(opts) => {
  const text = (document.body ? document.body.innerText : '') || '';
  const headings = opts.includeHeadings
    ? Array.from(document.querySelectorAll('h1,h2,h3,h4')).slice(0, 60).map(h => ({
        level: Number(h.tagName[1]),
        text: (h.innerText || '').trim().slice(0, 200),
      }))
    : [];
  const links = Array.from(document.querySelectorAll('a[href]')).slice(0, opts.maxLinks).map(a => ({
    text: (a.innerText || '').trim().slice(0, 120),
    href: a.href,
  }));
  const forms = opts.includeFormsSummary
    ? Array.from(document.forms).slice(0, 20).map(f => ({
        name: f.getAttribute('name') || f.getAttribute('id') || null,
        action: f.getAttribute('action'),
        method: (f.getAttribute('method') || 'get').toLowerCase(),
        fields: f.elements.length,
      }))
    : [];
  return { text, headings, links, forms };
}
"#;

/// Substring search over the page text with surrounding context.
pub const FIND_TEXT_JS: &str = r#"
(opts) => {
  const body = (document.body ? document.body.innerText : '') || '';
  const haystack = opts.caseSensitive ? body : body.toLowerCase();
  const needle = opts.caseSensitive ? opts.query : opts.query.toLowerCase();
  const matches = [];
  let from = 0;
  while (matches.length < opts.maxMatches) {
    const at = haystack.indexOf(needle, from);
    if (at === -1) break;
    const start = Math.max(0, at - opts.contextChars);
    const end = Math.min(body.length, at + needle.length + opts.contextChars);
    matches.push({ offset: at, context: body.slice(start, end) });
    from = at + needle.length;
  }
  let total = 0;
  let scan = 0;
  while (true) {
    const at = haystack.indexOf(needle, scan);
    if (at === -1) break;
    total += 1;
    scan = at + needle.length;
  }
  return { totalMatches: total, matches };
}
"#;

/// Generic form audit: controls grouped by form with label/type/value.
pub const FORMS_AUDIT_JS: &str = r#"
(opts) => {
  const labelFor = (el) => {
    if (el.labels && el.labels.length) return (el.labels[0].innerText || '').trim();
    if (el.getAttribute('aria-label')) return el.getAttribute('aria-label');
    const id = el.getAttribute('id');
    if (id) {
      const lab = document.querySelector(`label[for="${id}"]`);
      if (lab) return (lab.innerText || '').trim();
    }
    return el.getAttribute('placeholder') || el.getAttribute('name') || '';
  };
  const forms = Array.from(document.forms).map((f, formIndex) => ({
    formIndex,
    name: f.getAttribute('name') || f.getAttribute('id') || null,
    action: f.getAttribute('action'),
    fields: Array.from(f.elements)
      .filter(el => el.tagName !== 'FIELDSET' && el.type !== 'hidden')
      .slice(0, opts.maxQuestions)
      .map(el => ({
        label: labelFor(el).slice(0, 160),
        name: el.getAttribute('name'),
        tag: el.tagName.toLowerCase(),
        type: el.type || null,
        required: !!el.required,
        value: el.type === 'password' ? (el.value ? '***' : '') : String(el.value || '').slice(0, 200),
        checked: (el.type === 'checkbox' || el.type === 'radio') ? el.checked : undefined,
        options: el.tagName === 'SELECT'
          ? Array.from(el.options).slice(0, 40).map(o => o.text.slice(0, opts.maxOptionChars))
          : undefined,
      })),
  }));
  return { forms };
}
"#;

/// Per-origin web storage dump for storage-state export.
pub const STORAGE_DUMP_JS: &str = r#"
(() => {
  const dump = (store) => {
    const out = [];
    for (let i = 0; i < store.length; i++) {
      const name = store.key(i);
      out.push({ name, value: store.getItem(name) });
    }
    return out;
  };
  return {
    origin: location.origin,
    localStorage: dump(window.localStorage),
    sessionStorage: dump(window.sessionStorage),
  };
})()
"#;

/// Wrap a parameterized page function with its JSON options literal.
pub fn script_with_options(script: &str, options: &Value) -> String {
    format!("({script})({options})")
}
