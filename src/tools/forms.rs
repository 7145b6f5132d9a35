//! Form tools: a generic audit/fill pair and a Google Forms variant that
//! understands the listitem/heading structure Google renders.

use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::CallToolResult;
use rmcp::{ErrorData as McpError, schemars, tool, tool_router};
use serde::Deserialize;
use serde_json::{Map, Value, json};

use super::RelayServer;
use super::support::{FORMS_AUDIT_JS, eval_json, internal, script_with_options};
use crate::capture::{Detail, opt_usize};
use crate::envelope::error::ToolError;

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AuditArgs {
    #[serde(default)]
    pub detail: Option<Detail>,
    #[serde(default)]
    pub max_questions: Option<u64>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FillField {
    /// CSS selector of the control.
    #[serde(default)]
    pub selector: Option<String>,
    /// Visible label text, used when no selector is given.
    #[serde(default)]
    pub label: Option<String>,
    /// Value to set; for checkboxes use "true"/"false".
    pub value: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FillArgs {
    /// Fields to fill, in order.
    pub fields: Vec<FillField>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GoogleAnswer {
    /// Question index from forms.google_audit.
    pub index: u32,
    /// Answer for text, paragraph, and radio questions.
    #[serde(default)]
    pub value: Option<String>,
    /// Answers for checkbox questions.
    #[serde(default)]
    pub values: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GoogleFillArgs {
    pub answers: Vec<GoogleAnswer>,
}

const GENERIC_FILL_JS: &str = r#"
(fields) => {
  const findByLabel = (label) => {
    for (const lab of document.querySelectorAll('label')) {
      if ((lab.innerText || '').trim() === label) {
        if (lab.htmlFor) return document.getElementById(lab.htmlFor);
        const inner = lab.querySelector('input, textarea, select');
        if (inner) return inner;
      }
    }
    for (const el of document.querySelectorAll('input, textarea, select')) {
      if (el.getAttribute('aria-label') === label) return el;
      if (el.getAttribute('placeholder') === label) return el;
      if (el.getAttribute('name') === label) return el;
    }
    return null;
  };
  const results = [];
  for (const field of fields) {
    const el = field.selector ? document.querySelector(field.selector) : findByLabel(field.label);
    if (!el) { results.push({ field: field.selector || field.label, status: 'not-found' }); continue; }
    if (el.type === 'checkbox' || el.type === 'radio') {
      const want = field.value === 'true' || field.value === el.value;
      if (el.checked !== want) el.click();
      results.push({ field: field.selector || field.label, status: 'set' });
    } else if (el.tagName === 'SELECT') {
      const opt = Array.from(el.options).find(o => o.value === field.value || o.text.trim() === field.value);
      if (!opt) { results.push({ field: field.selector || field.label, status: 'no-option' }); continue; }
      el.value = opt.value;
      el.dispatchEvent(new Event('change', { bubbles: true }));
      results.push({ field: field.selector || field.label, status: 'set' });
    } else {
      el.focus();
      el.value = field.value;
      el.dispatchEvent(new Event('input', { bubbles: true }));
      el.dispatchEvent(new Event('change', { bubbles: true }));
      results.push({ field: field.selector || field.label, status: 'set' });
    }
  }
  return { results };
}
"#;

const GOOGLE_AUDIT_JS: &str = r#"
(opts) => {
  const items = Array.from(document.querySelectorAll('div[role="listitem"]'));
  const questions = [];
  for (const item of items) {
    if (questions.length >= opts.maxQuestions) break;
    const heading = item.querySelector('[role="heading"]');
    if (!heading) continue;
    const rawTitle = (heading.innerText || '').trim();
    const required = /\*\s*$/.test(rawTitle);
    const radios = Array.from(item.querySelectorAll('[role="radio"]'));
    const checks = Array.from(item.querySelectorAll('[role="checkbox"]'));
    const listbox = item.querySelector('[role="listbox"]');
    const textarea = item.querySelector('textarea');
    const textInput = item.querySelector(
      'input[type="text"], input[type="email"], input[type="url"], input[type="number"], input[type="date"]');

    let type = 'unknown', options = [], value = null;
    if (radios.length) {
      type = 'radio';
      options = radios.map(r => r.getAttribute('aria-label') || r.getAttribute('data-value') || '');
      const picked = radios.find(r => r.getAttribute('aria-checked') === 'true');
      value = picked ? (picked.getAttribute('aria-label') || picked.getAttribute('data-value')) : null;
    } else if (checks.length) {
      type = 'checkbox';
      options = checks.map(c => c.getAttribute('aria-label') || '');
      value = checks.filter(c => c.getAttribute('aria-checked') === 'true')
        .map(c => c.getAttribute('aria-label'));
    } else if (listbox) {
      type = 'dropdown';
      options = Array.from(item.querySelectorAll('[role="option"]')).map(o => (o.innerText || '').trim());
      value = (listbox.innerText || '').trim() || null;
    } else if (textarea) {
      type = 'paragraph';
      value = textarea.value || null;
    } else if (textInput) {
      type = 'text';
      value = textInput.value || null;
    }
    questions.push({
      index: questions.length,
      title: rawTitle.replace(/\*\s*$/, '').trim().slice(0, 300),
      required, type, value,
      options: options.slice(0, 30).map(o => String(o).slice(0, opts.maxOptionChars)),
    });
  }
  return { questions };
}
"#;

const GOOGLE_FILL_JS: &str = r#"
(answers) => {
  const items = Array.from(document.querySelectorAll('div[role="listitem"]'))
    .filter(item => item.querySelector('[role="heading"]'));
  const results = [];
  for (const answer of answers) {
    const item = items[answer.index];
    if (!item) { results.push({ index: answer.index, status: 'no-question' }); continue; }
    const radios = Array.from(item.querySelectorAll('[role="radio"]'));
    const checks = Array.from(item.querySelectorAll('[role="checkbox"]'));
    const textarea = item.querySelector('textarea');
    const textInput = item.querySelector(
      'input[type="text"], input[type="email"], input[type="url"], input[type="number"], input[type="date"]');

    const setText = (el, value) => {
      el.focus();
      el.value = value;
      el.dispatchEvent(new Event('input', { bubbles: true }));
      el.dispatchEvent(new Event('change', { bubbles: true }));
      el.blur();
    };
    const matches = (el, wanted) => {
      const label = el.getAttribute('aria-label') || el.getAttribute('data-value') || '';
      return label.trim() === wanted.trim();
    };

    if (radios.length && answer.value != null) {
      const target = radios.find(r => matches(r, answer.value));
      if (!target) { results.push({ index: answer.index, status: 'no-option' }); continue; }
      target.click();
      results.push({ index: answer.index, status: 'set' });
    } else if (checks.length && (answer.values || answer.value != null)) {
      const wanted = answer.values || [answer.value];
      let hit = 0;
      for (const want of wanted) {
        const target = checks.find(c => matches(c, want));
        if (target && target.getAttribute('aria-checked') !== 'true') { target.click(); hit++; }
        else if (target) { hit++; }
      }
      results.push({ index: answer.index, status: hit === wanted.length ? 'set' : 'partial' });
    } else if (textarea && answer.value != null) {
      setText(textarea, answer.value);
      results.push({ index: answer.index, status: 'set' });
    } else if (textInput && answer.value != null) {
      setText(textInput, answer.value);
      results.push({ index: answer.index, status: 'set' });
    } else {
      results.push({ index: answer.index, status: 'unsupported' });
    }
  }
  return { results };
}
"#;

const GOOGLE_SUBMIT_JS: &str = r#"
(() => {
  const buttons = Array.from(document.querySelectorAll('[role="button"]'));
  const submit = buttons.find(b => /^(submit|send)$/i.test((b.innerText || '').trim()))
    || buttons.find(b => /submit/i.test(b.getAttribute('aria-label') || ''));
  if (!submit) return { clicked: false };
  submit.click();
  return { clicked: true };
})()
"#;

#[tool_router(router = forms_router, vis = "pub(crate)")]
impl RelayServer {
    #[tool(
        name = "forms.audit",
        description = "Enumerate form controls on the page with labels, types, required flags, and current values."
    )]
    pub async fn forms_audit(
        &self,
        Parameters(args): Parameters<AuditArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.relay.run_tool("forms.audit", async |relay| {
            let detail = args.detail.unwrap_or_default();
            let mut overrides = Map::new();
            if let Some(v) = args.max_questions {
                overrides.insert("maxQuestions".into(), json!(v));
            }
            let options = relay.options("forms.audit", detail, &overrides);

            let (_page_id, page) = relay.ensure_page().await?;
            let script_opts = json!({
                "maxQuestions": opt_usize(&options, "maxQuestions", 40),
                "maxOptionChars": opt_usize(&options, "maxOptionChars", 60),
            });
            let raw = eval_json(&page, &script_with_options(FORMS_AUDIT_JS, &script_opts)).await?;
            Ok(json!({ "detail": detail.as_str(), "forms": raw["forms"] }))
        })
        .await
    }

    #[tool(
        name = "forms.fill",
        description = "Fill multiple form controls by selector or visible label, firing input/change events."
    )]
    pub async fn forms_fill(
        &self,
        Parameters(args): Parameters<FillArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.relay.run_tool("forms.fill", async |relay| {
            if args.fields.is_empty() {
                return Err(ToolError::not_found("fields must not be empty"));
            }
            let (page_id, page) = relay.ensure_page().await?;
            let fields = serde_json::to_value(
                args.fields
                    .iter()
                    .map(|f| json!({ "selector": f.selector, "label": f.label, "value": f.value }))
                    .collect::<Vec<_>>(),
            )
            .map_err(internal)?;
            let raw = eval_json(&page, &script_with_options(GENERIC_FILL_JS, &fields)).await?;
            relay.invalidate_after_mutation(page_id);
            Ok(json!({ "results": raw["results"] }))
        })
        .await
    }

    #[tool(
        name = "forms.google_audit",
        description = "Enumerate Google Forms questions: title, type, required flag, options, and current answer."
    )]
    pub async fn forms_google_audit(
        &self,
        Parameters(args): Parameters<AuditArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.relay.run_tool("forms.google_audit", async |relay| {
            let detail = args.detail.unwrap_or_default();
            let mut overrides = Map::new();
            if let Some(v) = args.max_questions {
                overrides.insert("maxQuestions".into(), json!(v));
            }
            let options = relay.options("forms.google_audit", detail, &overrides);

            let (_page_id, page) = relay.ensure_page().await?;
            let script_opts = json!({
                "maxQuestions": opt_usize(&options, "maxQuestions", 40),
                "maxOptionChars": opt_usize(&options, "maxOptionChars", 60),
            });
            let raw = eval_json(&page, &script_with_options(GOOGLE_AUDIT_JS, &script_opts)).await?;
            let count = raw["questions"].as_array().map(|q| q.len()).unwrap_or(0);
            Ok(json!({
                "detail": detail.as_str(),
                "count": count,
                "questions": raw["questions"],
            }))
        })
        .await
    }

    #[tool(
        name = "forms.google_fill",
        description = "Answer Google Forms questions by index: radio/checkbox options by label, text and paragraph fields by value."
    )]
    pub async fn forms_google_fill(
        &self,
        Parameters(args): Parameters<GoogleFillArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.relay.run_tool("forms.google_fill", async |relay| {
            if args.answers.is_empty() {
                return Err(ToolError::not_found("answers must not be empty"));
            }
            let (page_id, page) = relay.ensure_page().await?;
            let answers = serde_json::to_value(
                args.answers
                    .iter()
                    .map(|a| json!({ "index": a.index, "value": a.value, "values": a.values }))
                    .collect::<Vec<_>>(),
            )
            .map_err(internal)?;
            let raw = eval_json(&page, &script_with_options(GOOGLE_FILL_JS, &answers)).await?;
            relay.invalidate_after_mutation(page_id);

            let results = raw["results"].as_array().cloned().unwrap_or_default();
            let set = results
                .iter()
                .filter(|r| r["status"].as_str() == Some("set"))
                .count();
            Ok(json!({
                "answered": set,
                "requested": results.len(),
                "results": results,
            }))
        })
        .await
    }

    #[tool(
        name = "forms.google_submit",
        description = "Click the Google Forms submit button and report whether the confirmation page appeared."
    )]
    pub async fn forms_google_submit(&self) -> Result<CallToolResult, McpError> {
        self.relay.run_tool("forms.google_submit", async |relay| {
            let (page_id, page) = relay.ensure_page().await?;
            let raw = eval_json(&page, GOOGLE_SUBMIT_JS).await?;
            if raw["clicked"] != Value::Bool(true) {
                return Err(ToolError::not_found("no submit button found on this page"));
            }
            relay.invalidate_after_mutation(page_id);
            let _ = page.wait_for_navigation().await;

            let confirmed = eval_json(
                &page,
                "(document.body ? document.body.innerText : '').includes('recorded')",
            )
            .await
            .map(|v| v == Value::Bool(true))
            .unwrap_or(false);
            Ok(json!({ "status": "submitted", "confirmationDetected": confirmed }))
        })
        .await
    }
}
