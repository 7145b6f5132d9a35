//! Response envelope construction
//!
//! Every tool response is the same JSON object shape: the reserved envelope
//! keys built from live page context, the handler payload merged in beside
//! them, and (on failure) a normalized `error` object. Payload keys that
//! collide with reserved keys are renamed `payload<Key>` instead of being
//! dropped.

pub mod error;

use serde_json::{Map, Value, json};

use crate::budget::ENVELOPE_KEYS;
use error::{ErrorCode, ToolError};

/// Live page context captured after the handler ran; all fields degrade to
/// null when no page is active.
#[derive(Debug, Clone, Default)]
pub struct PageContext {
    pub page_id: Option<i64>,
    pub url: Option<String>,
    pub title: Option<String>,
    pub dom_version: Option<String>,
    pub active_frame_id: Option<String>,
}

/// Format a request id: `req-<unix_ms>-<seq>`.
pub fn request_id(unix_ms: i64, seq: u64) -> String {
    format!("req-{unix_ms}-{seq}")
}

fn rename_collision(key: &str) -> String {
    let mut chars = key.chars();
    match chars.next() {
        Some(first) => format!("payload{}{}", first.to_uppercase(), chars.as_str()),
        None => "payload".to_string(),
    }
}

/// Build the full response envelope.
///
/// `payload` must be an object for a success response; error responses
/// carry no payload.
pub fn build(
    ok: bool,
    request_id: &str,
    context: &PageContext,
    payload: Option<Map<String, Value>>,
    error: Option<(ErrorCode, String, Option<Value>)>,
) -> Value {
    let mut envelope = Map::new();
    envelope.insert("ok".into(), json!(ok));
    envelope.insert("requestId".into(), json!(request_id));
    envelope.insert("timestamp".into(), json!(chrono::Utc::now().to_rfc3339()));
    envelope.insert("pageId".into(), json!(context.page_id));
    envelope.insert("url".into(), json!(context.url));
    envelope.insert("title".into(), json!(context.title));
    envelope.insert("domVersion".into(), json!(context.dom_version));
    envelope.insert("activeFrameId".into(), json!(context.active_frame_id));

    if let Some((code, message, details)) = error {
        let mut body = Map::new();
        body.insert("code".into(), json!(code.as_str()));
        body.insert("message".into(), json!(message));
        if let Some(details) = details {
            body.insert("details".into(), details);
        }
        envelope.insert("error".into(), Value::Object(body));
    }

    if let Some(payload) = payload {
        for (key, value) in payload {
            if ENVELOPE_KEYS.contains(&key.as_str()) {
                envelope.insert(rename_collision(&key), value);
            } else {
                envelope.insert(key, value);
            }
        }
    }

    Value::Object(envelope)
}

/// Shape a `ToolError` into the `(code, message, details)` triple the
/// envelope carries. Stale references get a recovery hint in `details`.
pub fn error_parts(error: &ToolError) -> (ErrorCode, String, Option<Value>) {
    let code = error.code();
    let message = error.to_string();
    let details = match code {
        ErrorCode::StaleRef => Some(json!({
            "hint": "Re-capture references with browser.list or browser.take_snapshot, then retry."
        })),
        _ => None,
    };
    (code, message, details)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> PageContext {
        PageContext {
            page_id: Some(2),
            url: Some("https://example.com/".into()),
            title: Some("Example".into()),
            dom_version: Some("p3:main@2".into()),
            active_frame_id: Some("main".into()),
        }
    }

    #[test]
    fn success_envelope_has_all_reserved_keys() {
        let mut payload = Map::new();
        payload.insert("count".into(), json!(4));
        let env = build(true, "req-1-1", &context(), Some(payload), None);
        for key in ["ok", "requestId", "timestamp", "pageId", "url", "title", "domVersion", "activeFrameId"] {
            assert!(env.get(key).is_some(), "missing {key}");
        }
        assert_eq!(env["count"], json!(4));
        assert!(env.get("error").is_none());
    }

    #[test]
    fn colliding_payload_keys_are_renamed() {
        let mut payload = Map::new();
        payload.insert("url".into(), json!("payload-level-url"));
        payload.insert("title".into(), json!("payload-level-title"));
        let env = build(true, "req-1-2", &context(), Some(payload), None);
        assert_eq!(env["url"], json!("https://example.com/"));
        assert_eq!(env["payloadUrl"], json!("payload-level-url"));
        assert_eq!(env["payloadTitle"], json!("payload-level-title"));
    }

    #[test]
    fn error_envelope_carries_code_and_message() {
        let err = ToolError::stale_ref("elementId 3 is stale");
        let (code, message, details) = error_parts(&err);
        let env = build(false, "req-1-3", &PageContext::default(), None, Some((code, message, details)));
        assert_eq!(env["ok"], json!(false));
        assert_eq!(env["error"]["code"], json!("STALE_REF"));
        assert!(env["error"]["details"]["hint"].as_str().unwrap().contains("browser.list"));
        assert_eq!(env["pageId"], Value::Null);
    }

    #[test]
    fn request_id_format() {
        assert_eq!(request_id(1700000000123, 7), "req-1700000000123-7");
    }
}
