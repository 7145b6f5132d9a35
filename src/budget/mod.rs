//! Payload budget reducer
//!
//! Guarantees that no serialized response exceeds a configured byte ceiling.
//! `reduce` is a pure function over `(payload, max_bytes)`: identical inputs
//! produce identical outputs, and applying it to its own output is a no-op
//! (the reduced envelope already fits, so the fast path returns it
//! unchanged).
//!
//! Reduction stages, applied in order until the envelope fits:
//! 1. per-key typed caps (string caps, per-key array limits, 40-key objects)
//! 2. up to six passes shrinking the currently-largest non-envelope key
//! 3. minimal fallback keeping the envelope plus a small passthrough set
//! 4. hard-guarantee loop dropping metadata until only `{truncated:true}`
//!    remains

use serde_json::{Map, Value, json};

/// Reserved envelope keys that reduction never rewrites.
pub const ENVELOPE_KEYS: &[&str] = &[
    "ok",
    "requestId",
    "timestamp",
    "pageId",
    "url",
    "title",
    "domVersion",
    "activeFrameId",
    "error",
    "truncated",
    "truncationReason",
    "maxPayloadBytes",
    "originalBytes",
    "retryWith",
];

/// Small payload keys preserved by the minimal fallback stage. Cheap to keep
/// and enough for a caller to re-orient after an aggressive truncation.
const FALLBACK_PASSTHROUGH: &[&str] = &[
    "status",
    "eventType",
    "selector",
    "count",
    "returned",
    "totalMatches",
    "elementId",
    "uid",
    "dialogId",
    "downloadId",
    "popupId",
    "frameId",
    "pageIds",
];

const TRUNCATION_REASON: &str = "response_payload_budget_exceeded";

const HTML_STRING_CAP: usize = 2_500;
const DEFAULT_STRING_CAP: usize = 3_000;
const OBJECT_KEY_CAP: usize = 40;
const OBJECT_KEY_CAP_TIGHT: usize = 20;
const ARRAY_FLOOR: usize = 10;
const MAX_SHRINK_PASSES: usize = 6;

fn array_cap_for(key: &str) -> usize {
    match key {
        "items" | "nodes" => 120,
        "links" | "requests" | "messages" | "dialogs" => 60,
        "questions" | "results" | "texts" => 80,
        _ => 80,
    }
}

fn json_bytes(value: &Value) -> usize {
    serde_json::to_string(value).map(|s| s.len()).unwrap_or(0)
}

fn is_envelope_key(key: &str) -> bool {
    ENVELOPE_KEYS.contains(&key)
}

/// Parameter suggestions attached alongside truncation metadata so the
/// caller's immediate retry lands under the ceiling.
pub fn retry_hint() -> Value {
    json!({
        "detail": "low",
        "fullPage": false,
        "maxItems": 80,
        "limit": 20,
        "includeText": false,
        "includeBBox": false,
    })
}

/// Truncate a string to `cap` characters, marking the cut with a trailing
/// ellipsis. The marker counts against the cap so re-truncation of an
/// already-truncated string is a no-op.
fn truncate_string(s: &str, cap: usize) -> String {
    if s.chars().count() <= cap {
        return s.to_string();
    }
    let keep = cap.saturating_sub(1);
    let mut out: String = s.chars().take(keep).collect();
    out.push('\u{2026}');
    out
}

fn reduce_value_typed(key: &str, value: &Value) -> Value {
    match value {
        Value::String(s) => {
            let cap = if key == "html" { HTML_STRING_CAP } else { DEFAULT_STRING_CAP };
            Value::String(truncate_string(s, cap))
        }
        Value::Array(items) => {
            let cap = array_cap_for(key);
            if items.len() > cap {
                Value::Array(items[..cap].to_vec())
            } else {
                value.clone()
            }
        }
        Value::Object(map) => {
            if map.len() > OBJECT_KEY_CAP {
                Value::Object(map.iter().take(OBJECT_KEY_CAP).map(|(k, v)| (k.clone(), v.clone())).collect())
            } else {
                value.clone()
            }
        }
        _ => value.clone(),
    }
}

fn shrink_value(key: &str, value: &Value) -> Value {
    match value {
        Value::String(s) => {
            let len = s.chars().count();
            Value::String(truncate_string(s, (len / 2).max(1)))
        }
        Value::Array(items) => {
            let keep = (items.len() / 2).max(ARRAY_FLOOR.min(items.len()));
            Value::Array(items[..keep].to_vec())
        }
        Value::Object(map) => {
            if map.len() > OBJECT_KEY_CAP_TIGHT {
                Value::Object(
                    map.iter().take(OBJECT_KEY_CAP_TIGHT).map(|(k, v)| (k.clone(), v.clone())).collect(),
                )
            } else {
                let _ = key;
                value.clone()
            }
        }
        _ => value.clone(),
    }
}

/// Reduce `envelope` so that its UTF-8 JSON byte length is at most
/// `max_bytes`.
///
/// The input must be a response envelope object; non-object values degrade
/// straight to the minimal `{truncated:true}` form when oversized.
pub fn reduce(envelope: &Value, max_bytes: usize) -> Value {
    if json_bytes(envelope) <= max_bytes {
        return envelope.clone();
    }

    let original_bytes = json_bytes(envelope);
    let Some(source) = envelope.as_object() else {
        return json!({ "truncated": true });
    };

    let mut out: Map<String, Value> = source.clone();
    out.insert("truncated".into(), Value::Bool(true));
    out.insert("truncationReason".into(), Value::String(TRUNCATION_REASON.into()));
    out.insert("maxPayloadBytes".into(), json!(max_bytes));
    out.insert("originalBytes".into(), json!(original_bytes));
    out.insert("retryWith".into(), retry_hint());

    // Stage 1: typed per-key caps over non-envelope keys.
    let payload_keys: Vec<String> =
        out.keys().filter(|k| !is_envelope_key(k)).cloned().collect();
    for key in &payload_keys {
        if let Some(value) = out.get(key) {
            let reduced = reduce_value_typed(key, value);
            out.insert(key.clone(), reduced);
        }
    }
    if json_bytes(&Value::Object(out.clone())) <= max_bytes {
        return Value::Object(out);
    }

    // Stage 2: repeatedly halve the most expensive payload key.
    for _ in 0..MAX_SHRINK_PASSES {
        let mut costs: Vec<(String, usize)> = out
            .iter()
            .filter(|(k, _)| !is_envelope_key(k))
            .map(|(k, v)| (k.clone(), json_bytes(v)))
            .collect();
        costs.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        let Some((key, _)) = costs.first() else { break };
        if let Some(value) = out.get(key) {
            let shrunk = shrink_value(key, value);
            out.insert(key.clone(), shrunk);
        }
        if json_bytes(&Value::Object(out.clone())) <= max_bytes {
            return Value::Object(out);
        }
    }

    // Stage 3: minimal fallback. Envelope keys plus a small passthrough set.
    let mut minimal: Map<String, Value> = Map::new();
    for (key, value) in &out {
        if is_envelope_key(key) || FALLBACK_PASSTHROUGH.contains(&key.as_str()) {
            minimal.insert(key.clone(), value.clone());
        }
    }
    if json_bytes(&Value::Object(minimal.clone())) <= max_bytes {
        return Value::Object(minimal);
    }

    // Stage 4: hard guarantee. Drop metadata piecewise, then give up and
    // emit the bare truncation marker.
    minimal.remove("originalBytes");
    if json_bytes(&Value::Object(minimal.clone())) <= max_bytes {
        return Value::Object(minimal);
    }
    if let Some(Value::String(request_id)) = minimal.get("requestId").cloned() {
        let short: String = request_id.chars().take(12).collect();
        minimal.insert("requestId".into(), Value::String(short));
    }
    if json_bytes(&Value::Object(minimal.clone())) <= max_bytes {
        return Value::Object(minimal);
    }
    minimal.remove("ok");
    if json_bytes(&Value::Object(minimal.clone())) <= max_bytes {
        return Value::Object(minimal);
    }
    json!({ "truncated": true })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope_with(payload: Value) -> Value {
        let mut map = Map::new();
        map.insert("ok".into(), json!(true));
        map.insert("requestId".into(), json!("req-1700000000000-1"));
        map.insert("timestamp".into(), json!("2026-08-01T00:00:00Z"));
        map.insert("pageId".into(), json!(1));
        map.insert("url".into(), json!("https://example.com/"));
        map.insert("title".into(), json!("Example"));
        map.insert("domVersion".into(), json!("p1:main@1"));
        map.insert("activeFrameId".into(), json!("main"));
        if let Value::Object(extra) = payload {
            for (k, v) in extra {
                map.insert(k, v);
            }
        }
        Value::Object(map)
    }

    #[test]
    fn small_payload_passes_through_unchanged() {
        let env = envelope_with(json!({"text": "hello"}));
        assert_eq!(reduce(&env, 10_000), env);
    }

    #[test]
    fn oversized_payload_fits_and_carries_metadata() {
        let env = envelope_with(json!({"text": "x".repeat(50_000)}));
        let reduced = reduce(&env, 12_000);
        assert!(json_bytes(&reduced) <= 12_000);
        assert_eq!(reduced["truncated"], json!(true));
        assert_eq!(reduced["truncationReason"], json!(TRUNCATION_REASON));
        assert_eq!(reduced["maxPayloadBytes"], json!(12_000));
        assert!(reduced.get("retryWith").is_some());
        assert!(reduced["originalBytes"].as_u64().unwrap() > 12_000);
    }

    #[test]
    fn reducer_is_idempotent() {
        let env = envelope_with(json!({
            "items": (0..500).map(|i| json!({"n": i, "t": "t".repeat(40)})).collect::<Vec<_>>(),
            "html": "<div>".repeat(4_000),
        }));
        let once = reduce(&env, 8_000);
        let twice = reduce(&once, 8_000);
        assert_eq!(once, twice);
    }

    #[test]
    fn envelope_keys_survive_reduction() {
        let env = envelope_with(json!({"blob": "z".repeat(100_000)}));
        let reduced = reduce(&env, 4_000);
        assert_eq!(reduced["requestId"], json!("req-1700000000000-1"));
        assert_eq!(reduced["domVersion"], json!("p1:main@1"));
        assert_eq!(reduced["ok"], json!(true));
    }

    #[test]
    fn arrays_shrink_to_per_key_limits() {
        let big: Vec<Value> = (0..400).map(|i| json!(format!("link-{i}"))).collect();
        let env = envelope_with(json!({"links": big, "filler": "f".repeat(40_000)}));
        let reduced = reduce(&env, 10_000);
        let links = reduced["links"].as_array().unwrap();
        assert!(links.len() <= 60);
        // Order preserved from the front.
        assert_eq!(links[0], json!("link-0"));
    }

    #[test]
    fn tiny_budget_degrades_to_bare_marker() {
        let env = envelope_with(json!({"blob": "z".repeat(100_000)}));
        let reduced = reduce(&env, 24);
        assert_eq!(reduced, json!({"truncated": true}));
    }

    #[test]
    fn string_truncation_is_stable() {
        let s = "abcdefghij";
        let once = truncate_string(s, 5);
        assert_eq!(once.chars().count(), 5);
        assert_eq!(truncate_string(&once, 5), once);
    }
}
