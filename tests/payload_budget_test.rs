//! Payload reducer contract: every output fits the ceiling, reduction is
//! deterministic and idempotent, and the truncation metadata is attached.

use proptest::prelude::*;
use serde_json::{Map, Value, json};

use browser_relay::reduce;

fn envelope(payload: Value) -> Value {
    let mut map = Map::new();
    map.insert("ok".into(), json!(true));
    map.insert("requestId".into(), json!("req-1700000000000-42"));
    map.insert("timestamp".into(), json!("2026-08-01T12:00:00Z"));
    map.insert("pageId".into(), json!(3));
    map.insert("url".into(), json!("https://example.com/very/long/path"));
    map.insert("title".into(), json!("Example Domain"));
    map.insert("domVersion".into(), json!("p4:main@3"));
    map.insert("activeFrameId".into(), json!("main"));
    if let Value::Object(extra) = payload {
        for (k, v) in extra {
            map.insert(k, v);
        }
    }
    Value::Object(map)
}

fn byte_len(v: &Value) -> usize {
    serde_json::to_string(v).unwrap().len()
}

#[test]
fn fifty_k_text_snapshot_fits_twelve_k() {
    // Mirrors the envelope+truncation scenario: a page with 50k characters
    // of inner text reduced under a 12 kB ceiling.
    let env = envelope(json!({
        "detail": "low",
        "text": "lorem ipsum dolor sit amet ".repeat(2_000),
        "links": (0..120).map(|i| json!({"text": format!("link {i}"), "href": format!("https://example.com/{i}")})).collect::<Vec<_>>(),
    }));
    assert!(byte_len(&env) > 50_000);

    let reduced = reduce(&env, 12_000);
    assert!(byte_len(&reduced) <= 12_000);
    assert_eq!(reduced["ok"], json!(true));
    assert_eq!(reduced["detail"], json!("low"));
    assert_eq!(reduced["truncated"], json!(true));
    assert_eq!(reduced["truncationReason"], json!("response_payload_budget_exceeded"));
    assert!(reduced.get("retryWith").is_some());
    assert_eq!(reduced["retryWith"]["detail"], json!("low"));
}

#[test]
fn under_budget_envelope_is_returned_verbatim() {
    let env = envelope(json!({"count": 3, "items": ["a", "b", "c"]}));
    let reduced = reduce(&env, 280_000);
    assert_eq!(reduced, env);
    assert!(reduced.get("truncated").is_none());
}

#[test]
fn reduction_is_deterministic() {
    let env = envelope(json!({"html": "<p>hi</p>".repeat(10_000)}));
    assert_eq!(reduce(&env, 9_000), reduce(&env, 9_000));
}

#[test]
fn second_application_is_a_fixed_point() {
    let env = envelope(json!({
        "nodes": (0..800).map(|i| json!({"uid": format!("ax-{i}"), "name": "n".repeat(50)})).collect::<Vec<_>>(),
    }));
    let once = reduce(&env, 10_000);
    assert_eq!(reduce(&once, 10_000), once);
}

proptest! {
    #[test]
    fn arbitrary_string_payloads_fit_the_ceiling(
        text in ".{0,20000}",
        ceiling in 256usize..64_000,
    ) {
        let env = envelope(json!({"text": text, "extra": "padding".repeat(100)}));
        let reduced = reduce(&env, ceiling);
        prop_assert!(byte_len(&reduced) <= ceiling);
    }

    #[test]
    fn arbitrary_array_payloads_are_idempotent(
        items in proptest::collection::vec("[a-z]{0,200}", 0..300),
        ceiling in 512usize..32_768,
    ) {
        let env = envelope(json!({"items": items}));
        let once = reduce(&env, ceiling);
        let twice = reduce(&once, ceiling);
        prop_assert_eq!(once, twice);
    }
}
