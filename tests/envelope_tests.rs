//! Envelope wire-contract tests: reserved keys, collision renaming, error
//! normalization, and domVersion well-formedness.

use regex::Regex;
use serde_json::{Map, Value, json};

use browser_relay::envelope::{PageContext, build, error_parts, request_id};
use browser_relay::{ErrorCode, ToolError};

fn context() -> PageContext {
    PageContext {
        page_id: Some(1),
        url: Some("https://example.com/".into()),
        title: Some("Example".into()),
        dom_version: Some("p2:main@2".into()),
        active_frame_id: Some("main".into()),
    }
}

#[test]
fn every_success_response_has_the_reserved_keys() {
    let mut payload = Map::new();
    payload.insert("items".into(), json!([1, 2, 3]));
    let env = build(true, "req-1-1", &context(), Some(payload), None);

    for key in ["ok", "requestId", "timestamp", "pageId", "url", "title", "domVersion", "activeFrameId"] {
        assert!(env.get(key).is_some(), "missing reserved key {key}");
    }
    assert_eq!(env["ok"], json!(true));
    assert!(env.get("error").is_none());
}

#[test]
fn dom_version_is_well_formed() {
    let re = Regex::new(r"^p\d+:(main|f\d+)@\d+$").unwrap();
    let env = build(true, "req-1-2", &context(), None, None);
    assert!(re.is_match(env["domVersion"].as_str().unwrap()));
}

#[test]
fn request_id_embeds_millis_and_sequence() {
    let id = request_id(1_753_999_999_999, 12);
    assert_eq!(id, "req-1753999999999-12");
    let re = Regex::new(r"^req-\d+-\d+$").unwrap();
    assert!(re.is_match(&id));
}

#[test]
fn payload_collisions_are_renamed_not_dropped() {
    let mut payload = Map::new();
    payload.insert("domVersion".into(), json!("payload-version"));
    payload.insert("ok".into(), json!("payload-ok"));
    payload.insert("plain".into(), json!(1));
    let env = build(true, "req-1-3", &context(), Some(payload), None);

    assert_eq!(env["domVersion"], json!("p2:main@2"));
    assert_eq!(env["payloadDomVersion"], json!("payload-version"));
    assert_eq!(env["ok"], json!(true));
    assert_eq!(env["payloadOk"], json!("payload-ok"));
    assert_eq!(env["plain"], json!(1));
}

#[test]
fn errors_are_normalized_with_closed_codes() {
    for (error, expected) in [
        (ToolError::timeout("x"), "TIMEOUT"),
        (ToolError::permission("x"), "PERMISSION"),
        (ToolError::stale_ref("x"), "STALE_REF"),
        (ToolError::navigation("x"), "NAVIGATION"),
        (ToolError::not_found("x"), "NOT_FOUND"),
        (ToolError::internal("x"), "INTERNAL"),
    ] {
        let (code, message, details) = error_parts(&error);
        let env = build(false, "req-1-4", &PageContext::default(), None, Some((code, message, details)));
        assert_eq!(env["ok"], json!(false));
        assert_eq!(env["error"]["code"], json!(expected));
        assert!(env["error"]["message"].is_string());
    }
}

#[test]
fn stale_ref_errors_carry_a_recovery_hint() {
    let (code, _message, details) = error_parts(&ToolError::stale_ref("elementId 4 is stale"));
    assert_eq!(code, ErrorCode::StaleRef);
    let details = details.expect("stale refs get details");
    assert!(details["hint"].as_str().unwrap().contains("browser.take_snapshot"));
}

#[test]
fn null_context_serializes_as_nulls_not_missing_keys() {
    let env = build(true, "req-1-5", &PageContext::default(), None, None);
    assert_eq!(env["pageId"], Value::Null);
    assert_eq!(env["url"], Value::Null);
    assert_eq!(env["domVersion"], Value::Null);
}
