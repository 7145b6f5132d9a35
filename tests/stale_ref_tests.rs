//! Cached-reference discipline: element ids and accessibility uids bound to
//! `(pageId, frameId, frameDomVersion)` fail with STALE_REF once their
//! coordinates drift, and with NOT_FOUND when they were never captured.

use std::collections::HashMap;

use chromiumoxide::cdp::browser_protocol::dom::BackendNodeId;

use browser_relay::ErrorCode;
use browser_relay::elements::{ElementCache, ElementEntry, UidRegistry, context_key};

fn entry(selector: &str) -> ElementEntry {
    ElementEntry {
        element_id: 0,
        selector: Some(selector.to_string()),
        tag: "button".into(),
        input_type: None,
        role: Some("button".into()),
        text: Some("Submit".into()),
        href: None,
        aria_label: None,
        context_key: String::new(),
    }
}

#[test]
fn element_id_survives_within_one_dom_version() {
    let cache = ElementCache::new();
    let key = context_key(1, "main", 1);
    let filled = cache.fill(&key, vec![entry("#submit")]);
    let got = cache.resolve(filled[0].element_id, &key).unwrap();
    assert_eq!(got.selector.as_deref(), Some("#submit"));
}

#[test]
fn element_id_goes_stale_after_navigation() {
    // Capture at version 1, then the page navigates: the main frame's
    // version advances and the old id must be refused.
    let cache = ElementCache::new();
    cache.fill(&context_key(1, "main", 1), vec![entry("#submit")]);

    let err = cache.resolve(1, &context_key(1, "main", 2)).unwrap_err();
    assert_eq!(err.code(), ErrorCode::StaleRef);
    assert!(err.to_string().contains("browser.list"));
}

#[test]
fn element_id_from_another_page_is_stale_too() {
    let cache = ElementCache::new();
    cache.fill(&context_key(1, "main", 3), vec![entry("a.link")]);
    let err = cache.resolve(1, &context_key(2, "main", 3)).unwrap_err();
    assert_eq!(err.code(), ErrorCode::StaleRef);
}

#[test]
fn mutating_calls_clear_the_cache_entirely() {
    let cache = ElementCache::new();
    let key = context_key(1, "main", 1);
    cache.fill(&key, vec![entry("#a"), entry("#b")]);
    assert_eq!(cache.len(), 2);
    cache.clear();
    let err = cache.resolve(1, &key).unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotFound);
}

fn uid_map(pairs: &[(&str, i64)]) -> HashMap<String, BackendNodeId> {
    pairs.iter().map(|(uid, node)| (uid.to_string(), BackendNodeId::new(*node))).collect()
}

#[test]
fn uid_resolves_while_frame_version_matches() {
    let registry = UidRegistry::new();
    registry.store(1, "main", 5, uid_map(&[("ax-44", 44)]));
    let node = registry.resolve(1, "main", "ax-44", |_| Some(5)).unwrap();
    assert_eq!(node, BackendNodeId::new(44));
}

#[test]
fn uid_goes_stale_when_its_frame_advances() {
    // Snapshot an iframe, then replace its document: the frame version
    // advances and the uid must be refused.
    let registry = UidRegistry::new();
    registry.store(1, "f1", 2, uid_map(&[("ax-7", 7)]));

    let err = registry.resolve(1, "f1", "ax-7", |_| Some(3)).unwrap_err();
    assert_eq!(err.code(), ErrorCode::StaleRef);
    assert!(err.to_string().contains("take_snapshot"));
}

#[test]
fn uid_captured_on_main_resolves_under_an_explicit_frame_id() {
    let registry = UidRegistry::new();
    registry.store(1, "main", 1, uid_map(&[("ax-9", 9)]));
    let node = registry
        .resolve(1, "f2", "ax-9", |fid| if fid == "main" { Some(1) } else { None })
        .unwrap();
    assert_eq!(node, BackendNodeId::new(9));
}

#[test]
fn main_frame_fallback_still_honors_staleness() {
    let registry = UidRegistry::new();
    registry.store(1, "main", 1, uid_map(&[("ax-9", 9)]));
    let err = registry
        .resolve(1, "f2", "ax-9", |fid| if fid == "main" { Some(4) } else { None })
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::StaleRef);
}

#[test]
fn unknown_uid_is_not_found() {
    let registry = UidRegistry::new();
    registry.store(1, "main", 1, uid_map(&[]));
    let err = registry.resolve(1, "main", "ax-404", |_| Some(1)).unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotFound);
}

#[test]
fn snapshot_replacement_drops_old_uids_of_that_frame() {
    let registry = UidRegistry::new();
    registry.store(1, "main", 1, uid_map(&[("ax-1", 1)]));
    registry.store(1, "main", 2, uid_map(&[("ax-2", 2)]));
    // Old uid vanished with the replaced map.
    let err = registry.resolve(1, "main", "ax-1", |_| Some(2)).unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotFound);
    assert!(registry.resolve(1, "main", "ax-2", |_| Some(2)).is_ok());
}
