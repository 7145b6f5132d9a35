//! Capture profile table values and resolution semantics, including the
//! profile/detail switch behavior the assistant relies on.

use serde_json::{Map, json};

use browser_relay::capture::{CaptureProfile, Detail, capture_defaults, resolve_options};

#[test]
fn balanced_high_list_defaults() {
    let options = capture_defaults(CaptureProfile::Balanced, "list", Detail::High);
    assert_eq!(options["maxItems"], json!(320));
    assert_eq!(options["includeSelectors"], json!(true));
    assert_eq!(options["viewportOnly"], json!(false));
}

#[test]
fn light_profile_list_defaults_by_detail() {
    let high = capture_defaults(CaptureProfile::Light, "list", Detail::High);
    assert_eq!(high["maxItems"], json!(180));
    assert_eq!(high["viewportOnly"], json!(false));

    let low = capture_defaults(CaptureProfile::Light, "list", Detail::Low);
    assert_eq!(low["maxItems"], json!(120));
    assert_eq!(low["viewportOnly"], json!(true));
}

#[test]
fn snapshot_light_values() {
    let low = capture_defaults(CaptureProfile::Light, "snapshot", Detail::Low);
    assert_eq!(low["maxChars"], json!(6000));
    assert_eq!(low["maxLinks"], json!(30));
    assert_eq!(low["includeHeadings"], json!(false));
    assert_eq!(low["includeFormsSummary"], json!(false));

    let high = capture_defaults(CaptureProfile::Light, "snapshot", Detail::High);
    assert_eq!(high["maxChars"], json!(9000));
    assert_eq!(high["maxLinks"], json!(45));
    assert_eq!(high["includeHeadings"], json!(true));
}

#[test]
fn full_take_snapshot_disables_interesting_only() {
    let options = capture_defaults(CaptureProfile::Full, "take_snapshot", Detail::High);
    assert_eq!(options["interestingOnly"], json!(false));
    assert_eq!(options["maxNodes"], json!(2000));
    assert_eq!(options["maxDepth"], json!(32));
}

#[test]
fn every_capture_tool_has_all_six_cells() {
    let tools = [
        "snapshot", "list", "visual_snapshot", "take_snapshot", "html", "text", "find_text",
        "console_messages", "network_requests", "forms.audit", "forms.google_audit",
        "search.extract_results", "jobs.extract_listings",
    ];
    for tool in tools {
        for profile in [CaptureProfile::Light, CaptureProfile::Balanced, CaptureProfile::Full] {
            for detail in [Detail::Low, Detail::High] {
                let options = capture_defaults(profile, tool, detail);
                assert!(
                    !options.is_empty(),
                    "missing table cell: {tool} / {} / {}",
                    profile.as_str(),
                    detail.as_str()
                );
            }
        }
    }
}

#[test]
fn limits_never_shrink_with_more_generous_profiles() {
    for tool in ["list", "snapshot", "take_snapshot"] {
        let key = match tool {
            "list" => "maxItems",
            "snapshot" => "maxChars",
            _ => "maxNodes",
        };
        for detail in [Detail::Low, Detail::High] {
            let light = capture_defaults(CaptureProfile::Light, tool, detail)[key].as_u64().unwrap();
            let balanced = capture_defaults(CaptureProfile::Balanced, tool, detail)[key].as_u64().unwrap();
            let full = capture_defaults(CaptureProfile::Full, tool, detail)[key].as_u64().unwrap();
            assert!(light <= balanced && balanced <= full, "{tool}.{key} not monotonic");
        }
    }
}

#[test]
fn explicit_overrides_beat_profile_defaults() {
    let mut overrides = Map::new();
    overrides.insert("maxItems".into(), json!(12));
    overrides.insert("viewportOnly".into(), json!(false));
    let resolved = resolve_options(CaptureProfile::Light, "list", Detail::Low, &overrides);
    assert_eq!(resolved["maxItems"], json!(12));
    assert_eq!(resolved["viewportOnly"], json!(false));
    // Untouched defaults remain.
    assert_eq!(resolved["interactiveOnly"], json!(true));
}

#[test]
fn profile_parsing_accepts_known_names_only() {
    assert_eq!(CaptureProfile::parse("balanced"), Some(CaptureProfile::Balanced));
    assert_eq!(CaptureProfile::parse(" FULL "), Some(CaptureProfile::Full));
    assert_eq!(CaptureProfile::parse("medium"), None);
}
