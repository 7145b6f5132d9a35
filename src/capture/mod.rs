//! Capture profile registry
//!
//! Per-tool default limits across three profiles (`light|balanced|full`) and
//! two detail levels (`low|high`). The table is enumerated data, frozen at
//! first use; lookups return an owned options record so callers can merge
//! overrides without touching shared state.
//!
//! The active profile is session state (default `light`), switched by the
//! `browser.set_capture_profile` tool.

use std::collections::HashMap;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// Named preset controlling per-tool default limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum CaptureProfile {
    Light,
    Balanced,
    Full,
}

impl CaptureProfile {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Balanced => "balanced",
            Self::Full => "full",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "light" => Some(Self::Light),
            "balanced" => Some(Self::Balanced),
            "full" => Some(Self::Full),
            _ => None,
        }
    }
}

/// Per-call detail modifier selected within a capture profile.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, schemars::JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Detail {
    #[default]
    Low,
    High,
}

impl Detail {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::High => "high",
        }
    }
}

type Key = (CaptureProfile, &'static str, Detail);

fn entry(
    table: &mut HashMap<Key, Map<String, Value>>,
    profile: CaptureProfile,
    tool: &'static str,
    detail: Detail,
    options: Value,
) {
    let Value::Object(map) = options else {
        unreachable!("capture table entries are object literals");
    };
    table.insert((profile, tool, detail), map);
}

#[rustfmt::skip]
fn build_table() -> HashMap<Key, Map<String, Value>> {
    use CaptureProfile::{Balanced, Full, Light};
    use Detail::{High, Low};

    let mut t = HashMap::new();

    // snapshot: readable page digest.
    entry(&mut t, Light, "snapshot", Low, json!({"maxChars": 6000, "maxLinks": 30, "includeHeadings": false, "includeFormsSummary": false}));
    entry(&mut t, Light, "snapshot", High, json!({"maxChars": 9000, "maxLinks": 45, "includeHeadings": true, "includeFormsSummary": true}));
    entry(&mut t, Balanced, "snapshot", Low, json!({"maxChars": 12000, "maxLinks": 60, "includeHeadings": true, "includeFormsSummary": false}));
    entry(&mut t, Balanced, "snapshot", High, json!({"maxChars": 18000, "maxLinks": 90, "includeHeadings": true, "includeFormsSummary": true}));
    entry(&mut t, Full, "snapshot", Low, json!({"maxChars": 24000, "maxLinks": 120, "includeHeadings": true, "includeFormsSummary": true}));
    entry(&mut t, Full, "snapshot", High, json!({"maxChars": 36000, "maxLinks": 180, "includeHeadings": true, "includeFormsSummary": true}));

    // list: interactive element inventory.
    entry(&mut t, Light, "list", Low, json!({"maxItems": 120, "maxTextChars": 80, "interactiveOnly": true, "visibleOnly": true, "viewportOnly": true, "includeSelectors": false}));
    entry(&mut t, Light, "list", High, json!({"maxItems": 180, "maxTextChars": 120, "interactiveOnly": true, "visibleOnly": true, "viewportOnly": false, "includeSelectors": true}));
    entry(&mut t, Balanced, "list", Low, json!({"maxItems": 240, "maxTextChars": 120, "interactiveOnly": true, "visibleOnly": true, "viewportOnly": false, "includeSelectors": true}));
    entry(&mut t, Balanced, "list", High, json!({"maxItems": 320, "maxTextChars": 160, "interactiveOnly": false, "visibleOnly": true, "viewportOnly": false, "includeSelectors": true}));
    entry(&mut t, Full, "list", Low, json!({"maxItems": 400, "maxTextChars": 160, "interactiveOnly": false, "visibleOnly": false, "viewportOnly": false, "includeSelectors": true}));
    entry(&mut t, Full, "list", High, json!({"maxItems": 600, "maxTextChars": 240, "interactiveOnly": false, "visibleOnly": false, "viewportOnly": false, "includeSelectors": true}));

    // visual_snapshot: screenshot plus element boxes.
    entry(&mut t, Light, "visual_snapshot", Low, json!({"maxItems": 60, "includeBBox": true, "includeText": false, "maxTextChars": 60, "fullPage": false, "quality": 45}));
    entry(&mut t, Light, "visual_snapshot", High, json!({"maxItems": 100, "includeBBox": true, "includeText": true, "maxTextChars": 80, "fullPage": false, "quality": 55}));
    entry(&mut t, Balanced, "visual_snapshot", Low, json!({"maxItems": 140, "includeBBox": true, "includeText": true, "maxTextChars": 80, "fullPage": false, "quality": 60}));
    entry(&mut t, Balanced, "visual_snapshot", High, json!({"maxItems": 200, "includeBBox": true, "includeText": true, "maxTextChars": 120, "fullPage": true, "quality": 70}));
    entry(&mut t, Full, "visual_snapshot", Low, json!({"maxItems": 260, "includeBBox": true, "includeText": true, "maxTextChars": 120, "fullPage": true, "quality": 75}));
    entry(&mut t, Full, "visual_snapshot", High, json!({"maxItems": 400, "includeBBox": true, "includeText": true, "maxTextChars": 160, "fullPage": true, "quality": 85}));

    // take_snapshot: accessibility tree.
    entry(&mut t, Light, "take_snapshot", Low, json!({"interestingOnly": true, "maxNodes": 400, "maxDepth": 16, "maxNameChars": 80}));
    entry(&mut t, Light, "take_snapshot", High, json!({"interestingOnly": true, "maxNodes": 700, "maxDepth": 20, "maxNameChars": 120}));
    entry(&mut t, Balanced, "take_snapshot", Low, json!({"interestingOnly": true, "maxNodes": 800, "maxDepth": 24, "maxNameChars": 120}));
    entry(&mut t, Balanced, "take_snapshot", High, json!({"interestingOnly": true, "maxNodes": 1200, "maxDepth": 28, "maxNameChars": 160}));
    entry(&mut t, Full, "take_snapshot", Low, json!({"interestingOnly": false, "maxNodes": 1500, "maxDepth": 32, "maxNameChars": 160}));
    entry(&mut t, Full, "take_snapshot", High, json!({"interestingOnly": false, "maxNodes": 2000, "maxDepth": 32, "maxNameChars": 240}));

    // html / text excerpts.
    entry(&mut t, Light, "html", Low, json!({"maxChars": 4000}));
    entry(&mut t, Light, "html", High, json!({"maxChars": 8000}));
    entry(&mut t, Balanced, "html", Low, json!({"maxChars": 12000}));
    entry(&mut t, Balanced, "html", High, json!({"maxChars": 20000}));
    entry(&mut t, Full, "html", Low, json!({"maxChars": 30000}));
    entry(&mut t, Full, "html", High, json!({"maxChars": 60000}));

    entry(&mut t, Light, "text", Low, json!({"maxChars": 6000}));
    entry(&mut t, Light, "text", High, json!({"maxChars": 10000}));
    entry(&mut t, Balanced, "text", Low, json!({"maxChars": 16000}));
    entry(&mut t, Balanced, "text", High, json!({"maxChars": 24000}));
    entry(&mut t, Full, "text", Low, json!({"maxChars": 32000}));
    entry(&mut t, Full, "text", High, json!({"maxChars": 48000}));

    // find_text: on-page text search.
    entry(&mut t, Light, "find_text", Low, json!({"maxMatches": 20, "contextChars": 60}));
    entry(&mut t, Light, "find_text", High, json!({"maxMatches": 40, "contextChars": 120}));
    entry(&mut t, Balanced, "find_text", Low, json!({"maxMatches": 40, "contextChars": 120}));
    entry(&mut t, Balanced, "find_text", High, json!({"maxMatches": 80, "contextChars": 160}));
    entry(&mut t, Full, "find_text", Low, json!({"maxMatches": 120, "contextChars": 160}));
    entry(&mut t, Full, "find_text", High, json!({"maxMatches": 200, "contextChars": 240}));

    // console_messages / network_requests: observability queries.
    entry(&mut t, Light, "console_messages", Low, json!({"limit": 40, "maxTextChars": 200}));
    entry(&mut t, Light, "console_messages", High, json!({"limit": 80, "maxTextChars": 400}));
    entry(&mut t, Balanced, "console_messages", Low, json!({"limit": 80, "maxTextChars": 400}));
    entry(&mut t, Balanced, "console_messages", High, json!({"limit": 120, "maxTextChars": 600}));
    entry(&mut t, Full, "console_messages", Low, json!({"limit": 150, "maxTextChars": 600}));
    entry(&mut t, Full, "console_messages", High, json!({"limit": 200, "maxTextChars": 1000}));

    entry(&mut t, Light, "network_requests", Low, json!({"limit": 40, "includeHeaders": false}));
    entry(&mut t, Light, "network_requests", High, json!({"limit": 80, "includeHeaders": false}));
    entry(&mut t, Balanced, "network_requests", Low, json!({"limit": 120, "includeHeaders": false}));
    entry(&mut t, Balanced, "network_requests", High, json!({"limit": 200, "includeHeaders": false}));
    entry(&mut t, Full, "network_requests", Low, json!({"limit": 240, "includeHeaders": false}));
    entry(&mut t, Full, "network_requests", High, json!({"limit": 300, "includeHeaders": true}));

    // forms audit (generic and Google Forms variant share a table).
    for tool in ["forms.audit", "forms.google_audit"] {
        entry(&mut t, Light, tool, Low, json!({"maxQuestions": 40, "includeOptions": true, "maxOptionChars": 60}));
        entry(&mut t, Light, tool, High, json!({"maxQuestions": 60, "includeOptions": true, "maxOptionChars": 120}));
        entry(&mut t, Balanced, tool, Low, json!({"maxQuestions": 80, "includeOptions": true, "maxOptionChars": 120}));
        entry(&mut t, Balanced, tool, High, json!({"maxQuestions": 120, "includeOptions": true, "maxOptionChars": 160}));
        entry(&mut t, Full, tool, Low, json!({"maxQuestions": 160, "includeOptions": true, "maxOptionChars": 160}));
        entry(&mut t, Full, tool, High, json!({"maxQuestions": 240, "includeOptions": true, "maxOptionChars": 240}));
    }

    // domain extractors.
    entry(&mut t, Light, "search.extract_results", Low, json!({"maxResults": 10, "maxSnippetChars": 200}));
    entry(&mut t, Light, "search.extract_results", High, json!({"maxResults": 20, "maxSnippetChars": 300}));
    entry(&mut t, Balanced, "search.extract_results", Low, json!({"maxResults": 20, "maxSnippetChars": 300}));
    entry(&mut t, Balanced, "search.extract_results", High, json!({"maxResults": 30, "maxSnippetChars": 400}));
    entry(&mut t, Full, "search.extract_results", Low, json!({"maxResults": 40, "maxSnippetChars": 400}));
    entry(&mut t, Full, "search.extract_results", High, json!({"maxResults": 60, "maxSnippetChars": 600}));

    entry(&mut t, Light, "jobs.extract_listings", Low, json!({"maxListings": 20, "maxSummaryChars": 240}));
    entry(&mut t, Light, "jobs.extract_listings", High, json!({"maxListings": 40, "maxSummaryChars": 400}));
    entry(&mut t, Balanced, "jobs.extract_listings", Low, json!({"maxListings": 40, "maxSummaryChars": 400}));
    entry(&mut t, Balanced, "jobs.extract_listings", High, json!({"maxListings": 60, "maxSummaryChars": 600}));
    entry(&mut t, Full, "jobs.extract_listings", Low, json!({"maxListings": 80, "maxSummaryChars": 600}));
    entry(&mut t, Full, "jobs.extract_listings", High, json!({"maxListings": 120, "maxSummaryChars": 1000}));

    t
}

static TABLE: LazyLock<HashMap<Key, Map<String, Value>>> = LazyLock::new(build_table);

/// Look up the default options for `(profile, tool, detail)`.
///
/// Returns an owned copy; tools without a table entry get an empty record.
pub fn capture_defaults(profile: CaptureProfile, tool: &str, detail: Detail) -> Map<String, Value> {
    TABLE
        .get_key_value(&(profile, tool, detail))
        .map(|(_, v)| v.clone())
        .unwrap_or_default()
}

/// Resolve effective options: profile defaults overlaid with explicit
/// caller overrides. Overrides win key-by-key.
pub fn resolve_options(
    profile: CaptureProfile,
    tool: &str,
    detail: Detail,
    overrides: &Map<String, Value>,
) -> Map<String, Value> {
    let mut options = capture_defaults(profile, tool, detail);
    for (key, value) in overrides {
        if !value.is_null() {
            options.insert(key.clone(), value.clone());
        }
    }
    options
}

pub fn opt_usize(options: &Map<String, Value>, key: &str, default: usize) -> usize {
    options.get(key).and_then(Value::as_u64).map(|v| v as usize).unwrap_or(default)
}

pub fn opt_bool(options: &Map<String, Value>, key: &str, default: bool) -> bool {
    options.get(key).and_then(Value::as_bool).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_defaults_follow_profile_and_detail() {
        let light_low = capture_defaults(CaptureProfile::Light, "list", Detail::Low);
        assert_eq!(light_low["maxItems"], json!(120));
        assert_eq!(light_low["viewportOnly"], json!(true));
        assert_eq!(light_low["includeSelectors"], json!(false));

        let light_high = capture_defaults(CaptureProfile::Light, "list", Detail::High);
        assert_eq!(light_high["maxItems"], json!(180));
        assert_eq!(light_high["viewportOnly"], json!(false));

        let balanced_low = capture_defaults(CaptureProfile::Balanced, "list", Detail::Low);
        assert_eq!(balanced_low["maxItems"], json!(240));
        assert_eq!(balanced_low["includeSelectors"], json!(true));

        let balanced_high = capture_defaults(CaptureProfile::Balanced, "list", Detail::High);
        assert_eq!(balanced_high["maxItems"], json!(320));
        assert_eq!(balanced_high["viewportOnly"], json!(false));
    }

    #[test]
    fn snapshot_excerpt_values_match_the_table() {
        let low = capture_defaults(CaptureProfile::Light, "snapshot", Detail::Low);
        assert_eq!(low["maxChars"], json!(6000));
        assert_eq!(low["maxLinks"], json!(30));
        assert_eq!(low["includeHeadings"], json!(false));

        let full_ax = capture_defaults(CaptureProfile::Full, "take_snapshot", Detail::High);
        assert_eq!(full_ax["interestingOnly"], json!(false));
        assert_eq!(full_ax["maxNodes"], json!(2000));
        assert_eq!(full_ax["maxDepth"], json!(32));
    }

    #[test]
    fn lookups_return_owned_copies() {
        let mut first = capture_defaults(CaptureProfile::Light, "list", Detail::Low);
        first.insert("maxItems".into(), json!(1));
        let second = capture_defaults(CaptureProfile::Light, "list", Detail::Low);
        assert_eq!(second["maxItems"], json!(120));
    }

    #[test]
    fn overrides_win_over_defaults() {
        let mut overrides = Map::new();
        overrides.insert("maxItems".into(), json!(7));
        let resolved = resolve_options(CaptureProfile::Light, "list", Detail::Low, &overrides);
        assert_eq!(resolved["maxItems"], json!(7));
        assert_eq!(resolved["viewportOnly"], json!(true));
    }

    #[test]
    fn unknown_tool_resolves_to_empty_defaults() {
        assert!(capture_defaults(CaptureProfile::Light, "nope", Detail::Low).is_empty());
    }
}
