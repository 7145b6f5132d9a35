//! Short-lived element selector-plan cache
//!
//! Filled only by `browser.list` and `browser.visual_snapshot`. Entries hold
//! a selector plan for re-resolution, never a raw element handle. The cache
//! is cleared on every mutating tool call and invalidated by version drift.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use crate::envelope::error::ToolError;

/// One cached element: enough descriptive fields for the assistant to pick
/// a target, plus the selector used to re-resolve it at interaction time.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementEntry {
    pub element_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    pub tag: String,
    #[serde(skip_serializing_if = "Option::is_none", rename = "type")]
    pub input_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aria_label: Option<String>,
    #[serde(skip)]
    pub context_key: String,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<i64, ElementEntry>,
}

#[derive(Clone, Default)]
pub struct ElementCache {
    inner: Arc<Mutex<CacheState>>,
}

impl ElementCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the cache contents with a fresh capture. Ids are assigned
    /// 1..n in capture order.
    pub fn fill(&self, context_key: &str, mut entries: Vec<ElementEntry>) -> Vec<ElementEntry> {
        let mut state = self.inner.lock();
        state.entries.clear();
        for (index, entry) in entries.iter_mut().enumerate() {
            entry.element_id = index as i64 + 1;
            entry.context_key = context_key.to_string();
            state.entries.insert(entry.element_id, entry.clone());
        }
        entries
    }

    /// Fetch an entry for interaction, verifying its coordinates against
    /// the caller's current context key.
    pub fn resolve(&self, element_id: i64, current_context: &str) -> Result<ElementEntry, ToolError> {
        let state = self.inner.lock();
        let entry = state.entries.get(&element_id).ok_or_else(|| {
            ToolError::not_found(format!(
                "elementId {element_id} is not cached; run browser.list first"
            ))
        })?;
        if entry.context_key != current_context {
            return Err(ToolError::stale_ref(format!(
                "elementId {element_id} was captured at {} but the page is now at {}; \
                 re-run browser.list and retry",
                entry.context_key, current_context
            )));
        }
        Ok(entry.clone())
    }

    pub fn clear(&self) {
        self.inner.lock().entries.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(tag: &str) -> ElementEntry {
        ElementEntry {
            element_id: 0,
            selector: Some(format!("{tag}:nth-of-type(1)")),
            tag: tag.to_string(),
            input_type: None,
            role: None,
            text: None,
            href: None,
            aria_label: None,
            context_key: String::new(),
        }
    }

    #[test]
    fn fill_assigns_sequential_ids() {
        let cache = ElementCache::new();
        let filled = cache.fill("1:main:1", vec![entry("a"), entry("button")]);
        assert_eq!(filled[0].element_id, 1);
        assert_eq!(filled[1].element_id, 2);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn resolve_at_same_context_succeeds() {
        let cache = ElementCache::new();
        cache.fill("1:main:1", vec![entry("button")]);
        let got = cache.resolve(1, "1:main:1").unwrap();
        assert_eq!(got.tag, "button");
    }

    #[test]
    fn resolve_after_version_drift_is_stale() {
        let cache = ElementCache::new();
        cache.fill("1:main:1", vec![entry("button")]);
        let err = cache.resolve(1, "1:main:2").unwrap_err();
        assert_eq!(err.code(), crate::envelope::error::ErrorCode::StaleRef);
    }

    #[test]
    fn unknown_id_is_not_found() {
        let cache = ElementCache::new();
        let err = cache.resolve(7, "1:main:1").unwrap_err();
        assert_eq!(err.code(), crate::envelope::error::ErrorCode::NotFound);
    }

    #[test]
    fn refill_replaces_previous_capture() {
        let cache = ElementCache::new();
        cache.fill("1:main:1", vec![entry("a"), entry("b"), entry("c")]);
        cache.fill("1:main:2", vec![entry("input")]);
        assert_eq!(cache.len(), 1);
        assert!(cache.resolve(1, "1:main:2").is_ok());
        assert!(cache.resolve(2, "1:main:2").is_err());
    }
}
