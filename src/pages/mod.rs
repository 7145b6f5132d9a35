//! Page manager
//!
//! Tracks pages opened inside the automation context: assigns stable page
//! ids at attach, keeps at most one active page, and prefers non-blank
//! pages when (re)selecting. Closed pages stay listable (with
//! `closed=true`) but cannot be selected. Replacing the backing browser
//! context resets everything.

use std::sync::Arc;

use chromiumoxide::page::Page;
use parking_lot::Mutex;

use crate::envelope::error::ToolError;

/// URLs treated as "blank" for active-page preference.
fn is_blank_url(url: &str) -> bool {
    url.is_empty()
        || url == "about:blank"
        || url.starts_with("chrome://newtab")
        || url.starts_with("chrome://new-tab-page")
}

#[derive(Clone)]
pub struct PageEntry {
    pub page_id: i64,
    pub target_id: String,
    pub page: Page,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub closed: bool,
    /// Last URL observed by a tool call; selection preference only, not a
    /// live value.
    pub last_url: String,
}

#[derive(Default)]
struct PagesState {
    next_id: i64,
    entries: Vec<PageEntry>,
    active: Option<i64>,
}

/// Shared page registry. Clones share state; the popup watcher holds one.
#[derive(Clone, Default)]
pub struct PageRegistry {
    inner: Arc<Mutex<PagesState>>,
}

impl PageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a page if its target is unknown; returns its page id either
    /// way, plus whether it was newly attached.
    pub fn observe(&self, page: &Page, url: &str) -> (i64, bool) {
        let target = page.target_id().inner().clone();
        let mut state = self.inner.lock();
        if let Some(entry) = state.entries.iter_mut().find(|e| e.target_id == target) {
            if !url.is_empty() {
                entry.last_url = url.to_string();
            }
            return (entry.page_id, false);
        }
        state.next_id += 1;
        let page_id = state.next_id;
        state.entries.push(PageEntry {
            page_id,
            target_id: target,
            page: page.clone(),
            created_at: chrono::Utc::now(),
            closed: false,
            last_url: url.to_string(),
        });
        if state.active.is_none() {
            state.active = Some(page_id);
        }
        (page_id, true)
    }

    /// The active page, if any. Never returns a closed page.
    pub fn active(&self) -> Option<(i64, Page)> {
        let state = self.inner.lock();
        let id = state.active?;
        state
            .entries
            .iter()
            .find(|e| e.page_id == id && !e.closed)
            .map(|e| (e.page_id, e.page.clone()))
    }

    pub fn get(&self, page_id: i64) -> Result<PageEntry, ToolError> {
        let state = self.inner.lock();
        state
            .entries
            .iter()
            .find(|e| e.page_id == page_id)
            .cloned()
            .ok_or_else(|| ToolError::not_found(format!("page {page_id} not found")))
    }

    pub fn entries(&self) -> Vec<PageEntry> {
        self.inner.lock().entries.clone()
    }

    pub fn active_id(&self) -> Option<i64> {
        self.inner.lock().active
    }

    pub fn known_target(&self, target_id: &str) -> bool {
        self.inner.lock().entries.iter().any(|e| e.target_id == target_id)
    }

    /// Select a page by id. Closed pages are rejected.
    pub fn select(&self, page_id: i64) -> Result<(), ToolError> {
        let mut state = self.inner.lock();
        let entry = state
            .entries
            .iter()
            .find(|e| e.page_id == page_id)
            .ok_or_else(|| ToolError::not_found(format!("page {page_id} not found")))?;
        if entry.closed {
            return Err(ToolError::not_found(format!("page {page_id} is closed")));
        }
        state.active = Some(page_id);
        Ok(())
    }

    /// Mark a page closed. If it was active, promote the best remaining
    /// page (non-blank preferred, newest wins ties).
    pub fn mark_closed(&self, page_id: i64) -> Result<(), ToolError> {
        let mut state = self.inner.lock();
        let entry = state
            .entries
            .iter_mut()
            .find(|e| e.page_id == page_id)
            .ok_or_else(|| ToolError::not_found(format!("page {page_id} not found")))?;
        entry.closed = true;
        if state.active == Some(page_id) {
            state.active = best_candidate(&state.entries);
        }
        Ok(())
    }

    /// Record the latest URL seen for a page and re-run active-page
    /// preference when the current active page is blank.
    pub fn note_url(&self, page_id: i64, url: &str) {
        let mut state = self.inner.lock();
        if let Some(entry) = state.entries.iter_mut().find(|e| e.page_id == page_id) {
            entry.last_url = url.to_string();
        }
        let active_is_blank = state
            .active
            .and_then(|id| state.entries.iter().find(|e| e.page_id == id))
            .map(|e| e.closed || is_blank_url(&e.last_url))
            .unwrap_or(true);
        if active_is_blank {
            if let Some(better) = best_candidate(&state.entries) {
                state.active = Some(better);
            }
        }
    }

    /// Drop all state. Used when the backing browser context changes.
    pub fn reset(&self) {
        let mut state = self.inner.lock();
        *state = PagesState::default();
    }
}

fn best_candidate(entries: &[PageEntry]) -> Option<i64> {
    entries
        .iter()
        .filter(|e| !e.closed)
        .max_by_key(|e| (!is_blank_url(&e.last_url), e.page_id))
        .map(|e| e.page_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_url_detection() {
        assert!(is_blank_url(""));
        assert!(is_blank_url("about:blank"));
        assert!(is_blank_url("chrome://newtab/"));
        assert!(is_blank_url("chrome://new-tab-page/"));
        assert!(!is_blank_url("https://example.com/"));
    }
}
