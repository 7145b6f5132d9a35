//! DOM version tracker
//!
//! Assigns stable frame ids per page and maintains monotonic page/frame
//! versions that invalidate cached element and accessibility references on
//! navigation, frame replacement, and detach.
//!
//! The main frame always has id `"main"`; subframes get `f1, f2, ...` in
//! attach order and ids are never reused within a page. A navigation bumps
//! the target frame's version and the page version; a detach bumps the page
//! version only.

use std::collections::HashMap;
use std::sync::Arc;

use chromiumoxide::cdp::browser_protocol::page::{
    EventFrameAttached, EventFrameDetached, EventFrameNavigated,
};
use chromiumoxide::page::Page;
use futures::StreamExt;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::envelope::error::ToolError;

pub const MAIN_FRAME_ID: &str = "main";

/// Snapshot of the version coordinates for one frame of one page.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DomContext {
    pub page_dom_version: u64,
    pub frame_id: String,
    pub frame_dom_version: u64,
    pub dom_version: String,
}

/// Frame record exposed by `browser.list_frames`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameRecord {
    pub frame_id: String,
    pub parent_frame_id: Option<String>,
    pub is_main: bool,
    pub name: Option<String>,
    pub url: Option<String>,
    pub frame_dom_version: u64,
}

#[derive(Debug)]
struct FrameSlot {
    cdp_id: String,
    parent: Option<String>,
    name: Option<String>,
    url: Option<String>,
    version: u64,
}

#[derive(Debug, Default)]
struct TrackerState {
    page_dom_version: u64,
    next_frame_seq: u64,
    // stable id -> slot; insertion order is not meaningful, ids are.
    frames: HashMap<String, FrameSlot>,
    by_cdp: HashMap<String, String>,
}

impl TrackerState {
    fn assign_id(&mut self, cdp_id: &str, parent: Option<String>) -> String {
        if let Some(existing) = self.by_cdp.get(cdp_id) {
            return existing.clone();
        }
        self.next_frame_seq += 1;
        let id = format!("f{}", self.next_frame_seq);
        self.frames.insert(
            id.clone(),
            FrameSlot { cdp_id: cdp_id.to_string(), parent, name: None, url: None, version: 1 },
        );
        self.by_cdp.insert(cdp_id.to_string(), id.clone());
        id
    }

    fn register_main(&mut self, cdp_id: &str) {
        self.frames.insert(
            MAIN_FRAME_ID.to_string(),
            FrameSlot { cdp_id: cdp_id.to_string(), parent: None, name: None, url: None, version: 1 },
        );
        self.by_cdp.insert(cdp_id.to_string(), MAIN_FRAME_ID.to_string());
    }
}

/// Per-page frame/version bookkeeping with CDP listeners feeding it.
///
/// Cloning shares the underlying state; listener tasks hold a clone and a
/// generation tag so stale listeners from a replaced context no-op.
#[derive(Clone)]
pub struct FrameTracker {
    inner: Arc<Mutex<TrackerState>>,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl FrameTracker {
    /// Create a tracker for a page whose main frame id is already known.
    ///
    /// `on_invalidate` runs after every navigation/detach version bump so
    /// the owner can clear element caches bound to old versions.
    pub async fn attach(
        page: &Page,
        on_invalidate: Arc<dyn Fn() + Send + Sync>,
    ) -> Result<Self, ToolError> {
        let mut state = TrackerState { page_dom_version: 1, ..Default::default() };

        let main_id = page
            .mainframe()
            .await
            .map_err(|e| ToolError::Internal(anyhow::anyhow!("cannot read main frame: {e}")))?;
        let main_cdp = main_id.map(|id| id.inner().clone()).unwrap_or_default();
        state.register_main(&main_cdp);

        let tracker = Self {
            inner: Arc::new(Mutex::new(state)),
            tasks: Arc::new(Mutex::new(Vec::new())),
        };
        tracker.spawn_listeners(page, on_invalidate).await;
        Ok(tracker)
    }

    async fn spawn_listeners(&self, page: &Page, on_invalidate: Arc<dyn Fn() + Send + Sync>) {
        let mut tasks = Vec::new();

        match page.event_listener::<EventFrameAttached>().await {
            Ok(mut stream) => {
                let inner = self.inner.clone();
                tasks.push(tokio::spawn(async move {
                    while let Some(event) = stream.next().await {
                        let mut state = inner.lock();
                        let parent = state.by_cdp.get(event.parent_frame_id.inner()).cloned();
                        let id = state.assign_id(event.frame_id.inner(), parent);
                        trace!(frame = %id, "frame attached");
                    }
                }));
            }
            Err(e) => warn!("frame-attached listener unavailable: {e}"),
        }

        match page.event_listener::<EventFrameNavigated>().await {
            Ok(mut stream) => {
                let inner = self.inner.clone();
                let invalidate = on_invalidate.clone();
                tasks.push(tokio::spawn(async move {
                    while let Some(event) = stream.next().await {
                        let frame = &event.frame;
                        {
                            let mut state = inner.lock();
                            let id = match state.by_cdp.get(frame.id.inner()).cloned() {
                                Some(id) => id,
                                None if frame.parent_id.is_none() => {
                                    // Main-frame CDP id changed (process swap):
                                    // rebind "main" to the new id.
                                    let old = state
                                        .frames
                                        .get(MAIN_FRAME_ID)
                                        .map(|slot| slot.cdp_id.clone());
                                    if let Some(old) = old {
                                        state.by_cdp.remove(&old);
                                    }
                                    state.by_cdp
                                        .insert(frame.id.inner().clone(), MAIN_FRAME_ID.into());
                                    if let Some(slot) = state.frames.get_mut(MAIN_FRAME_ID) {
                                        slot.cdp_id = frame.id.inner().clone();
                                    }
                                    MAIN_FRAME_ID.to_string()
                                }
                                None => {
                                    let parent = frame
                                        .parent_id
                                        .as_ref()
                                        .and_then(|p| state.by_cdp.get(p.inner()).cloned());
                                    state.assign_id(frame.id.inner(), parent)
                                }
                            };
                            state.page_dom_version += 1;
                            if let Some(slot) = state.frames.get_mut(&id) {
                                slot.version += 1;
                                slot.url = Some(frame.url.clone());
                                slot.name = frame.name.clone();
                            }
                            debug!(frame = %id, version = state.page_dom_version, "frame navigated");
                        }
                        invalidate();
                    }
                }));
            }
            Err(e) => warn!("frame-navigated listener unavailable: {e}"),
        }

        match page.event_listener::<EventFrameDetached>().await {
            Ok(mut stream) => {
                let inner = self.inner.clone();
                let invalidate = on_invalidate;
                tasks.push(tokio::spawn(async move {
                    while let Some(event) = stream.next().await {
                        {
                            let mut state = inner.lock();
                            if let Some(id) = state.by_cdp.remove(event.frame_id.inner()) {
                                state.frames.remove(&id);
                                state.page_dom_version += 1;
                                debug!(frame = %id, "frame detached");
                            }
                        }
                        invalidate();
                    }
                }));
            }
            Err(e) => warn!("frame-detached listener unavailable: {e}"),
        }

        self.tasks.lock().extend(tasks);
    }

    /// Current version coordinates for `frame_id` (default: main frame).
    pub fn dom_context(&self, frame_id: Option<&str>) -> Result<DomContext, ToolError> {
        let state = self.inner.lock();
        let id = frame_id.unwrap_or(MAIN_FRAME_ID);
        let slot = state
            .frames
            .get(id)
            .ok_or_else(|| ToolError::not_found(format!("frame '{id}' not found")))?;
        Ok(DomContext {
            page_dom_version: state.page_dom_version,
            frame_id: id.to_string(),
            frame_dom_version: slot.version,
            dom_version: format!("p{}:{}@{}", state.page_dom_version, id, slot.version),
        })
    }

    pub fn list_frames(&self) -> (u64, Vec<FrameRecord>) {
        let state = self.inner.lock();
        let mut frames: Vec<FrameRecord> = state
            .frames
            .iter()
            .map(|(id, slot)| FrameRecord {
                frame_id: id.clone(),
                parent_frame_id: slot.parent.clone(),
                is_main: id == MAIN_FRAME_ID,
                name: slot.name.clone(),
                url: slot.url.clone(),
                frame_dom_version: slot.version,
            })
            .collect();
        frames.sort_by(|a, b| {
            // main first, then by numeric suffix.
            let rank = |r: &FrameRecord| {
                if r.is_main { 0 } else { r.frame_id[1..].parse::<u64>().unwrap_or(u64::MAX) }
            };
            rank(a).cmp(&rank(b))
        });
        (state.page_dom_version, frames)
    }

    /// CDP frame id backing a stable frame id, for frame-scoped CDP calls.
    pub fn cdp_frame_id(&self, frame_id: &str) -> Option<String> {
        let state = self.inner.lock();
        state.frames.get(frame_id).map(|slot| slot.cdp_id.clone())
    }

    /// Stable id for a CDP frame id, if tracked.
    pub fn stable_frame_id(&self, cdp_id: &str) -> Option<String> {
        self.inner.lock().by_cdp.get(cdp_id).cloned()
    }

    /// Abort listener tasks. Called when the page closes or the backing
    /// context is replaced.
    pub fn detach(&self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }

    #[cfg(test)]
    fn test_new() -> Self {
        let mut state = TrackerState { page_dom_version: 1, ..Default::default() };
        state.register_main("CDP-MAIN");
        Self { inner: Arc::new(Mutex::new(state)), tasks: Arc::new(Mutex::new(Vec::new())) }
    }

    #[cfg(test)]
    fn test_navigate(&self, cdp_id: &str, url: &str) {
        let mut state = self.inner.lock();
        let id = match state.by_cdp.get(cdp_id).cloned() {
            Some(id) => id,
            None => state.assign_id(cdp_id, Some(MAIN_FRAME_ID.into())),
        };
        state.page_dom_version += 1;
        if let Some(slot) = state.frames.get_mut(&id) {
            slot.version += 1;
            slot.url = Some(url.to_string());
        }
    }

    #[cfg(test)]
    fn test_detach(&self, cdp_id: &str) {
        let mut state = self.inner.lock();
        if let Some(id) = state.by_cdp.remove(cdp_id) {
            state.frames.remove(&id);
            state.page_dom_version += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn main_frame_context_is_well_formed() {
        let tracker = FrameTracker::test_new();
        let cx = tracker.dom_context(None).unwrap();
        assert_eq!(cx.frame_id, "main");
        assert_eq!(cx.dom_version, "p1:main@1");
    }

    #[test]
    fn navigation_bumps_page_and_frame_versions() {
        let tracker = FrameTracker::test_new();
        tracker.test_navigate("CDP-MAIN", "https://example.com/");
        let cx = tracker.dom_context(None).unwrap();
        assert_eq!(cx.page_dom_version, 2);
        assert_eq!(cx.frame_dom_version, 2);
        assert_eq!(cx.dom_version, "p2:main@2");
    }

    #[test]
    fn subframe_ids_are_monotonic_and_never_reused() {
        let tracker = FrameTracker::test_new();
        tracker.test_navigate("CDP-A", "https://a.example/");
        tracker.test_navigate("CDP-B", "https://b.example/");
        tracker.test_detach("CDP-A");
        tracker.test_navigate("CDP-C", "https://c.example/");

        let (_, frames) = tracker.list_frames();
        let ids: Vec<&str> = frames.iter().map(|f| f.frame_id.as_str()).collect();
        assert_eq!(ids, vec!["main", "f2", "f3"]);
    }

    #[test]
    fn detach_bumps_page_version_only() {
        let tracker = FrameTracker::test_new();
        tracker.test_navigate("CDP-A", "https://a.example/");
        let before = tracker.dom_context(None).unwrap();
        tracker.test_detach("CDP-A");
        let after = tracker.dom_context(None).unwrap();
        assert_eq!(after.page_dom_version, before.page_dom_version + 1);
        assert_eq!(after.frame_dom_version, before.frame_dom_version);
    }

    #[test]
    fn unknown_frame_is_not_found() {
        let tracker = FrameTracker::test_new();
        assert!(tracker.dom_context(Some("f9")).is_err());
    }
}
