//! Accessibility UID maps
//!
//! `browser.take_snapshot` writes one map per `(page, frame)`, recording the
//! frame's DOM version at capture time. UID lookups fail with `STALE_REF`
//! once the frame has advanced. A uid captured on the main frame still
//! resolves when the caller passes an explicit frame id, as long as the main
//! frame itself has not advanced.

use std::collections::HashMap;
use std::sync::Arc;

use chromiumoxide::cdp::browser_protocol::dom::BackendNodeId;
use parking_lot::Mutex;

use crate::envelope::error::ToolError;
use crate::tracker::MAIN_FRAME_ID;

struct FrameUidMap {
    frame_dom_version_at_capture: u64,
    uids: HashMap<String, BackendNodeId>,
}

#[derive(Default)]
struct UidState {
    // pageId -> frameId -> map
    pages: HashMap<i64, HashMap<String, FrameUidMap>>,
}

#[derive(Clone, Default)]
pub struct UidRegistry {
    inner: Arc<Mutex<UidState>>,
}

impl UidRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the uid map for one frame of one page.
    pub fn store(
        &self,
        page_id: i64,
        frame_id: &str,
        frame_dom_version: u64,
        uids: HashMap<String, BackendNodeId>,
    ) {
        let mut state = self.inner.lock();
        state
            .pages
            .entry(page_id)
            .or_default()
            .insert(frame_id.to_string(), FrameUidMap { frame_dom_version_at_capture: frame_dom_version, uids });
    }

    /// Resolve a uid to its backend node id.
    ///
    /// `current_version_of` reports the live frame version so capture-time
    /// drift is detected here, not at the CDP call.
    pub fn resolve(
        &self,
        page_id: i64,
        frame_id: &str,
        uid: &str,
        current_version_of: impl Fn(&str) -> Option<u64>,
    ) -> Result<BackendNodeId, ToolError> {
        let state = self.inner.lock();
        let frames = state
            .pages
            .get(&page_id)
            .ok_or_else(|| ToolError::not_found(format!("no snapshot captured for page {page_id}")))?;

        let lookup = |fid: &str| -> Option<Result<BackendNodeId, ToolError>> {
            let map = frames.get(fid)?;
            let node = map.uids.get(uid)?;
            let current = current_version_of(fid);
            match current {
                Some(v) if v == map.frame_dom_version_at_capture => Some(Ok(*node)),
                Some(v) => Some(Err(ToolError::stale_ref(format!(
                    "uid {uid} was captured at {fid}@{} but the frame is now at @{v}; \
                     re-run browser.take_snapshot and retry",
                    map.frame_dom_version_at_capture
                )))),
                None => Some(Err(ToolError::stale_ref(format!(
                    "uid {uid} was captured on frame {fid} which no longer exists"
                )))),
            }
        };

        if let Some(result) = lookup(frame_id) {
            return result;
        }
        // Main-frame fallback: snapshots taken without an explicit frame
        // land in the main map, and callers often pass the frame id they
        // saw in the node listing.
        if frame_id != MAIN_FRAME_ID {
            if let Some(result) = lookup(MAIN_FRAME_ID) {
                return result;
            }
        }
        Err(ToolError::not_found(format!(
            "uid {uid} not found; run browser.take_snapshot first"
        )))
    }

    pub fn clear_page(&self, page_id: i64) {
        self.inner.lock().pages.remove(&page_id);
    }

    pub fn clear(&self) {
        self.inner.lock().pages.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uids(pairs: &[(&str, i64)]) -> HashMap<String, BackendNodeId> {
        pairs.iter().map(|(k, v)| (k.to_string(), BackendNodeId::new(*v))).collect()
    }

    #[test]
    fn resolve_at_capture_version() {
        let reg = UidRegistry::new();
        reg.store(1, "main", 3, uids(&[("ax-10", 10)]));
        let node = reg.resolve(1, "main", "ax-10", |_| Some(3)).unwrap();
        assert_eq!(node, BackendNodeId::new(10));
    }

    #[test]
    fn version_drift_is_stale() {
        let reg = UidRegistry::new();
        reg.store(1, "main", 3, uids(&[("ax-10", 10)]));
        let err = reg.resolve(1, "main", "ax-10", |_| Some(4)).unwrap_err();
        assert_eq!(err.code(), crate::envelope::error::ErrorCode::StaleRef);
    }

    #[test]
    fn explicit_frame_falls_back_to_main_map() {
        let reg = UidRegistry::new();
        reg.store(1, "main", 2, uids(&[("ax-5", 5)]));
        let node = reg
            .resolve(1, "f1", "ax-5", |fid| if fid == "main" { Some(2) } else { Some(9) })
            .unwrap();
        assert_eq!(node, BackendNodeId::new(5));
    }

    #[test]
    fn frame_scoped_uid_goes_stale_with_its_frame() {
        let reg = UidRegistry::new();
        reg.store(1, "f1", 4, uids(&[("ax-7", 7)]));
        let err = reg.resolve(1, "f1", "ax-7", |_| Some(5)).unwrap_err();
        assert_eq!(err.code(), crate::envelope::error::ErrorCode::StaleRef);
    }

    #[test]
    fn missing_uid_is_not_found() {
        let reg = UidRegistry::new();
        reg.store(1, "main", 1, uids(&[]));
        let err = reg.resolve(1, "main", "ax-1", |_| Some(1)).unwrap_err();
        assert_eq!(err.code(), crate::envelope::error::ErrorCode::NotFound);
    }
}
