//! Element selector-plan cache and accessibility UID map
//!
//! Both caches bind entries to explicit `(pageId, frameId, frameDomVersion)`
//! coordinates instead of holding live driver handles. Any use of a cached
//! reference re-checks the coordinates first; a mismatch is a `STALE_REF`
//! telling the caller to re-capture.

mod cache;
mod uid_map;

pub use cache::{ElementCache, ElementEntry};
pub use uid_map::UidRegistry;

/// Composite coordinate string all cached references are keyed by.
pub fn context_key(page_id: i64, frame_id: &str, frame_dom_version: u64) -> String {
    format!("{page_id}:{frame_id}:{frame_dom_version}")
}
