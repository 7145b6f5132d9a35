//! Tool runtime core
//!
//! `Relay` owns the shared state every tool composes: the browser host,
//! page registry, version trackers, element/uid caches, event plane, and
//! security gate. Tool handlers run through [`Relay::run_tool`], which
//! serializes calls on the runner lock, assigns request ids, builds the
//! response envelope from live page context, classifies errors, and
//! enforces the payload ceiling.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chromiumoxide::page::Page;
use parking_lot::Mutex as SyncMutex;
use rmcp::model::{CallToolResult, Content};
use serde_json::{Map, Value};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, trace};

use crate::budget;
use crate::capture::{self, CaptureProfile, Detail};
use crate::config::ServerConfig;
use crate::elements::{ElementCache, UidRegistry, context_key};
use crate::envelope::{self, PageContext, error::ToolError};
use crate::events::EventPlane;
use crate::host::BrowserHost;
use crate::pages::PageRegistry;
use crate::security::SecurityGate;
use crate::tracker::{DomContext, FrameTracker, MAIN_FRAME_ID};

/// Wait defaults; every bounded operation is capped at [`MAX_TIMEOUT_MS`].
pub const DEFAULT_NAV_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_WAIT_TIMEOUT_MS: u64 = 10_000;
pub const MAX_TIMEOUT_MS: u64 = 300_000;

pub fn clamp_timeout(ms: u64) -> Duration {
    Duration::from_millis(ms.clamp(1, MAX_TIMEOUT_MS))
}

/// Bound a future with a timeout that surfaces as a `TIMEOUT` tool error.
pub async fn with_timeout<T>(
    ms: u64,
    what: &str,
    fut: impl Future<Output = Result<T, ToolError>>,
) -> Result<T, ToolError> {
    match tokio::time::timeout(clamp_timeout(ms), fut).await {
        Ok(result) => result,
        Err(_) => Err(ToolError::timeout(format!("{what} timed out after {ms} ms"))),
    }
}

#[derive(Clone)]
pub struct Relay {
    pub config: Arc<ServerConfig>,
    pub security: Arc<SecurityGate>,
    pub host: BrowserHost,
    pub pages: PageRegistry,
    pub elements: ElementCache,
    pub uids: UidRegistry,
    pub events: EventPlane,
    trackers: Arc<SyncMutex<HashMap<i64, FrameTracker>>>,
    profile: Arc<SyncMutex<CaptureProfile>>,
    runner: Arc<AsyncMutex<()>>,
    request_seq: Arc<AtomicU64>,
}

impl Relay {
    pub fn new(config: ServerConfig) -> Self {
        let config = Arc::new(config);
        let security = Arc::new(SecurityGate::new(
            &config.input_dir,
            &config.output_dir,
            &config.log_dir,
            config.allow_evaluate,
            config.evaluate_allow_origins.clone(),
        ));
        let profile = config.capture_profile;
        Self {
            security,
            host: BrowserHost::new(config.clone()),
            pages: PageRegistry::new(),
            elements: ElementCache::new(),
            uids: UidRegistry::new(),
            events: EventPlane::new(config.downloads_dir()),
            trackers: Arc::new(SyncMutex::new(HashMap::new())),
            profile: Arc::new(SyncMutex::new(profile)),
            runner: Arc::new(AsyncMutex::new(())),
            request_seq: Arc::new(AtomicU64::new(0)),
            config,
        }
    }

    // ------------------------------------------------------------ middleware

    fn next_request_id(&self) -> String {
        let seq = self.request_seq.fetch_add(1, Ordering::SeqCst) + 1;
        envelope::request_id(chrono::Utc::now().timestamp_millis(), seq)
    }

    /// Wrap a tool handler: serialize, run, envelope, classify, reduce.
    ///
    /// Handlers return their payload object (or throw a `ToolError`); they
    /// never build envelopes or embed `error` themselves.
    pub async fn run_tool<F>(&self, tool: &str, handler: F) -> Result<CallToolResult, rmcp::ErrorData>
    where
        F: AsyncFnOnce(Relay) -> Result<Value, ToolError>,
    {
        let _guard = self.runner.lock().await;
        let request_id = self.next_request_id();
        trace!(tool, request_id = %request_id, "tool call start");

        let outcome = handler(self.clone()).await;

        let mut ceiling = self.config.max_response_bytes;
        let mut frame_override: Option<String> = None;

        let envelope = match outcome {
            Ok(mut payload) => {
                let mut map = match payload.take() {
                    Value::Object(map) => map,
                    Value::Null => Map::new(),
                    other => {
                        let mut map = Map::new();
                        map.insert("result".into(), other);
                        map
                    }
                };
                if let Some(Value::Object(meta)) = map.remove("__meta") {
                    if let Some(frame) = meta.get("frameId").and_then(Value::as_str) {
                        frame_override = Some(frame.to_string());
                    }
                    if let Some(max) = meta.get("maxPayloadBytes").and_then(Value::as_u64) {
                        ceiling = ceiling.min(max as usize);
                    }
                }
                let context = self.page_context(frame_override.as_deref()).await;
                envelope::build(true, &request_id, &context, Some(map), None)
            }
            Err(error) => {
                let (code, message, details) = envelope::error_parts(&error);
                debug!(tool, code = code.as_str(), %message, "tool call failed");
                let context = self.page_context(None).await;
                envelope::build(false, &request_id, &context, None, Some((code, message, details)))
            }
        };

        let reduced = budget::reduce(&envelope, ceiling);
        let text = serde_json::to_string(&reduced)
            .unwrap_or_else(|_| "{\"truncated\":true}".to_string());
        Ok(CallToolResult::success(vec![Content::text(text)]))
    }

    /// Live page context for the envelope; every field degrades to null.
    async fn page_context(&self, frame_override: Option<&str>) -> PageContext {
        let Some((page_id, page)) = self.pages.active() else {
            return PageContext::default();
        };
        let url = page_url_or_blank(&page).await;
        let title = page.get_title().await.ok().flatten();
        self.pages.note_url(page_id, &url);

        let frame_id = frame_override.unwrap_or(MAIN_FRAME_ID);
        let dom_version = self
            .tracker(page_id)
            .ok()
            .and_then(|t| t.dom_context(Some(frame_id)).ok())
            .map(|cx| cx.dom_version);

        PageContext {
            page_id: Some(page_id),
            url: Some(url),
            title,
            dom_version,
            active_frame_id: Some(frame_id.to_string()),
        }
    }

    // ------------------------------------------------------------ page state

    /// Adopt every page the browser currently has, then return the active
    /// one. Creates a blank page when the browser has none.
    pub async fn ensure_page(&self) -> Result<(i64, Page), ToolError> {
        self.sync_pages().await?;
        if let Some(active) = self.pages.active() {
            return Ok(active);
        }
        let page = self.host.new_page("about:blank").await?;
        let page_id = self.adopt_page(&page).await?;
        Ok((page_id, page))
    }

    /// Reconcile the page registry with the browser's target list.
    pub async fn sync_pages(&self) -> Result<(), ToolError> {
        let pages = self.host.pages().await?;
        for page in &pages {
            self.adopt_page(page).await?;
        }
        Ok(())
    }

    /// Register a page and attach its frame tracker and event listeners
    /// (idempotent per target).
    pub async fn adopt_page(&self, page: &Page) -> Result<i64, ToolError> {
        let url = page_url_or_blank(page).await;
        let (page_id, newly_attached) = self.pages.observe(page, &url);
        if newly_attached {
            debug!(page_id, url = %url, "attaching page");
            if self.config.stealth {
                let stealth_config = crate::stealth::StealthConfig::default();
                if let Err(e) = crate::stealth::inject(page, &stealth_config).await {
                    tracing::warn!("stealth injection failed: {e}");
                }
            }
            let elements = self.elements.clone();
            let uids = self.uids.clone();
            let invalidate: Arc<dyn Fn() + Send + Sync> = Arc::new(move || {
                elements.clear();
                uids.clear_page(page_id);
            });
            let tracker = FrameTracker::attach(page, invalidate).await?;
            self.trackers.lock().insert(page_id, tracker);
            self.events.attach_page(page, page_id).await;
        }
        Ok(page_id)
    }

    pub fn tracker(&self, page_id: i64) -> Result<FrameTracker, ToolError> {
        self.trackers
            .lock()
            .get(&page_id)
            .cloned()
            .ok_or_else(|| ToolError::not_found(format!("page {page_id} has no tracker attached")))
    }

    pub fn dom_context(&self, page_id: i64, frame: Option<&str>) -> Result<DomContext, ToolError> {
        self.tracker(page_id)?.dom_context(frame)
    }

    /// Context key for the element cache: captures happen on the main
    /// frame, so the main frame's version is the coordinate that counts.
    pub fn main_context_key(&self, page_id: i64) -> Result<String, ToolError> {
        let cx = self.dom_context(page_id, None)?;
        Ok(context_key(page_id, &cx.frame_id, cx.frame_dom_version))
    }

    /// Clear short-lived caches after any mutating operation.
    pub fn invalidate_after_mutation(&self, page_id: i64) {
        self.elements.clear();
        self.uids.clear_page(page_id);
    }

    /// Resolve a uid to a backend node id under the current frame versions.
    pub fn resolve_uid(
        &self,
        page_id: i64,
        frame_id: Option<&str>,
        uid: &str,
    ) -> Result<chromiumoxide::cdp::browser_protocol::dom::BackendNodeId, ToolError> {
        let tracker = self.tracker(page_id)?;
        let frame = frame_id.unwrap_or(MAIN_FRAME_ID);
        self.uids.resolve(page_id, frame, uid, |fid| {
            tracker.dom_context(Some(fid)).ok().map(|cx| cx.frame_dom_version)
        })
    }

    // --------------------------------------------------------- capture state

    pub fn capture_profile(&self) -> CaptureProfile {
        *self.profile.lock()
    }

    pub fn set_capture_profile(&self, profile: CaptureProfile) {
        *self.profile.lock() = profile;
    }

    /// Effective options for a capture-sensitive tool call.
    pub fn options(&self, tool: &str, detail: Detail, overrides: &Map<String, Value>) -> Map<String, Value> {
        capture::resolve_options(self.capture_profile(), tool, detail, overrides)
    }

    // -------------------------------------------------------------- lifecycle

    /// Tear down all per-context state and close the browser session. The
    /// next tool call starts from a fresh context.
    pub async fn reset_session(&self) {
        for (_, tracker) in self.trackers.lock().drain() {
            tracker.detach();
        }
        self.pages.reset();
        self.events.reset();
        self.elements.clear();
        self.uids.clear();
        self.host.reset().await;
    }

    pub async fn shutdown(&self) {
        for (_, tracker) in self.trackers.lock().drain() {
            tracker.detach();
        }
        self.host.shutdown().await;
    }
}

/// Page URL with a diagnostic fallback: `about:blank` on any failure, which
/// is more legible in logs than an empty string.
pub async fn page_url_or_blank(page: &Page) -> String {
    match page.url().await {
        Ok(Some(url)) => url,
        Ok(None) => "about:blank".to_string(),
        Err(e) => {
            trace!("failed to read page url: {e}");
            "about:blank".to_string()
        }
    }
}
