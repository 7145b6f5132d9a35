//! Event plane
//!
//! Dialogs, downloads, popups, console messages, and network requests are
//! captured asynchronously into bounded ring buffers and queried
//! synchronously by id. Listener attachment is idempotent per page (keyed
//! by CDP target id) and generation-tagged: listeners spawned for a
//! replaced browser context detect the bump and stop recording.

mod records;
mod ring;

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chromiumoxide::cdp::browser_protocol::browser::{
    EventDownloadProgress, EventDownloadWillBegin,
};
use chromiumoxide::cdp::browser_protocol::network::{
    EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent, EventResponseReceived,
};
use chromiumoxide::cdp::browser_protocol::page::{
    EventJavascriptDialogOpening, EventWindowOpen, HandleJavaScriptDialogParams,
};
use chromiumoxide::cdp::js_protocol::runtime::{
    EventConsoleApiCalled, EventExceptionThrown,
};
use chromiumoxide::page::Page;
use futures::StreamExt;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, trace, warn};

pub use records::{
    ConsoleRecord, DialogRecord, DialogStatus, DownloadRecord, DownloadState, NetworkRecord,
    PopupRecord,
};
pub use ring::RingBuffer;

use crate::envelope::error::ToolError;

/// Pending dialogs auto-dismiss after this long.
pub const DIALOG_AUTO_DISMISS: Duration = Duration::from_secs(15);

const CONSOLE_CAPACITY: usize = 200;
const NETWORK_CAPACITY: usize = 300;
const DIALOG_CAPACITY: usize = 400;
const DOWNLOAD_CAPACITY: usize = 400;
const POPUP_CAPACITY: usize = 200;

const DOWNLOAD_POLL: Duration = Duration::from_millis(100);

/// Buffer families addressable by `browser.expect_event`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Dialog,
    Download,
    Popup,
    Console,
    Network,
}

impl EventKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "dialog" => Some(Self::Dialog),
            "download" => Some(Self::Download),
            "popup" => Some(Self::Popup),
            "console" => Some(Self::Console),
            "network" | "request" | "response" => Some(Self::Network),
            _ => None,
        }
    }
}

/// Match conditions for `browser.expect_event`.
#[derive(Debug, Default)]
pub struct EventQuery {
    pub pattern: Option<String>,
    pub regex: Option<regex::Regex>,
    pub status: Option<i64>,
    pub method: Option<String>,
}

impl EventQuery {
    fn matches_text(&self, text: &str) -> bool {
        if let Some(re) = &self.regex {
            return re.is_match(text);
        }
        match &self.pattern {
            Some(needle) => text.contains(needle.as_str()),
            None => true,
        }
    }
}

struct PlaneInner {
    dialogs: Mutex<RingBuffer<DialogRecord>>,
    downloads: Mutex<RingBuffer<DownloadRecord>>,
    popups: Mutex<RingBuffer<PopupRecord>>,
    console: Mutex<RingBuffer<ConsoleRecord>>,
    network: Mutex<RingBuffer<NetworkRecord>>,
    attached: Mutex<HashSet<String>>,
    generation: AtomicU64,
    seq: AtomicU64,
    dialog_seq: AtomicU64,
    download_seq: AtomicU64,
    popup_seq: AtomicU64,
    console_seq: AtomicU64,
    network_seq: AtomicU64,
    download_dir: PathBuf,
}

#[derive(Clone)]
pub struct EventPlane {
    inner: Arc<PlaneInner>,
}

impl EventPlane {
    pub fn new(download_dir: PathBuf) -> Self {
        Self {
            inner: Arc::new(PlaneInner {
                dialogs: Mutex::new(RingBuffer::new(DIALOG_CAPACITY)),
                downloads: Mutex::new(RingBuffer::new(DOWNLOAD_CAPACITY)),
                popups: Mutex::new(RingBuffer::new(POPUP_CAPACITY)),
                console: Mutex::new(RingBuffer::new(CONSOLE_CAPACITY)),
                network: Mutex::new(RingBuffer::new(NETWORK_CAPACITY)),
                attached: Mutex::new(HashSet::new()),
                generation: AtomicU64::new(0),
                seq: AtomicU64::new(0),
                dialog_seq: AtomicU64::new(0),
                download_seq: AtomicU64::new(0),
                popup_seq: AtomicU64::new(0),
                console_seq: AtomicU64::new(0),
                network_seq: AtomicU64::new(0),
                download_dir,
            }),
        }
    }

    fn next_seq(&self) -> u64 {
        self.inner.seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Global sequence watermark; `expect_event` arms itself by reading
    /// this before running the triggering action.
    pub fn current_seq(&self) -> u64 {
        self.inner.seq.load(Ordering::SeqCst)
    }

    fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }

    /// Drop all buffers and listener registrations. Listeners spawned for
    /// the previous context observe the generation bump and stop.
    pub fn reset(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.inner.attached.lock().clear();
        self.clear_buffers();
    }

    pub fn clear_buffers(&self) {
        self.inner.dialogs.lock().clear();
        self.inner.downloads.lock().clear();
        self.inner.popups.lock().clear();
        self.inner.console.lock().clear();
        self.inner.network.lock().clear();
    }

    /// Attach the full listener set to a page. Safe to call repeatedly;
    /// only the first call per target does anything.
    pub async fn attach_page(&self, page: &Page, page_id: i64) {
        let target = page.target_id().inner().clone();
        {
            let mut attached = self.inner.attached.lock();
            if !attached.insert(target.clone()) {
                return;
            }
        }
        debug!(page_id, target = %target, "attaching event listeners");
        let generation = self.generation();

        self.spawn_dialog_listener(page, page_id, generation).await;
        self.spawn_popup_listener(page, page_id, generation).await;
        self.spawn_console_listeners(page, page_id, generation).await;
        self.spawn_network_listeners(page, page_id, generation).await;
        self.spawn_download_listeners(page, page_id, generation).await;
    }

    // ---------------------------------------------------------------- dialogs

    async fn spawn_dialog_listener(&self, page: &Page, page_id: i64, generation: u64) {
        let stream = match page.event_listener::<EventJavascriptDialogOpening>().await {
            Ok(s) => s,
            Err(e) => {
                warn!("dialog listener unavailable: {e}");
                return;
            }
        };
        let plane = self.clone();
        let dismiss_page = page.clone();
        tokio::spawn(async move {
            let mut stream = stream;
            while let Some(event) = stream.next().await {
                if plane.generation() != generation {
                    return;
                }
                let id = plane.inner.dialog_seq.fetch_add(1, Ordering::SeqCst) + 1;
                let dialog_id = format!("dlg-{id}");
                let record = DialogRecord {
                    dialog_id: dialog_id.clone(),
                    seq: plane.next_seq(),
                    page_id,
                    kind: format!("{:?}", event.r#type).to_lowercase(),
                    message: event.message.clone(),
                    default_value: event.default_prompt.clone(),
                    status: DialogStatus::Pending,
                    prompt_value: None,
                    opened_at: chrono::Utc::now(),
                    resolved_at: None,
                };
                debug!(dialog = %dialog_id, kind = %record.kind, "dialog opened");
                plane.inner.dialogs.lock().push(record);

                // Unhandled dialogs block the page; dismiss after the
                // grace period unless a tool resolved them first.
                let plane_timer = plane.clone();
                let timer_id = dialog_id.clone();
                let timer_page = dismiss_page.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(DIALOG_AUTO_DISMISS).await;
                    let still_pending = {
                        let mut dialogs = plane_timer.inner.dialogs.lock();
                        match dialogs.find_mut(|d| d.dialog_id == timer_id) {
                            Some(d) if d.status == DialogStatus::Pending => {
                                d.status = DialogStatus::AutoDismissed;
                                d.resolved_at = Some(chrono::Utc::now());
                                true
                            }
                            _ => false,
                        }
                    };
                    if still_pending {
                        debug!(dialog = %timer_id, "auto-dismissing stale dialog");
                        if let Ok(params) =
                            HandleJavaScriptDialogParams::builder().accept(false).build()
                        {
                            if let Err(e) = timer_page.execute(params).await {
                                trace!("auto-dismiss failed (dialog likely gone): {e}");
                            }
                        }
                    }
                });
            }
        });
    }

    pub fn list_dialogs(&self, pending_only: bool) -> Vec<DialogRecord> {
        self.inner
            .dialogs
            .lock()
            .iter()
            .filter(|d| !pending_only || d.status == DialogStatus::Pending)
            .cloned()
            .collect()
    }

    pub fn get_dialog(&self, dialog_id: &str) -> Result<DialogRecord, ToolError> {
        self.inner
            .dialogs
            .lock()
            .find(|d| d.dialog_id == dialog_id)
            .cloned()
            .ok_or_else(|| ToolError::not_found(format!("dialog {dialog_id} not found")))
    }

    /// Transition a pending dialog to a terminal state. Returns the updated
    /// record, or the previously recorded resolution when the dialog was
    /// already resolved (idempotent handling, no error).
    pub fn resolve_dialog(
        &self,
        dialog_id: &str,
        status: DialogStatus,
        prompt_value: Option<String>,
    ) -> Result<DialogRecord, ToolError> {
        let mut dialogs = self.inner.dialogs.lock();
        let record = dialogs
            .find_mut(|d| d.dialog_id == dialog_id)
            .ok_or_else(|| ToolError::not_found(format!("dialog {dialog_id} not found")))?;
        if record.status.is_terminal() {
            return Ok(record.clone());
        }
        record.status = status;
        record.prompt_value = prompt_value;
        record.resolved_at = Some(chrono::Utc::now());
        Ok(record.clone())
    }

    // -------------------------------------------------------------- downloads

    async fn spawn_download_listeners(&self, page: &Page, page_id: i64, generation: u64) {
        match page.event_listener::<EventDownloadWillBegin>().await {
            Ok(mut stream) => {
                let plane = self.clone();
                tokio::spawn(async move {
                    while let Some(event) = stream.next().await {
                        if plane.generation() != generation {
                            return;
                        }
                        let id = plane.inner.download_seq.fetch_add(1, Ordering::SeqCst) + 1;
                        let download_id = format!("dl-{id}");
                        let temp_path = plane.inner.download_dir.join(event.guid.clone());
                        debug!(download = %download_id, file = %event.suggested_filename, "download started");
                        plane.inner.downloads.lock().push(DownloadRecord {
                            download_id,
                            seq: plane.next_seq(),
                            page_id,
                            guid: event.guid.clone(),
                            url: event.url.clone(),
                            suggested_filename: event.suggested_filename.clone(),
                            state: DownloadState::InProgress,
                            received_bytes: 0,
                            total_bytes: None,
                            captured_at: chrono::Utc::now(),
                            consumed: false,
                            saved_path: None,
                            temp_path,
                        });
                    }
                });
            }
            Err(e) => warn!("download listener unavailable: {e}"),
        }

        match page.event_listener::<EventDownloadProgress>().await {
            Ok(mut stream) => {
                let plane = self.clone();
                tokio::spawn(async move {
                    while let Some(event) = stream.next().await {
                        if plane.generation() != generation {
                            return;
                        }
                        let mut downloads = plane.inner.downloads.lock();
                        if let Some(record) = downloads.find_mut(|d| d.guid == event.guid) {
                            record.received_bytes = event.received_bytes as u64;
                            record.total_bytes = Some(event.total_bytes as u64);
                            record.state = match format!("{:?}", event.state).as_str() {
                                "Completed" => DownloadState::Completed,
                                "Canceled" => DownloadState::Canceled,
                                _ => DownloadState::InProgress,
                            };
                        }
                    }
                });
            }
            Err(e) => warn!("download-progress listener unavailable: {e}"),
        }
    }

    pub fn list_downloads(&self) -> Vec<DownloadRecord> {
        self.inner.downloads.lock().iter().cloned().collect()
    }

    pub fn get_download(&self, download_id: &str) -> Result<DownloadRecord, ToolError> {
        self.inner
            .downloads
            .lock()
            .find(|d| d.download_id == download_id)
            .cloned()
            .ok_or_else(|| ToolError::not_found(format!("download {download_id} not found")))
    }

    /// Wait for the next unconsumed download record. With `peek` the record
    /// stays available for later waits; otherwise it is consumed.
    pub async fn wait_for_download(
        &self,
        timeout: Duration,
        peek: bool,
    ) -> Result<DownloadRecord, ToolError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            {
                let mut downloads = self.inner.downloads.lock();
                if let Some(record) = downloads.find_mut(|d| !d.consumed) {
                    if !peek {
                        record.consumed = true;
                    }
                    return Ok(record.clone());
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(ToolError::timeout(format!(
                    "no download captured within {} ms",
                    timeout.as_millis()
                )));
            }
            tokio::time::sleep(DOWNLOAD_POLL).await;
        }
    }

    /// Wait until a download's bytes are fully on disk.
    pub async fn wait_download_completed(
        &self,
        download_id: &str,
        timeout: Duration,
    ) -> Result<DownloadRecord, ToolError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let record = self.get_download(download_id)?;
            match record.state {
                DownloadState::Completed => return Ok(record),
                DownloadState::Canceled => {
                    return Err(ToolError::not_found(format!(
                        "download {download_id} was canceled by the browser"
                    )));
                }
                DownloadState::InProgress => {
                    if tokio::time::Instant::now() >= deadline {
                        return Err(ToolError::timeout(format!(
                            "download {download_id} did not complete within {} ms",
                            timeout.as_millis()
                        )));
                    }
                    tokio::time::sleep(DOWNLOAD_POLL).await;
                }
            }
        }
    }

    pub fn mark_download_saved(&self, download_id: &str, path: &str) {
        let mut downloads = self.inner.downloads.lock();
        if let Some(record) = downloads.find_mut(|d| d.download_id == download_id) {
            record.saved_path = Some(path.to_string());
        }
    }

    // ----------------------------------------------------------------- popups

    async fn spawn_popup_listener(&self, page: &Page, page_id: i64, generation: u64) {
        let stream = match page.event_listener::<EventWindowOpen>().await {
            Ok(s) => s,
            Err(e) => {
                warn!("popup listener unavailable: {e}");
                return;
            }
        };
        let plane = self.clone();
        tokio::spawn(async move {
            let mut stream = stream;
            while let Some(event) = stream.next().await {
                if plane.generation() != generation {
                    return;
                }
                let id = plane.inner.popup_seq.fetch_add(1, Ordering::SeqCst) + 1;
                let popup_id = format!("pop-{id}");
                debug!(popup = %popup_id, url = %event.url, "window.open captured");
                plane.inner.popups.lock().push(PopupRecord {
                    popup_id,
                    seq: plane.next_seq(),
                    opener_page_id: page_id,
                    page_id: None,
                    url: event.url.clone(),
                    captured_at: chrono::Utc::now(),
                    consumed: false,
                });
            }
        });
    }

    pub fn list_popups(&self) -> Vec<PopupRecord> {
        self.inner.popups.lock().iter().cloned().collect()
    }

    /// Next unconsumed popup record, if any.
    pub fn next_popup(&self, peek: bool) -> Option<PopupRecord> {
        let mut popups = self.inner.popups.lock();
        let record = popups.find_mut(|p| !p.consumed)?;
        if !peek {
            record.consumed = true;
        }
        Some(record.clone())
    }

    /// Bind a popup record to the page id it resolved to.
    pub fn bind_popup_page(&self, popup_id: &str, page_id: i64) {
        let mut popups = self.inner.popups.lock();
        if let Some(record) = popups.find_mut(|p| p.popup_id == popup_id) {
            record.page_id = Some(page_id);
        }
    }

    // ---------------------------------------------------------------- console

    async fn spawn_console_listeners(&self, page: &Page, page_id: i64, generation: u64) {
        if let Err(e) = page
            .execute(chromiumoxide::cdp::js_protocol::runtime::EnableParams::default())
            .await
        {
            warn!("Runtime.enable failed, console capture degraded: {e}");
        }

        match page.event_listener::<EventConsoleApiCalled>().await {
            Ok(mut stream) => {
                let plane = self.clone();
                tokio::spawn(async move {
                    while let Some(event) = stream.next().await {
                        if plane.generation() != generation {
                            return;
                        }
                        let text = event
                            .args
                            .iter()
                            .map(|arg| {
                                arg.value
                                    .as_ref()
                                    .map(|v| match v {
                                        Value::String(s) => s.clone(),
                                        other => other.to_string(),
                                    })
                                    .or_else(|| arg.description.clone())
                                    .unwrap_or_default()
                            })
                            .collect::<Vec<_>>()
                            .join(" ");
                        let id = plane.inner.console_seq.fetch_add(1, Ordering::SeqCst) + 1;
                        plane.inner.console.lock().push(ConsoleRecord {
                            message_id: format!("log-{id}"),
                            seq: plane.next_seq(),
                            page_id,
                            level: format!("{:?}", event.r#type).to_lowercase(),
                            text,
                            source: "console".into(),
                            url: None,
                            line: None,
                            captured_at: chrono::Utc::now(),
                        });
                    }
                });
            }
            Err(e) => warn!("console listener unavailable: {e}"),
        }

        match page.event_listener::<EventExceptionThrown>().await {
            Ok(mut stream) => {
                let plane = self.clone();
                tokio::spawn(async move {
                    while let Some(event) = stream.next().await {
                        if plane.generation() != generation {
                            return;
                        }
                        let details = &event.exception_details;
                        let text = details
                            .exception
                            .as_ref()
                            .and_then(|e| e.description.clone())
                            .unwrap_or_else(|| details.text.clone());
                        let id = plane.inner.console_seq.fetch_add(1, Ordering::SeqCst) + 1;
                        plane.inner.console.lock().push(ConsoleRecord {
                            message_id: format!("log-{id}"),
                            seq: plane.next_seq(),
                            page_id,
                            level: "error".into(),
                            text,
                            source: "exception".into(),
                            url: details.url.clone(),
                            line: Some(details.line_number),
                            captured_at: chrono::Utc::now(),
                        });
                    }
                });
            }
            Err(e) => warn!("exception listener unavailable: {e}"),
        }
    }

    pub fn console_tail(&self, limit: usize, level: Option<&str>) -> Vec<ConsoleRecord> {
        let console = self.inner.console.lock();
        let mut out: Vec<ConsoleRecord> = console
            .iter()
            .rev()
            .filter(|r| level.is_none_or(|l| r.level == l))
            .take(limit)
            .cloned()
            .collect();
        out.reverse();
        out
    }

    // ---------------------------------------------------------------- network

    async fn spawn_network_listeners(&self, page: &Page, page_id: i64, generation: u64) {
        if let Err(e) = page
            .execute(chromiumoxide::cdp::browser_protocol::network::EnableParams::default())
            .await
        {
            warn!("Network.enable failed, request capture degraded: {e}");
        }

        match page.event_listener::<EventRequestWillBeSent>().await {
            Ok(mut stream) => {
                let plane = self.clone();
                tokio::spawn(async move {
                    while let Some(event) = stream.next().await {
                        if plane.generation() != generation {
                            return;
                        }
                        let id = plane.inner.network_seq.fetch_add(1, Ordering::SeqCst) + 1;
                        plane.inner.network.lock().push(NetworkRecord {
                            request_id: format!("req-{id}"),
                            seq: plane.next_seq(),
                            page_id,
                            cdp_request_id: event.request_id.inner().clone(),
                            url: event.request.url.clone(),
                            method: event.request.method.clone(),
                            resource_type: event.r#type.as_ref().map(|t| format!("{t:?}")),
                            status: None,
                            mime_type: None,
                            finished: false,
                            failure: None,
                            encoded_data_length: None,
                            started_at: chrono::Utc::now(),
                        });
                    }
                });
            }
            Err(e) => warn!("request listener unavailable: {e}"),
        }

        match page.event_listener::<EventResponseReceived>().await {
            Ok(mut stream) => {
                let plane = self.clone();
                tokio::spawn(async move {
                    while let Some(event) = stream.next().await {
                        if plane.generation() != generation {
                            return;
                        }
                        let mut network = plane.inner.network.lock();
                        if let Some(record) =
                            network.find_mut(|r| r.cdp_request_id == *event.request_id.inner())
                        {
                            record.status = Some(event.response.status);
                            record.mime_type = Some(event.response.mime_type.clone());
                        }
                    }
                });
            }
            Err(e) => warn!("response listener unavailable: {e}"),
        }

        match page.event_listener::<EventLoadingFinished>().await {
            Ok(mut stream) => {
                let plane = self.clone();
                tokio::spawn(async move {
                    while let Some(event) = stream.next().await {
                        if plane.generation() != generation {
                            return;
                        }
                        let mut network = plane.inner.network.lock();
                        if let Some(record) =
                            network.find_mut(|r| r.cdp_request_id == *event.request_id.inner())
                        {
                            record.finished = true;
                            record.encoded_data_length = Some(event.encoded_data_length as u64);
                        }
                    }
                });
            }
            Err(e) => warn!("loading-finished listener unavailable: {e}"),
        }

        match page.event_listener::<EventLoadingFailed>().await {
            Ok(mut stream) => {
                let plane = self.clone();
                tokio::spawn(async move {
                    while let Some(event) = stream.next().await {
                        if plane.generation() != generation {
                            return;
                        }
                        let mut network = plane.inner.network.lock();
                        if let Some(record) =
                            network.find_mut(|r| r.cdp_request_id == *event.request_id.inner())
                        {
                            record.finished = true;
                            record.failure = Some(event.error_text.clone());
                        }
                    }
                });
            }
            Err(e) => warn!("loading-failed listener unavailable: {e}"),
        }
    }

    pub fn network_tail(&self, limit: usize, url_filter: Option<&str>) -> Vec<NetworkRecord> {
        let network = self.inner.network.lock();
        let mut out: Vec<NetworkRecord> = network
            .iter()
            .rev()
            .filter(|r| url_filter.is_none_or(|f| r.url.contains(f)))
            .take(limit)
            .cloned()
            .collect();
        out.reverse();
        out
    }

    pub fn get_network(&self, request_id: &str) -> Result<NetworkRecord, ToolError> {
        self.inner
            .network
            .lock()
            .find(|r| r.request_id == request_id)
            .cloned()
            .ok_or_else(|| {
                ToolError::not_found(format!(
                    "request {request_id} not found (it may have been evicted)"
                ))
            })
    }

    // ------------------------------------------------------------ expect_event

    /// Find the first record of `kind` with `seq > min_seq` matching the
    /// query. Used by `browser.expect_event` after arming.
    pub fn find_event_since(
        &self,
        kind: EventKind,
        min_seq: u64,
        query: &EventQuery,
    ) -> Option<Value> {
        match kind {
            EventKind::Dialog => self
                .inner
                .dialogs
                .lock()
                .find(|d| d.seq > min_seq && query.matches_text(&d.message))
                .map(|d| serde_json::to_value(d).unwrap_or(Value::Null)),
            EventKind::Download => self
                .inner
                .downloads
                .lock()
                .find(|d| d.seq > min_seq && query.matches_text(&d.url))
                .map(|d| serde_json::to_value(d).unwrap_or(Value::Null)),
            EventKind::Popup => self
                .inner
                .popups
                .lock()
                .find(|p| p.seq > min_seq && query.matches_text(&p.url))
                .map(|p| serde_json::to_value(p).unwrap_or(Value::Null)),
            EventKind::Console => self
                .inner
                .console
                .lock()
                .find(|c| c.seq > min_seq && query.matches_text(&c.text))
                .map(|c| serde_json::to_value(c).unwrap_or(Value::Null)),
            EventKind::Network => self
                .inner
                .network
                .lock()
                .find(|r| {
                    r.seq > min_seq
                        && query.matches_text(&r.url)
                        && query.status.is_none_or(|s| r.status == Some(s))
                        && query
                            .method
                            .as_deref()
                            .is_none_or(|m| r.method.eq_ignore_ascii_case(m))
                })
                .map(|r| serde_json::to_value(r).unwrap_or(Value::Null)),
        }
    }

    /// Record a dialog directly. Test-only seam for the state machine and
    /// eviction properties.
    #[cfg(test)]
    pub fn push_dialog_for_test(&self, page_id: i64, kind: &str, message: &str) -> String {
        let id = self.inner.dialog_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let dialog_id = format!("dlg-{id}");
        self.inner.dialogs.lock().push(DialogRecord {
            dialog_id: dialog_id.clone(),
            seq: self.next_seq(),
            page_id,
            kind: kind.into(),
            message: message.into(),
            default_value: None,
            status: DialogStatus::Pending,
            prompt_value: None,
            opened_at: chrono::Utc::now(),
            resolved_at: None,
        });
        dialog_id
    }

    #[cfg(test)]
    pub fn push_network_for_test(&self, page_id: i64, url: &str, method: &str, status: Option<i64>) -> String {
        let id = self.inner.network_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let request_id = format!("req-{id}");
        self.inner.network.lock().push(NetworkRecord {
            request_id: request_id.clone(),
            seq: self.next_seq(),
            page_id,
            cdp_request_id: format!("cdp-{id}"),
            url: url.into(),
            method: method.into(),
            resource_type: None,
            status,
            mime_type: None,
            finished: status.is_some(),
            failure: None,
            encoded_data_length: None,
            started_at: chrono::Utc::now(),
        });
        request_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plane() -> EventPlane {
        EventPlane::new(std::env::temp_dir())
    }

    #[test]
    fn dialog_resolution_is_single_shot() {
        let plane = plane();
        let id = plane.push_dialog_for_test(1, "prompt", "name?");

        let resolved = plane
            .resolve_dialog(&id, DialogStatus::Accepted, Some("Ada".into()))
            .unwrap();
        assert_eq!(resolved.status, DialogStatus::Accepted);
        assert_eq!(resolved.prompt_value.as_deref(), Some("Ada"));

        // A second transition attempt is a no-op returning the recorded
        // resolution.
        let again = plane.resolve_dialog(&id, DialogStatus::Dismissed, None).unwrap();
        assert_eq!(again.status, DialogStatus::Accepted);
        assert_eq!(again.prompt_value.as_deref(), Some("Ada"));
    }

    #[test]
    fn pending_filter_hides_resolved_dialogs() {
        let plane = plane();
        let a = plane.push_dialog_for_test(1, "alert", "hello");
        let _b = plane.push_dialog_for_test(1, "confirm", "sure?");
        plane.resolve_dialog(&a, DialogStatus::Dismissed, None).unwrap();

        assert_eq!(plane.list_dialogs(true).len(), 1);
        assert_eq!(plane.list_dialogs(false).len(), 2);
    }

    #[test]
    fn evicted_network_record_is_not_found() {
        let plane = plane();
        let first = plane.push_network_for_test(1, "https://a.test/", "GET", Some(200));
        for i in 0..NETWORK_CAPACITY {
            plane.push_network_for_test(1, &format!("https://x.test/{i}"), "GET", Some(200));
        }
        let err = plane.get_network(&first).unwrap_err();
        assert_eq!(err.code(), crate::envelope::error::ErrorCode::NotFound);
    }

    #[test]
    fn expect_event_only_sees_records_after_the_watermark() {
        let plane = plane();
        plane.push_network_for_test(1, "https://old.test/api", "GET", Some(200));
        let mark = plane.current_seq();
        plane.push_network_for_test(1, "https://new.test/api", "POST", Some(201));

        let query = EventQuery { pattern: Some("api".into()), ..Default::default() };
        let hit = plane.find_event_since(EventKind::Network, mark, &query).unwrap();
        assert_eq!(hit["url"], serde_json::json!("https://new.test/api"));
    }

    #[test]
    fn network_match_on_status_and_method() {
        let plane = plane();
        plane.push_network_for_test(1, "https://a.test/x", "POST", Some(404));
        let query = EventQuery {
            pattern: Some("a.test".into()),
            status: Some(404),
            method: Some("post".into()),
            ..Default::default()
        };
        assert!(plane.find_event_since(EventKind::Network, 0, &query).is_some());

        let wrong_status = EventQuery { status: Some(200), ..Default::default() };
        assert!(plane.find_event_since(EventKind::Network, 0, &wrong_status).is_none());
    }

    #[test]
    fn regex_matching_when_enabled() {
        let plane = plane();
        plane.push_network_for_test(1, "https://api.test/v2/items", "GET", Some(200));
        let query = EventQuery {
            regex: Some(regex::Regex::new(r"/v\d+/items$").unwrap()),
            ..Default::default()
        };
        assert!(plane.find_event_since(EventKind::Network, 0, &query).is_some());
    }

    #[test]
    fn reset_clears_buffers_and_bumps_generation() {
        let plane = plane();
        plane.push_dialog_for_test(1, "alert", "x");
        let generation = plane.inner.generation.load(Ordering::SeqCst);
        plane.reset();
        assert!(plane.list_dialogs(false).is_empty());
        assert_eq!(plane.inner.generation.load(Ordering::SeqCst), generation + 1);
    }
}
