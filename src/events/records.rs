//! Event record types materialized from browser events
//!
//! Every record carries a typed id (`dlg-`, `dl-`, `pop-`, `req-`, `log-`)
//! from a per-session autoincrementing counter, plus a global sequence
//! number used by `browser.expect_event` to distinguish events that arrived
//! after an armed action.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Dialog lifecycle per the state machine: `pending` transitions exactly
/// once to one of the terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DialogStatus {
    Pending,
    Accepted,
    Dismissed,
    AutoDismissed,
    Error,
}

impl DialogStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DialogRecord {
    pub dialog_id: String,
    #[serde(skip)]
    pub seq: u64,
    pub page_id: i64,
    /// alert | confirm | prompt | beforeunload
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    pub status: DialogStatus,
    /// Prompt text submitted on accept.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_value: Option<String>,
    pub opened_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DownloadState {
    InProgress,
    Completed,
    Canceled,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRecord {
    pub download_id: String,
    #[serde(skip)]
    pub seq: u64,
    pub page_id: i64,
    #[serde(skip)]
    pub guid: String,
    pub url: String,
    pub suggested_filename: String,
    pub state: DownloadState,
    pub received_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_bytes: Option<u64>,
    pub captured_at: DateTime<Utc>,
    /// Flipped by a non-peek `wait_for_download`; per-record, not per-wait.
    pub consumed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saved_path: Option<String>,
    /// Where the browser wrote the bytes (downloads dir, named by guid).
    #[serde(skip)]
    pub temp_path: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PopupRecord {
    pub popup_id: String,
    #[serde(skip)]
    pub seq: u64,
    pub opener_page_id: i64,
    /// Filled once the popup's page is attached to the page manager.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_id: Option<i64>,
    pub url: String,
    pub captured_at: DateTime<Utc>,
    pub consumed: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleRecord {
    pub message_id: String,
    #[serde(skip)]
    pub seq: u64,
    pub page_id: i64,
    /// log | warn | error | debug | info | ...
    pub level: String,
    pub text: String,
    /// console | exception
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<i64>,
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkRecord {
    pub request_id: String,
    #[serde(skip)]
    pub seq: u64,
    pub page_id: i64,
    #[serde(skip)]
    pub cdp_request_id: String,
    pub url: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    pub finished: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoded_data_length: Option<u64>,
    pub started_at: DateTime<Utc>,
}
