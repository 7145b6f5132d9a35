//! Server configuration types
//!
//! All knobs are environment-driven; see [`super::env`] for the key table.

use std::path::PathBuf;

use serde::Serialize;

use crate::capture::CaptureProfile;

/// Hard response ceiling default and clamp bounds (bytes).
pub const DEFAULT_MAX_RESPONSE_BYTES: usize = 280_000;
pub const MIN_MAX_RESPONSE_BYTES: usize = 32_768;
pub const MAX_MAX_RESPONSE_BYTES: usize = 2_000_000;

/// Immutable server configuration assembled at startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Launch the browser without a GUI.
    pub headless: bool,
    /// Apply navigator/property masking init scripts to every new page.
    pub stealth: bool,
    /// Browser channel preference (`chrome`, `chromium`, `chrome-beta`, ...).
    pub channel: Option<String>,
    /// Explicit browser binary, overrides channel discovery.
    pub executable_path: Option<PathBuf>,
    /// Persistent profile root. Normalized when pointing inside a profile
    /// subfolder (the `Default`/`Profile N` component moves to
    /// `profile_directory`).
    pub user_data_dir: Option<PathBuf>,
    /// Profile subdirectory inside `user_data_dir`.
    pub profile_directory: Option<String>,
    /// Remote debugging websocket/http endpoint to attach to.
    pub cdp_endpoint: Option<String>,
    /// Remote debugging port on localhost, used when no endpoint is given.
    pub cdp_port: Option<u16>,
    /// Never launch; only attach over CDP.
    pub force_cdp: bool,
    /// Refuse to launch without a persistent profile.
    pub require_profile: bool,
    /// Enable the `browser.evaluate` tool.
    pub allow_evaluate: bool,
    /// Evaluate origin allowlist; exact origins or the literal `*`.
    pub evaluate_allow_origins: Vec<String>,
    /// Capture profile active at startup.
    pub capture_profile: CaptureProfile,
    /// Hard response ceiling in bytes, clamped to
    /// [`MIN_MAX_RESPONSE_BYTES`, `MAX_MAX_RESPONSE_BYTES`].
    pub max_response_bytes: usize,
    /// Read-only user-data input directory.
    pub input_dir: PathBuf,
    /// Shared output directory (downloads, extractor files, storage state).
    pub output_dir: PathBuf,
    /// Log directory.
    pub log_dir: PathBuf,
}

impl ServerConfig {
    /// Directory where captured downloads land before `save_download`
    /// copies them to a caller-chosen path.
    pub fn downloads_dir(&self) -> PathBuf {
        self.output_dir.join("downloads")
    }

    pub fn summary(&self) -> ConfigSummary {
        ConfigSummary {
            headless: self.headless,
            stealth: self.stealth,
            channel: self.channel.clone(),
            attach_only: self.force_cdp,
            cdp_endpoint: self.cdp_endpoint.clone(),
            persistent_profile: self.user_data_dir.is_some(),
            allow_evaluate: self.allow_evaluate,
            capture_profile: self.capture_profile.as_str().to_string(),
            max_response_bytes: self.max_response_bytes,
            output_dir: self.output_dir.display().to_string(),
        }
    }
}

/// Compact configuration digest reported by `browser.status`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSummary {
    pub headless: bool,
    pub stealth: bool,
    pub channel: Option<String>,
    pub attach_only: bool,
    pub cdp_endpoint: Option<String>,
    pub persistent_profile: bool,
    pub allow_evaluate: bool,
    pub capture_profile: String,
    pub max_response_bytes: usize,
    pub output_dir: String,
}
