//! Environment-variable configuration loading
//!
//! Every key is recognized under two names: the primary (e.g. `HEADLESS`)
//! and a `BROWSER_RELAY_`-prefixed alias (e.g. `BROWSER_RELAY_HEADLESS`).
//! The alias wins when both are set; some hosts strip or rewrite unprefixed
//! environment keys, so the alias is the survivable spelling.

use std::path::PathBuf;

use tracing::warn;

use super::types::{
    DEFAULT_MAX_RESPONSE_BYTES, MAX_MAX_RESPONSE_BYTES, MIN_MAX_RESPONSE_BYTES, ServerConfig,
};
use crate::capture::CaptureProfile;

const ENV_PREFIX: &str = "BROWSER_RELAY_";

fn lookup(name: &str) -> Option<String> {
    std::env::var(format!("{ENV_PREFIX}{name}"))
        .or_else(|_| std::env::var(name))
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn lookup_bool(name: &str, default: bool) -> bool {
    match lookup(name) {
        Some(raw) => match raw.to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            other => {
                warn!("Unrecognized boolean value for {}: '{}', using {}", name, other, default);
                default
            }
        },
        None => default,
    }
}

fn lookup_path(name: &str) -> Option<PathBuf> {
    lookup(name).map(PathBuf::from)
}

/// Split a `user_data_dir` that points inside a profile subfolder into the
/// profile root and the profile directory name.
fn normalize_user_data_dir(dir: PathBuf) -> (PathBuf, Option<String>) {
    let Some(name) = dir.file_name().and_then(|n| n.to_str()) else {
        return (dir, None);
    };
    let is_profile_component = name == "Default" || name.starts_with("Profile ");
    if is_profile_component {
        if let Some(parent) = dir.parent() {
            return (parent.to_path_buf(), Some(name.to_string()));
        }
    }
    (dir, None)
}

impl ServerConfig {
    /// Assemble configuration from the environment, applying defaults,
    /// normalization, and clamping.
    pub fn from_env() -> Self {
        let (user_data_dir, inferred_profile) = match lookup_path("USER_DATA_DIR") {
            Some(dir) => {
                let (root, profile) = normalize_user_data_dir(dir);
                (Some(root), profile)
            }
            None => (None, None),
        };
        let profile_directory = lookup("PROFILE_DIRECTORY").or(inferred_profile);

        let max_response_bytes = lookup("MAX_RESPONSE_BYTES")
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(DEFAULT_MAX_RESPONSE_BYTES)
            .clamp(MIN_MAX_RESPONSE_BYTES, MAX_MAX_RESPONSE_BYTES);

        let capture_profile = lookup("CAPTURE_PROFILE")
            .and_then(|v| {
                let parsed = CaptureProfile::parse(&v);
                if parsed.is_none() {
                    warn!("Unknown CAPTURE_PROFILE '{}', defaulting to light", v);
                }
                parsed
            })
            .unwrap_or(CaptureProfile::Light);

        let evaluate_allow_origins = lookup("EVALUATE_ALLOW_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim().trim_end_matches('/').to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let data_root = dirs::data_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("browser-relay");

        Self {
            headless: lookup_bool("HEADLESS", true),
            stealth: lookup_bool("STEALTH", false),
            channel: lookup("CHANNEL"),
            executable_path: lookup_path("EXECUTABLE_PATH"),
            user_data_dir,
            profile_directory,
            cdp_endpoint: lookup("CDP_ENDPOINT"),
            cdp_port: lookup("CDP_PORT").and_then(|v| v.parse().ok()),
            force_cdp: lookup_bool("FORCE_CDP", false),
            require_profile: lookup_bool("REQUIRE_PROFILE", false),
            allow_evaluate: lookup_bool("ALLOW_EVALUATE", false),
            evaluate_allow_origins,
            capture_profile,
            max_response_bytes,
            input_dir: lookup_path("INPUT_DIR").unwrap_or_else(|| data_root.join("input")),
            output_dir: lookup_path("OUTPUT_DIR").unwrap_or_else(|| data_root.join("output")),
            log_dir: lookup_path("LOG_DIR").unwrap_or_else(|| data_root.join("logs")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_subfolder_is_normalized() {
        let (root, profile) = normalize_user_data_dir(PathBuf::from("/home/u/.config/chromium/Default"));
        assert_eq!(root, PathBuf::from("/home/u/.config/chromium"));
        assert_eq!(profile.as_deref(), Some("Default"));

        let (root, profile) = normalize_user_data_dir(PathBuf::from("/data/chrome/Profile 2"));
        assert_eq!(root, PathBuf::from("/data/chrome"));
        assert_eq!(profile.as_deref(), Some("Profile 2"));
    }

    #[test]
    fn plain_profile_root_is_untouched() {
        let (root, profile) = normalize_user_data_dir(PathBuf::from("/data/chrome"));
        assert_eq!(root, PathBuf::from("/data/chrome"));
        assert!(profile.is_none());
    }
}
