//! Fingerprint configuration injected as `window.__relayFp` before the
//! evasion scripts run.

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StealthConfig {
    pub platform: String,
    pub vendor: String,
    pub language: String,
    pub languages: Vec<String>,
    pub hardware_concurrency: u32,
    pub webgl_vendor: String,
    pub webgl_renderer: String,
    /// Per-session hex seed for deterministic canvas noise.
    pub session_seed: String,
}

impl Default for StealthConfig {
    fn default() -> Self {
        let seed: Vec<u8> = (0..16).map(|_| rand::random::<u8>()).collect();
        Self {
            platform: "Linux x86_64".into(),
            vendor: "Google Inc.".into(),
            language: "en-US".into(),
            languages: vec!["en-US".into(), "en".into()],
            hardware_concurrency: 8,
            webgl_vendor: "Google Inc. (Intel)".into(),
            webgl_renderer: "ANGLE (Intel, Mesa Intel(R) UHD Graphics, OpenGL 4.6)".into(),
            session_seed: hex::encode(seed),
        }
    }
}
