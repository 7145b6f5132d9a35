//! Environment configuration: alias precedence, clamping, and profile-path
//! normalization. Environment mutation is process-global, so everything
//! runs in one test.

use browser_relay::ServerConfig;
use browser_relay::config::{MAX_MAX_RESPONSE_BYTES, MIN_MAX_RESPONSE_BYTES};

fn clear_env() {
    for key in [
        "HEADLESS", "STEALTH", "CHANNEL", "EXECUTABLE_PATH", "USER_DATA_DIR",
        "PROFILE_DIRECTORY", "CDP_ENDPOINT", "CDP_PORT", "FORCE_CDP", "REQUIRE_PROFILE",
        "ALLOW_EVALUATE", "EVALUATE_ALLOW_ORIGINS", "CAPTURE_PROFILE", "MAX_RESPONSE_BYTES",
        "INPUT_DIR", "OUTPUT_DIR", "LOG_DIR",
    ] {
        unsafe {
            std::env::remove_var(key);
            std::env::remove_var(format!("BROWSER_RELAY_{key}"));
        }
    }
}

#[test]
fn environment_loading_end_to_end() {
    clear_env();

    // Defaults.
    let config = ServerConfig::from_env();
    assert!(config.headless);
    assert!(!config.stealth);
    assert!(!config.allow_evaluate);
    assert_eq!(config.max_response_bytes, 280_000);
    assert_eq!(config.capture_profile.as_str(), "light");

    // Prefixed alias wins over the primary name.
    unsafe {
        std::env::set_var("HEADLESS", "true");
        std::env::set_var("BROWSER_RELAY_HEADLESS", "false");
    }
    let config = ServerConfig::from_env();
    assert!(!config.headless);

    // Ceiling clamping, both directions.
    unsafe { std::env::set_var("MAX_RESPONSE_BYTES", "1") };
    assert_eq!(ServerConfig::from_env().max_response_bytes, MIN_MAX_RESPONSE_BYTES);
    unsafe { std::env::set_var("MAX_RESPONSE_BYTES", "99999999") };
    assert_eq!(ServerConfig::from_env().max_response_bytes, MAX_MAX_RESPONSE_BYTES);
    unsafe { std::env::set_var("MAX_RESPONSE_BYTES", "50000") };
    assert_eq!(ServerConfig::from_env().max_response_bytes, 50_000);

    // Origins list parsing.
    unsafe {
        std::env::set_var("ALLOW_EVALUATE", "yes");
        std::env::set_var("EVALUATE_ALLOW_ORIGINS", "https://a.test, https://b.test/ ,");
    }
    let config = ServerConfig::from_env();
    assert!(config.allow_evaluate);
    assert_eq!(config.evaluate_allow_origins, vec!["https://a.test", "https://b.test"]);

    // Profile subfolder normalization.
    unsafe { std::env::set_var("USER_DATA_DIR", "/tmp/relay-profiles/chrome/Default") };
    let config = ServerConfig::from_env();
    assert_eq!(config.user_data_dir.as_deref(), Some(std::path::Path::new("/tmp/relay-profiles/chrome")));
    assert_eq!(config.profile_directory.as_deref(), Some("Default"));

    // Explicit PROFILE_DIRECTORY overrides the inferred one.
    unsafe { std::env::set_var("PROFILE_DIRECTORY", "Profile 3") };
    let config = ServerConfig::from_env();
    assert_eq!(config.profile_directory.as_deref(), Some("Profile 3"));

    // Capture profile selection with a bad value falling back to light.
    unsafe { std::env::set_var("CAPTURE_PROFILE", "balanced") };
    assert_eq!(ServerConfig::from_env().capture_profile.as_str(), "balanced");
    unsafe { std::env::set_var("CAPTURE_PROFILE", "turbo") };
    assert_eq!(ServerConfig::from_env().capture_profile.as_str(), "light");

    clear_env();
}
