use std::sync::{Mutex, MutexGuard};

use super::*;

static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Serializes the tests in this file that touch process env.
fn env_lock() -> MutexGuard<'static, ()> {
    ENV_LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// # Safety
/// Caller must hold `env_lock()`.
unsafe fn clear_session_env() {
    unsafe {
        std::env::remove_var("VULNSCAN_BASE_URL");
        std::env::remove_var("VULNSCAN_STATE_DIR");
        std::env::remove_var("VULNSCAN_REQUEST_TIMEOUT_SECS");
        std::env::remove_var("VULNSCAN_CONNECT_TIMEOUT_SECS");
    }
}

#[test]
fn from_env_defaults() {
    let _guard = env_lock();
    unsafe { clear_session_env() };

    let cfg = SessionConfig::from_env();
    assert_eq!(cfg.base_url, DEFAULT_BASE_URL);
    assert_eq!(cfg.state_dir, PathBuf::from(DEFAULT_STATE_DIR));
    assert_eq!(
        cfg.timeouts,
        HttpTimeouts { request_secs: DEFAULT_REQUEST_TIMEOUT_SECS, connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS }
    );
}

#[test]
fn from_env_parses_overrides() {
    let _guard = env_lock();
    unsafe {
        clear_session_env();
        std::env::set_var("VULNSCAN_BASE_URL", "https://scan.example.test/");
        std::env::set_var("VULNSCAN_STATE_DIR", "/tmp/vulnscan-state");
        std::env::set_var("VULNSCAN_REQUEST_TIMEOUT_SECS", "42");
        std::env::set_var("VULNSCAN_CONNECT_TIMEOUT_SECS", "7");
    }

    let cfg = SessionConfig::from_env();
    assert_eq!(cfg.base_url, "https://scan.example.test");
    assert_eq!(cfg.state_dir, PathBuf::from("/tmp/vulnscan-state"));
    assert_eq!(cfg.timeouts, HttpTimeouts { request_secs: 42, connect_secs: 7 });

    unsafe { clear_session_env() };
}

#[test]
fn from_env_invalid_timeout_falls_back() {
    let _guard = env_lock();
    unsafe {
        clear_session_env();
        std::env::set_var("VULNSCAN_REQUEST_TIMEOUT_SECS", "soon");
    }

    let cfg = SessionConfig::from_env();
    assert_eq!(cfg.timeouts.request_secs, DEFAULT_REQUEST_TIMEOUT_SECS);

    unsafe { clear_session_env() };
}

#[test]
fn endpoint_joins_without_double_slash() {
    let cfg = SessionConfig::new("http://host:8000/", ".state");
    assert_eq!(cfg.endpoint("/api/me"), "http://host:8000/api/me");
    assert_eq!(cfg.endpoint("api/login"), "http://host:8000/api/login");
}

#[test]
fn timeouts_convert_to_durations() {
    let t = HttpTimeouts { request_secs: 5, connect_secs: 2 };
    assert_eq!(t.request(), Duration::from_secs(5));
    assert_eq!(t.connect(), Duration::from_secs(2));
}
