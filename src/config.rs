use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::constants::{
    DEFAULT_FPS_CHECK_DELAY_MS, DEFAULT_FPS_CONFIRM_DELAY_MS, DEFAULT_FPS_THRESHOLD,
    DEFAULT_INIT_ATTEMPTS, DEFAULT_INIT_BACKOFF_MS, DEFAULT_LANGUAGE, DEFAULT_QUALITY_WINDOW,
    DEFAULT_SESSION_TIMEOUT_MS, DEFAULT_SOCKET_URL, DEFAULT_SUBMIT_TIMEOUT_SECS,
};

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub enable_file_logs: bool,
    pub log_dir: String,
    pub scan: ScanConfig,
    pub socket: SocketConfig,
    pub submit: SubmitConfig,
}

/// Tunables of a single scan session.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanConfig {
    pub quality_window: usize,
    pub fps_threshold: f64,
    pub fps_check_delay: Duration,
    pub fps_confirm_delay: Duration,
    pub session_timeout: Duration,
    pub init_attempts: u32,
    pub init_backoff: Duration,
    pub use_front_camera: bool,
    pub language: String,
}

#[derive(Clone)]
pub struct SocketConfig {
    pub url: String,
    pub auth_token: String,
}

#[derive(Debug, Clone)]
pub struct SubmitConfig {
    pub form_url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            quality_window: DEFAULT_QUALITY_WINDOW,
            fps_threshold: DEFAULT_FPS_THRESHOLD,
            fps_check_delay: Duration::from_millis(DEFAULT_FPS_CHECK_DELAY_MS),
            fps_confirm_delay: Duration::from_millis(DEFAULT_FPS_CONFIRM_DELAY_MS),
            session_timeout: Duration::from_millis(DEFAULT_SESSION_TIMEOUT_MS),
            init_attempts: DEFAULT_INIT_ATTEMPTS,
            init_backoff: Duration::from_millis(DEFAULT_INIT_BACKOFF_MS),
            use_front_camera: true,
            language: DEFAULT_LANGUAGE.to_string(),
        }
    }
}

impl ScanConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.quality_window == 0 {
            return Err("scan.quality_window must be >= 1".to_string());
        }
        if !(self.fps_threshold > 0.0) {
            return Err("scan.fps_threshold must be > 0".to_string());
        }
        if self.init_attempts == 0 {
            return Err("scan.init_attempts must be >= 1".to_string());
        }
        if self.session_timeout.is_zero() {
            return Err("scan.session_timeout must be > 0".to_string());
        }
        if self.language.trim().is_empty() {
            return Err("scan.language must not be empty".to_string());
        }
        Ok(())
    }
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_SOCKET_URL.to_string(),
            auth_token: String::new(),
        }
    }
}

impl fmt::Debug for SocketConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketConfig")
            .field("url", &self.url)
            .field("auth_token", &"***REDACTED***")
            .finish()
    }
}

impl Default for SubmitConfig {
    fn default() -> Self {
        Self {
            form_url: None,
            timeout_secs: DEFAULT_SUBMIT_TIMEOUT_SECS,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            log_level: env_or("RUST_LOG", "info"),
            enable_file_logs: env_or_bool("ENABLE_FILE_LOGS", false),
            log_dir: env_or("LOG_DIR", "./logs"),
            scan: ScanConfig {
                quality_window: env_or_parse("SCAN_QUALITY_WINDOW", DEFAULT_QUALITY_WINDOW),
                fps_threshold: env_or_parse("SCAN_FPS_THRESHOLD", DEFAULT_FPS_THRESHOLD),
                fps_check_delay: env_or_millis("SCAN_FPS_CHECK_DELAY_MS", DEFAULT_FPS_CHECK_DELAY_MS),
                fps_confirm_delay: env_or_millis(
                    "SCAN_FPS_CONFIRM_DELAY_MS",
                    DEFAULT_FPS_CONFIRM_DELAY_MS,
                ),
                session_timeout: env_or_millis("SCAN_SESSION_TIMEOUT_MS", DEFAULT_SESSION_TIMEOUT_MS),
                init_attempts: env_or_parse("SCAN_INIT_ATTEMPTS", DEFAULT_INIT_ATTEMPTS),
                init_backoff: env_or_millis("SCAN_INIT_BACKOFF_MS", DEFAULT_INIT_BACKOFF_MS),
                use_front_camera: env_or_bool("SCAN_FRONT_CAMERA", true),
                language: env_or("SCAN_LANGUAGE", DEFAULT_LANGUAGE),
            },
            socket: SocketConfig {
                url: env_or("SOCKET_URL", DEFAULT_SOCKET_URL),
                auth_token: env_or("SOCKET_AUTH_TOKEN", ""),
            },
            submit: SubmitConfig {
                form_url: env::var("SUBMIT_FORM_URL")
                    .ok()
                    .filter(|v| !v.trim().is_empty()),
                timeout_secs: env_or_parse("SUBMIT_TIMEOUT_SECS", DEFAULT_SUBMIT_TIMEOUT_SECS),
            },
        }
    }
}

pub fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

pub fn env_or_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy,
{
    match env::var(key) {
        Ok(raw) => match raw.parse::<T>() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(
                    key,
                    value = %raw,
                    "Failed to parse env var, using default"
                );
                default
            }
        },
        Err(_) => default,
    }
}

pub fn env_or_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

fn env_or_millis(key: &str, default_ms: u64) -> Duration {
    Duration::from_millis(env_or_parse(key, default_ms))
}
