//! Configuration module for the Theme Studio backend.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Default bound on how long callers wait for the preview to signal readiness.
pub const DEFAULT_PREVIEW_READY_TIMEOUT_SECS: u64 = 10;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Pre-shared key guarding the editor API (disabled when unset)
    pub api_psk: Option<String>,
    /// Path to SQLite database file
    pub db_path: PathBuf,
    /// Optional directory of additional theme definitions (`*.json`)
    pub themes_dir: Option<PathBuf>,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Origin of the editor page; inbound preview messages must match it
    pub editor_origin: String,
    /// Bound for `MessageBus::wait_for_ready`
    pub preview_ready_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let api_psk = env::var("STUDIO_API_PSK").ok().filter(|k| !k.is_empty());

        let db_path = env::var("STUDIO_DB_PATH")
            .unwrap_or_else(|_| "./data/studio.sqlite".to_string())
            .into();

        let themes_dir = env::var("STUDIO_THEMES_DIR").ok().map(PathBuf::from);

        let bind_addr = env::var("STUDIO_BIND_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
            .parse()
            .expect("Invalid STUDIO_BIND_ADDR format");

        let log_level = env::var("STUDIO_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let editor_origin = env::var("STUDIO_EDITOR_ORIGIN")
            .unwrap_or_else(|_| "http://localhost:3000".to_string());

        let preview_ready_timeout = env::var("STUDIO_PREVIEW_READY_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(DEFAULT_PREVIEW_READY_TIMEOUT_SECS));

        Self {
            api_psk,
            db_path,
            themes_dir,
            bind_addr,
            log_level,
            editor_origin,
            preview_ready_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        // Clear any existing env vars
        for key in [
            "STUDIO_API_PSK",
            "STUDIO_DB_PATH",
            "STUDIO_THEMES_DIR",
            "STUDIO_BIND_ADDR",
            "STUDIO_LOG_LEVEL",
            "STUDIO_EDITOR_ORIGIN",
            "STUDIO_PREVIEW_READY_TIMEOUT_SECS",
        ] {
            env::remove_var(key);
        }

        let config = Config::from_env();

        assert!(config.api_psk.is_none());
        assert_eq!(config.db_path, PathBuf::from("./data/studio.sqlite"));
        assert!(config.themes_dir.is_none());
        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:8080");
        assert_eq!(config.log_level, "info");
        assert_eq!(config.editor_origin, "http://localhost:3000");
        assert_eq!(config.preview_ready_timeout, Duration::from_secs(10));
    }
}
