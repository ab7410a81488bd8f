//! ==============================================================================
//! config.rs - Runtime Configuration Loader
//! ==============================================================================
//!
//! purpose:
//!     defines the schema for `console.toml`.
//!     loads configuration from file or falls back to defaults.
//!
//! structure:
//!     - RemoteConfig: where the hardware-access service lives, request timeout.
//!     - RefreshConfig: auto-refresh interval and whether it starts enabled.
//!     - ConsoleConfig: bind address of the operator console.
//!     - StatusConfig / ActivityConfig: banner display time, log capacity.
//!     - LoggingConfig: default tracing filter.
//!
//! every section and field is optional; missing ones take the defaults below.
//!
//! ==============================================================================

use crate::controller::ControllerOptions;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct ConsoleConfig {
    pub remote: RemoteConfig,
    pub refresh: RefreshConfig,
    pub console: ServeConfig,
    pub status: StatusConfig,
    pub activity: ActivityConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RemoteConfig {
    pub base_url: String,
    /// unset: no timeout
    pub request_timeout_ms: Option<u64>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5000".to_string(),
            request_timeout_ms: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RefreshConfig {
    pub interval_seconds: u64,
    pub auto_start: bool,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_seconds: crate::scheduler::DEFAULT_INTERVAL.as_secs(),
            auto_start: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServeConfig {
    pub bind: String,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self { bind: "127.0.0.1:8080".to_string() }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StatusConfig {
    pub banner_seconds: u64,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self { banner_seconds: 5 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ActivityConfig {
    pub capacity: usize,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self { capacity: 100 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string() }
    }
}

/// where the active configuration came from
#[derive(Debug)]
pub enum ConfigSource {
    File(PathBuf),
    /// no usable file; unreadable candidates with their errors
    Defaults { skipped: Vec<(PathBuf, String)> },
}

impl ConfigSource {
    pub fn log(&self) {
        match self {
            ConfigSource::File(path) => tracing::info!("[CONFIG] Loaded from {}", path.display()),
            ConfigSource::Defaults { skipped } => {
                for (path, e) in skipped {
                    tracing::warn!("[CONFIG] Failed to load {}: {}", path.display(), e);
                }
                tracing::warn!("[CONFIG] No config file found - using defaults");
            }
        }
    }
}

impl ConsoleConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))?;

        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        toml::from_str(content).map_err(|e| anyhow::anyhow!("Failed to parse config: {}", e))
    }

    /// Load with default fallback
    ///
    /// runs before tracing is initialised (the filter comes from this file),
    /// so the outcome is returned for the caller to log.
    pub fn load_or_default() -> (Self, ConfigSource) {
        let paths = [
            PathBuf::from("config").join("console.toml"),
            PathBuf::from("..").join("config").join("console.toml"),
        ];

        let mut skipped = Vec::new();
        for path in paths {
            if path.exists() {
                match Self::load(&path) {
                    Ok(config) => return (config, ConfigSource::File(path)),
                    Err(e) => skipped.push((path, e.to_string())),
                }
            }
        }

        (Self::default(), ConfigSource::Defaults { skipped })
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.remote.request_timeout_ms.map(Duration::from_millis)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh.interval_seconds.max(1))
    }

    pub fn controller_options(&self) -> ControllerOptions {
        ControllerOptions {
            log_capacity: self.activity.capacity,
            banner_ttl: Duration::from_secs(self.status.banner_seconds),
        }
    }

    /// Log configuration summary
    pub fn log_summary(&self) {
        tracing::info!("pin service: {}", self.remote.base_url);
        match self.remote.request_timeout_ms {
            Some(ms) => tracing::info!("request timeout: {}ms", ms),
            None => tracing::info!("request timeout: none"),
        }
        tracing::info!(
            "auto-refresh: every {}s ({})",
            self.refresh.interval_seconds,
            if self.refresh.auto_start { "on at startup" } else { "off at startup" }
        );
        tracing::info!("console: http://{}", self.console.bind);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_takes_defaults() {
        let config = ConsoleConfig::parse("").unwrap();
        assert_eq!(config.remote.base_url, "http://127.0.0.1:5000");
        assert_eq!(config.request_timeout(), None);
        assert_eq!(config.refresh_interval(), Duration::from_secs(5));
        assert!(config.refresh.auto_start);
        assert_eq!(config.activity.capacity, 100);
        assert_eq!(config.controller_options().banner_ttl, Duration::from_secs(5));
    }

    #[test]
    fn partial_sections_merge_with_defaults() {
        let config = ConsoleConfig::parse(
            r#"
            [remote]
            base_url = "http://jetson.local:5000"
            request_timeout_ms = 2500

            [refresh]
            auto_start = false
            "#,
        )
        .unwrap();

        assert_eq!(config.remote.base_url, "http://jetson.local:5000");
        assert_eq!(config.request_timeout(), Some(Duration::from_millis(2500)));
        assert!(!config.refresh.auto_start);
        assert_eq!(config.refresh.interval_seconds, 5);
        assert_eq!(config.console.bind, "127.0.0.1:8080");
    }

    #[test]
    fn zero_interval_is_clamped() {
        let config = ConsoleConfig::parse("[refresh]\ninterval_seconds = 0").unwrap();
        assert_eq!(config.refresh_interval(), Duration::from_secs(1));
    }

    #[test]
    fn shipped_sample_matches_defaults() {
        let config = ConsoleConfig::parse(include_str!("../config/console.toml")).unwrap();
        assert_eq!(config.remote.base_url, RemoteConfig::default().base_url);
        assert_eq!(config.request_timeout(), None);
        assert_eq!(config.console.bind, "127.0.0.1:8080");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn malformed_file_is_an_error() {
        assert!(ConsoleConfig::parse("[remote]\nbase_url = 5").is_err());
    }
}
