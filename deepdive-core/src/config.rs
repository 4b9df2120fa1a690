//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/deepdive/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/deepdive/` (~/.config/deepdive/)
//! - Data: `$XDG_DATA_HOME/deepdive/` (~/.local/share/deepdive/)
//! - State/Logs: `$XDG_STATE_HOME/deepdive/` (~/.local/state/deepdive/)

use crate::dispatch::EventParam;
use crate::error::{Error, Result};
use crate::payload::TimestampStyle;
use serde::Deserialize;
use std::path::PathBuf;

/// Environment variable that supplies the project id ahead of the config file
pub const PROJECT_ID_ENV: &str = "DEEPDIVE_PROJECT_ID";

/// Default collection endpoint
pub const DEFAULT_COLLECT_URL: &str = "https://collect.backend.deep-dive.cloud/";

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Tracker configuration
    #[serde(default)]
    pub tracker: TrackerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Tracker configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TrackerConfig {
    /// Project the events belong to. Without one the tracker stays disabled.
    pub project_id: Option<String>,

    /// Collection endpoint
    #[serde(default = "default_collect_url")]
    pub collect_url: String,

    /// Query parameter name for the event type (`event` or `event_type`)
    #[serde(default)]
    pub event_param: EventParam,

    /// `local` (with UTC offset) or `utc`
    #[serde(default)]
    pub timestamp_style: TimestampStyle,

    /// Accept a `debug_id` query parameter on the page URL
    #[serde(default)]
    pub debug_id: bool,

    /// Send a pageview as soon as the tracker initializes
    #[serde(default = "default_auto_pageview")]
    pub auto_pageview: bool,

    /// Maximum number of calls held before initialization (unbounded if unset)
    #[serde(default)]
    pub queue_capacity: Option<usize>,

    /// HTTP request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            project_id: None,
            collect_url: default_collect_url(),
            event_param: EventParam::default(),
            timestamp_style: TimestampStyle::default(),
            debug_id: false,
            auto_pageview: default_auto_pageview(),
            queue_capacity: None,
            timeout_secs: default_timeout(),
        }
    }
}

impl TrackerConfig {
    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.collect_url).map_err(|e| {
            Error::Config(format!(
                "tracker.collect_url {:?} is not a valid URL: {}",
                self.collect_url, e
            ))
        })?;
        if self.queue_capacity == Some(0) {
            return Err(Error::Config(
                "tracker.queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(Error::Config(
                "tracker.timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Project id from `DEEPDIVE_PROJECT_ID`, falling back to the config file.
    /// Empty values count as missing.
    pub fn resolve_project_id(&self) -> Option<String> {
        std::env::var(PROJECT_ID_ENV)
            .ok()
            .or_else(|| self.project_id.clone())
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
    }
}

fn default_collect_url() -> String {
    DEFAULT_COLLECT_URL.to_string()
}

fn default_auto_pageview() -> bool {
    true
}

fn default_timeout() -> u64 {
    10
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.tracker.validate()?;
        Ok(config)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/deepdive/config.toml` (~/.config/deepdive/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("deepdive").join("config.toml")
    }

    /// Returns the data directory path (primary store and cookie mirror)
    ///
    /// `$XDG_DATA_HOME/deepdive/` (~/.local/share/deepdive/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("deepdive")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/deepdive/` (~/.local/state/deepdive/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("deepdive")
    }

    /// Returns the primary store path
    ///
    /// `$XDG_DATA_HOME/deepdive/store.db`
    pub fn store_path() -> PathBuf {
        Self::data_dir().join("store.db")
    }

    /// Returns the cookie mirror path
    ///
    /// `$XDG_DATA_HOME/deepdive/cookies.json`
    pub fn cookie_path() -> PathBuf {
        Self::data_dir().join("cookies.json")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/deepdive/deepdive.log`
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("deepdive.log")
    }

    /// Ensure XDG base directory environment variables are set.
    ///
    /// This is mainly for CLI binaries that want explicit, stable path behavior
    /// before invoking other components that read these env vars.
    pub fn ensure_xdg_env() {
        let home = home_dir();

        if std::env::var("XDG_DATA_HOME").is_err() {
            std::env::set_var("XDG_DATA_HOME", home.join(".local/share"));
        }

        if std::env::var("XDG_STATE_HOME").is_err() {
            std::env::set_var("XDG_STATE_HOME", home.join(".local/state"));
        }

        if std::env::var("XDG_CONFIG_HOME").is_err() {
            std::env::set_var("XDG_CONFIG_HOME", home.join(".config"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.tracker.project_id.is_none());
        assert_eq!(config.tracker.collect_url, DEFAULT_COLLECT_URL);
        assert_eq!(config.tracker.event_param, EventParam::Event);
        assert_eq!(config.tracker.timestamp_style, TimestampStyle::Local);
        assert!(!config.tracker.debug_id);
        assert!(config.tracker.auto_pageview);
        assert_eq!(config.logging.level, "info");
        assert!(config.tracker.validate().is_ok());
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[tracker]
project_id = "proj_123"
collect_url = "https://collect.example.com/"
event_param = "event_type"
timestamp_style = "utc"
debug_id = true
auto_pageview = false
queue_capacity = 50

[logging]
level = "debug"
"#;
        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(config.tracker.project_id.as_deref(), Some("proj_123"));
        assert_eq!(config.tracker.collect_url, "https://collect.example.com/");
        assert_eq!(config.tracker.event_param, EventParam::EventType);
        assert_eq!(config.tracker.timestamp_style, TimestampStyle::Utc);
        assert!(config.tracker.debug_id);
        assert!(!config.tracker.auto_pageview);
        assert_eq!(config.tracker.queue_capacity, Some(50));
        assert_eq!(config.tracker.timeout_secs, 10);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_tracker_config_validation() {
        let config = TrackerConfig {
            collect_url: "nope".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = TrackerConfig {
            queue_capacity: Some(0),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = TrackerConfig {
            timeout_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_event_param_is_rejected() {
        let toml = r#"
[tracker]
event_param = "kind"
"#;
        assert!(toml::from_str::<Config>(toml).is_err());
    }
}
