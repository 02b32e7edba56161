//! Board configuration loading
//!
//! Resolution follows a fixed priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! A missing or malformed config file is never fatal: it is logged and the
//! compiled defaults are used instead.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "REQBOARD_CONFIG";

/// Environment variable overriding `max_requests_per_user`
pub const MAX_REQUESTS_ENV_VAR: &str = "REQBOARD_MAX_REQUESTS";

/// Client behaviour knobs
///
/// The observed deployments differ only in these values (quota size,
/// free-text support, per-song dedup), so they are flags on one design.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardConfig {
    /// Quota on this client's own submissions (song and free-text combined)
    pub max_requests_per_user: u32,

    /// Whether free-text requests are accepted and listed
    pub custom_requests_enabled: bool,

    /// Reject a second request for a song this client already requested
    pub one_request_per_song: bool,

    /// Minimum length of a trimmed free-text title
    pub min_custom_title_chars: usize,

    /// Backstop refresh period in seconds
    pub refresh_interval_secs: u64,

    /// How long this client's own last submission stays highlighted
    pub highlight_window_secs: u64,

    /// Storage key of the persisted local ledger
    pub ledger_key: String,

    /// Change notification channel capacity
    pub notification_capacity: usize,

    /// How often a running client polls the shared change log, in milliseconds
    pub change_poll_interval_ms: u64,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            max_requests_per_user: 50,
            custom_requests_enabled: true,
            one_request_per_song: false,
            min_custom_title_chars: 2,
            refresh_interval_secs: 5,
            highlight_window_secs: 5,
            ledger_key: "my_requested_songs".to_string(),
            notification_capacity: 256,
            change_poll_interval_ms: 500,
        }
    }
}

impl BoardConfig {
    /// Parse configuration from TOML text (missing keys take defaults)
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Invalid TOML: {}", e)))
    }

    /// Load configuration from a TOML file
    pub fn load_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if self.max_requests_per_user == 0 {
            return Err(Error::Config(
                "max_requests_per_user must be at least 1".to_string(),
            ));
        }
        if self.refresh_interval_secs == 0 {
            return Err(Error::Config(
                "refresh_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.ledger_key.trim().is_empty() {
            return Err(Error::Config("ledger_key must not be empty".to_string()));
        }
        if self.notification_capacity == 0 {
            return Err(Error::Config(
                "notification_capacity must be at least 1".to_string(),
            ));
        }
        if self.change_poll_interval_ms == 0 {
            return Err(Error::Config(
                "change_poll_interval_ms must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn highlight_window(&self) -> Duration {
        Duration::from_secs(self.highlight_window_secs)
    }

    pub fn change_poll_interval(&self) -> Duration {
        Duration::from_millis(self.change_poll_interval_ms)
    }
}

/// Resolves the effective configuration from CLI, environment, file and defaults
#[derive(Debug, Clone, Default)]
pub struct ConfigResolver {
    cli_config_path: Option<PathBuf>,
    cli_max_requests: Option<u32>,
}

impl ConfigResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Config file given on the command line
    pub fn with_config_path(mut self, path: Option<PathBuf>) -> Self {
        self.cli_config_path = path;
        self
    }

    /// Quota given on the command line
    pub fn with_max_requests(mut self, max: Option<u32>) -> Self {
        self.cli_max_requests = max;
        self
    }

    /// Produce the validated configuration
    pub fn resolve(&self) -> Result<BoardConfig> {
        let mut config = match self.config_file_path() {
            Some(path) => match BoardConfig::load_file(&path) {
                Ok(config) => {
                    info!("Loaded configuration from {}", path.display());
                    config
                }
                Err(e) => {
                    warn!(
                        "Ignoring config file {}: {} (using defaults)",
                        path.display(),
                        e
                    );
                    BoardConfig::default()
                }
            },
            None => {
                debug!("No config file found, using compiled defaults");
                BoardConfig::default()
            }
        };

        // Priority 1 and 2 for the quota
        if let Some(max) = self.cli_max_requests {
            config.max_requests_per_user = max;
        } else if let Ok(raw) = std::env::var(MAX_REQUESTS_ENV_VAR) {
            match raw.trim().parse::<u32>() {
                Ok(max) => config.max_requests_per_user = max,
                Err(_) => warn!("Ignoring non-numeric {}={:?}", MAX_REQUESTS_ENV_VAR, raw),
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Locate the config file: CLI path, then env var, then platform default
    fn config_file_path(&self) -> Option<PathBuf> {
        if let Some(path) = &self.cli_config_path {
            return Some(path.clone());
        }

        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            return Some(PathBuf::from(path));
        }

        default_config_file().filter(|path| path.exists())
    }
}

/// Platform config file location (`<config_dir>/reqboard/config.toml`)
pub fn default_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("reqboard").join("config.toml"))
}

/// OS-dependent default data folder
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("reqboard"))
        .unwrap_or_else(|| PathBuf::from("./reqboard_data"))
}

/// Default board database path
pub fn default_db_path() -> PathBuf {
    default_data_dir().join("board.db")
}

/// Default directory for persisted client state
pub fn default_state_dir() -> PathBuf {
    default_data_dir().join("client")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = BoardConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.refresh_interval(), Duration::from_secs(5));
        assert_eq!(config.highlight_window(), Duration::from_secs(5));
        assert_eq!(config.change_poll_interval(), Duration::from_millis(500));
        assert_eq!(config.ledger_key, "my_requested_songs");
    }

    #[test]
    fn test_partial_toml_keeps_other_defaults() {
        let config = BoardConfig::from_toml_str("max_requests_per_user = 5\n").unwrap();
        assert_eq!(config.max_requests_per_user, 5);
        assert!(config.custom_requests_enabled);
        assert_eq!(config.min_custom_title_chars, 2);
    }

    #[test]
    fn test_malformed_toml_is_config_error() {
        let result = BoardConfig::from_toml_str("max_requests_per_user = \"many\"");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_zero_quota_rejected() {
        let config = BoardConfig {
            max_requests_per_user: 0,
            ..BoardConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let config = BoardConfig {
            refresh_interval_secs: 0,
            ..BoardConfig::default()
        };
        assert!(config.validate().is_err());

        let config = BoardConfig {
            change_poll_interval_ms: 0,
            ..BoardConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
