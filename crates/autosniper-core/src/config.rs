//! Configuration management for AutoSniper.
//!
//! Provides TOML-based configuration with XDG-compliant paths and
//! environment variable overrides.

use crate::error::{ConfigError, ConfigResult};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main application configuration.
///
/// This is loaded from `~/.config/autosniper/config.toml` (or platform equivalent).
/// If the file doesn't exist, default values are used.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Storage settings
    pub database: DatabaseConfig,
    /// Rendering session settings
    pub browser: BrowserConfig,
    /// Extraction and enrichment behavior
    pub scanning: ScanningConfig,
    /// Recurring scan and maintenance settings
    pub scheduler: SchedulerConfig,
    /// External messaging settings
    pub notifications: NotificationConfig,
}

impl AppConfig {
    /// Load configuration from disk, falling back to defaults if not found.
    ///
    /// # Errors
    /// Returns error if:
    /// - Config directory cannot be determined
    /// - File exists but cannot be read
    /// - File contents are not valid TOML
    pub fn load() -> ConfigResult<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from `path`, falling back to defaults if it is missing.
    ///
    /// # Errors
    /// Returns error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        if path.exists() {
            tracing::debug!("Loading config from {}", path.display());
            let contents = fs::read_to_string(path)?;
            let config = toml::from_str(&contents)?;
            Ok(config)
        } else {
            tracing::debug!("Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load configuration with environment variable overrides.
    ///
    /// Supports the following environment variables:
    /// - `AUTOSNIPER_DB_PATH`: Override the database file path
    /// - `AUTOSNIPER_HEADLESS`: Override browser headless mode (true/false)
    /// - `AUTOSNIPER_SCHEDULER_ENABLED`: Override the recurring scheduler (true/false)
    /// - `TELEGRAM_BOT_TOKEN`: Messaging bot credentials
    pub fn load_with_env() -> ConfigResult<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides on top of the loaded values.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("AUTOSNIPER_DB_PATH") {
            tracing::debug!("Override database.path from env: {}", val);
            self.database.path = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("AUTOSNIPER_HEADLESS") {
            if let Ok(headless) = val.parse() {
                self.browser.headless = headless;
                tracing::debug!("Override browser.headless from env: {}", headless);
            }
        }

        if let Ok(val) = std::env::var("AUTOSNIPER_SCHEDULER_ENABLED") {
            if let Ok(enabled) = val.parse() {
                self.scheduler.enabled = enabled;
                tracing::debug!("Override scheduler.enabled from env: {}", enabled);
            }
        }

        if let Ok(token) = std::env::var("TELEGRAM_BOT_TOKEN") {
            if !token.trim().is_empty() {
                self.notifications.telegram_bot_token = Some(token);
            }
        }
    }

    /// Reject values that would stall or disable the pipeline.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.scanning.detail_concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                field: "scanning.detail_concurrency".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.scheduler.tick_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "scheduler.tick_secs".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.scanning.min_strategy_yield == 0 {
            return Err(ConfigError::InvalidValue {
                field: "scanning.min_strategy_yield".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Get the path to the configuration file.
    ///
    /// Uses XDG base directories: `~/.config/autosniper/config.toml`
    pub fn config_path() -> ConfigResult<PathBuf> {
        let dirs = ProjectDirs::from("com", "autosniper", "autosniper")
            .ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.config_dir().join("config.toml"))
    }
}

/// Storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite database file (relative paths resolve against the working directory)
    pub path: PathBuf,
    /// Maximum pooled connections
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("autosniper.db"),
            max_connections: 5,
        }
    }
}

/// Rendering session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Run browser in headless mode
    pub headless: bool,
    /// Largest window the randomized viewport may use, width
    pub window_width: u32,
    /// Largest window the randomized viewport may use, height
    pub window_height: u32,
    /// Navigation timeout in seconds
    pub navigation_timeout_secs: u64,
    /// Quiescence wait before falling back to the content-loaded signal
    pub network_idle_timeout_secs: u64,
    /// Locale advertised to the source site
    pub locale: String,
    /// Timezone emulated by the session
    pub timezone: String,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            window_width: 1920,
            window_height: 1080,
            navigation_timeout_secs: 90,
            network_idle_timeout_secs: 30,
            locale: "tr-TR".to_string(),
            timezone: "Europe/Istanbul".to_string(),
        }
    }
}

/// Extraction and enrichment behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanningConfig {
    /// Origin of the listing source
    pub base_url: String,
    /// Minimum records a strategy must yield to end the extraction chain
    pub min_strategy_yield: usize,
    /// Maximum result rows read by the row strategy
    pub max_rows: usize,
    /// Maximum links read by the link strategy
    pub max_links: usize,
    /// Pages shorter than this are treated as blocked
    pub min_page_length: usize,
    /// Pause before retrying a blocked page, in seconds
    pub block_retry_pause_secs: u64,
    /// Pause after load before reading content, in seconds
    pub settle_pause_secs: u64,
    /// Simultaneous detail fetches
    pub detail_concurrency: usize,
    /// Per-fetch timeout for detail pages, in seconds
    pub detail_timeout_secs: u64,
    /// Images kept per listing from its detail page
    pub max_detail_images: usize,
    /// User agent for plain HTTP detail fetches
    pub user_agent: String,
}

impl ScanningConfig {
    /// Per-fetch detail timeout as a `Duration`.
    #[must_use]
    pub fn detail_timeout(&self) -> Duration {
        Duration::from_secs(self.detail_timeout_secs)
    }
}

impl Default for ScanningConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.arabam.com".to_string(),
            min_strategy_yield: 5,
            max_rows: 25,
            max_links: 50,
            min_page_length: 5000,
            block_retry_pause_secs: 5,
            settle_pause_secs: 5,
            detail_concurrency: 5,
            detail_timeout_secs: 15,
            max_detail_images: 5,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                .to_string(),
        }
    }
}

/// Recurring scan and maintenance settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Whether the recurring driver starts with the process
    pub enabled: bool,
    /// Period between due-filter checks, in seconds
    pub tick_secs: u64,
    /// Listings older than this many days are evicted
    pub retention_days: i64,
    /// Period between retention runs, in hours
    pub retention_interval_hours: u64,
    /// Period between favorite price re-checks, in hours
    pub price_check_interval_hours: u64,
    /// Delay before the first retention run after start, in seconds
    pub initial_cleanup_delay_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tick_secs: 60,
            retention_days: 30,
            retention_interval_hours: 24,
            price_check_interval_hours: 6,
            initial_cleanup_delay_secs: 30,
        }
    }
}

/// External messaging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Bot API origin
    pub telegram_api_base: String,
    /// Bot token, supplied through the environment only
    #[serde(skip)]
    pub telegram_bot_token: Option<String>,
    /// Request timeout for bot API calls, in seconds
    pub timeout_secs: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            telegram_api_base: "https://api.telegram.org".to_string(),
            telegram_bot_token: None,
            timeout_secs: 10,
        }
    }
}
