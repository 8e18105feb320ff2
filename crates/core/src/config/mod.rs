//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (OFFSYNC_*)
//! 2. TOML config file (if OFFSYNC_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (OFFSYNC_*)
/// 2. TOML config file (if OFFSYNC_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the SQLite database holding records and cached content.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// User-Agent string for HTTP requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// HTTP request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum bytes to fetch per request.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Cached entries older than this are evicted.
    #[serde(default = "default_cache_max_age_secs")]
    pub cache_max_age_secs: u64,

    /// Maximum number of entries kept in the managed cache.
    #[serde(default = "default_cache_max_entries")]
    pub cache_max_entries: usize,

    /// Cache key of the application shell page.
    #[serde(default = "default_app_shell_key")]
    pub app_shell_key: String,

    /// Cache key of the offline fallback page.
    #[serde(default = "default_offline_key")]
    pub offline_key: String,

    /// Endpoint describing the most recent article, used by push handling.
    #[serde(default = "default_latest_article_key")]
    pub latest_article_key: String,

    /// Additional keys warmed up at startup.
    #[serde(default = "default_precache")]
    pub precache: Vec<String>,

    /// Origin all relative keys resolve against.
    #[serde(default = "default_origin")]
    pub origin: String,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./offsync.sqlite")
}

fn default_user_agent() -> String {
    "offsync/0.1".into()
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_max_body_bytes() -> usize {
    5_242_880 // 5MB
}

fn default_cache_max_age_secs() -> u64 {
    60 * 60 * 24 * 60 // 60 days
}

fn default_cache_max_entries() -> usize {
    120
}

fn default_app_shell_key() -> String {
    "/_/app_shell".into()
}

fn default_offline_key() -> String {
    "/_/offline/".into()
}

fn default_latest_article_key() -> String {
    "/_/latest_article".into()
}

fn default_precache() -> Vec<String> {
    vec!["/".into(), default_offline_key()]
}

fn default_origin() -> String {
    "https://localhost".into()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            max_body_bytes: default_max_body_bytes(),
            cache_max_age_secs: default_cache_max_age_secs(),
            cache_max_entries: default_cache_max_entries(),
            app_shell_key: default_app_shell_key(),
            offline_key: default_offline_key(),
            latest_article_key: default_latest_article_key(),
            precache: default_precache(),
            origin: default_origin(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Cache age bound as Duration.
    pub fn cache_max_age(&self) -> Duration {
        Duration::from_secs(self.cache_max_age_secs)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `OFFSYNC_`
    /// 2. TOML file from `OFFSYNC_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("OFFSYNC_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("OFFSYNC_")
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
