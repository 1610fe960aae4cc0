//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (TIDECACHE_*)
//! 2. TOML config file (if TIDECACHE_CONFIG_FILE set)
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
/// 1. Environment variables (TIDECACHE_*)
/// 2. TOML config file (if TIDECACHE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Version tag appended to versioned partition names.
    ///
    /// Bumping it and redeploying is the only upgrade path: the next
    /// activation evicts every partition the new keep-list omits.
    #[serde(default = "default_version")]
    pub version: String,

    /// Origin of the hosted application (scheme, host and port).
    ///
    /// Relative request URLs resolve against it and it defines same-origin.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Path to SQLite partition store.
    ///
    /// Set via TIDECACHE_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// User-Agent string for network requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Network request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum response body size accepted from the network.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// Path of the page served when a navigation fails.
    #[serde(default = "default_offline_page")]
    pub offline_page: String,

    /// Same-origin paths primed into the static partition on install.
    #[serde(default = "default_precache_assets")]
    pub precache_assets: Vec<String>,

    /// Host patterns of the live backend API. Never intercepted.
    ///
    /// Either an exact host (`api.example.com`) or a suffix wildcard
    /// (`*.supabase.co`).
    #[serde(default)]
    pub api_hosts: Vec<String>,

    /// Third-party font hosts served cache-first from `fonts-cache`.
    #[serde(default = "default_font_hosts")]
    pub font_hosts: Vec<String>,

    /// Path prefixes of large user-uploaded documents.
    #[serde(default = "default_document_paths")]
    pub document_paths: Vec<String>,

    /// Background-sync tag that triggers a retry-queue replay.
    #[serde(default = "default_sync_tag")]
    pub sync_tag: String,

    /// Retry queue bounds.
    #[serde(default)]
    pub queue: QueueConfig,

    /// Defaults applied to push payloads with missing fields.
    #[serde(default)]
    pub push: PushDefaults,
}

/// Retention bounds for the mutation retry queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueueConfig {
    /// Oldest entries are dropped once the queue grows past this.
    #[serde(default = "default_queue_max_entries")]
    pub max_entries: usize,

    /// Entries older than this are dropped instead of replayed.
    #[serde(default = "default_queue_max_age_days")]
    pub max_age_days: i64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { max_entries: default_queue_max_entries(), max_age_days: default_queue_max_age_days() }
    }
}

/// Notification fields used when a push payload omits them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PushDefaults {
    #[serde(default = "default_push_title")]
    pub title: String,
    #[serde(default = "default_push_body")]
    pub body: String,
    #[serde(default = "default_push_icon")]
    pub icon: String,
    #[serde(default = "default_push_tag")]
    pub tag: String,
    #[serde(default = "default_push_url")]
    pub url: String,
}

impl Default for PushDefaults {
    fn default() -> Self {
        Self {
            title: default_push_title(),
            body: default_push_body(),
            icon: default_push_icon(),
            tag: default_push_tag(),
            url: default_push_url(),
        }
    }
}

fn default_version() -> String {
    "v1".into()
}

fn default_origin() -> String {
    "http://localhost:3000".into()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./tidecache.sqlite")
}

fn default_user_agent() -> String {
    "tidecache/0.1".into()
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_max_bytes() -> usize {
    26_214_400 // 25MB
}

fn default_offline_page() -> String {
    "/offline.html".into()
}

fn default_precache_assets() -> Vec<String> {
    vec!["/".into(), "/offline.html".into()]
}

fn default_font_hosts() -> Vec<String> {
    vec!["fonts.googleapis.com".into(), "fonts.gstatic.com".into()]
}

fn default_document_paths() -> Vec<String> {
    vec!["/storage/".into()]
}

fn default_sync_tag() -> String {
    "sync-mutations".into()
}

fn default_queue_max_entries() -> usize {
    100
}

fn default_queue_max_age_days() -> i64 {
    7
}

fn default_push_title() -> String {
    "Tidecache".into()
}

fn default_push_body() -> String {
    "You have a new update".into()
}

fn default_push_icon() -> String {
    "/icons/icon-192.png".into()
}

fn default_push_tag() -> String {
    "general".into()
}

fn default_push_url() -> String {
    "/".into()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            origin: default_origin(),
            db_path: default_db_path(),
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            max_bytes: default_max_bytes(),
            offline_page: default_offline_page(),
            precache_assets: default_precache_assets(),
            api_hosts: Vec::new(),
            font_hosts: default_font_hosts(),
            document_paths: default_document_paths(),
            sync_tag: default_sync_tag(),
            queue: QueueConfig::default(),
            push: PushDefaults::default(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `TIDECACHE_`
    /// 2. TOML file from `TIDECACHE_CONFIG_FILE` (if set)
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

        if let Ok(config_path) = std::env::var("TIDECACHE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("TIDECACHE_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.version, "v1");
        assert_eq!(config.origin, "http://localhost:3000");
        assert_eq!(config.db_path, PathBuf::from("./tidecache.sqlite"));
        assert_eq!(config.offline_page, "/offline.html");
        assert_eq!(config.precache_assets, vec!["/".to_string(), "/offline.html".to_string()]);
        assert!(config.api_hosts.is_empty());
        assert_eq!(config.document_paths, vec!["/storage/".to_string()]);
        assert_eq!(config.sync_tag, "sync-mutations");
        assert_eq!(config.queue.max_entries, 100);
        assert_eq!(config.queue.max_age_days, 7);
        assert_eq!(config.push.url, "/");
    }

    #[test]
    fn test_timeout_duration() {
        let config = AppConfig::default();
        assert_eq!(config.timeout(), Duration::from_millis(20_000));
    }

    #[test]
    fn test_load_layers_file_and_env() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "tidecache.toml",
                r#"
                version = "v3"
                api_hosts = ["api.example.com"]

                [queue]
                max_entries = 10
                "#,
            )?;
            jail.set_env("TIDECACHE_CONFIG_FILE", "tidecache.toml");
            jail.set_env("TIDECACHE_ORIGIN", "https://app.example.com");
            jail.set_env("TIDECACHE_QUEUE__MAX_AGE_DAYS", "3");

            let config = AppConfig::load().map_err(|e| e.to_string())?;
            assert_eq!(config.version, "v3");
            assert_eq!(config.origin, "https://app.example.com");
            assert_eq!(config.api_hosts, vec!["api.example.com".to_string()]);
            assert_eq!(config.queue.max_entries, 10);
            assert_eq!(config.queue.max_age_days, 3);
            Ok(())
        });
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("TIDECACHE_VERSION", "v 3");
            let result = AppConfig::load();
            assert!(matches!(result, Err(ConfigError::Invalid { ref field, .. }) if field == "version"));
            Ok(())
        });
    }
}
