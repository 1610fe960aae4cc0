//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Longest a queued mutation may wait for replay, about ten years.
const MAX_QUEUE_AGE_DAYS: i64 = 3650;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `version` is empty or contains whitespace
    /// - `origin` is not an http(s) URL
    /// - `offline_page` or a precache asset is not an absolute path
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `max_bytes` is 0 or exceeds 100MB
    /// - queue bounds are not positive
    ///
    /// Returns `ConfigError::Missing` if `sync_tag` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version.is_empty() || self.version.chars().any(char::is_whitespace) {
            return Err(ConfigError::Invalid {
                field: "version".into(),
                reason: "must be non-empty and contain no whitespace".into(),
            });
        }

        match url::Url::parse(&self.origin) {
            Ok(origin) if matches!(origin.scheme(), "http" | "https") && origin.host_str().is_some() => {}
            _ => {
                return Err(ConfigError::Invalid { field: "origin".into(), reason: "must be an http(s) URL".into() });
            }
        }

        if !self.offline_page.starts_with('/') {
            return Err(ConfigError::Invalid { field: "offline_page".into(), reason: "must start with '/'".into() });
        }
        if let Some(asset) = self.precache_assets.iter().find(|a| !a.starts_with('/')) {
            return Err(ConfigError::Invalid {
                field: "precache_assets".into(),
                reason: format!("'{asset}' must start with '/'"),
            });
        }

        if self.timeout_ms < 100 {
            return Err(ConfigError::Invalid { field: "timeout_ms".into(), reason: "must be at least 100ms".into() });
        }
        if self.timeout_ms > 300_000 {
            return Err(ConfigError::Invalid {
                field: "timeout_ms".into(),
                reason: "must not exceed 5 minutes (300000ms)".into(),
            });
        }

        if self.max_bytes == 0 {
            return Err(ConfigError::Invalid { field: "max_bytes".into(), reason: "must be greater than 0".into() });
        }
        if self.max_bytes > 100 * 1024 * 1024 {
            return Err(ConfigError::Invalid { field: "max_bytes".into(), reason: "must not exceed 100MB".into() });
        }

        if self.queue.max_entries == 0 {
            return Err(ConfigError::Invalid {
                field: "queue.max_entries".into(),
                reason: "must be greater than 0".into(),
            });
        }
        if self.queue.max_age_days <= 0 {
            return Err(ConfigError::Invalid {
                field: "queue.max_age_days".into(),
                reason: "must be greater than 0".into(),
            });
        }
        if self.queue.max_age_days > MAX_QUEUE_AGE_DAYS {
            return Err(ConfigError::Invalid {
                field: "queue.max_age_days".into(),
                reason: format!("must not exceed {MAX_QUEUE_AGE_DAYS}"),
            });
        }

        if self.sync_tag.is_empty() {
            return Err(ConfigError::Missing {
                field: "sync_tag".into(),
                hint: "Set TIDECACHE_SYNC_TAG to the background-sync tag the host registers".into(),
            });
        }

        for pattern in &self.api_hosts {
            if self.font_hosts.iter().any(|h| h == pattern) {
                tracing::warn!(
                    host = %pattern,
                    "host listed in both api_hosts and font_hosts; API bypass takes precedence"
                );
            }
        }

        Ok(())
    }
}
