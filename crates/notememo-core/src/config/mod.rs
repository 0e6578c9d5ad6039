//! Sync configuration for client processes.
//!
//! The core never reads the environment itself; binaries collect values (from
//! the process environment, optionally primed by `.env`) and hand them to
//! [`SyncConfig::from_lookup`].

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::util::{format_access_code, is_http_url, normalize_text_option};

/// Default bound on every remote call
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Default period of background sync
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(300);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Settings recognized by the sync subsystem.
#[derive(Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Master switch; when off every pass is skipped
    pub sync_enabled: bool,
    /// Explicit user identity; falls back to the id learned from the server
    pub user_identity: Option<String>,
    /// Base URL of the sync API
    pub api_base_url: Option<String>,
    /// Access code sent with every request
    pub access_code: Option<String>,
    pub fetch_timeout: Duration,
    pub sync_interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            sync_enabled: false,
            user_identity: None,
            api_base_url: None,
            access_code: None,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            sync_interval: DEFAULT_SYNC_INTERVAL,
        }
    }
}

impl fmt::Debug for SyncConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("SyncConfig")
            .field("sync_enabled", &self.sync_enabled)
            .field("user_identity", &self.user_identity)
            .field("api_base_url", &self.api_base_url)
            .field(
                "access_code",
                &self.access_code.as_ref().map(|_| "[REDACTED]"),
            )
            .field("fetch_timeout", &self.fetch_timeout)
            .field("sync_interval", &self.sync_interval)
            .finish()
    }
}

impl SyncConfig {
    /// Build a config from a key lookup (usually the process environment)
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let sync_enabled = optional_trimmed(&lookup, "NOTEMEMO_SYNC_ENABLED")
            .map(|value| parse_flag("NOTEMEMO_SYNC_ENABLED", &value))
            .transpose()?
            .unwrap_or(false);

        let user_identity = optional_trimmed(&lookup, "NOTEMEMO_USER_ID");

        let api_base_url = optional_trimmed(&lookup, "NOTEMEMO_API_URL")
            .map(|url| url.trim_end_matches('/').to_string());
        if let Some(url) = api_base_url.as_deref() {
            if !is_http_url(url) {
                return Err(ConfigError::Invalid(
                    "NOTEMEMO_API_URL must start with http:// or https://".to_string(),
                ));
            }
        }

        let access_code = optional_trimmed(&lookup, "NOTEMEMO_ACCESS_CODE")
            .map(|code| format_access_code(&code))
            .filter(|code| !code.is_empty());

        let fetch_timeout = parse_secs(&lookup, "NOTEMEMO_SYNC_TIMEOUT_SECS", 1..=60)?
            .unwrap_or(DEFAULT_FETCH_TIMEOUT);
        let sync_interval = parse_secs(&lookup, "NOTEMEMO_SYNC_INTERVAL_SECS", 10..=86_400)?
            .unwrap_or(DEFAULT_SYNC_INTERVAL);

        if sync_enabled && api_base_url.is_none() {
            return Err(ConfigError::MissingVar("NOTEMEMO_API_URL"));
        }
        if sync_enabled && access_code.is_none() {
            return Err(ConfigError::MissingVar("NOTEMEMO_ACCESS_CODE"));
        }

        Ok(Self {
            sync_enabled,
            user_identity,
            api_base_url,
            access_code,
            fetch_timeout,
            sync_interval,
        })
    }
}

/// Parse a boolean environment flag
pub fn parse_flag(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid(format!("{name} must be true or false"))),
    }
}

fn parse_secs(
    lookup: impl Fn(&str) -> Option<String>,
    name: &str,
    range: std::ops::RangeInclusive<u64>,
) -> Result<Option<Duration>, ConfigError> {
    let Some(raw) = optional_trimmed(lookup, name) else {
        return Ok(None);
    };
    let secs = raw.parse::<u64>().map_err(|_| {
        ConfigError::Invalid(format!(
            "{name} must be an integer in [{}, {}]",
            range.start(),
            range.end()
        ))
    })?;
    if !range.contains(&secs) {
        return Err(ConfigError::Invalid(format!(
            "{name} must be in [{}, {}]",
            range.start(),
            range.end()
        )));
    }
    Ok(Some(Duration::from_secs(secs)))
}

fn optional_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    normalize_text_option(lookup(name))
}
