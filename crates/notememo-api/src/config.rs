use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::PathBuf;

use notememo_core::config::parse_flag;
use notememo_core::util::format_access_code;
use notememo_core::ConfigError;

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";
const DEFAULT_DB_PATH: &str = "notememo-server.db";

#[derive(Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub enable_sync: bool,
    /// Normalized access codes accepted by the server
    pub access_codes: Vec<String>,
    pub db_path: PathBuf,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("AppConfig")
            .field("bind_addr", &self.bind_addr)
            .field("enable_sync", &self.enable_sync)
            .field(
                "access_codes",
                &format_args!("[REDACTED; {}]", self.access_codes.len()),
            )
            .field("db_path", &self.db_path)
            .finish()
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_addr = value_or_default(&lookup, "NOTEMEMO_API_BIND_ADDR", DEFAULT_BIND_ADDR);
        let db_path = PathBuf::from(value_or_default(
            &lookup,
            "NOTEMEMO_API_DB_PATH",
            DEFAULT_DB_PATH,
        ));

        let enable_sync = match optional_trimmed(&lookup, "ENABLE_SYNC") {
            Some(value) => parse_flag("ENABLE_SYNC", &value)?,
            None => false,
        };

        let raw_codes = optional_trimmed(&lookup, "ACCESS_CODES")
            .or_else(|| optional_trimmed(&lookup, "ACCESS_CODE"))
            .unwrap_or_default();
        let mut access_codes: Vec<String> = Vec::new();
        for raw in raw_codes.split(',') {
            let code = format_access_code(raw);
            if code.is_empty() {
                if !raw.trim().is_empty() {
                    return Err(ConfigError::Invalid(
                        "ACCESS_CODES entries must contain digits".to_string(),
                    ));
                }
                continue;
            }
            if !access_codes.contains(&code) {
                access_codes.push(code);
            }
        }

        if enable_sync && access_codes.is_empty() {
            return Err(ConfigError::MissingVar("ACCESS_CODES"));
        }

        Ok(Self {
            bind_addr,
            enable_sync,
            access_codes,
            db_path,
        })
    }

    /// Whether `code` (already normalized) may use the sync routes
    pub fn accepts(&self, code: &str) -> bool {
        self.access_codes.iter().any(|allowed| allowed == code)
    }
}

fn value_or_default(lookup: impl Fn(&str) -> Option<String>, name: &str, default: &str) -> String {
    optional_trimmed(lookup, name).unwrap_or_else(|| default.to_string())
}

fn optional_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}
