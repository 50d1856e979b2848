//! Configuration management for the check-in scanner.
//!
//! Loads configuration from environment variables with sensible defaults.
//! Numbers that fail to parse are reported, never silently replaced by the
//! default.

use crate::scanner::DEFAULT_COOLDOWN;
use crate::types::UserId;
use crate::validator::{DEFAULT_MAX_IDENTIFIER_LEN, DEFAULT_PREFIXES, PayloadFormat};
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Default RPC function name for check-ins
pub const DEFAULT_CHECKIN_FUNCTION: &str = "check_in_to_event";

/// Default backend request timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Configuration errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required variable is not set
    #[error("{0} is not set")]
    Missing(&'static str),

    /// A variable is set to something unusable
    #[error("{var}={value:?} is invalid: {reason}")]
    Invalid {
        /// Variable name
        var: &'static str,
        /// Value as found
        value: String,
        /// What is wrong with it
        reason: String,
    },
}

/// Application configuration loaded from environment variables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Remote check-in backend; `None` in offline mode
    pub backend: Option<BackendConfig>,
    /// Scanner behaviour
    pub scanner: ScannerConfig,
    /// Console harness settings
    pub cli: CliConfig,
}

/// Remote check-in backend
#[derive(Clone, PartialEq, Eq)]
pub struct BackendConfig {
    /// Project URL, e.g. `https://xyz.example.co`
    pub base_url: String,
    /// Public anon key sent as `apikey`
    pub anon_key: String,
    /// Member session token, sent as bearer when present
    pub access_token: Option<String>,
    /// RPC function name
    pub checkin_function: String,
    /// Per-request timeout
    pub request_timeout: Duration,
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("base_url", &self.base_url)
            .field("anon_key", &"<redacted>")
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("checkin_function", &self.checkin_function)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// Scanner behaviour
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannerConfig {
    /// Duplicate-suppression window after the lock is released
    pub cooldown: Duration,
    /// Provider prefixes stripped from payloads
    pub payload_prefixes: Vec<String>,
    /// Maximum identifier length in characters
    pub max_identifier_len: usize,
}

impl ScannerConfig {
    /// Payload format built from the prefixes and length bound
    #[must_use]
    pub fn payload_format(&self) -> PayloadFormat {
        PayloadFormat::new(self.payload_prefixes.iter().cloned(), self.max_identifier_len)
    }
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            cooldown: DEFAULT_COOLDOWN,
            payload_prefixes: DEFAULT_PREFIXES.iter().map(|p| (*p).to_owned()).collect(),
            max_identifier_len: DEFAULT_MAX_IDENTIFIER_LEN,
        }
    }
}

/// Console harness settings
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CliConfig {
    /// Member to check in as
    pub user_id: Option<UserId>,
    /// Use the in-memory backend instead of HTTP
    pub offline: bool,
    /// `(identifier, name)` pairs seeded into the in-memory backend
    pub offline_events: Vec<(String, String)>,
    /// Log filter override
    pub log_filter: Option<String>,
}

impl Config {
    /// Load configuration from the process environment
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a required variable is missing or a value
    /// does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a required variable is missing or a value
    /// does not parse.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let offline = match var("ROLLCALL_OFFLINE") {
            Some(value) => parse_flag("ROLLCALL_OFFLINE", &value)?,
            None => false,
        };

        let cli = CliConfig {
            user_id: var("ROLLCALL_USER_ID").map(|id| UserId::new(id.trim())),
            offline,
            offline_events: match var("ROLLCALL_OFFLINE_EVENTS") {
                Some(value) => parse_events("ROLLCALL_OFFLINE_EVENTS", &value)?,
                None => Vec::new(),
            },
            log_filter: var("ROLLCALL_LOG"),
        };

        let scanner = ScannerConfig {
            cooldown: parse_millis(
                "ROLLCALL_SCAN_COOLDOWN_MS",
                var("ROLLCALL_SCAN_COOLDOWN_MS"),
                DEFAULT_COOLDOWN,
            )?,
            payload_prefixes: var("ROLLCALL_PAYLOAD_PREFIXES").map_or_else(
                || ScannerConfig::default().payload_prefixes,
                |value| {
                    value
                        .split(',')
                        .map(str::trim)
                        .filter(|p| !p.is_empty())
                        .map(str::to_owned)
                        .collect()
                },
            ),
            max_identifier_len: parse_or(
                "ROLLCALL_MAX_IDENTIFIER_LEN",
                var("ROLLCALL_MAX_IDENTIFIER_LEN"),
                DEFAULT_MAX_IDENTIFIER_LEN,
            )?,
        };

        if scanner.max_identifier_len == 0 {
            return Err(ConfigError::Invalid {
                var: "ROLLCALL_MAX_IDENTIFIER_LEN",
                value: "0".to_owned(),
                reason: "must be at least 1".to_owned(),
            });
        }

        let backend = if offline {
            None
        } else {
            Some(BackendConfig {
                base_url: var("ROLLCALL_BACKEND_URL")
                    .ok_or(ConfigError::Missing("ROLLCALL_BACKEND_URL"))?,
                anon_key: var("ROLLCALL_ANON_KEY").ok_or(ConfigError::Missing("ROLLCALL_ANON_KEY"))?,
                access_token: var("ROLLCALL_ACCESS_TOKEN"),
                checkin_function: var("ROLLCALL_CHECKIN_FUNCTION")
                    .unwrap_or_else(|| DEFAULT_CHECKIN_FUNCTION.to_owned()),
                request_timeout: parse_millis(
                    "ROLLCALL_REQUEST_TIMEOUT_MS",
                    var("ROLLCALL_REQUEST_TIMEOUT_MS"),
                    DEFAULT_REQUEST_TIMEOUT,
                )?,
            })
        };

        Ok(Self {
            backend,
            scanner,
            cli,
        })
    }
}

fn parse_or<T>(var: &'static str, value: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            reason: e.to_string(),
            value,
        }),
        None => Ok(default),
    }
}

fn parse_millis(
    var: &'static str,
    value: Option<String>,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match value {
        Some(value) => parse_or::<u64>(var, Some(value), 0).map(Duration::from_millis),
        None => Ok(default),
    }
}

fn parse_flag(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            var,
            value: value.to_owned(),
            reason: "expected 1/0, true/false, yes/no or on/off".to_owned(),
        }),
    }
}

fn parse_events(var: &'static str, value: &str) -> Result<Vec<(String, String)>, ConfigError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| match entry.split_once('=') {
            Some((id, name)) if !id.trim().is_empty() => {
                Ok((id.trim().to_owned(), name.trim().to_owned()))
            },
            _ => Err(ConfigError::Invalid {
                var,
                value: entry.to_owned(),
                reason: "expected id=name".to_owned(),
            }),
        })
        .collect()
}
