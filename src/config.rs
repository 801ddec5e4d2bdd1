//! Runtime configuration resolved from the environment and the stored entry.
//! Environment values win; the entry fills in whatever is not set.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::client::DEFAULT_BASE_URL;
use crate::entry::EntryData;

pub const DEFAULT_SCAN_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_SCAN_TIMEOUT_SECS: u64 = 15;
pub const MIN_SCAN_INTERVAL_SECS: u64 = 20;
pub const MIN_SCAN_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_ENTRY_FILE: &str = "jablotron_cloud.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    MissingCredentials,
    InvalidNumber { var: &'static str, value: String },
    IntervalTooShort(u64),
    TimeoutTooLow(u64),
}

impl ConfigError {
    /// Short machine-readable reason, as shown by the options form.
    pub fn code(&self) -> &'static str {
        match self {
            ConfigError::MissingCredentials => "invalid_auth",
            ConfigError::InvalidNumber { .. } => "invalid_number",
            ConfigError::IntervalTooShort(_) => "interval_too_short",
            ConfigError::TimeoutTooLow(_) => "timeout_too_low",
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingCredentials => write!(
                f,
                "missing credentials: set JABLOTRON_USERNAME and JABLOTRON_PASSWORD"
            ),
            ConfigError::InvalidNumber { var, value } => {
                write!(f, "{} must be a whole number of seconds, got '{}'", var, value)
            }
            ConfigError::IntervalTooShort(secs) => write!(
                f,
                "scan interval of {}s is too short (minimum {}s)",
                secs, MIN_SCAN_INTERVAL_SECS
            ),
            ConfigError::TimeoutTooLow(secs) => write!(
                f,
                "scan timeout of {}s is too low (minimum {}s)",
                secs, MIN_SCAN_TIMEOUT_SECS
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone)]
pub struct Config {
    pub username: String,
    pub password: String,
    /// PIN used when a control request does not carry its own code.
    pub default_pin: String,
    /// Arm even when some sensors are reporting a fault.
    pub force_arm: bool,
    pub scan_interval: Duration,
    /// Upper bound for one refresh pass and for each request.
    pub scan_timeout: Duration,
    pub entry_file: PathBuf,
    pub api_url: String,
}

impl Config {
    pub fn from_env(stored: Option<&EntryData>) -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok(), stored)
    }

    pub fn from_lookup<F>(lookup: F, stored: Option<&EntryData>) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let stored = stored.cloned().unwrap_or_default();

        let username = var("JABLOTRON_USERNAME")
            .map(|v| v.trim().to_string())
            .or(stored.username)
            .ok_or(ConfigError::MissingCredentials)?;
        let password = var("JABLOTRON_PASSWORD")
            .or(stored.password)
            .ok_or(ConfigError::MissingCredentials)?;

        let default_pin = var("JABLOTRON_PIN").or(stored.pin).unwrap_or_default();

        let force_arm = var("JABLOTRON_FORCE_ARM")
            .map(|s| matches!(s.trim(), "1" | "true" | "TRUE"))
            .or(stored.force_update)
            .unwrap_or(true);

        let scan_interval = match var("SCAN_INTERVAL_SECS") {
            Some(v) => parse_secs("SCAN_INTERVAL_SECS", &v)?,
            None => stored.scan_interval.unwrap_or(DEFAULT_SCAN_INTERVAL_SECS),
        };
        if scan_interval < MIN_SCAN_INTERVAL_SECS {
            return Err(ConfigError::IntervalTooShort(scan_interval));
        }

        let scan_timeout = match var("SCAN_TIMEOUT_SECS") {
            Some(v) => parse_secs("SCAN_TIMEOUT_SECS", &v)?,
            None => stored.timeout.unwrap_or(DEFAULT_SCAN_TIMEOUT_SECS),
        };
        if scan_timeout < MIN_SCAN_TIMEOUT_SECS {
            return Err(ConfigError::TimeoutTooLow(scan_timeout));
        }

        Ok(Config {
            username,
            password,
            default_pin,
            force_arm,
            scan_interval: Duration::from_secs(scan_interval),
            scan_timeout: Duration::from_secs(scan_timeout),
            entry_file: entry_file_from(&var),
            api_url: var("JABLOTRON_API_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        })
    }

    /// Options as they are persisted in the config entry.
    pub fn to_entry_data(&self) -> EntryData {
        EntryData {
            username: Some(self.username.clone()),
            password: Some(self.password.clone()),
            pin: Some(self.default_pin.clone()),
            force_update: Some(self.force_arm),
            scan_interval: Some(self.scan_interval.as_secs()),
            timeout: Some(self.scan_timeout.as_secs()),
        }
    }
}

/// Location of the entry file, needed before the rest of the config can be resolved.
pub fn entry_file_from_env() -> PathBuf {
    entry_file_from(&|key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty()))
}

fn entry_file_from(var: &dyn Fn(&str) -> Option<String>) -> PathBuf {
    PathBuf::from(var("JABLOTRON_ENTRY_FILE").unwrap_or_else(|| DEFAULT_ENTRY_FILE.to_string()))
}

fn parse_secs(var: &'static str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse::<u64>().map_err(|_| ConfigError::InvalidNumber {
        var,
        value: value.to_string(),
    })
}
