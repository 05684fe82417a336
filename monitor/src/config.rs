//! Configuration module for Shopwatch Monitor.
//!
//! This module handles parsing configuration from environment variables.
//!
//! # Environment Variables
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `SHOPWATCH_API_URL` | Yes | - | Store API base URL (e.g., `https://shop.example.com/api`) |
//! | `SHOPWATCH_STATE_DIR` | No | `~/.shopwatch` | Directory for credentials and hand-off state |
//! | `SHOPWATCH_POLL_INTERVAL_SECS` | No | 20 | Seconds between snapshot polls |
//! | `SHOPWATCH_IDLE_TIMEOUT_SECS` | No | 3600 | Inactivity before forced logout |
//! | `SHOPWATCH_FRESHNESS_WINDOW_SECS` | No | 300 | Max age of an order that counts as new |
//! | `SHOPWATCH_NOTIFY_NEW_ORDERS` | No | true | Notify on new orders |
//! | `SHOPWATCH_NOTIFY_CANCELLATIONS` | No | true | Notify on customer cancellations |
//! | `SHOPWATCH_NOTIFY_OUT_OF_STOCK` | No | true | Notify when an item runs out |
//!
//! # Example
//!
//! ```no_run
//! use shopwatch_monitor::config::Config;
//!
//! let config = Config::from_env().expect("Failed to load configuration");
//! println!("API URL: {}", config.api_url);
//! ```

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::BaseDirs;
use thiserror::Error;

/// Default state directory name relative to home.
const DEFAULT_STATE_DIR: &str = ".shopwatch";

/// Default poll period.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 20;

/// Default inactivity threshold (1 hour).
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 3600;

/// Default recency window for new orders (5 minutes).
pub const DEFAULT_FRESHNESS_WINDOW_SECS: u64 = 300;

/// Upper bound for any seconds setting (10 years).
pub const MAX_DURATION_SECS: u64 = 10 * 365 * 24 * 3600;

/// File name of the hand-off store inside the state directory.
const HANDOFF_FILE: &str = "handoff.json";

/// File name of the stored API token inside the state directory.
const CREDENTIALS_FILE: &str = "credentials";

/// Errors that can occur during configuration parsing.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    /// Environment variable has an invalid value.
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Failed to determine home directory.
    #[error("failed to determine home directory")]
    NoHomeDirectory,
}

/// Which transition kinds the user wants to be notified about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationPreferences {
    pub new_orders: bool,
    pub order_cancellations: bool,
    pub out_of_stock: bool,
}

impl Default for NotificationPreferences {
    fn default() -> Self {
        Self {
            new_orders: true,
            order_cancellations: true,
            out_of_stock: true,
        }
    }
}

/// Configuration for the Shopwatch Monitor.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the store API.
    pub api_url: String,

    /// Directory holding the credential file and the hand-off store.
    pub state_dir: PathBuf,

    /// Period between snapshot polls.
    pub poll_interval: Duration,

    /// Inactivity threshold for the idle watchdog.
    pub idle_timeout: Duration,

    /// Orders created longer ago than this are treated as historical backfill.
    pub freshness_window: Duration,

    /// Per-kind notification switches.
    pub preferences: NotificationPreferences,
}

impl Config {
    /// Creates a new `Config` by parsing environment variables.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if:
    /// - `SHOPWATCH_API_URL` is not set
    /// - A numeric variable is set but is not a positive integer
    /// - A boolean variable is set to something unrecognised
    /// - The home directory cannot be determined (needed for the default state dir)
    pub fn from_env() -> Result<Self, ConfigError> {
        // Required: SHOPWATCH_API_URL
        let api_url = env::var("SHOPWATCH_API_URL")
            .map_err(|_| ConfigError::MissingEnvVar("SHOPWATCH_API_URL".to_string()))?;

        let state_dir = state_dir_from_env()?;

        let poll_interval = Duration::from_secs(parse_secs(
            "SHOPWATCH_POLL_INTERVAL_SECS",
            DEFAULT_POLL_INTERVAL_SECS,
            1,
        )?);
        let idle_timeout = Duration::from_secs(parse_secs(
            "SHOPWATCH_IDLE_TIMEOUT_SECS",
            DEFAULT_IDLE_TIMEOUT_SECS,
            1,
        )?);
        let freshness_window = Duration::from_secs(parse_secs(
            "SHOPWATCH_FRESHNESS_WINDOW_SECS",
            DEFAULT_FRESHNESS_WINDOW_SECS,
            0,
        )?);

        let preferences = NotificationPreferences {
            new_orders: parse_flag("SHOPWATCH_NOTIFY_NEW_ORDERS")?,
            order_cancellations: parse_flag("SHOPWATCH_NOTIFY_CANCELLATIONS")?,
            out_of_stock: parse_flag("SHOPWATCH_NOTIFY_OUT_OF_STOCK")?,
        };

        Ok(Self {
            api_url,
            state_dir,
            poll_interval,
            idle_timeout,
            freshness_window,
            preferences,
        })
    }

    /// Path of the hand-off store file.
    #[must_use]
    pub fn handoff_path(&self) -> PathBuf {
        handoff_path_in(&self.state_dir)
    }

    /// Path of the stored API token.
    #[must_use]
    pub fn credentials_path(&self) -> PathBuf {
        credentials_path_in(&self.state_dir)
    }
}

/// Path of the hand-off store inside `state_dir`.
#[must_use]
pub fn handoff_path_in(state_dir: &Path) -> PathBuf {
    state_dir.join(HANDOFF_FILE)
}

/// Path of the stored API token inside `state_dir`.
#[must_use]
pub fn credentials_path_in(state_dir: &Path) -> PathBuf {
    state_dir.join(CREDENTIALS_FILE)
}

/// Resolves the state directory without requiring the API URL.
///
/// Used by commands that only touch local state (login, logout).
///
/// # Errors
///
/// Returns [`ConfigError::NoHomeDirectory`] if no override is set and the home
/// directory cannot be determined.
pub fn state_dir_from_env() -> Result<PathBuf, ConfigError> {
    if let Ok(dir) = env::var("SHOPWATCH_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }

    let base_dirs = BaseDirs::new().ok_or(ConfigError::NoHomeDirectory)?;
    Ok(base_dirs.home_dir().join(DEFAULT_STATE_DIR))
}

/// Parses an integer seconds value between `min` and [`MAX_DURATION_SECS`].
fn parse_secs(key: &str, default: u64, min: u64) -> Result<u64, ConfigError> {
    match env::var(key) {
        Ok(val) => {
            let secs = val.parse::<u64>().map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("expected non-negative integer, got '{val}'"),
            })?;
            if secs < min {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: format!("must be at least {min}, got {secs}"),
                });
            }
            if secs > MAX_DURATION_SECS {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: format!("must be at most {MAX_DURATION_SECS}, got {secs}"),
                });
            }
            Ok(secs)
        }
        Err(_) => Ok(default),
    }
}

/// Parses a boolean switch. Unset means enabled.
fn parse_flag(key: &str) -> Result<bool, ConfigError> {
    match env::var(key) {
        Ok(val) => match val.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("expected true or false, got '{val}'"),
            }),
        },
        Err(_) => Ok(true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    /// Runs `f` with every SHOPWATCH_* variable cleared, restoring them after.
    fn with_clean_env<F, R>(f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let saved_vars: Vec<(String, String)> = env::vars()
            .filter(|(k, _)| k.starts_with("SHOPWATCH_"))
            .collect();

        for (key, _) in &saved_vars {
            env::remove_var(key);
        }

        let result = f();

        for (key, _) in env::vars().filter(|(k, _)| k.starts_with("SHOPWATCH_")) {
            env::remove_var(key);
        }
        for (key, value) in saved_vars {
            env::set_var(key, value);
        }

        result
    }

    #[test]
    #[serial]
    fn test_missing_api_url() {
        with_clean_env(|| {
            let err = Config::from_env().unwrap_err();
            assert!(matches!(err, ConfigError::MissingEnvVar(ref s) if s == "SHOPWATCH_API_URL"));
        });
    }

    #[test]
    #[serial]
    fn test_minimal_config_uses_defaults() {
        with_clean_env(|| {
            env::set_var("SHOPWATCH_API_URL", "https://shop.example.com/api");
            env::set_var("SHOPWATCH_STATE_DIR", "/tmp/shopwatch-test");

            let config = Config::from_env().expect("should parse minimal config");

            assert_eq!(config.api_url, "https://shop.example.com/api");
            assert_eq!(config.poll_interval, Duration::from_secs(20));
            assert_eq!(config.idle_timeout, Duration::from_secs(3600));
            assert_eq!(config.freshness_window, Duration::from_secs(300));
            assert_eq!(config.preferences, NotificationPreferences::default());
            assert_eq!(
                config.handoff_path(),
                PathBuf::from("/tmp/shopwatch-test/handoff.json")
            );
            assert_eq!(
                config.credentials_path(),
                PathBuf::from("/tmp/shopwatch-test/credentials")
            );
        });
    }

    #[test]
    #[serial]
    fn test_default_state_dir_under_home() {
        with_clean_env(|| {
            env::set_var("SHOPWATCH_API_URL", "https://shop.example.com/api");

            let config = Config::from_env().expect("should parse");
            assert!(config.state_dir.ends_with(DEFAULT_STATE_DIR));
        });
    }

    #[test]
    #[serial]
    fn test_full_config() {
        with_clean_env(|| {
            env::set_var("SHOPWATCH_API_URL", "https://shop.example.com/api");
            env::set_var("SHOPWATCH_STATE_DIR", "/custom/state");
            env::set_var("SHOPWATCH_POLL_INTERVAL_SECS", "5");
            env::set_var("SHOPWATCH_IDLE_TIMEOUT_SECS", "900");
            env::set_var("SHOPWATCH_FRESHNESS_WINDOW_SECS", "60");
            env::set_var("SHOPWATCH_NOTIFY_NEW_ORDERS", "off");
            env::set_var("SHOPWATCH_NOTIFY_CANCELLATIONS", "YES");
            env::set_var("SHOPWATCH_NOTIFY_OUT_OF_STOCK", "0");

            let config = Config::from_env().expect("should parse full config");

            assert_eq!(config.state_dir, PathBuf::from("/custom/state"));
            assert_eq!(config.poll_interval, Duration::from_secs(5));
            assert_eq!(config.idle_timeout, Duration::from_secs(900));
            assert_eq!(config.freshness_window, Duration::from_secs(60));
            assert!(!config.preferences.new_orders);
            assert!(config.preferences.order_cancellations);
            assert!(!config.preferences.out_of_stock);
        });
    }

    #[test]
    #[serial]
    fn test_zero_poll_interval_rejected() {
        with_clean_env(|| {
            env::set_var("SHOPWATCH_API_URL", "https://shop.example.com/api");
            env::set_var("SHOPWATCH_POLL_INTERVAL_SECS", "0");

            let err = Config::from_env().unwrap_err();
            assert!(
                matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "SHOPWATCH_POLL_INTERVAL_SECS")
            );
        });
    }

    #[test]
    #[serial]
    fn test_non_numeric_idle_timeout_rejected() {
        with_clean_env(|| {
            env::set_var("SHOPWATCH_API_URL", "https://shop.example.com/api");
            env::set_var("SHOPWATCH_IDLE_TIMEOUT_SECS", "an hour");

            let err = Config::from_env().unwrap_err();
            assert_eq!(
                err.to_string(),
                "invalid value for SHOPWATCH_IDLE_TIMEOUT_SECS: expected non-negative integer, got 'an hour'"
            );
        });
    }

    #[test]
    #[serial]
    fn test_oversized_idle_timeout_rejected() {
        with_clean_env(|| {
            env::set_var("SHOPWATCH_API_URL", "https://shop.example.com/api");
            env::set_var("SHOPWATCH_IDLE_TIMEOUT_SECS", u64::MAX.to_string());

            let err = Config::from_env().unwrap_err();
            assert!(
                matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "SHOPWATCH_IDLE_TIMEOUT_SECS")
            );
        });
    }

    #[test]
    #[serial]
    fn test_max_duration_accepted() {
        with_clean_env(|| {
            env::set_var("SHOPWATCH_API_URL", "https://shop.example.com/api");
            env::set_var("SHOPWATCH_IDLE_TIMEOUT_SECS", MAX_DURATION_SECS.to_string());

            let config = Config::from_env().unwrap();
            assert_eq!(config.idle_timeout, Duration::from_secs(MAX_DURATION_SECS));
        });
    }

    #[test]
    #[serial]
    fn test_zero_freshness_window_allowed() {
        with_clean_env(|| {
            env::set_var("SHOPWATCH_API_URL", "https://shop.example.com/api");
            env::set_var("SHOPWATCH_FRESHNESS_WINDOW_SECS", "0");

            let config = Config::from_env().unwrap();
            assert_eq!(config.freshness_window, Duration::ZERO);
        });
    }

    #[test]
    #[serial]
    fn test_invalid_flag_rejected() {
        with_clean_env(|| {
            env::set_var("SHOPWATCH_API_URL", "https://shop.example.com/api");
            env::set_var("SHOPWATCH_NOTIFY_OUT_OF_STOCK", "maybe");

            let err = Config::from_env().unwrap_err();
            assert!(
                matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "SHOPWATCH_NOTIFY_OUT_OF_STOCK")
            );
        });
    }

    #[test]
    #[serial]
    fn test_state_dir_override_without_api_url() {
        with_clean_env(|| {
            env::set_var("SHOPWATCH_STATE_DIR", "/only/state");
            assert_eq!(state_dir_from_env().unwrap(), PathBuf::from("/only/state"));
        });
    }
}
