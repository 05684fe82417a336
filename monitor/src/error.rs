//! Error types for the Shopwatch Monitor.
//!
//! Each module owns a focused error enum; [`MonitorError`] gathers them for
//! callers that drive the whole monitor.

use thiserror::Error;

use crate::api::ApiError;
use crate::config::ConfigError;
use crate::handoff::HandoffError;
use crate::session::SessionError;

/// Errors that can occur during monitor operations.
///
/// # Examples
///
/// ```ignore
/// use shopwatch_monitor::error::MonitorError;
///
/// fn load() -> Result<(), MonitorError> {
///     let config = Config::from_env()?;
///     let handoff = HandoffStore::open(config.handoff_path())?;
///     Ok(())
/// }
/// ```
#[derive(Error, Debug)]
pub enum MonitorError {
    /// Configuration-related error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// File system I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing or serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Remote store API error.
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// Hand-off store error.
    #[error("hand-off error: {0}")]
    Handoff(#[from] HandoffError),

    /// Credential storage error.
    #[error("session error: {0}")]
    Session(#[from] SessionError),
}

/// A specialized `Result` type for monitor operations.
pub type Result<T> = std::result::Result<T, MonitorError>;
