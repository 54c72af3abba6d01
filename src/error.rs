// src/error.rs

//! Unified error handling for the archive crawler.
//!
//! Errors fall into two propagation classes. Item-level errors (validation,
//! gone, single fetch failures) are logged by the job loop and the next item
//! is processed. Run-level errors (temporary ban, abort, configuration) stop
//! the current run immediately; see [`AppError::is_run_level`].

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

/// Result type alias for crawler operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Diagnostic key/value pairs attached to block signals.
pub type Context = BTreeMap<String, String>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// SQLite operation failed
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// CSS selector parsing failed
    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    /// Storage backend rejected or failed an operation
    #[error("Storage error: {0}")]
    Storage(String),

    /// A single store call exceeded the backend's per-call ceiling
    #[error("Batch of {size} exceeds the {limit} {kind} limit per call")]
    BatchLimit {
        kind: &'static str,
        size: usize,
        limit: usize,
    },

    /// Configuration error (unsupported partition year, missing credentials)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Extracted data failed schema checks
    #[error("Validation error: {0}")]
    Validation(String),

    /// Source answered with a non-success status that is not a block
    #[error("HTTP status {status} for {url}")]
    Status { status: u16, url: String },

    /// Item no longer exists upstream (404/410 or a not-found page)
    #[error("Gone: {0}")]
    Gone(String),

    /// Source site reported a temporary IP ban
    #[error("Temporary ban: {message}")]
    TemporaryBan { message: String, context: Context },

    /// Structural block; the run must stop without rescheduling
    #[error("Crawl aborted: {message}")]
    Abort { message: String, context: Context },
}

impl AppError {
    /// Create a selector parsing error.
    pub fn selector(selector: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a storage error.
    pub fn storage(message: impl fmt::Display) -> Self {
        Self::Storage(message.to_string())
    }

    /// Create a temporary ban signal with diagnostic context.
    pub fn temporary_ban(message: impl Into<String>, context: Context) -> Self {
        Self::TemporaryBan {
            message: message.into(),
            context,
        }
    }

    /// Create an abort signal with diagnostic context.
    pub fn abort(message: impl Into<String>, context: Context) -> Self {
        Self::Abort {
            message: message.into(),
            context,
        }
    }

    /// Errors that stop the whole run instead of the current item.
    pub fn is_run_level(&self) -> bool {
        matches!(
            self,
            Self::TemporaryBan { .. } | Self::Abort { .. } | Self::Config(_)
        )
    }

    /// Connection- or timeout-level failures eligible for a bounded retry.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::Sqlite(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }

    /// Diagnostic context carried by block signals.
    pub fn context(&self) -> Option<&Context> {
        match self {
            Self::TemporaryBan { context, .. } | Self::Abort { context, .. } => Some(context),
            _ => None,
        }
    }
}
