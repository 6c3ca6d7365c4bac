// src/error.rs

//! Unified error handling for the harvester.
//!
//! `AppError` covers everything that is fatal to a run: corpus I/O,
//! configuration and input validation. Per-unit fetch outcomes live in
//! [`crate::services::FetchError`] and never abort a batch.

use std::fmt;
use std::path::Path;

use thiserror::Error;

/// Result type alias for harvester operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client could not be built
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// CSV reading or writing failed
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Input validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Persisted corpus could not be read or written
    #[error("Corpus error for {path}: {message}")]
    Corpus { path: String, message: String },
}

impl AppError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a corpus I/O error for the given file.
    pub fn corpus(path: impl AsRef<Path>, message: impl fmt::Display) -> Self {
        Self::Corpus {
            path: path.as_ref().display().to_string(),
            message: message.to_string(),
        }
    }
}
