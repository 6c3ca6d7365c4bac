// src/utils/http.rs

//! HTTP client utilities.

use std::time::Duration;

use crate::error::Result;
use crate::models::ApiConfig;

/// Create a configured asynchronous HTTP client.
pub fn create_client(config: &ApiConfig) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(&config.user_agent)
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;
    Ok(client)
}

/// Bearer token from the explicit value, else from the configured
/// environment variable.
pub fn resolve_token(explicit: Option<String>, config: &ApiConfig) -> Option<String> {
    explicit
        .or_else(|| std::env::var(&config.token_env).ok())
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}
