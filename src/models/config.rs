//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Upper bound on attempts per unit (one retry).
pub const MAX_ATTEMPTS: u8 = 2;

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Remote API endpoint and HTTP client settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Concurrency, pagination and chunking settings
    #[serde(default)]
    pub harvest: HarvestConfig,

    /// Attempts per unit for each record kind
    #[serde(default)]
    pub retry: RetryConfig,

    /// On-disk layout
    #[serde(default)]
    pub paths: PathsConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration, or defaults when the file does not exist.
    ///
    /// A file that exists but fails to parse is still an error.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            log::info!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.api.user_agent.trim().is_empty() {
            return Err(AppError::validation("api.user_agent is empty"));
        }
        if self.api.timeout_secs == 0 {
            return Err(AppError::validation("api.timeout_secs must be > 0"));
        }
        url::Url::parse(&self.api.base_url)?;
        if !self.api.base_url.ends_with('/') {
            return Err(AppError::validation("api.base_url must end with '/'"));
        }
        if !self.api.site_url.is_empty() {
            url::Url::parse(&self.api.site_url)?;
            if !self.api.site_url.ends_with('/') {
                return Err(AppError::validation("api.site_url must end with '/'"));
            }
        }
        if self.harvest.collection_concurrency == 0 {
            return Err(AppError::validation(
                "harvest.collection_concurrency must be > 0",
            ));
        }
        if self.harvest.page_size == 0 {
            return Err(AppError::validation("harvest.page_size must be > 0"));
        }
        if self.harvest.chunk_size == 0 {
            return Err(AppError::validation("harvest.chunk_size must be > 0"));
        }
        for (name, attempts) in self.retry.entries() {
            if attempts == 0 || attempts > MAX_ATTEMPTS {
                return Err(AppError::validation(format!(
                    "retry.{name} must be between 1 and {MAX_ATTEMPTS}"
                )));
            }
        }
        Ok(())
    }
}

/// Remote API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL every endpoint path is joined onto
    #[serde(default = "defaults::base_url")]
    pub base_url: String,

    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Environment variable holding the bearer token
    #[serde(default = "defaults::token_env")]
    pub token_env: String,

    /// Profile site for username lookups (empty disables them)
    #[serde(default = "defaults::site_url")]
    pub site_url: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::base_url(),
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            token_env: defaults::token_env(),
            site_url: defaults::site_url(),
        }
    }
}

/// Harvest behaviour settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestConfig {
    /// Concurrent units for catalog kinds (0 = available parallelism)
    #[serde(default)]
    pub max_concurrent: usize,

    /// Concurrent units for account collection batches
    #[serde(default = "defaults::collection_concurrency")]
    pub collection_concurrency: usize,

    /// Records requested per page
    #[serde(default = "defaults::page_size")]
    pub page_size: usize,

    /// Delay between pages of one query in milliseconds
    #[serde(default = "defaults::page_delay")]
    pub page_delay_ms: u64,

    /// Units per checkpointed chunk
    #[serde(default = "defaults::chunk_size")]
    pub chunk_size: usize,

    /// Subject type accepted into the catalog (2 = anime)
    #[serde(default = "defaults::subject_type")]
    pub subject_type: u8,
}

impl HarvestConfig {
    /// Effective concurrency for catalog kinds.
    pub fn concurrency(&self) -> usize {
        if self.max_concurrent > 0 {
            return self.max_concurrent;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
    }

    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 0,
            collection_concurrency: defaults::collection_concurrency(),
            page_size: defaults::page_size(),
            page_delay_ms: defaults::page_delay(),
            chunk_size: defaults::chunk_size(),
            subject_type: defaults::subject_type(),
        }
    }
}

/// Attempts per unit. Catalog fetches are not retried by default; account
/// collections get one retry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "defaults::single_attempt")]
    pub catalog: u8,

    #[serde(default = "defaults::single_attempt")]
    pub staff: u8,

    #[serde(default = "defaults::single_attempt")]
    pub relations: u8,

    #[serde(default = "defaults::collection_attempts")]
    pub collections: u8,
}

impl RetryConfig {
    fn entries(&self) -> [(&'static str, u8); 4] {
        [
            ("catalog", self.catalog),
            ("staff", self.staff),
            ("relations", self.relations),
            ("collections", self.collections),
        ]
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            catalog: defaults::single_attempt(),
            staff: defaults::single_attempt(),
            relations: defaults::single_attempt(),
            collections: defaults::collection_attempts(),
        }
    }
}

/// File layout settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory holding corpora, remap tables and skip logs
    #[serde(default = "defaults::data_dir")]
    pub data_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: defaults::data_dir(),
        }
    }
}

mod defaults {
    use std::path::PathBuf;

    // API defaults
    pub fn base_url() -> String {
        "https://api.bgm.tv/v0/".into()
    }
    pub fn user_agent() -> String {
        "harvester/0.1 (+https://github.com/bangumi/api)".into()
    }
    pub fn timeout() -> u64 {
        60
    }
    pub fn token_env() -> String {
        "TOKEN".into()
    }
    pub fn site_url() -> String {
        "https://bgm.tv/".into()
    }

    // Harvest defaults
    pub fn collection_concurrency() -> usize {
        8
    }
    pub fn page_size() -> usize {
        40
    }
    pub fn page_delay() -> u64 {
        500
    }
    pub fn chunk_size() -> usize {
        100
    }
    pub fn subject_type() -> u8 {
        2
    }

    // Retry defaults
    pub fn single_attempt() -> u8 {
        1
    }
    pub fn collection_attempts() -> u8 {
        2
    }

    // Path defaults
    pub fn data_dir() -> PathBuf {
        PathBuf::from("data")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_default_config_ok() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_user_agent() {
        let mut config = Config::default();
        config.api.user_agent = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_more_than_one_retry() {
        let mut config = Config::default();
        config.retry.collections = 3;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_base_url_without_trailing_slash() {
        let mut config = Config::default();
        config.api.base_url = "https://api.bgm.tv/v0".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_accepts_disabled_site_and_rejects_bad_one() {
        let mut config = Config::default();
        config.api.site_url = String::new();
        assert!(config.validate().is_ok());

        config.api.site_url = "https://bgm.tv".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let config: Config = toml::from_str(
            r#"
            [harvest]
            chunk_size = 200

            [retry]
            catalog = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.harvest.chunk_size, 200);
        assert_eq!(config.harvest.page_size, 40);
        assert_eq!(config.retry.catalog, 2);
        assert_eq!(config.retry.collections, 2);
        assert_eq!(config.api.timeout_secs, 60);
    }

    #[test]
    fn missing_file_loads_defaults_but_malformed_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("harvest.toml");
        let config = Config::load_or_default(&missing).unwrap();
        assert_eq!(config.harvest.chunk_size, 100);

        let broken = dir.path().join("broken.toml");
        fs::write(&broken, "[harvest\nchunk_size = ").unwrap();
        let result = Config::load_or_default(&broken);
        assert!(matches!(result, Err(AppError::Toml(_))));
    }

    #[test]
    fn zero_concurrency_means_available_parallelism() {
        let harvest = HarvestConfig::default();
        assert!(harvest.concurrency() >= 1);

        let fixed = HarvestConfig {
            max_concurrent: 3,
            ..HarvestConfig::default()
        };
        assert_eq!(fixed.concurrency(), 3);
    }
}
