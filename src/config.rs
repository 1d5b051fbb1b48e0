//! Configuration management for the member export.
//!
//! Supports loading from environment variables, config files, and CLI arguments.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_API_ID: &str = "CHANNEL_MEMBERS_API_ID";
pub const ENV_API_HASH: &str = "CHANNEL_MEMBERS_API_HASH";
pub const ENV_PHONE: &str = "CHANNEL_MEMBERS_PHONE";
pub const ENV_USERNAME: &str = "CHANNEL_MEMBERS_USERNAME";
pub const ENV_API_URL: &str = "CHANNEL_MEMBERS_API_URL";

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperConfig {
    /// Account credentials for the messaging API
    #[serde(default)]
    pub credentials: Credentials,

    /// Base URL of the HTTP gateway in front of the messaging API
    #[serde(default = "default_api_url")]
    pub api_base_url: String,

    /// Member listing loop settings
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Client-side throttling
    #[serde(default)]
    pub rate_limits: RateLimitConfig,

    /// Output file locations
    #[serde(default)]
    pub paths: PathConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub api_id: String,

    #[serde(default)]
    pub api_hash: String,

    /// Phone number the login code is sent to
    #[serde(default)]
    pub phone: String,

    /// Session name on the gateway
    #[serde(default)]
    pub username: String,
}

impl Credentials {
    /// Names of the environment variables whose values are still missing.
    pub fn missing(&self) -> Vec<&'static str> {
        [
            (ENV_API_ID, &self.api_id),
            (ENV_API_HASH, &self.api_hash),
            (ENV_PHONE, &self.phone),
            (ENV_USERNAME, &self.username),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect()
    }

    fn apply_env(&mut self) {
        for (name, slot) in [
            (ENV_API_ID, &mut self.api_id),
            (ENV_API_HASH, &mut self.api_hash),
            (ENV_PHONE, &mut self.phone),
            (ENV_USERNAME, &mut self.username),
        ] {
            if let Ok(value) = std::env::var(name) {
                *slot = value;
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Members requested per page
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Budget for unclassified failures over a whole listing
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Fixed backoff after an unclassified failure (seconds)
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,

    /// Pause between full pages (ms)
    #[serde(default = "default_page_pause_ms")]
    pub page_pause_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            max_retries: default_max_retries(),
            retry_delay_secs: default_retry_delay_secs(),
            page_pause_ms: default_page_pause_ms(),
        }
    }
}

impl FetchConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn page_pause(&self) -> Duration {
        Duration::from_millis(self.page_pause_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum requests per second sent to the gateway
    #[serde(default = "default_rps")]
    pub requests_per_second: u32,

    /// HTTP client timeout (seconds)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_rps(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    #[serde(default = "default_members_file")]
    pub members_file: String,

    #[serde(default = "default_names_file")]
    pub names_file: String,

    #[serde(default = "default_metadata_file")]
    pub metadata_file: String,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            members_file: default_members_file(),
            names_file: default_names_file(),
            metadata_file: default_metadata_file(),
        }
    }
}

impl PathConfig {
    pub fn members_path(&self) -> PathBuf {
        self.output_dir.join(&self.members_file)
    }

    pub fn names_path(&self) -> PathBuf {
        self.output_dir.join(&self.names_file)
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.output_dir.join(&self.metadata_file)
    }
}

// Default value functions
fn default_api_url() -> String {
    "http://127.0.0.1:8081".to_string()
}

fn default_page_size() -> u32 {
    200 // Largest page the participants listing serves
}

fn default_max_retries() -> u32 {
    5
}

fn default_retry_delay_secs() -> u64 {
    30
}

fn default_page_pause_ms() -> u64 {
    1000
}

fn default_rps() -> u32 {
    5
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_members_file() -> String {
    "user_data.json".to_string()
}

fn default_names_file() -> String {
    "results.txt".to_string()
}

fn default_metadata_file() -> String {
    "run_metadata.json".to_string()
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            credentials: Credentials::default(),
            api_base_url: default_api_url(),
            fetch: FetchConfig::default(),
            rate_limits: RateLimitConfig::default(),
            paths: PathConfig::default(),
        }
    }
}

impl ScraperConfig {
    /// Load configuration from environment (and `.env`, if present)
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = Self::default();
        config.apply_env();
        Ok(config)
    }

    /// Load from a TOML config file with environment overrides
    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let contents = std::fs::read_to_string(path)?;
        let mut config: Self = ::toml::from_str(&contents)?;

        // Environment variables override file settings
        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        self.credentials.apply_env();
        if let Ok(url) = std::env::var(ENV_API_URL) {
            self.api_base_url = url;
        }
    }

    /// Check the settings the login and listing phases depend on
    pub fn validate(&self) -> anyhow::Result<()> {
        let missing = self.credentials.missing();
        if !missing.is_empty() {
            anyhow::bail!(
                "Missing credentials. Please set {}.",
                missing.join(", ")
            );
        }
        if self.fetch.page_size == 0 {
            anyhow::bail!("fetch.page_size must be > 0");
        }
        if self.rate_limits.requests_per_second == 0 {
            anyhow::bail!("rate_limits.requests_per_second must be > 0");
        }
        Ok(())
    }

    /// Ensure the output directory exists
    pub fn ensure_directories(&self) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.paths.output_dir)?;
        Ok(())
    }
}
