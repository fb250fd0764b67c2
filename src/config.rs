//! Runtime settings.
//!
//! Loaded from an optional `muniscrape.toml` next to the working directory,
//! with environment variables taking precedence. A `.env` file is honored
//! via dotenvy before anything reads the environment.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

fn default_database_path() -> PathBuf {
    PathBuf::from("muniscrape.db")
}

fn default_request_delay_ms() -> u64 {
    1000
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36".to_string()
}

fn default_geocoding_timeout_secs() -> u64 {
    10
}

/// Application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    /// Politeness delay between requests to the same site.
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Retry budget for transient fetch failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Google Maps Geocoding API key. Empty disables real geocoding calls
    /// unless dry-run is on.
    #[serde(default)]
    pub google_api_key: String,
    /// Log geocoding queries instead of calling the provider.
    #[serde(default)]
    pub geocoding_dry_run: bool,
    #[serde(default = "default_geocoding_timeout_secs")]
    pub geocoding_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            request_delay_ms: default_request_delay_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            max_retries: default_max_retries(),
            user_agent: default_user_agent(),
            google_api_key: String::new(),
            geocoding_dry_run: false,
            geocoding_timeout_secs: default_geocoding_timeout_secs(),
        }
    }
}

impl Settings {
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn geocoding_timeout(&self) -> Duration {
        Duration::from_secs(self.geocoding_timeout_secs)
    }

    /// Apply environment variable overrides.
    fn apply_env(&mut self) {
        if let Ok(path) = std::env::var("MUNISCRAPE_DATABASE") {
            self.database_path = PathBuf::from(path);
        }
        if let Ok(delay) = std::env::var("MUNISCRAPE_REQUEST_DELAY_MS") {
            if let Ok(ms) = delay.parse() {
                self.request_delay_ms = ms;
            }
        }
        if let Ok(agent) = std::env::var("MUNISCRAPE_USER_AGENT") {
            self.user_agent = agent;
        }
        if let Ok(key) = std::env::var("GOOGLE_API_KEY") {
            self.google_api_key = key;
        }
        if let Ok(flag) = std::env::var("GEOCODING_DRY_RUN") {
            self.geocoding_dry_run = matches!(flag.as_str(), "1" | "true" | "yes");
        }
    }
}

/// Load settings: defaults, then the config file if present, then the
/// environment.
pub fn load_settings(config_file: Option<&Path>) -> anyhow::Result<Settings> {
    let path = config_file.unwrap_or_else(|| Path::new("muniscrape.toml"));

    let mut settings = if path.exists() {
        let raw = fs::read_to_string(path)?;
        toml::from_str(&raw)?
    } else {
        Settings::default()
    };

    settings.apply_env();
    Ok(settings)
}
