//! Configuration types and loading
//!
//! Config precedence: env vars > config file > defaults.
//! The access token override comes from SESSION_ACCESS_TOKEN only; tokens
//! are never stored in the TOML.

use common::Secret;
use serde::Deserialize;
use session_client::{CoordinatorOptions, DEFAULT_FALLBACK_MESSAGE};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    pub session: SessionConfig,
}

/// API endpoint settings
#[derive(Debug, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

/// Session persistence and refresh settings
#[derive(Debug, Deserialize)]
pub struct SessionConfig {
    /// Where the token pair lives (SESSION_TOKEN_FILE overrides)
    #[serde(default)]
    pub token_file: Option<PathBuf>,
    #[serde(default)]
    pub refresh_timeout_secs: Option<u64>,
    #[serde(default = "default_fallback_message")]
    pub fallback_message: String,
    #[serde(skip)]
    pub access_token: Option<Secret<String>>,
}

fn default_timeout() -> u64 {
    30
}

fn default_fallback_message() -> String {
    DEFAULT_FALLBACK_MESSAGE.to_string()
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if let Some(token_file) = non_empty_env("SESSION_TOKEN_FILE") {
            config.session.token_file = Some(PathBuf::from(token_file));
        }
        if let Some(token) = non_empty_env("SESSION_ACCESS_TOKEN") {
            config.session.access_token = Some(Secret::new(token));
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        if !self.api.base_url.starts_with("http://") && !self.api.base_url.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "base_url must start with http:// or https://, got: {}",
                self.api.base_url
            )));
        }

        if self.api.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        if self.session.refresh_timeout_secs == Some(0) {
            return Err(common::Error::Config(
                "refresh_timeout_secs must be greater than 0".into(),
            ));
        }

        if self.session.token_file.is_none() {
            return Err(common::Error::Config(
                "session.token_file is required (or set SESSION_TOKEN_FILE)".into(),
            ));
        }

        Ok(())
    }

    /// Token file path. Present after a successful `load`.
    pub fn token_file(&self) -> common::Result<&Path> {
        self.session
            .token_file
            .as_deref()
            .ok_or_else(|| common::Error::Config("session.token_file is not set".into()))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_secs)
    }

    pub fn coordinator_options(&self) -> CoordinatorOptions {
        CoordinatorOptions {
            refresh_timeout: self.session.refresh_timeout_secs.map(Duration::from_secs),
            fallback_message: self.session.fallback_message.clone(),
        }
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("session-cli.toml")
    }
}
