use std::path::{Path, PathBuf};
use std::time::Duration;

use common::crypto::{PassphraseError, Pbkdf2Params, PBKDF2_MIN_ITERATIONS};
use common::vault::UnlockPolicy;
use serde::{Deserialize, Serialize};
use url::Url;

pub const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    Io(PathBuf, std::io::Error),
    #[error("failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid log level: {0}")]
    InvalidLogLevel(String),
    #[error("invalid pbkdf2 parameters: {0}")]
    Pbkdf2(#[from] PassphraseError),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Base URL for the backup and room endpoints
    pub api_url: Url,
    /// SQLite database for durable keys; in-memory when absent
    #[serde(default)]
    pub sqlite_path: Option<PathBuf>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Directory for daily-rolling log files
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
    #[serde(default = "default_pbkdf2_iterations")]
    pub pbkdf2_iterations: u32,
    #[serde(default = "default_unlock_max_failures")]
    pub unlock_max_failures: u32,
    #[serde(default = "default_unlock_lockout_secs")]
    pub unlock_lockout_secs: u64,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_pbkdf2_iterations() -> u32 {
    PBKDF2_MIN_ITERATIONS
}

fn default_unlock_max_failures() -> u32 {
    5
}

fn default_unlock_lockout_secs() -> u64 {
    30
}

impl Config {
    /// Config with defaults for everything but the API URL
    pub fn new(api_url: Url) -> Self {
        Self {
            api_url,
            sqlite_path: None,
            log_level: default_log_level(),
            log_dir: None,
            pbkdf2_iterations: default_pbkdf2_iterations(),
            unlock_max_failures: default_unlock_max_failures(),
            unlock_lockout_secs: default_unlock_lockout_secs(),
        }
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents)
    }

    /// Parse and validate
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.level()?;
        self.pbkdf2_params()?;
        if self.unlock_max_failures == 0 {
            return Err(ConfigError::Invalid(
                "unlock_max_failures must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn level(&self) -> Result<tracing::Level, ConfigError> {
        self.log_level
            .parse()
            .map_err(|_| ConfigError::InvalidLogLevel(self.log_level.clone()))
    }

    pub fn pbkdf2_params(&self) -> Result<Pbkdf2Params, ConfigError> {
        Ok(Pbkdf2Params::new(self.pbkdf2_iterations)?)
    }

    pub fn unlock_policy(&self) -> UnlockPolicy {
        UnlockPolicy {
            max_failures: self.unlock_max_failures,
            lockout: Duration::from_secs(self.unlock_lockout_secs),
        }
    }
}
