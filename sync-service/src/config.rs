//! Layered configuration.
//!
//! Precedence, lowest first:
//! 1. Defaults (from the `Default` impls)
//! 2. Config file (`promptsync.toml`)
//! 3. Environment variables (`PROMPTSYNC_*`, `__` between nested keys),
//!    e.g. `PROMPTSYNC_REMOTE__PROJECT_ID=1234`

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const ENV_PREFIX: &str = "PROMPTSYNC";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(String),

    #[error("Configuration file not found at path: {0}")]
    FileNotFound(PathBuf),

    #[error("Invalid configuration value: {0}")]
    Validation(String),

    #[error("Could not determine a data directory; set storage.data_dir")]
    NoDataDir,
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::Load(err.to_string())
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Load(err.to_string())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub remote: RemoteConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

/// Where the shared document lives and how changes are proposed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// API root of the hosting platform.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Project id or `namespace/project` path.
    #[serde(default)]
    pub project_id: String,

    /// Repository path of the prompt document.
    #[serde(default = "default_file_path")]
    pub file_path: String,

    /// Branch the document is read from and push branches start at.
    #[serde(default = "default_branch")]
    pub base_branch: String,

    /// Branch merge requests target.
    #[serde(default = "default_branch")]
    pub target_branch: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory for persisted prompt state. Defaults to
    /// `$XDG_DATA_HOME/promptsync`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

fn default_api_url() -> String {
    "https://gitlab.com/api/v4".to_string()
}
fn default_file_path() -> String {
    "prompts.json".to_string()
}
fn default_branch() -> String {
    "main".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            project_id: String::new(),
            file_path: default_file_path(),
            base_branch: default_branch(),
            target_branch: default_branch(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl RemoteConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl StorageConfig {
    pub fn resolve_data_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => dirs::data_dir()
                .map(|dir| dir.join("promptsync"))
                .ok_or(ConfigError::NoDataDir),
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let remote = &self.remote;
        if remote.project_id.trim().is_empty() {
            return Err(ConfigError::Validation(
                "remote.project_id must be set".to_string(),
            ));
        }
        if remote.file_path.trim().is_empty() {
            return Err(ConfigError::Validation(
                "remote.file_path must not be empty".to_string(),
            ));
        }
        if remote.base_branch.trim().is_empty() || remote.target_branch.trim().is_empty() {
            return Err(ConfigError::Validation(
                "remote branches must not be empty".to_string(),
            ));
        }
        if remote.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "remote.timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration loader with layered merging support.
#[derive(Default)]
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Loads and validates the merged configuration.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let config = self.load_unvalidated()?;
        config.validate()?;
        Ok(config)
    }

    /// Merges defaults, file and environment without validating.
    pub fn load_unvalidated(&self) -> Result<AppConfig, ConfigError> {
        let defaults_json = serde_json::to_string(&AppConfig::default())?;
        let mut builder = Config::builder().add_source(config::File::from_str(
            &defaults_json,
            config::FileFormat::Json,
        ));

        if let Some(ref path) = self.config_path {
            if !path.exists() {
                return Err(ConfigError::FileNotFound(path.clone()));
            }
            builder = builder.add_source(File::from(path.as_ref()));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        Ok(builder.build()?.try_deserialize()?)
    }

    /// Locates a config file in standard locations:
    /// 1. `./promptsync.toml`
    /// 2. `~/.config/promptsync/config.toml`
    /// 3. `~/.promptsync.toml`
    pub fn find_config_file() -> Option<PathBuf> {
        let cwd_config = PathBuf::from("./promptsync.toml");
        if cwd_config.exists() {
            return Some(cwd_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let xdg_config = config_dir.join("promptsync").join("config.toml");
            if xdg_config.exists() {
                return Some(xdg_config);
            }
        }

        if let Some(home_dir) = dirs::home_dir() {
            let home_config = home_dir.join(".promptsync.toml");
            if home_config.exists() {
                return Some(home_config);
            }
        }

        None
    }

    /// Loads from the first file found by [`Self::find_config_file`], if any.
    pub fn load_default() -> Result<AppConfig, ConfigError> {
        match Self::find_config_file() {
            Some(path) => ConfigLoader::new().with_file(path).load(),
            None => ConfigLoader::new().load(),
        }
    }
}
