//! Configuration file resolution and TOML loading

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable naming the configuration file
pub const CONFIG_ENV_VAR: &str = "BIDS_CONVERT_CONFIG";

/// File name looked up in the working directory and the user config directory
pub const CONFIG_FILE_NAME: &str = "bids-convert.toml";

/// Logging configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Configuration file resolution, in priority order:
/// 1. Command-line argument
/// 2. Environment variable
/// 3. `bids-convert.toml` in the working directory
/// 4. `<user config dir>/bids-convert/config.toml`
pub struct ConfigFileResolver {
    env_var_name: String,
    working_dir: PathBuf,
}

impl ConfigFileResolver {
    pub fn new() -> Self {
        Self {
            env_var_name: CONFIG_ENV_VAR.to_string(),
            working_dir: PathBuf::from("."),
        }
    }

    /// Resolve relative to a different working directory (used by tests)
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }

    pub fn resolve(&self, cli_arg: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = cli_arg {
            return Ok(path.to_path_buf());
        }

        if let Ok(path) = std::env::var(&self.env_var_name) {
            if !path.trim().is_empty() {
                return Ok(PathBuf::from(path));
            }
        }

        let local = self.working_dir.join(CONFIG_FILE_NAME);
        if local.exists() {
            return Ok(local);
        }

        if let Some(user) = user_config_file() {
            if user.exists() {
                return Ok(user);
            }
        }

        Err(Error::Config(format!(
            "No configuration file found. Pass --config, set {}, or create ./{}",
            self.env_var_name, CONFIG_FILE_NAME
        )))
    }
}

impl Default for ConfigFileResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-user configuration file location
pub fn user_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("bids-convert").join("config.toml"))
}

/// Read and deserialize a TOML file
pub fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    let value = toml::from_str(&content)?;
    Ok(value)
}
