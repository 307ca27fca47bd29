//! Configuration schema (sqlsched.toml)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Location used when neither the CLI nor the config file names one
pub const DEFAULT_LOCATION: &str = "US";

/// Environment variable read for the Data Transfer API bearer token
pub const DEFAULT_ACCESS_TOKEN_ENV: &str = "GOOGLE_OAUTH_ACCESS_TOKEN";

/// Warehouse connection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarehouseConfig {
    /// Default GCP project for dry runs and deploys
    #[serde(default)]
    pub project_id: Option<String>,

    /// BigQuery / Data Transfer location
    #[serde(default = "default_location")]
    pub location: String,

    /// Service account key file; Application Default Credentials when unset
    #[serde(default)]
    pub credentials: Option<PathBuf>,

    /// Environment variable holding an OAuth access token for the Data Transfer API
    #[serde(default = "default_access_token_env")]
    pub access_token_env: String,

    /// Per-call deadline for remote requests, in seconds
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_location() -> String {
    DEFAULT_LOCATION.to_string()
}

fn default_access_token_env() -> String {
    DEFAULT_ACCESS_TOKEN_ENV.to_string()
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            project_id: None,
            location: default_location(),
            credentials: None,
            access_token_env: default_access_token_env(),
            timeout_secs: None,
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding SQL templates
    #[serde(default)]
    pub templates_root: Option<PathBuf>,

    /// Warehouse connection configuration
    #[serde(default)]
    pub warehouse: WarehouseConfig,

    /// Project root path (for resolving relative paths)
    #[serde(skip)]
    pub project_root: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            templates_root: None,
            warehouse: WarehouseConfig::default(),
            project_root: std::env::current_dir().unwrap_or_default(),
        }
    }
}

impl Config {
    /// Load config from TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        let mut config: Config = toml::from_str(&contents)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;

        // Set project root to parent of config file
        if let Some(parent) = path.parent() {
            config.project_root = parent.to_path_buf();
        }

        Ok(config)
    }

    /// Load config from TOML string
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml)
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Templates root resolved against the project root
    pub fn resolved_templates_root(&self) -> Option<PathBuf> {
        self.templates_root.as_ref().map(|root| {
            if root.is_relative() {
                self.project_root.join(root)
            } else {
                root.clone()
            }
        })
    }
}

/// Config error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),
}
