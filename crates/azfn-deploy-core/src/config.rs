//! Configuration management for azfn-deploy
//!
//! Handles loading of the user configuration file that supplies defaults for:
//! - Azure regions (function app and OpenAI)
//! - Template and source locations
//! - Settle delay and smoke-test timeout
//! - Target environment

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::utils::expand_tilde;

pub const DEFAULT_LOCATION: &str = "eastus";
pub const DEFAULT_OPENAI_LOCATION: &str = "eastus";
pub const DEFAULT_TEMPLATE: &str = "azuredeploy.json";
pub const DEFAULT_SETTLE_SECS: u64 = 30;
pub const DEFAULT_SMOKE_TIMEOUT_SECS: u64 = 60;

/// Target environment of a deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "development" | "dev" => Some(Environment::Development),
            "staging" | "stage" => Some(Environment::Staging),
            "production" | "prod" => Some(Environment::Production),
            _ => None,
        }
    }

    pub fn all() -> &'static [Environment] {
        &[
            Environment::Development,
            Environment::Staging,
            Environment::Production,
        ]
    }
}

impl Default for Environment {
    fn default() -> Self {
        Environment::Production
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Main configuration file structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConfigFile {
    pub environment: Environment,
    pub location: String,
    #[serde(rename = "openAILocation")]
    pub openai_location: String,
    pub template_file: String,
    pub source_dir: String,
    pub settle_delay_secs: u64,
    pub smoke_timeout_secs: u64,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            environment: Environment::Production,
            location: DEFAULT_LOCATION.to_string(),
            openai_location: DEFAULT_OPENAI_LOCATION.to_string(),
            template_file: DEFAULT_TEMPLATE.to_string(),
            source_dir: ".".to_string(),
            settle_delay_secs: DEFAULT_SETTLE_SECS,
            smoke_timeout_secs: DEFAULT_SMOKE_TIMEOUT_SECS,
        }
    }
}

/// Application configuration manager
#[derive(Debug, Clone)]
pub struct AppConfig {
    config: ConfigFile,
    current_env: Environment,
    path: Option<PathBuf>,
}

impl AppConfig {
    /// Load configuration from the user config file, falling back to defaults
    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;
        Self::load_from(&config_path)
    }

    /// Load configuration from an explicit path; a missing file yields the defaults
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let (config, path) = if config_path.exists() {
            let content = fs::read_to_string(config_path)
                .with_context(|| format!("Failed to read config file {}", config_path.display()))?;
            let config: ConfigFile = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse config file {}", config_path.display()))?;
            (config, Some(config_path.to_path_buf()))
        } else {
            (ConfigFile::default(), None)
        };

        // Environment variable wins over the file
        let current_env = std::env::var("AZFN_DEPLOY_ENV")
            .ok()
            .and_then(|s| Environment::from_str(&s))
            .unwrap_or(config.environment);

        Ok(Self {
            config,
            current_env,
            path,
        })
    }

    pub fn from_file(config: ConfigFile) -> Self {
        Self {
            current_env: config.environment,
            config,
            path: None,
        }
    }

    pub fn get_environment(&self) -> Environment {
        self.current_env
    }

    pub fn location(&self) -> &str {
        &self.config.location
    }

    pub fn openai_location(&self) -> &str {
        &self.config.openai_location
    }

    pub fn template_path(&self) -> PathBuf {
        expand_tilde(&self.config.template_file)
    }

    pub fn source_dir(&self) -> PathBuf {
        expand_tilde(&self.config.source_dir)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.config.settle_delay_secs)
    }

    pub fn smoke_timeout(&self) -> Duration {
        Duration::from_secs(self.config.smoke_timeout_secs)
    }

    /// Path the configuration was read from, if a file existed
    pub fn source_path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn get_config_path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Failed to get home directory")?;
        Ok(home.join(".config/azfn-deploy/config.json"))
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_file(ConfigFile::default())
    }
}
